use thiserror::Error;

/// Errors raised while decoding the intermediate course document.
///
/// The decoder fails fast: declared counts and offsets that do not fit the
/// document are reported here instead of reading out of bounds.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("error reading document data")]
    Binrw(#[from] binrw::Error),

    #[error("string table offset {offset:#x} is out of bounds")]
    StringOffsetOutOfBounds { offset: u32 },

    #[error("missing null terminator for string table offset {offset:#x}")]
    UnterminatedString { offset: u32 },

    #[error("string table offset {offset:#x} does not address valid UTF-8")]
    InvalidString { offset: u32 },

    #[error("collision face count mismatch: header declares {declared}, groups contain {actual}")]
    FaceCountMismatch { declared: u32, actual: u32 },
}

/// Errors raised while assembling a model scene from decoded records.
///
/// Reference errors are fatal. The build produces either a complete,
/// internally consistent archive or none at all.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("error resolving name from string table")]
    Name(#[from] DecodeError),

    #[error("material `{material}` references undefined shader `{shader}`")]
    UnknownShader { material: String, shader: String },

    #[error("material `{material}` references undefined texture `{texture}`")]
    UnknownTexture { material: String, texture: String },

    #[error("object `{object}` references undefined material `{material}`")]
    UnknownMaterial { object: String, material: String },

    #[error("duplicate {kind} name `{name}`")]
    Duplicate { kind: &'static str, name: String },
}

/// Errors raised by the archive packaging pipeline.
#[derive(Debug, Error)]
pub enum BuildArchiveError {
    #[error("error decoding course document")]
    Decode(#[from] DecodeError),

    #[error("error assembling model `{name}`")]
    Model {
        name: String,
        #[source]
        source: AssembleError,
    },

    #[error("error building collision file")]
    Collision(#[from] crate::kcl::KclError),

    #[error("error encoding archive files")]
    Encode(#[from] binrw::Error),
}
