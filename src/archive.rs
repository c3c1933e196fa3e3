//! The document-to-archive pipeline.
use std::io::Cursor;

use log::info;

use crate::{
    brres, collision,
    ctd::{Document, FormatVersion},
    error::BuildArchiveError,
    kcl::KclFile,
    kmp, model, track_info,
    u8arc::U8Archive,
    yaz0,
};

/// Names inside the archive's single `.` directory, in insertion order.
const KMP_NAME: &str = "course.kmp";
const COURSE_MODEL_NAME: &str = "course_model.brres";
const SKYBOX_MODEL_NAME: &str = "vrcorn_model.brres";
const KCL_NAME: &str = "course.kcl";

/// Converts raw document bytes into a compressed SZS archive.
///
/// The build is all or nothing: any decode or reference error aborts with
/// no output. Identical input bytes and version produce identical output
/// bytes.
pub fn build_archive(
    document: &[u8],
    version: FormatVersion,
) -> Result<Vec<u8>, BuildArchiveError> {
    let document = Document::from_bytes(document, version)?;

    let course = model::assemble_model(&document.course_model, &document.strings, "course")
        .map_err(|source| BuildArchiveError::Model {
            name: "course".to_string(),
            source,
        })?;
    let skybox = model::assemble_model(&document.skybox_model, &document.strings, "vrcorn")
        .map_err(|source| BuildArchiveError::Model {
            name: "vrcorn".to_string(),
            source,
        })?;
    let mesh = collision::assemble_collision(&document.collision);
    let info = track_info::assemble_track_info(&document.track_info);

    let mut archive = U8Archive::new(".");
    archive.add_file(KMP_NAME, kmp::to_bytes(&info)?);
    archive.add_file(COURSE_MODEL_NAME, brres::to_bytes(&course)?);
    archive.add_file(SKYBOX_MODEL_NAME, brres::to_bytes(&skybox)?);
    archive.add_file(KCL_NAME, KclFile::from_mesh(&mesh)?.to_bytes()?);

    let mut packed = Cursor::new(Vec::new());
    archive.write(&mut packed)?;
    let packed = packed.into_inner();

    let compressed = yaz0::compress(&packed);
    info!(
        "archive: {} bytes packed, {} bytes compressed",
        packed.len(),
        compressed.len()
    );
    Ok(compressed)
}
