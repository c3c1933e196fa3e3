//! A library for converting intermediate course documents into Mario Kart
//! Wii track archives.
//!
//! The input is the offset-indexed binary document (`.szs.data`) emitted by
//! the track authoring tool. [archive::build_archive] decodes the document,
//! assembles a course model, a skybox model, a collision mesh and a
//! track-info record, packages them into a single-directory U8 archive and
//! compresses the result with Yaz0.
//!
//! ```rust no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = std::fs::read("castle_course.szs.data")?;
//! let szs = szs_builder::archive::build_archive(&data, szs_builder::ctd::FormatVersion::V4)?;
//! std::fs::write("castle_course.szs", szs)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! The document format has no self-describing schema. Record boundaries and
//! field widths are positional and have changed across four incompatible
//! revisions, so each record kind gets an explicit fixed-shape decoder in
//! [ctd] selected by [ctd::FormatVersion]. Cross-references between
//! textures, shaders, materials and objects go through names resolved from
//! a shared string table. A lookup miss is a typed reference error, never a
//! silent fallback.
//!
//! Out-of-range offsets and counts fail fast with a descriptive error.
//! The decoder never mirrors the original tool's unchecked reads.
use std::io::{Read, Seek, SeekFrom};

use binrw::{BinReaderExt, BinResult};

pub mod archive;
pub mod brres;
pub mod collision;
pub mod ctd;
pub mod error;
pub mod kcl;
pub mod kmp;
pub mod model;
pub mod scene;
pub mod track_info;
pub mod u8arc;
pub mod yaz0;

/// Reads the recurring offset-table pattern: a `u32` count followed by
/// `count` `u32` offsets, each relative to `base`, the start of the table's
/// owning sub-region. Restores the stream position afterwards.
pub(crate) fn parse_offset_table<R, T, F>(reader: &mut R, base: u64, mut parse: F) -> BinResult<Vec<T>>
where
    R: Read + Seek,
    F: FnMut(&mut R) -> BinResult<T>,
{
    let count = reader.read_be::<u32>()?;
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(reader.read_be::<u32>()?);
    }

    let saved_pos = reader.stream_position()?;

    let mut items = Vec::with_capacity(count as usize);
    for offset in offsets {
        reader.seek(SeekFrom::Start(base + offset as u64))?;
        items.push(parse(reader)?);
    }

    reader.seek(SeekFrom::Start(saved_pos))?;

    Ok(items)
}

/// Reads exactly `count` raw bytes at the current position.
pub(crate) fn read_bytes<R: Read + Seek>(reader: &mut R, count: usize) -> BinResult<Vec<u8>> {
    let mut data = vec![0u8; count];
    reader.read_exact(&mut data).map_err(binrw::Error::Io)?;
    Ok(data)
}
