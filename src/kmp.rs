//! Writing of KMP course parameter files.
//!
//! The file is an `RKMD` header with fifteen fixed-order sections. Only the
//! start position (`KTPT`) and stage info (`STGI`) carry data from the
//! track info; the remaining sections are written as empty headers so the
//! file stays structurally complete for downstream editors.
use std::io::{Cursor, Seek, SeekFrom, Write};

use binrw::{BinResult, BinWrite};
use glam::Vec3;
use log::debug;

use crate::track_info::{StartSide, TrackInfo};

const MAGIC: [u8; 4] = *b"RKMD";
const VERSION: u32 = 0x9D8;
const SECTION_COUNT: u16 = 15;
/// Header: magic, file size, section count, header size, version, then one
/// offset per section.
const HEADER_SIZE: u16 = 0x10 + SECTION_COUNT as u16 * 4;

const SECTION_MAGICS: [&[u8; 4]; SECTION_COUNT as usize] = [
    b"KTPT", b"ENPT", b"ENPH", b"ITPT", b"ITPH", b"CKPT", b"CKPH", b"GOBJ",
    b"POTI", b"AREA", b"CAME", b"JGPT", b"CNPT", b"MSPT", b"STGI",
];

/// Serializes a KMP populated from `info`.
///
/// Section offsets are relative to the end of the file header. The file
/// size is backpatched once the last section is written.
pub fn write_kmp<W: Write + Seek>(writer: &mut W, info: &TrackInfo) -> BinResult<()> {
    let be = binrw::Endian::Big;
    let start = writer.stream_position()?;

    MAGIC.write_options(writer, be, ())?;
    0u32.write_options(writer, be, ())?; // file size, patched below
    SECTION_COUNT.write_options(writer, be, ())?;
    HEADER_SIZE.write_options(writer, be, ())?;
    VERSION.write_options(writer, be, ())?;
    let offsets_pos = writer.stream_position()?;
    [0u32; SECTION_COUNT as usize].write_options(writer, be, ())?;

    let mut offsets = [0u32; SECTION_COUNT as usize];
    for (index, magic) in SECTION_MAGICS.iter().enumerate() {
        offsets[index] = (writer.stream_position()? - start) as u32 - HEADER_SIZE as u32;
        match **magic {
            MAGIC_KTPT => write_ktpt(writer, info)?,
            MAGIC_STGI => write_stgi(writer, info)?,
            _ => write_section_header(writer, magic, 0)?,
        }
    }

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(start + 4))?;
    ((end - start) as u32).write_options(writer, be, ())?;
    writer.seek(SeekFrom::Start(offsets_pos))?;
    offsets.write_options(writer, be, ())?;
    writer.seek(SeekFrom::Start(end))?;

    debug!("kmp: {} bytes", end - start);
    Ok(())
}

const MAGIC_KTPT: [u8; 4] = *b"KTPT";
const MAGIC_STGI: [u8; 4] = *b"STGI";

fn write_section_header<W: Write + Seek>(
    writer: &mut W,
    magic: &[u8; 4],
    entries: u16,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    magic.write_options(writer, be, ())?;
    entries.write_options(writer, be, ())?;
    // Per-section extra value, unused by every section we emit.
    0u16.write_options(writer, be, ())?;
    Ok(())
}

/// One start point for all players at the track-info transform.
fn write_ktpt<W: Write + Seek>(writer: &mut W, info: &TrackInfo) -> BinResult<()> {
    let be = binrw::Endian::Big;
    write_section_header(writer, &MAGIC_KTPT, 1)?;
    write_vec3(writer, info.start_position)?;
    write_vec3(writer, degrees(info.start_rotation))?;
    (-1i16).write_options(writer, be, ())?; // all player indices
    0u16.write_options(writer, be, ())?;
    Ok(())
}

fn write_stgi<W: Write + Seek>(writer: &mut W, info: &TrackInfo) -> BinResult<()> {
    let be = binrw::Endian::Big;
    write_section_header(writer, &MAGIC_STGI, 1)?;
    info.lap_count.write_options(writer, be, ())?;
    let pole: u8 = match info.start_side {
        StartSide::Left => 0,
        StartSide::Right => 1,
    };
    pole.write_options(writer, be, ())?;
    // Normal start grid spacing, lens flare enabled, opaque white flare.
    0u8.write_options(writer, be, ())?;
    1u8.write_options(writer, be, ())?;
    0xFFFFFF00u32.write_options(writer, be, ())?;
    0u8.write_options(writer, be, ())?;
    // No speed modifier.
    0u16.write_options(writer, be, ())?;
    0u8.write_options(writer, be, ())?;
    Ok(())
}

fn write_vec3<W: Write + Seek>(writer: &mut W, v: Vec3) -> BinResult<()> {
    v.to_array().write_options(writer, binrw::Endian::Big, ())
}

/// The document stores rotations in radians; KMP stores degrees.
fn degrees(v: Vec3) -> Vec3 {
    Vec3::new(
        v.x.to_degrees(),
        v.y.to_degrees(),
        v.z.to_degrees(),
    )
}

/// Serializes to a byte vector.
pub fn to_bytes(info: &TrackInfo) -> BinResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    write_kmp(&mut out, info)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn info() -> TrackInfo {
        TrackInfo {
            lap_count: 3,
            start_side: StartSide::Right,
            start_position: Vec3::new(1000.0, 0.0, -500.0),
            start_rotation: Vec3::new(0.0, std::f32::consts::PI, 0.0),
        }
    }

    #[test]
    fn header_and_section_directory() {
        let bytes = to_bytes(&info()).unwrap();

        assert_eq!(b"RKMD", &bytes[..4]);
        let file_size = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(bytes.len() as u32, file_size);
        assert_eq!(15, u16::from_be_bytes(bytes[8..10].try_into().unwrap()));
        let header_size = u16::from_be_bytes(bytes[10..12].try_into().unwrap());
        assert_eq!(0x4C, header_size);

        // Every section offset points at its magic.
        for (index, magic) in SECTION_MAGICS.iter().enumerate() {
            let dir = 0x10 + index * 4;
            let off = u32::from_be_bytes(bytes[dir..dir + 4].try_into().unwrap());
            let section = header_size as usize + off as usize;
            assert_eq!(&magic[..], &bytes[section..section + 4]);
        }
    }

    #[test]
    fn ktpt_carries_start_transform_in_degrees() {
        let bytes = to_bytes(&info()).unwrap();

        // KTPT is the first section, right after the header.
        let entry = 0x4C + 8;
        let x = f32::from_be_bytes(bytes[entry..entry + 4].try_into().unwrap());
        assert_eq!(1000.0, x);
        let yaw = f32::from_be_bytes(bytes[entry + 16..entry + 20].try_into().unwrap());
        assert_eq!(180.0, yaw);
        let player = i16::from_be_bytes(bytes[entry + 24..entry + 26].try_into().unwrap());
        assert_eq!(-1, player);
    }

    #[test]
    fn stgi_carries_laps_and_pole_position() {
        let bytes = to_bytes(&info()).unwrap();

        // STGI is the last section: header 8 bytes, then the 12 byte entry.
        let entry = bytes.len() - 12;
        assert_eq!(b"STGI", &bytes[entry - 8..entry - 4]);
        assert_eq!(3, bytes[entry]);
        assert_eq!(1, bytes[entry + 1]);
    }

    #[test]
    fn middle_sections_are_empty_headers() {
        let bytes = to_bytes(&info()).unwrap();
        // ENPT follows KTPT's single 0x1C entry.
        let enpt = 0x4C + 8 + 0x1C;
        assert_eq!(b"ENPT", &bytes[enpt..enpt + 4]);
        assert_eq!(0, u16::from_be_bytes(bytes[enpt + 4..enpt + 6].try_into().unwrap()));
    }
}
