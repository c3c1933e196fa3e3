//! Decoding for the intermediate course document emitted by the track
//! authoring tool (`.szs.data` files).
//!
//! A document is one byte region holding four sub-regions addressed by a
//! 0x10 byte header: track info, models, collision and the shared string
//! table. All integers are big-endian. Offsets inside a sub-region are
//! relative to that sub-region, and names are 4-byte offsets into the
//! string table.
//!
//! The layout changed across four incompatible revisions; [FormatVersion]
//! selects the exact offset and size arithmetic. Only the material, shader
//! and texture shapes differ between revisions, so the attribute array,
//! geometry and collision decoding is shared.
use std::io::{Cursor, Read, Seek, SeekFrom};

use binrw::{binread, BinRead, BinReaderExt, BinResult};
use log::debug;

use crate::{error::DecodeError, parse_offset_table, read_bytes};

pub const VERTEX_SIZE: usize = 0x0C;
pub const NORMAL_SIZE: usize = 0x0C;
pub const COLOR_SIZE: usize = 0x04;
pub const TEXCOORD_SIZE: usize = 0x08;
pub const COLLISION_VERTEX_SIZE: usize = 0x24;

/// The observed revisions of the document format.
///
/// - [V1](FormatVersion::V1): objects only, one geometry span and an inline
///   constant colour per object; grouped collision region.
/// - [V2](FormatVersion::V2): named material records; flattened collision.
/// - [V3](FormatVersion::V3): texture records and material texture layers.
/// - [V4](FormatVersion::V4): shader records with TEV stages, per-object
///   colour/texcoord layer tables and a part table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatVersion {
    V1,
    V2,
    V3,
    V4,
}

/// A fully decoded course document.
#[derive(Debug)]
pub struct Document {
    pub track_info: TrackInfoRecord,
    pub course_model: Model,
    pub skybox_model: Model,
    pub collision: Collision,
    pub strings: StringTable,
}

impl Document {
    pub fn from_bytes(bytes: &[u8], version: FormatVersion) -> Result<Self, DecodeError> {
        let mut reader = Cursor::new(bytes);

        let track_info_off = reader.read_be::<u32>()? as u64;
        let models_off = reader.read_be::<u32>()? as u64;
        let collision_off = reader.read_be::<u32>()? as u64;
        let string_table_off = reader.read_be::<u32>()? as usize;

        debug!(
            "document regions: track info {track_info_off:#x}, models {models_off:#x}, \
             collision {collision_off:#x}, string table {string_table_off:#x}"
        );

        reader.seek(SeekFrom::Start(track_info_off)).map_err(binrw::Error::Io)?;
        let track_info = reader.read_be::<TrackInfoRecord>()?;

        reader.seek(SeekFrom::Start(models_off)).map_err(binrw::Error::Io)?;
        let course_off = reader.read_be::<u32>()? as u64;
        let skybox_off = reader.read_be::<u32>()? as u64;
        let course_model = Model::parse(&mut reader, models_off + course_off, version)?;
        let skybox_model = Model::parse(&mut reader, models_off + skybox_off, version)?;

        let collision = Collision::parse(&mut reader, collision_off, version)?;

        if string_table_off > bytes.len() {
            return Err(DecodeError::StringOffsetOutOfBounds {
                offset: string_table_off as u32,
            });
        }
        let strings = StringTable::new(bytes[string_table_off..].to_vec());

        Ok(Self {
            track_info,
            course_model,
            skybox_model,
            collision,
            strings,
        })
    }
}

/// The shared table of null-terminated names.
///
/// Resolution is a pure lookup. The offset must address a terminated,
/// UTF-8 encoded name within the table.
#[derive(Debug, Clone, PartialEq)]
pub struct StringTable {
    data: Vec<u8>,
}

impl StringTable {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn get(&self, offset: u32) -> Result<&str, DecodeError> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Err(DecodeError::StringOffsetOutOfBounds { offset });
        }
        let len = self.data[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeError::UnterminatedString { offset })?;
        std::str::from_utf8(&self.data[start..start + len])
            .map_err(|_| DecodeError::InvalidString { offset })
    }
}

/// Fixed 0x20 track info record: 8 byte header, then the start transform.
#[derive(Debug, BinRead, PartialEq, Clone)]
#[br(big)]
pub struct TrackInfoRecord {
    /// Track slot id. Decoded but unused by the pipeline.
    pub slot: u8,
    pub lap_count: u8,
    /// 0 places the start grid on the left side, anything else on the right.
    #[br(pad_after = 5)]
    pub start_side: u8,
    pub start_position: [f32; 3],
    pub start_rotation: [f32; 3],
}

/// One model sub-document. Tables absent from the revision decode as empty.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct Model {
    pub textures: Vec<TextureRecord>,
    pub shaders: Vec<ShaderRecord>,
    pub materials: Vec<MaterialRecord>,
    pub objects: Vec<ObjectRecord>,
}

impl Model {
    pub(crate) fn parse<R: Read + Seek>(
        reader: &mut R,
        base: u64,
        version: FormatVersion,
    ) -> BinResult<Self> {
        reader.seek(SeekFrom::Start(base))?;

        // Revision headers are a strict prefix chain: each later revision
        // prepends one more table offset.
        let textures_off = match version {
            FormatVersion::V3 | FormatVersion::V4 => reader.read_be::<u32>()?,
            _ => 0,
        };
        let shaders_off = match version {
            FormatVersion::V4 => reader.read_be::<u32>()?,
            _ => 0,
        };
        let materials_off = match version {
            FormatVersion::V1 => 0,
            _ => reader.read_be::<u32>()?,
        };
        // V1 has no header at all. The object table sits at the model start.
        let objects_off = match version {
            FormatVersion::V1 => 0,
            _ => reader.read_be::<u32>()?,
        };

        let textures = Self::parse_table(reader, base, textures_off, |r| r.read_be())?;
        let shaders = Self::parse_table(reader, base, shaders_off, |r| r.read_be())?;
        let materials =
            Self::parse_table(reader, base, materials_off, |r| MaterialRecord::parse(r, version))?;

        let objects = if version == FormatVersion::V1 {
            reader.seek(SeekFrom::Start(base))?;
            parse_offset_table(reader, base, |r| ObjectRecord::parse(r, version))?
        } else {
            Self::parse_table(reader, base, objects_off, |r| ObjectRecord::parse(r, version))?
        };

        Ok(Self {
            textures,
            shaders,
            materials,
            objects,
        })
    }

    /// Parses the offset table at `base + off`, treating a zero offset as an
    /// absent table.
    fn parse_table<R, T, F>(reader: &mut R, base: u64, off: u32, parse: F) -> BinResult<Vec<T>>
    where
        R: Read + Seek,
        F: FnMut(&mut R) -> BinResult<T>,
    {
        if off == 0 {
            return Ok(Vec::new());
        }
        reader.seek(SeekFrom::Start(base + off as u64))?;
        parse_offset_table(reader, base, parse)
    }
}

#[derive(Debug, BinRead, PartialEq, Eq, Clone, Copy)]
#[br(repr(u8))]
pub enum TextureFormat {
    I4 = 0,
    I8 = 1,
    Ia4 = 2,
    Ia8 = 3,
    Rgb565 = 4,
    Rgb5a3 = 5,
    Rgba32 = 6,
    Cmpr = 7,
}

#[binread]
#[derive(Debug, PartialEq, Clone)]
#[br(big)]
pub struct TextureRecord {
    pub name_off: u32,
    pub width: u16,
    pub height: u16,
    pub format: TextureFormat,
    /// Mipmap level count the external generator should produce.
    #[br(pad_after = 2)]
    pub mipmaps: u8,
    #[br(temp)]
    data_len: u32,
    #[br(count = data_len)]
    pub data: Vec<u8>,
}

#[binread]
#[derive(Debug, PartialEq, Clone)]
#[br(big)]
pub struct ShaderRecord {
    pub name_off: u32,
    #[br(temp)]
    stage_count: u32,
    #[br(count = stage_count)]
    pub stages: Vec<StageRecord>,
}

/// One fixed 0x18 TEV stage record. Field order and widths are exact.
#[derive(Debug, BinRead, PartialEq, Clone)]
#[br(big)]
pub struct StageRecord {
    pub texture_flag: u8,
    #[br(pad_after = 2)]
    pub texcoord: u8,
    pub const_color_sel: u8,
    pub const_alpha_sel: u8,
    pub color_op: CombinerRecord,
    pub alpha_op: CombinerRecord,
}

/// A 9 byte colour or alpha combiner operation.
#[derive(Debug, BinRead, PartialEq, Clone)]
#[br(big)]
pub struct CombinerRecord {
    pub args: [u8; 4],
    pub bias: u8,
    pub op: u8,
    pub clamp: u8,
    pub shift: u8,
    pub dest: u8,
}

#[derive(Debug, BinRead, PartialEq, Eq, Clone, Copy)]
#[br(repr(u8))]
pub enum WrapMode {
    Clamp = 0,
    Repeat = 1,
    Mirror = 2,
}

#[derive(Debug, BinRead, PartialEq, Eq, Clone, Copy)]
#[br(repr(u8))]
pub enum FilterMode {
    Nearest = 0,
    Linear = 1,
    NearestMipNearest = 2,
    LinearMipNearest = 3,
    NearestMipLinear = 4,
    LinearMipLinear = 5,
}

/// One texture layer binding within a material record.
#[derive(Debug, BinRead, PartialEq, Clone)]
#[br(big)]
pub struct LayerRecord {
    pub texture_name_off: u32,
    pub wrap: WrapMode,
    pub min_filter: FilterMode,
    #[br(pad_after = 1)]
    pub mag_filter: FilterMode,
}

#[derive(Debug, PartialEq, Clone)]
pub struct MaterialRecord {
    pub name_off: u32,
    /// Explicit shader reference, present from V4 on. Earlier revisions
    /// choose a default shader by a fixed rule during assembly.
    pub shader_name_off: Option<u32>,
    pub color: [u8; 4],
    pub layers: Vec<LayerRecord>,
}

impl MaterialRecord {
    fn parse<R: Read + Seek>(reader: &mut R, version: FormatVersion) -> BinResult<Self> {
        let name_off = reader.read_be::<u32>()?;
        let shader_name_off = if version >= FormatVersion::V4 {
            Some(reader.read_be::<u32>()?)
        } else {
            None
        };
        let color = reader.read_be::<[u8; 4]>()?;

        let layers = if version >= FormatVersion::V3 {
            let count = reader.read_be::<u32>()?;
            (0..count)
                .map(|_| reader.read_be::<LayerRecord>())
                .collect::<BinResult<_>>()?
        } else {
            Vec::new()
        };

        Ok(Self {
            name_off,
            shader_name_off,
            color,
            layers,
        })
    }
}

/// A count-prefixed attribute array with its raw element bytes.
#[derive(Debug, PartialEq, Clone)]
pub struct AttributeRecord {
    pub count: u32,
    pub data: Vec<u8>,
}

impl AttributeRecord {
    fn parse<R: Read + Seek>(reader: &mut R, element_size: usize) -> BinResult<Self> {
        let count = reader.read_be::<u32>()?;
        let data = read_bytes(reader, count as usize * element_size)?;
        Ok(Self { count, data })
    }
}

/// An indexed geometry span, stored with its 3 byte draw header.
///
/// The span's true length is `3 + index_count * width` where the per-index
/// width is `4 + 2 * (color_layers + texcoord_layers)`.
#[derive(Debug, PartialEq, Clone)]
pub struct GeometryRecord {
    pub index_count: u16,
    pub data: Vec<u8>,
}

impl GeometryRecord {
    fn parse<R: Read + Seek>(reader: &mut R, index_width: usize) -> BinResult<Self> {
        let command = reader.read_be::<u8>()?;
        let index_count = reader.read_be::<u16>()?;
        let body = read_bytes(reader, index_count as usize * index_width)?;

        let mut data = Vec::with_capacity(3 + body.len());
        data.push(command);
        data.extend_from_slice(&index_count.to_be_bytes());
        data.extend_from_slice(&body);

        Ok(Self { index_count, data })
    }
}

/// The material reference of one drawable part.
#[derive(Debug, PartialEq, Clone)]
pub enum PartMaterial {
    /// V1 only: a constant colour baked into the object record. A material
    /// is synthesised for it during assembly.
    Color([u8; 4]),
    /// A material name offset into the string table.
    Name(u32),
}

#[derive(Debug, PartialEq, Clone)]
pub struct PartRecord {
    pub material: PartMaterial,
    pub geometry: GeometryRecord,
}

/// One object record with its attribute arrays and drawable parts.
///
/// All offsets inside the record are relative to the record start.
/// Revisions before V4 carry exactly one part and no layer tables.
#[derive(Debug, PartialEq, Clone)]
pub struct ObjectRecord {
    pub name_off: u32,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
    pub scale: [f32; 3],
    pub vertices: AttributeRecord,
    pub normals: AttributeRecord,
    pub color_layers: Vec<AttributeRecord>,
    pub texcoord_layers: Vec<AttributeRecord>,
    pub parts: Vec<PartRecord>,
}

impl ObjectRecord {
    pub(crate) fn index_width(color_layers: usize, texcoord_layers: usize) -> usize {
        4 + 2 * (color_layers + texcoord_layers)
    }

    fn parse<R: Read + Seek>(reader: &mut R, version: FormatVersion) -> BinResult<Self> {
        let base = reader.stream_position()?;

        let name_off = reader.read_be::<u32>()?;
        let verts_off = reader.read_be::<u32>()?;
        let norms_off = reader.read_be::<u32>()?;

        match version {
            FormatVersion::V1 | FormatVersion::V2 | FormatVersion::V3 => {
                let geo_off = reader.read_be::<u32>()?;
                let position = reader.read_be::<[f32; 3]>()?;
                let rotation = reader.read_be::<[f32; 3]>()?;
                let scale = reader.read_be::<[f32; 3]>()?;
                let material = match version {
                    FormatVersion::V1 => PartMaterial::Color(reader.read_be::<[u8; 4]>()?),
                    _ => PartMaterial::Name(reader.read_be::<u32>()?),
                };

                let (vertices, normals) = Self::parse_arrays(reader, base, verts_off, norms_off)?;

                reader.seek(SeekFrom::Start(base + geo_off as u64))?;
                let geometry = GeometryRecord::parse(reader, Self::index_width(0, 0))?;

                Ok(Self {
                    name_off,
                    position,
                    rotation,
                    scale,
                    vertices,
                    normals,
                    color_layers: Vec::new(),
                    texcoord_layers: Vec::new(),
                    parts: vec![PartRecord { material, geometry }],
                })
            }
            FormatVersion::V4 => {
                let colors_off = reader.read_be::<u32>()?;
                let texcoords_off = reader.read_be::<u32>()?;
                let parts_off = reader.read_be::<u32>()?;
                let position = reader.read_be::<[f32; 3]>()?;
                let rotation = reader.read_be::<[f32; 3]>()?;
                let scale = reader.read_be::<[f32; 3]>()?;

                let (vertices, normals) = Self::parse_arrays(reader, base, verts_off, norms_off)?;

                let color_layers =
                    Self::parse_layer_table(reader, base, colors_off, COLOR_SIZE)?;
                let texcoord_layers =
                    Self::parse_layer_table(reader, base, texcoords_off, TEXCOORD_SIZE)?;

                let width = Self::index_width(color_layers.len(), texcoord_layers.len());
                reader.seek(SeekFrom::Start(base + parts_off as u64))?;
                let parts = parse_offset_table(reader, base, |r| {
                    let material_name_off = r.read_be::<u32>()?;
                    let geo_off = r.read_be::<u32>()?;
                    r.seek(SeekFrom::Start(base + geo_off as u64))?;
                    let geometry = GeometryRecord::parse(r, width)?;
                    Ok(PartRecord {
                        material: PartMaterial::Name(material_name_off),
                        geometry,
                    })
                })?;

                Ok(Self {
                    name_off,
                    position,
                    rotation,
                    scale,
                    vertices,
                    normals,
                    color_layers,
                    texcoord_layers,
                    parts,
                })
            }
        }
    }

    fn parse_arrays<R: Read + Seek>(
        reader: &mut R,
        base: u64,
        verts_off: u32,
        norms_off: u32,
    ) -> BinResult<(AttributeRecord, AttributeRecord)> {
        reader.seek(SeekFrom::Start(base + verts_off as u64))?;
        let vertices = AttributeRecord::parse(reader, VERTEX_SIZE)?;
        reader.seek(SeekFrom::Start(base + norms_off as u64))?;
        let normals = AttributeRecord::parse(reader, NORMAL_SIZE)?;
        Ok((vertices, normals))
    }

    /// Layer tables are optional. A zero offset means no layers of the kind.
    fn parse_layer_table<R: Read + Seek>(
        reader: &mut R,
        base: u64,
        off: u32,
        element_size: usize,
    ) -> BinResult<Vec<AttributeRecord>> {
        if off == 0 {
            return Ok(Vec::new());
        }
        reader.seek(SeekFrom::Start(base + off as u64))?;
        parse_offset_table(reader, base, |r| AttributeRecord::parse(r, element_size))
    }
}

/// One decoded triangle group of the grouped collision revision.
#[derive(Debug, PartialEq, Clone)]
pub struct CollisionGroup {
    pub face_count: u32,
    pub flag: u16,
    pub vertex_data: Vec<u8>,
}

/// The collision region in either of its two encodings.
///
/// Both produce the same logical output, a co-indexed vertex/flag pair,
/// through [crate::collision::assemble_collision].
#[derive(Debug, PartialEq, Clone)]
pub enum Collision {
    /// Revision A (V1): per-object triangle groups behind an offset table.
    Grouped {
        face_count: u32,
        groups: Vec<CollisionGroup>,
    },
    /// Revision B (V2 and later): pre-flattened vertex and flag spans.
    Flat {
        face_count: u32,
        vertex_data: Vec<u8>,
        flags: Vec<u16>,
    },
}

impl Collision {
    fn parse<R: Read + Seek>(
        reader: &mut R,
        base: u64,
        version: FormatVersion,
    ) -> Result<Self, DecodeError> {
        reader.seek(SeekFrom::Start(base)).map_err(binrw::Error::Io)?;

        if version == FormatVersion::V1 {
            let group_count = reader.read_be::<u32>()?;
            let face_count = reader.read_be::<u32>()?;
            let mut offsets = Vec::with_capacity(group_count as usize);
            for _ in 0..group_count {
                offsets.push(reader.read_be::<u32>()?);
            }

            let mut groups = Vec::with_capacity(group_count as usize);
            for offset in offsets {
                reader
                    .seek(SeekFrom::Start(base + offset as u64))
                    .map_err(binrw::Error::Io)?;
                let count = reader.read_be::<u32>()?;
                let flag = reader.read_be::<u16>()?;
                reader.read_be::<u16>()?; // padding
                let vertex_data = read_bytes(reader, count as usize * COLLISION_VERTEX_SIZE)?;
                groups.push(CollisionGroup {
                    face_count: count,
                    flag,
                    vertex_data,
                });
            }

            let actual = groups.iter().map(|g| g.face_count).sum::<u32>();
            if actual != face_count {
                return Err(DecodeError::FaceCountMismatch {
                    declared: face_count,
                    actual,
                });
            }

            Ok(Self::Grouped { face_count, groups })
        } else {
            let face_count = reader.read_be::<u32>()?;
            let vertex_data = read_bytes(reader, face_count as usize * COLLISION_VERTEX_SIZE)?;
            let flags = (0..face_count)
                .map(|_| reader.read_be::<u16>())
                .collect::<BinResult<_>>()?;

            Ok(Self::Flat {
                face_count,
                vertex_data,
                flags,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use hexlit::hex;
    use pretty_assertions::assert_eq;

    #[test]
    fn string_table_lookup() {
        let table = StringTable::new(b"course\0cube\0".to_vec());
        assert_eq!("course", table.get(0).unwrap());
        assert_eq!("cube", table.get(7).unwrap());
        // Offsets may land mid-name.
        assert_eq!("urse", table.get(2).unwrap());
    }

    #[test]
    fn string_table_out_of_bounds() {
        let table = StringTable::new(b"course\0".to_vec());
        assert!(matches!(
            table.get(7),
            Err(DecodeError::StringOffsetOutOfBounds { offset: 7 })
        ));
    }

    #[test]
    fn string_table_unterminated() {
        let table = StringTable::new(b"course".to_vec());
        assert!(matches!(
            table.get(0),
            Err(DecodeError::UnterminatedString { offset: 0 })
        ));
    }

    #[test]
    fn read_track_info_record() {
        let data = hex!(
            03 03 01 00 00000000
            447a0000 00000000 c47a0000 // position (1000, 0, -1000)
            00000000 3fc90fdb 00000000 // rotation (0, pi/2, 0)
        );

        let record = TrackInfoRecord::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(
            TrackInfoRecord {
                slot: 3,
                lap_count: 3,
                start_side: 1,
                start_position: [1000.0, 0.0, -1000.0],
                start_rotation: [0.0, std::f32::consts::FRAC_PI_2, 0.0],
            },
            record
        );
    }

    #[test]
    fn read_stage_record() {
        let data = hex!(
            01 02 0000 // texture on, texcoord 2
            04 05      // constant selectors
            00010302 00 00 01 00 00 // colour op
            00000003 00 00 01 00 00 // alpha op
        );

        let stage = StageRecord::read(&mut Cursor::new(&data)).unwrap();
        assert_eq!(1, stage.texture_flag);
        assert_eq!(2, stage.texcoord);
        assert_eq!(4, stage.const_color_sel);
        assert_eq!(5, stage.const_alpha_sel);
        assert_eq!([0, 1, 3, 2], stage.color_op.args);
        assert_eq!(1, stage.color_op.clamp);
        assert_eq!([0, 0, 0, 3], stage.alpha_op.args);
    }

    #[test]
    fn reject_unknown_wrap_mode() {
        let data = hex!(00000000 07 00 00 00);
        assert!(LayerRecord::read(&mut Cursor::new(&data)).is_err());
    }

    fn v1_object_bytes() -> Vec<u8> {
        // One triangle, 0x38 record head, arrays and geometry appended.
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_be_bytes()); // name
        data.extend_from_slice(&0x38u32.to_be_bytes()); // vertices
        data.extend_from_slice(&0x60u32.to_be_bytes()); // normals
        data.extend_from_slice(&0x70u32.to_be_bytes()); // geometry
        for f in [
            1.0f32, 2.0, 3.0, // position
            0.0, 0.0, 0.0, // rotation
            1.0, 1.0, 1.0, // scale
        ] {
            data.extend_from_slice(&f.to_be_bytes());
        }
        data.extend_from_slice(&[0x80, 0x40, 0x20, 0xFF]); // colour

        assert_eq!(0x38, data.len());
        data.extend_from_slice(&3u32.to_be_bytes());
        for f in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0] {
            data.extend_from_slice(&f.to_be_bytes());
        }
        assert_eq!(0x60, data.len());
        data.extend_from_slice(&1u32.to_be_bytes());
        for f in [0.0f32, 1.0, 0.0] {
            data.extend_from_slice(&f.to_be_bytes());
        }
        assert_eq!(0x70, data.len());
        data.push(0x90);
        data.extend_from_slice(&3u16.to_be_bytes());
        for pair in [[0u16, 0], [1, 0], [2, 0]] {
            data.extend_from_slice(&pair[0].to_be_bytes());
            data.extend_from_slice(&pair[1].to_be_bytes());
        }
        data.push(0); // padding
        data
    }

    #[test]
    fn read_v1_object() {
        let data = v1_object_bytes();
        let object = ObjectRecord::parse(&mut Cursor::new(&data), FormatVersion::V1).unwrap();

        assert_eq!([1.0, 2.0, 3.0], object.position);
        assert_eq!(3, object.vertices.count);
        assert_eq!(0x24, object.vertices.data.len());
        assert_eq!(1, object.normals.count);
        assert_eq!(1, object.parts.len());

        let part = &object.parts[0];
        assert_eq!(PartMaterial::Color([0x80, 0x40, 0x20, 0xFF]), part.material);
        assert_eq!(3, part.geometry.index_count);
        // 3 byte header plus 3 indices of width 4.
        assert_eq!(3 + 3 * 4, part.geometry.data.len());
        assert_eq!(0x90, part.geometry.data[0]);
    }

    #[test]
    fn v1_object_record_is_not_position_dependent() {
        // The same record behind a nonzero base must decode identically,
        // since all internal offsets are relative to the record start.
        let mut data = vec![0xAAu8; 0x10];
        data.extend_from_slice(&v1_object_bytes());

        let mut reader = Cursor::new(&data);
        reader.seek(SeekFrom::Start(0x10)).unwrap();
        let shifted = ObjectRecord::parse(&mut reader, FormatVersion::V1).unwrap();
        let plain =
            ObjectRecord::parse(&mut Cursor::new(&v1_object_bytes()), FormatVersion::V1).unwrap();
        assert_eq!(plain, shifted);
    }

    #[test]
    fn v4_geometry_width_follows_layer_counts() {
        // One colour layer and two texcoord layers: width 4 + 2*3 = 10.
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_be_bytes()); // name
        data.extend_from_slice(&0x3Cu32.to_be_bytes()); // vertices
        data.extend_from_slice(&0x4Cu32.to_be_bytes()); // normals
        data.extend_from_slice(&0x5Cu32.to_be_bytes()); // colour layer table
        data.extend_from_slice(&0x6Cu32.to_be_bytes()); // texcoord layer table
        data.extend_from_slice(&0x90u32.to_be_bytes()); // part table
        for f in [0.0f32; 9] {
            data.extend_from_slice(&f.to_be_bytes());
        }
        assert_eq!(0x3C, data.len());

        // vertices: 1 element
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[0; 12]);
        assert_eq!(0x4C, data.len());
        // normals: 1 element
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[0; 12]);
        assert_eq!(0x5C, data.len());
        // colour layer table: 1 layer at 0x64
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&0x64u32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[0xFF; 4]);
        assert_eq!(0x6C, data.len());
        // texcoord layer table: 2 layers at 0x78 and 0x84
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&0x78u32.to_be_bytes());
        data.extend_from_slice(&0x84u32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&[0; 8]);
        assert_eq!(0x90, data.len());
        // part table: 1 part at 0x98
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&0x98u32.to_be_bytes());
        data.extend_from_slice(&4u32.to_be_bytes()); // material name
        data.extend_from_slice(&0xA0u32.to_be_bytes()); // geometry
        assert_eq!(0xA0, data.len());
        data.push(0x90);
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&[0; 3 * 10]);
        data.push(0);

        let object = ObjectRecord::parse(&mut Cursor::new(&data), FormatVersion::V4).unwrap();
        assert_eq!(1, object.color_layers.len());
        assert_eq!(2, object.texcoord_layers.len());

        let geometry = &object.parts[0].geometry;
        assert_eq!(3, geometry.index_count);
        assert_eq!(3 + 3 * 10, geometry.data.len());
    }

    #[test]
    fn decode_minimal_document() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x10u32.to_be_bytes()); // track info
        data.extend_from_slice(&0x30u32.to_be_bytes()); // models
        data.extend_from_slice(&0x40u32.to_be_bytes()); // collision
        data.extend_from_slice(&0x48u32.to_be_bytes()); // string table

        data.extend_from_slice(&[1, 3, 0, 0, 0, 0, 0, 0]);
        for f in [0.0f32; 6] {
            data.extend_from_slice(&f.to_be_bytes());
        }
        assert_eq!(0x30, data.len());

        // Two empty V1 models, then an empty grouped collision region.
        data.extend_from_slice(&0x08u32.to_be_bytes());
        data.extend_from_slice(&0x0Cu32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(0x48, data.len());
        data.extend_from_slice(b"cube\0");

        let document = Document::from_bytes(&data, FormatVersion::V1).unwrap();
        assert_eq!(3, document.track_info.lap_count);
        assert!(document.course_model.objects.is_empty());
        assert!(document.skybox_model.objects.is_empty());
        assert!(matches!(
            document.collision,
            Collision::Grouped { face_count: 0, .. }
        ));
        assert_eq!("cube", document.strings.get(0).unwrap());
    }

    #[test]
    fn grouped_collision_face_count_mismatch_fails() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_be_bytes()); // group count
        data.extend_from_slice(&5u32.to_be_bytes()); // declared faces
        data.extend_from_slice(&0x0Cu32.to_be_bytes());
        data.extend_from_slice(&2u32.to_be_bytes()); // actual faces
        data.extend_from_slice(&0x0001u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&vec![0; 2 * COLLISION_VERTEX_SIZE]);

        let result = Collision::parse(&mut Cursor::new(&data), 0, FormatVersion::V1);
        assert!(matches!(
            result,
            Err(DecodeError::FaceCountMismatch {
                declared: 5,
                actual: 2
            })
        ));
    }
}
