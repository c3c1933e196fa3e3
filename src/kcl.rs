//! Writing of KCL collision files.
//!
//! Triangles arrive as raw vertex data from the flattened collision mesh
//! and are converted to the game's prism form: one vertex, a face normal,
//! three edge normals and an edge length per triangle, with positions and
//! normals deduplicated into shared pools.
//!
//! The spatial index is a single-leaf octree holding every prism. That is
//! enough for correctness; finer subdivision is an optimization the engine
//! does not require.
use std::collections::HashMap;
use std::io::{Cursor, Seek, Write};

use binrw::{BinResult, BinWrite, BinWriterExt};
use glam::Vec3;
use log::{debug, warn};
use thiserror::Error;

use crate::collision::CollisionMesh;
use crate::ctd::COLLISION_VERTEX_SIZE;

const HEADER_SIZE: u32 = 0x3C;
const PRISM_SIZE: u32 = 0x10;
/// Collision walls extend this far below the surface.
const PRISM_THICKNESS: f32 = 300.0;
/// Slack added around the triangle soup's bounding box.
const AREA_MARGIN: f32 = 100.0;

/// Errors raised while converting a mesh to prism form.
///
/// Prism and pool references are 16-bit on the wire, so meshes past those
/// limits cannot be encoded and fail instead of wrapping.
#[derive(Debug, Error)]
pub enum KclError {
    #[error("collision mesh has {count} faces, more than the format limit of {max}")]
    TooManyPrisms { count: u32, max: u32 },

    #[error("collision {kind} pool exceeds {max} entries")]
    PoolOverflow { kind: &'static str, max: usize },
}

/// One triangle in prism form, with indices into the shared pools.
#[derive(Debug, PartialEq, Clone)]
pub struct Prism {
    pub length: f32,
    pub position: u16,
    pub face_normal: u16,
    pub edge_normals: [u16; 3],
    pub attribute: u16,
}

/// A complete collision file ready to serialize.
#[derive(Debug, PartialEq, Clone)]
pub struct KclFile {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub prisms: Vec<Prism>,
    area_min: Vec3,
    coord_shift: u32,
}

/// Interns [Vec3] values by exact bit pattern.
struct Pool {
    kind: &'static str,
    values: Vec<Vec3>,
    indices: HashMap<[u32; 3], u16>,
}

impl Pool {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            values: Vec::new(),
            indices: HashMap::new(),
        }
    }

    fn intern(&mut self, value: Vec3) -> Result<u16, KclError> {
        let key = [
            value.x.to_bits(),
            value.y.to_bits(),
            value.z.to_bits(),
        ];
        if let Some(&index) = self.indices.get(&key) {
            return Ok(index);
        }
        let index = u16::try_from(self.values.len()).map_err(|_| KclError::PoolOverflow {
            kind: self.kind,
            max: u16::MAX as usize,
        })?;
        self.values.push(value);
        self.indices.insert(key, index);
        Ok(index)
    }
}

impl KclFile {
    /// Converts the collision mesh into prism form.
    ///
    /// Degenerate triangles, where the face normal cannot be derived, are
    /// dropped with a warning rather than failing the build. Meshes whose
    /// face count or pooled values do not fit the 16-bit wire indices are
    /// a hard error.
    pub fn from_mesh(mesh: &CollisionMesh) -> Result<Self, KclError> {
        // The octree leaf lists prisms as one-based u16 indices.
        if mesh.face_count > u16::MAX as u32 {
            return Err(KclError::TooManyPrisms {
                count: mesh.face_count,
                max: u16::MAX as u32,
            });
        }

        let mut positions = Pool::new("position");
        let mut normals = Pool::new("normal");
        let mut prisms = Vec::with_capacity(mesh.face_count as usize);

        let mut area_min = Vec3::splat(f32::MAX);
        let mut area_max = Vec3::splat(f32::MIN);

        for (face, chunk) in mesh
            .vertex_data
            .chunks_exact(COLLISION_VERTEX_SIZE)
            .enumerate()
        {
            let [v1, v2, v3] = read_triangle(chunk);
            for v in [v1, v2, v3] {
                area_min = area_min.min(v);
                area_max = area_max.max(v);
            }

            let Some(prism) = derive_prism(
                v1,
                v2,
                v3,
                mesh.flags[face],
                &mut positions,
                &mut normals,
            )?
            else {
                warn!("dropping degenerate collision face {face}");
                continue;
            };
            prisms.push(prism);
        }

        if prisms.is_empty() {
            area_min = Vec3::ZERO;
            area_max = Vec3::ZERO;
        }
        area_min -= Vec3::splat(AREA_MARGIN);
        let extent = (area_max + Vec3::splat(AREA_MARGIN)) - area_min;
        let coord_shift = extent
            .max_element()
            .max(1.0)
            .log2()
            .ceil() as u32;

        debug!(
            "kcl: {} prisms, {} positions, {} normals, shift {coord_shift}",
            prisms.len(),
            positions.values.len(),
            normals.values.len()
        );

        Ok(Self {
            positions: positions.values,
            normals: normals.values,
            prisms,
            area_min,
            coord_shift,
        })
    }

    pub fn write<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        let positions_off = HEADER_SIZE;
        let normals_off = positions_off + self.positions.len() as u32 * 0x0C;
        let prisms_off = normals_off + self.normals.len() as u32 * 0x0C;
        let octree_off = prisms_off + self.prisms.len() as u32 * PRISM_SIZE;

        let be = binrw::Endian::Big;
        positions_off.write_options(writer, be, ())?;
        normals_off.write_options(writer, be, ())?;
        // The engine reads prisms one-based, so the section pointer is
        // biased back by one prism.
        (prisms_off - PRISM_SIZE).write_options(writer, be, ())?;
        octree_off.write_options(writer, be, ())?;
        PRISM_THICKNESS.write_options(writer, be, ())?;
        write_vec3(writer, self.area_min)?;
        // One root block: every coordinate masks to zero.
        let mask = !((1u32 << self.coord_shift) - 1);
        writer.write_be(&[mask, mask, mask])?;
        writer.write_be(&[self.coord_shift, 0u32, 0u32])?;
        // Maximum sphere radius the engine will query with.
        250.0f32.write_options(writer, be, ())?;

        for position in &self.positions {
            write_vec3(writer, *position)?;
        }
        for normal in &self.normals {
            write_vec3(writer, *normal)?;
        }
        for prism in &self.prisms {
            prism.length.write_options(writer, be, ())?;
            prism.position.write_options(writer, be, ())?;
            prism.face_normal.write_options(writer, be, ())?;
            prism.edge_normals.write_options(writer, be, ())?;
            prism.attribute.write_options(writer, be, ())?;
        }

        self.write_octree(writer)
    }

    /// Eight root children sharing one leaf that lists every prism.
    fn write_octree<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        let be = binrw::Endian::Big;
        // Leaf data begins right after the child table. Leaf pointers are
        // read with a two byte bias.
        let leaf = 0x8000_0000u32 | (8 * 4 - 2);
        for _ in 0..8 {
            leaf.write_options(writer, be, ())?;
        }
        for index in 0..self.prisms.len() {
            ((index + 1) as u16).write_options(writer, be, ())?;
        }
        0u16.write_options(writer, be, ())?;
        Ok(())
    }

    /// Serializes to a byte vector.
    pub fn to_bytes(&self) -> BinResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        self.write(&mut out)?;
        Ok(out.into_inner())
    }
}

fn write_vec3<W: Write + Seek>(writer: &mut W, v: Vec3) -> BinResult<()> {
    v.to_array().write_options(writer, binrw::Endian::Big, ())
}

fn read_triangle(chunk: &[u8]) -> [Vec3; 3] {
    let f = |i: usize| {
        f32::from_be_bytes(chunk[i * 4..i * 4 + 4].try_into().unwrap_or([0; 4]))
    };
    [
        Vec3::new(f(0), f(1), f(2)),
        Vec3::new(f(3), f(4), f(5)),
        Vec3::new(f(6), f(7), f(8)),
    ]
}

/// [None] when the triangle is degenerate and no normals can be derived.
fn derive_prism(
    v1: Vec3,
    v2: Vec3,
    v3: Vec3,
    flag: u16,
    positions: &mut Pool,
    normals: &mut Pool,
) -> Result<Option<Prism>, KclError> {
    let e12 = v2 - v1;
    let e13 = v3 - v1;
    let Some(face_normal) = e12.cross(e13).try_normalize() else {
        return Ok(None);
    };
    let (Some(enrm1), Some(enrm2), Some(enrm3)) = (
        face_normal.cross(e13).try_normalize(),
        e12.cross(face_normal).try_normalize(),
        face_normal.cross(e12).try_normalize(),
    ) else {
        return Ok(None);
    };
    let length = e13.dot(enrm3);

    Ok(Some(Prism {
        length,
        position: positions.intern(v1)?,
        face_normal: normals.intern(face_normal)?,
        edge_normals: [
            normals.intern(enrm1)?,
            normals.intern(enrm2)?,
            normals.intern(enrm3)?,
        ],
        attribute: flag,
    }))
}
