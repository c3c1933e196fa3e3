//! The decoded bone/array/material/shader/object graph for one 3D model.
//!
//! Resources cross-reference each other by name through insertion-ordered
//! tables, so serialization order is deterministic and lookups stay cheap.
//! Nothing here decodes bytes; the assemblers in [crate::model] populate a
//! scene from document records.
use glam::Vec3;
use indexmap::IndexMap;

use crate::{
    ctd::{FilterMode, TextureFormat, WrapMode},
    error::AssembleError,
};

/// The reserved name of synthetic default resources.
pub const DEFAULT_NAME: &str = "___Default___";
/// The reserved name of the synthetic textured fallback shader, created
/// lazily for layered materials without an explicit shader reference.
pub const DEFAULT_TEX_SHADER_NAME: &str = "___DefaultTex___";

/// TEV selector encodings shared by the authoring tool and the synthetic
/// default shaders.
pub mod tev {
    pub const ARG_ZERO: u8 = 0;
    pub const ARG_TEXTURE: u8 = 1;
    pub const ARG_RASTER: u8 = 2;
    pub const ARG_CONSTANT: u8 = 3;

    pub const BIAS_ZERO: u8 = 0;
    pub const OP_ADD: u8 = 0;
    pub const SHIFT_0: u8 = 0;
    pub const DEST_PIXEL: u8 = 0;
    pub const SEL_CONST0: u8 = 0;
}

#[derive(Debug, PartialEq, Clone)]
pub struct Bone {
    pub name: String,
    /// Index of the parent bone, or [None] for the synthetic root.
    pub parent: Option<usize>,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

/// A named attribute array: element count plus the raw element bytes copied
/// out of the document.
#[derive(Debug, PartialEq, Clone)]
pub struct AttributeArray {
    pub count: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Texture {
    pub width: u16,
    pub height: u16,
    pub format: TextureFormat,
    pub mipmaps: u8,
    pub data: Vec<u8>,
}

/// A 9 field combiner operation of one TEV stage.
#[derive(Debug, PartialEq, Clone)]
pub struct TevOp {
    pub args: [u8; 4],
    pub bias: u8,
    pub op: u8,
    pub clamp: bool,
    pub shift: u8,
    pub dest: u8,
}

#[derive(Debug, PartialEq, Clone)]
pub struct TevStage {
    pub uses_texture: bool,
    pub texcoord: u8,
    pub const_color: u8,
    pub const_alpha: u8,
    pub color_op: TevOp,
    pub alpha_op: TevOp,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Shader {
    pub stages: Vec<TevStage>,
}

/// One texture binding with its wrap and filter state.
#[derive(Debug, PartialEq, Clone)]
pub struct MaterialLayer {
    pub texture: String,
    pub wrap: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Material {
    pub color: [u8; 4],
    /// Name of the shader this material is bound to.
    pub shader: String,
    pub layers: Vec<MaterialLayer>,
}

/// One drawable object: a bone, attribute array references, a material
/// reference and its raw indexed geometry span.
#[derive(Debug, PartialEq, Clone)]
pub struct Object {
    pub name: String,
    pub bone: usize,
    pub vertex_array: String,
    pub normal_array: String,
    pub color_layers: Vec<String>,
    pub texcoord_layers: Vec<String>,
    pub material: String,
    pub geometry: Vec<u8>,
    pub index_count: u16,
}

impl Object {
    /// Byte width of one index record within the geometry span.
    pub fn index_width(&self) -> usize {
        4 + 2 * (self.color_layers.len() + self.texcoord_layers.len())
    }

    pub fn triangle_count(&self) -> u16 {
        self.index_count / 3
    }
}

/// One entry of the opaque draw list.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct DrawEntry {
    pub object: usize,
    pub material: usize,
    pub bone: usize,
}

/// A complete model scene, ready for serialization.
#[derive(Debug, PartialEq, Clone)]
pub struct ModelScene {
    pub name: String,
    /// Bone tree as a flat list. Index 0 is the synthetic root.
    pub bones: Vec<Bone>,
    pub vertex_arrays: IndexMap<String, AttributeArray>,
    pub normal_arrays: IndexMap<String, AttributeArray>,
    pub color_arrays: IndexMap<String, AttributeArray>,
    pub texcoord_arrays: IndexMap<String, AttributeArray>,
    pub textures: IndexMap<String, Texture>,
    pub shaders: IndexMap<String, Shader>,
    pub materials: IndexMap<String, Material>,
    pub objects: Vec<Object>,
    pub draw_opa: Vec<DrawEntry>,
}

impl ModelScene {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bones: vec![Bone {
                name: "root".to_string(),
                parent: None,
                position: Vec3::ZERO,
                rotation: Vec3::ZERO,
                scale: Vec3::ONE,
            }],
            vertex_arrays: IndexMap::new(),
            normal_arrays: IndexMap::new(),
            color_arrays: IndexMap::new(),
            texcoord_arrays: IndexMap::new(),
            textures: IndexMap::new(),
            shaders: IndexMap::new(),
            materials: IndexMap::new(),
            objects: Vec::new(),
            draw_opa: Vec::new(),
        }
    }

    pub fn root_bone(&self) -> usize {
        0
    }

    /// Inserts a bone and returns its index.
    pub fn insert_bone(&mut self, bone: Bone) -> usize {
        self.bones.push(bone);
        self.bones.len() - 1
    }

    pub fn add_texture(&mut self, name: String, texture: Texture) -> Result<(), AssembleError> {
        Self::insert_unique(&mut self.textures, "texture", name, texture)
    }

    pub fn add_shader(&mut self, name: String, shader: Shader) -> Result<(), AssembleError> {
        Self::insert_unique(&mut self.shaders, "shader", name, shader)
    }

    pub fn add_material(&mut self, name: String, material: Material) -> Result<(), AssembleError> {
        Self::insert_unique(&mut self.materials, "material", name, material)
    }

    pub fn add_vertex_array(
        &mut self,
        name: String,
        array: AttributeArray,
    ) -> Result<(), AssembleError> {
        Self::insert_unique(&mut self.vertex_arrays, "vertex array", name, array)
    }

    pub fn add_normal_array(
        &mut self,
        name: String,
        array: AttributeArray,
    ) -> Result<(), AssembleError> {
        Self::insert_unique(&mut self.normal_arrays, "normal array", name, array)
    }

    pub fn add_color_array(
        &mut self,
        name: String,
        array: AttributeArray,
    ) -> Result<(), AssembleError> {
        Self::insert_unique(&mut self.color_arrays, "color array", name, array)
    }

    pub fn add_texcoord_array(
        &mut self,
        name: String,
        array: AttributeArray,
    ) -> Result<(), AssembleError> {
        Self::insert_unique(&mut self.texcoord_arrays, "texcoord array", name, array)
    }

    /// Adds a drawable object and returns its index.
    pub fn add_object(&mut self, object: Object) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn material_index(&self, name: &str) -> Option<usize> {
        self.materials.get_index_of(name)
    }

    /// Registers an (object, material, bone) triple with the opaque draw
    /// list. Insertion order is the draw order.
    pub fn link_draw_opa(&mut self, object: usize, material: usize, bone: usize) {
        self.draw_opa.push(DrawEntry {
            object,
            material,
            bone,
        });
    }

    fn insert_unique<T>(
        table: &mut IndexMap<String, T>,
        kind: &'static str,
        name: String,
        value: T,
    ) -> Result<(), AssembleError> {
        if table.contains_key(&name) {
            return Err(AssembleError::Duplicate { kind, name });
        }
        table.insert(name, value);
        Ok(())
    }
}
