//! Assembles a [ModelScene] from one decoded model sub-document.
//!
//! Processing order is fixed and significant because later stages reference
//! earlier ones by name: textures, then shaders, then materials, then
//! objects. Each kind is preceded by synthesis of its `___Default___`
//! resource unless the document already defines one under that name.
use log::{debug, info};

use crate::{
    ctd::{self, PartMaterial, StringTable},
    error::AssembleError,
    scene::{
        tev, AttributeArray, Bone, Material, MaterialLayer, ModelScene, Object, Shader, Texture,
        TevOp, TevStage, DEFAULT_NAME, DEFAULT_TEX_SHADER_NAME,
    },
};
use glam::Vec3;

/// Decodes one model sub-document into a scene named `name`.
///
/// Any reference to an undefined resource name is a hard error; the scene
/// cannot be produced. The only substitution performed is the explicit
/// default-resource rule for materials without a shader reference.
pub fn assemble_model(
    model: &ctd::Model,
    strings: &StringTable,
    name: &str,
) -> Result<ModelScene, AssembleError> {
    let mut scene = ModelScene::new(name);

    if !defines_default(model.textures.iter().map(|t| t.name_off), strings)? {
        scene.add_texture(DEFAULT_NAME.to_string(), default_texture())?;
    }
    for record in &model.textures {
        let texture_name = strings.get(record.name_off)?.to_string();
        scene.add_texture(
            texture_name,
            Texture {
                width: record.width,
                height: record.height,
                format: record.format,
                mipmaps: record.mipmaps,
                data: record.data.clone(),
            },
        )?;
    }

    if !defines_default(model.shaders.iter().map(|s| s.name_off), strings)? {
        scene.add_shader(DEFAULT_NAME.to_string(), default_shader())?;
    }
    for record in &model.shaders {
        let shader_name = strings.get(record.name_off)?.to_string();
        scene.add_shader(shader_name, shader_from_record(record))?;
    }

    if !defines_default(model.materials.iter().map(|m| m.name_off), strings)? {
        scene.add_material(DEFAULT_NAME.to_string(), default_material())?;
    }
    for record in &model.materials {
        assemble_material(&mut scene, record, strings)?;
    }

    for record in &model.objects {
        assemble_object(&mut scene, record, strings)?;
    }

    info!(
        "assembled model `{name}`: {} textures, {} shaders, {} materials, {} objects",
        scene.textures.len(),
        scene.shaders.len(),
        scene.materials.len(),
        scene.objects.len()
    );

    Ok(scene)
}

/// Whether the document itself supplies a resource under the reserved
/// default name, in which case synthesis must be suppressed.
fn defines_default(
    name_offs: impl Iterator<Item = u32>,
    strings: &StringTable,
) -> Result<bool, AssembleError> {
    for off in name_offs {
        if strings.get(off)? == DEFAULT_NAME {
            return Ok(true);
        }
    }
    Ok(false)
}

fn assemble_material(
    scene: &mut ModelScene,
    record: &ctd::MaterialRecord,
    strings: &StringTable,
) -> Result<(), AssembleError> {
    let material_name = strings.get(record.name_off)?.to_string();

    let mut layers = Vec::with_capacity(record.layers.len());
    for layer in &record.layers {
        let texture = strings.get(layer.texture_name_off)?.to_string();
        if !scene.textures.contains_key(&texture) {
            return Err(AssembleError::UnknownTexture {
                material: material_name,
                texture,
            });
        }
        layers.push(MaterialLayer {
            texture,
            wrap: layer.wrap,
            min_filter: layer.min_filter,
            mag_filter: layer.mag_filter,
        });
    }

    let shader = match record.shader_name_off {
        Some(off) => {
            let shader = strings.get(off)?.to_string();
            if !scene.shaders.contains_key(&shader) {
                return Err(AssembleError::UnknownShader {
                    material: material_name,
                    shader,
                });
            }
            shader
        }
        // Earlier revisions carry no shader reference. Materials without
        // texture layers render their constant colour; layered ones fall
        // back to a textured shader until shader authoring lands upstream.
        None if layers.is_empty() => DEFAULT_NAME.to_string(),
        None => {
            if !scene.shaders.contains_key(DEFAULT_TEX_SHADER_NAME) {
                scene.add_shader(DEFAULT_TEX_SHADER_NAME.to_string(), default_textured_shader())?;
            }
            DEFAULT_TEX_SHADER_NAME.to_string()
        }
    };

    debug!("material `{material_name}` bound to shader `{shader}`");

    scene.add_material(
        material_name,
        Material {
            color: record.color,
            shader,
            layers,
        },
    )
}

fn assemble_object(
    scene: &mut ModelScene,
    record: &ctd::ObjectRecord,
    strings: &StringTable,
) -> Result<(), AssembleError> {
    let object_name = strings.get(record.name_off)?.to_string();

    let bone = scene.insert_bone(Bone {
        name: object_name.clone(),
        parent: Some(scene.root_bone()),
        position: Vec3::from_array(record.position),
        rotation: Vec3::from_array(record.rotation),
        scale: Vec3::from_array(record.scale),
    });

    scene.add_vertex_array(object_name.clone(), attribute_array(&record.vertices))?;
    scene.add_normal_array(object_name.clone(), attribute_array(&record.normals))?;

    let mut color_layers = Vec::with_capacity(record.color_layers.len());
    for (index, layer) in record.color_layers.iter().enumerate() {
        let key = format!("{object_name}#{index}");
        scene.add_color_array(key.clone(), attribute_array(layer))?;
        color_layers.push(key);
    }
    let mut texcoord_layers = Vec::with_capacity(record.texcoord_layers.len());
    for (index, layer) in record.texcoord_layers.iter().enumerate() {
        let key = format!("{object_name}#{index}");
        scene.add_texcoord_array(key.clone(), attribute_array(layer))?;
        texcoord_layers.push(key);
    }

    // Parts share the object's bone and arrays but bind their own material
    // and geometry span.
    for part in &record.parts {
        let material = match &part.material {
            PartMaterial::Name(off) => {
                let material = strings.get(*off)?.to_string();
                if !scene.materials.contains_key(&material) {
                    return Err(AssembleError::UnknownMaterial {
                        object: object_name,
                        material,
                    });
                }
                material
            }
            PartMaterial::Color(color) => {
                // V1 documents bake a constant colour into the object
                // record; synthesise a material of the same name for it.
                scene.add_material(
                    object_name.clone(),
                    Material {
                        color: *color,
                        shader: DEFAULT_NAME.to_string(),
                        layers: Vec::new(),
                    },
                )?;
                object_name.clone()
            }
        };

        let material_index =
            scene
                .material_index(&material)
                .ok_or_else(|| AssembleError::UnknownMaterial {
                    object: object_name.clone(),
                    material: material.clone(),
                })?;
        let object = scene.add_object(Object {
            name: object_name.clone(),
            bone,
            vertex_array: object_name.clone(),
            normal_array: object_name.clone(),
            color_layers: color_layers.clone(),
            texcoord_layers: texcoord_layers.clone(),
            material,
            geometry: part.geometry.data.clone(),
            index_count: part.geometry.index_count,
        });
        scene.link_draw_opa(object, material_index, bone);
    }

    Ok(())
}

fn attribute_array(record: &ctd::AttributeRecord) -> AttributeArray {
    AttributeArray {
        count: record.count,
        data: record.data.clone(),
    }
}

/// An 8x8 opaque white RGB5A3 texture.
fn default_texture() -> Texture {
    Texture {
        width: 8,
        height: 8,
        format: ctd::TextureFormat::Rgb5a3,
        mipmaps: 0,
        data: vec![0xFF; 8 * 8 * 2],
    }
}

/// One stage passing the material constant colour straight through.
fn default_shader() -> Shader {
    Shader {
        stages: vec![TevStage {
            uses_texture: false,
            texcoord: 0,
            const_color: tev::SEL_CONST0,
            const_alpha: tev::SEL_CONST0,
            color_op: constant_op(),
            alpha_op: constant_op(),
        }],
    }
}

/// One stage modulating the first texture layer with the constant colour.
fn default_textured_shader() -> Shader {
    let op = TevOp {
        args: [tev::ARG_ZERO, tev::ARG_TEXTURE, tev::ARG_CONSTANT, tev::ARG_ZERO],
        bias: tev::BIAS_ZERO,
        op: tev::OP_ADD,
        clamp: true,
        shift: tev::SHIFT_0,
        dest: tev::DEST_PIXEL,
    };
    Shader {
        stages: vec![TevStage {
            uses_texture: true,
            texcoord: 0,
            const_color: tev::SEL_CONST0,
            const_alpha: tev::SEL_CONST0,
            color_op: op.clone(),
            alpha_op: op,
        }],
    }
}

fn default_material() -> Material {
    Material {
        color: [0x80, 0x80, 0x80, 0xFF],
        shader: DEFAULT_NAME.to_string(),
        layers: Vec::new(),
    }
}

fn constant_op() -> TevOp {
    TevOp {
        args: [tev::ARG_ZERO, tev::ARG_ZERO, tev::ARG_ZERO, tev::ARG_CONSTANT],
        bias: tev::BIAS_ZERO,
        op: tev::OP_ADD,
        clamp: true,
        shift: tev::SHIFT_0,
        dest: tev::DEST_PIXEL,
    }
}

fn shader_from_record(record: &ctd::ShaderRecord) -> Shader {
    Shader {
        stages: record
            .stages
            .iter()
            .map(|stage| TevStage {
                uses_texture: stage.texture_flag != 0,
                texcoord: stage.texcoord,
                const_color: stage.const_color_sel,
                const_alpha: stage.const_alpha_sel,
                color_op: tev_op(&stage.color_op),
                alpha_op: tev_op(&stage.alpha_op),
            })
            .collect(),
    }
}

fn tev_op(record: &ctd::CombinerRecord) -> TevOp {
    TevOp {
        args: record.args,
        bias: record.bias,
        op: record.op,
        clamp: record.clamp != 0,
        shift: record.shift,
        dest: record.dest,
    }
}
