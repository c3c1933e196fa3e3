//! Writing of BRRES model containers.
//!
//! A container holds a `bres` header, a root section whose index groups
//! name the stored resources, one MDL0 per model and one TEX0 per texture.
//! The MDL0 carries the node-tree and draw byte code plus bone, array,
//! material, shader and object sections in scene order.
//!
//! Name references everywhere in the file are u32 offsets from the file
//! start into one shared string pool written after the last section. The
//! pool is deduplicated and references are backpatched in a final pass.
use std::io::{Cursor, Seek, SeekFrom, Write};

use binrw::{BinResult, BinWrite};
use glam::Vec3;
use indexmap::IndexMap;
use log::debug;

use crate::scene::{AttributeArray, Material, ModelScene, Object, Shader, Texture};

const MAGIC: [u8; 4] = *b"bres";
const BYTE_ORDER_MARK: u16 = 0xFEFF;
const MDL0_MAGIC: [u8; 4] = *b"MDL0";
const TEX0_MAGIC: [u8; 4] = *b"TEX0";
const MDL0_VERSION: u32 = 11;

const BYTECODE_NODE: u8 = 0x02;
const BYTECODE_DRAW: u8 = 0x04;
const BYTECODE_END: u8 = 0x01;

/// Deferred name references into the shared string pool.
///
/// Writing a reference emits a placeholder and records the position; the
/// pool itself lands after the last section and every placeholder is
/// patched with the real offset.
#[derive(Default)]
struct StringPool {
    references: Vec<(u64, String)>,
}

impl StringPool {
    fn reference<W: Write + Seek>(&mut self, writer: &mut W, name: &str) -> BinResult<()> {
        self.references.push((writer.stream_position()?, name.to_string()));
        0u32.write_options(writer, binrw::Endian::Big, ())
    }

    fn finalize<W: Write + Seek>(self, writer: &mut W) -> BinResult<()> {
        let be = binrw::Endian::Big;
        let mut offsets: IndexMap<String, u32> = IndexMap::new();
        for (_, name) in &self.references {
            if !offsets.contains_key(name) {
                let offset = writer.stream_position()? as u32;
                offsets.insert(name.clone(), offset);
                writer.write_all(name.as_bytes()).map_err(binrw::Error::Io)?;
                writer.write_all(&[0]).map_err(binrw::Error::Io)?;
            }
        }

        let end = writer.stream_position()?;
        for (position, name) in &self.references {
            writer.seek(SeekFrom::Start(*position))?;
            offsets[name].write_options(writer, be, ())?;
        }
        writer.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

/// Serializes `scene` as a single-model BRRES container.
pub fn write_brres<W: Write + Seek>(writer: &mut W, scene: &ModelScene) -> BinResult<()> {
    let be = binrw::Endian::Big;
    let start = writer.stream_position()?;
    let mut pool = StringPool::default();

    MAGIC.write_options(writer, be, ())?;
    BYTE_ORDER_MARK.write_options(writer, be, ())?;
    0u16.write_options(writer, be, ())?;
    let file_size_pos = writer.stream_position()?;
    0u32.write_options(writer, be, ())?; // patched at the end
    0x10u16.write_options(writer, be, ())?; // root offset
    // Sections: the model plus one per texture.
    ((1 + scene.textures.len()) as u16).write_options(writer, be, ())?;

    write_root(writer, scene, &mut pool)?;

    let mdl0_pos = writer.stream_position()?;
    write_mdl0(writer, scene, &mut pool)?;

    let mut tex0_positions = Vec::with_capacity(scene.textures.len());
    for (name, texture) in &scene.textures {
        tex0_positions.push(writer.stream_position()?);
        write_tex0(writer, name, texture, &mut pool)?;
    }

    pool.finalize(writer)?;

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(file_size_pos))?;
    ((end - start) as u32).write_options(writer, be, ())?;

    // Patch the root index group data offsets now that sections have
    // landed.
    patch_root_offsets(writer, start, mdl0_pos, &tex0_positions)?;
    writer.seek(SeekFrom::Start(end))?;

    debug!("brres `{}`: {} bytes", scene.name, end - start);
    Ok(())
}

/// Serializes to a byte vector.
pub fn to_bytes(scene: &ModelScene) -> BinResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    write_brres(&mut out, scene)?;
    Ok(out.into_inner())
}

/// Root section: a folder group naming the model folder and, when textures
/// exist, the texture folder, each folder listing its resources.
///
/// Entry data offsets are zero here and patched once the section positions
/// are known.
fn write_root<W: Write + Seek>(
    writer: &mut W,
    scene: &ModelScene,
    pool: &mut StringPool,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    b"root".write_options(writer, be, ())?;
    let size_pos = writer.stream_position()?;
    0u32.write_options(writer, be, ())?;

    write_index_group(writer, pool, &["3DModels(NW4R)", "Textures(NW4R)"])?;
    write_index_group(writer, pool, &[&scene.name])?;
    let texture_names: Vec<&str> = scene.textures.keys().map(String::as_str).collect();
    write_index_group(writer, pool, &texture_names)?;

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(size_pos))?;
    ((end - size_pos + 4) as u32).write_options(writer, be, ())?;
    writer.seek(SeekFrom::Start(end))?;
    Ok(())
}

/// One index group: byte size, entry count, then 0x10 entries. The data
/// offset of each entry is a placeholder until patching.
fn write_index_group<W: Write + Seek>(
    writer: &mut W,
    pool: &mut StringPool,
    names: &[&str],
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    let size = 8 + names.len() as u32 * 0x10;
    size.write_options(writer, be, ())?;
    (names.len() as u32).write_options(writer, be, ())?;
    for (index, name) in names.iter().enumerate() {
        (index as u16).write_options(writer, be, ())?;
        // Binary search tree links, unused by sequential readers.
        [0u16; 3].write_options(writer, be, ())?;
        pool.reference(writer, name)?;
        0u32.write_options(writer, be, ())?; // data offset placeholder
    }
    Ok(())
}

/// Rewrites the data offsets of the root's folder entries.
fn patch_root_offsets<W: Write + Seek>(
    writer: &mut W,
    start: u64,
    mdl0_pos: u64,
    tex0_positions: &[u64],
) -> BinResult<()> {
    // Header is 0x10 bytes, the root magic and size 8 more; groups follow.
    let folder_group = start + 0x18;
    let model_group = folder_group + 8 + 2 * 0x10;
    let texture_group = model_group + 8 + 0x10;

    // Folder entries point at their groups.
    patch_entry(writer, folder_group, 0, (model_group - start) as u32)?;
    patch_entry(writer, folder_group, 1, (texture_group - start) as u32)?;
    patch_entry(writer, model_group, 0, (mdl0_pos - start) as u32)?;
    for (index, position) in tex0_positions.iter().enumerate() {
        patch_entry(writer, texture_group, index, (*position - start) as u32)?;
    }
    Ok(())
}

fn patch_entry<W: Write + Seek>(
    writer: &mut W,
    group: u64,
    entry: usize,
    value: u32,
) -> BinResult<()> {
    // Entry layout: id, pad, name, data. Data offset sits at +0x0C.
    writer.seek(SeekFrom::Start(group + 8 + entry as u64 * 0x10 + 0x0C))?;
    value.write_options(writer, binrw::Endian::Big, ())
}

fn write_mdl0<W: Write + Seek>(
    writer: &mut W,
    scene: &ModelScene,
    pool: &mut StringPool,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    MDL0_MAGIC.write_options(writer, be, ())?;
    let size_pos = writer.stream_position()?;
    0u32.write_options(writer, be, ())?;
    MDL0_VERSION.write_options(writer, be, ())?;
    pool.reference(writer, &scene.name)?;

    // Section directory: node tree, draw list, bones, the four array
    // kinds, materials, shaders, objects. Offsets are relative to the
    // MDL0 start and patched as each section is written.
    let directory_pos = writer.stream_position()?;
    [0u32; 10].write_options(writer, be, ())?;
    let mdl0_start = size_pos - 4;
    let mut directory = [0u32; 10];

    directory[0] = (writer.stream_position()? - mdl0_start) as u32;
    write_node_tree(writer, scene)?;
    directory[1] = (writer.stream_position()? - mdl0_start) as u32;
    write_draw_opa(writer, scene)?;
    directory[2] = (writer.stream_position()? - mdl0_start) as u32;
    write_bones(writer, scene, pool)?;
    for (slot, arrays) in [
        (3, &scene.vertex_arrays),
        (4, &scene.normal_arrays),
        (5, &scene.color_arrays),
        (6, &scene.texcoord_arrays),
    ] {
        directory[slot] = (writer.stream_position()? - mdl0_start) as u32;
        write_arrays(writer, arrays, pool)?;
    }
    directory[7] = (writer.stream_position()? - mdl0_start) as u32;
    write_materials(writer, scene, pool)?;
    directory[8] = (writer.stream_position()? - mdl0_start) as u32;
    write_shaders(writer, scene)?;
    directory[9] = (writer.stream_position()? - mdl0_start) as u32;
    write_objects(writer, scene, pool)?;

    let end = writer.stream_position()?;
    writer.seek(SeekFrom::Start(size_pos))?;
    ((end - mdl0_start) as u32).write_options(writer, be, ())?;
    writer.seek(SeekFrom::Start(directory_pos))?;
    directory.write_options(writer, be, ())?;
    writer.seek(SeekFrom::Start(end))?;
    Ok(())
}

/// Node-tree byte code: one command per bone in index order, then the
/// terminator.
fn write_node_tree<W: Write + Seek>(writer: &mut W, scene: &ModelScene) -> BinResult<()> {
    let be = binrw::Endian::Big;
    for (index, bone) in scene.bones.iter().enumerate() {
        BYTECODE_NODE.write_options(writer, be, ())?;
        (index as u16).write_options(writer, be, ())?;
        (bone.parent.unwrap_or(0) as u16).write_options(writer, be, ())?;
    }
    BYTECODE_END.write_options(writer, be, ())
}

/// Draw byte code: one command per opaque draw entry, in link order.
fn write_draw_opa<W: Write + Seek>(writer: &mut W, scene: &ModelScene) -> BinResult<()> {
    let be = binrw::Endian::Big;
    for entry in &scene.draw_opa {
        BYTECODE_DRAW.write_options(writer, be, ())?;
        (entry.material as u16).write_options(writer, be, ())?;
        (entry.object as u16).write_options(writer, be, ())?;
        (entry.bone as u16).write_options(writer, be, ())?;
        0u8.write_options(writer, be, ())?; // priority
    }
    BYTECODE_END.write_options(writer, be, ())
}

fn write_bones<W: Write + Seek>(
    writer: &mut W,
    scene: &ModelScene,
    pool: &mut StringPool,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    (scene.bones.len() as u32).write_options(writer, be, ())?;
    for bone in &scene.bones {
        pool.reference(writer, &bone.name)?;
        (bone.parent.map_or(-1i32, |p| p as i32)).write_options(writer, be, ())?;
        write_vec3(writer, bone.scale)?;
        write_vec3(writer, bone.rotation)?;
        write_vec3(writer, bone.position)?;
    }
    Ok(())
}

fn write_arrays<W: Write + Seek>(
    writer: &mut W,
    arrays: &IndexMap<String, AttributeArray>,
    pool: &mut StringPool,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    (arrays.len() as u32).write_options(writer, be, ())?;
    for (name, array) in arrays {
        pool.reference(writer, name)?;
        array.count.write_options(writer, be, ())?;
        (array.data.len() as u32).write_options(writer, be, ())?;
        array.data.write_options(writer, be, ())?;
    }
    Ok(())
}

fn write_materials<W: Write + Seek>(
    writer: &mut W,
    scene: &ModelScene,
    pool: &mut StringPool,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    (scene.materials.len() as u32).write_options(writer, be, ())?;
    for (name, material) in &scene.materials {
        write_material(writer, name, material, scene, pool)?;
    }
    Ok(())
}

fn write_material<W: Write + Seek>(
    writer: &mut W,
    name: &str,
    material: &Material,
    scene: &ModelScene,
    pool: &mut StringPool,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    pool.reference(writer, name)?;
    material.color.write_options(writer, be, ())?;
    // Shader resolution happened during assembly, so the index is present.
    let shader = scene.shaders.get_index_of(&material.shader).unwrap_or(0) as u32;
    shader.write_options(writer, be, ())?;
    (material.layers.len() as u32).write_options(writer, be, ())?;
    for layer in &material.layers {
        pool.reference(writer, &layer.texture)?;
        (layer.wrap as u8).write_options(writer, be, ())?;
        (layer.min_filter as u8).write_options(writer, be, ())?;
        (layer.mag_filter as u8).write_options(writer, be, ())?;
        0u8.write_options(writer, be, ())?;
    }
    Ok(())
}

fn write_shaders<W: Write + Seek>(writer: &mut W, scene: &ModelScene) -> BinResult<()> {
    let be = binrw::Endian::Big;
    (scene.shaders.len() as u32).write_options(writer, be, ())?;
    for shader in scene.shaders.values() {
        write_shader(writer, shader)?;
    }
    Ok(())
}

fn write_shader<W: Write + Seek>(writer: &mut W, shader: &Shader) -> BinResult<()> {
    let be = binrw::Endian::Big;
    (shader.stages.len() as u32).write_options(writer, be, ())?;
    for stage in &shader.stages {
        u8::from(stage.uses_texture).write_options(writer, be, ())?;
        stage.texcoord.write_options(writer, be, ())?;
        stage.const_color.write_options(writer, be, ())?;
        stage.const_alpha.write_options(writer, be, ())?;
        for op in [&stage.color_op, &stage.alpha_op] {
            op.args.write_options(writer, be, ())?;
            op.bias.write_options(writer, be, ())?;
            op.op.write_options(writer, be, ())?;
            u8::from(op.clamp).write_options(writer, be, ())?;
            op.shift.write_options(writer, be, ())?;
            op.dest.write_options(writer, be, ())?;
        }
    }
    Ok(())
}

fn write_objects<W: Write + Seek>(
    writer: &mut W,
    scene: &ModelScene,
    pool: &mut StringPool,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    (scene.objects.len() as u32).write_options(writer, be, ())?;
    for object in &scene.objects {
        write_object(writer, object, pool)?;
    }
    Ok(())
}

fn write_object<W: Write + Seek>(
    writer: &mut W,
    object: &Object,
    pool: &mut StringPool,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    pool.reference(writer, &object.name)?;
    (object.bone as u32).write_options(writer, be, ())?;
    pool.reference(writer, &object.vertex_array)?;
    pool.reference(writer, &object.normal_array)?;
    (object.color_layers.len() as u32).write_options(writer, be, ())?;
    for layer in &object.color_layers {
        pool.reference(writer, layer)?;
    }
    (object.texcoord_layers.len() as u32).write_options(writer, be, ())?;
    for layer in &object.texcoord_layers {
        pool.reference(writer, layer)?;
    }
    pool.reference(writer, &object.material)?;
    object.index_count.write_options(writer, be, ())?;
    0u16.write_options(writer, be, ())?;
    (object.geometry.len() as u32).write_options(writer, be, ())?;
    object.geometry.write_options(writer, be, ())?;
    Ok(())
}

fn write_tex0<W: Write + Seek>(
    writer: &mut W,
    name: &str,
    texture: &Texture,
    pool: &mut StringPool,
) -> BinResult<()> {
    let be = binrw::Endian::Big;
    TEX0_MAGIC.write_options(writer, be, ())?;
    ((0x20 + texture.data.len()) as u32).write_options(writer, be, ())?;
    pool.reference(writer, name)?;
    texture.width.write_options(writer, be, ())?;
    texture.height.write_options(writer, be, ())?;
    (texture.format as u8).write_options(writer, be, ())?;
    texture.mipmaps.write_options(writer, be, ())?;
    0u16.write_options(writer, be, ())?;
    (texture.data.len() as u32).write_options(writer, be, ())?;
    texture.data.write_options(writer, be, ())?;
    Ok(())
}

fn write_vec3<W: Write + Seek>(writer: &mut W, v: Vec3) -> BinResult<()> {
    v.to_array().write_options(writer, binrw::Endian::Big, ())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::scene::{tev, Bone, DrawEntry, Material, TevOp, TevStage};
    use pretty_assertions::assert_eq;

    fn sample_scene() -> ModelScene {
        let mut scene = ModelScene::new("course");
        scene
            .add_texture(
                "stone".to_string(),
                Texture {
                    width: 8,
                    height: 8,
                    format: crate::ctd::TextureFormat::Cmpr,
                    mipmaps: 0,
                    data: vec![0x11; 32],
                },
            )
            .unwrap();
        let op = TevOp {
            args: [tev::ARG_ZERO, tev::ARG_ZERO, tev::ARG_ZERO, tev::ARG_CONSTANT],
            bias: tev::BIAS_ZERO,
            op: tev::OP_ADD,
            clamp: true,
            shift: tev::SHIFT_0,
            dest: tev::DEST_PIXEL,
        };
        scene
            .add_shader(
                "flat".to_string(),
                Shader {
                    stages: vec![TevStage {
                        uses_texture: false,
                        texcoord: 0,
                        const_color: 0,
                        const_alpha: 0,
                        color_op: op.clone(),
                        alpha_op: op,
                    }],
                },
            )
            .unwrap();
        scene
            .add_material(
                "mat".to_string(),
                Material {
                    color: [0x80, 0x80, 0x80, 0xFF],
                    shader: "flat".to_string(),
                    layers: Vec::new(),
                },
            )
            .unwrap();
        let bone = scene.insert_bone(Bone {
            name: "cube".to_string(),
            parent: Some(0),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        });
        scene
            .add_vertex_array(
                "cube".to_string(),
                AttributeArray {
                    count: 3,
                    data: vec![0; 36],
                },
            )
            .unwrap();
        scene
            .add_normal_array(
                "cube".to_string(),
                AttributeArray {
                    count: 1,
                    data: vec![0; 12],
                },
            )
            .unwrap();
        let object = scene.add_object(Object {
            name: "cube".to_string(),
            bone,
            vertex_array: "cube".to_string(),
            normal_array: "cube".to_string(),
            color_layers: Vec::new(),
            texcoord_layers: Vec::new(),
            material: "mat".to_string(),
            geometry: vec![0x90, 0, 3, 0, 0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0],
            index_count: 3,
        });
        scene.link_draw_opa(object, 0, bone);
        scene
    }

    #[test]
    fn header_and_file_size() {
        let bytes = to_bytes(&sample_scene()).unwrap();
        assert_eq!(b"bres", &bytes[..4]);
        assert_eq!([0xFE, 0xFF], bytes[4..6]);
        let size = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
        assert_eq!(bytes.len() as u32, size);
        // MDL0 plus one TEX0.
        assert_eq!(2, u16::from_be_bytes(bytes[14..16].try_into().unwrap()));
    }

    #[test]
    fn root_entries_point_at_sections() {
        let scene = sample_scene();
        let bytes = to_bytes(&scene).unwrap();

        // Folder group at 0x18; its first entry's data offset leads to the
        // model group, whose first entry leads to the MDL0.
        let model_group =
            u32::from_be_bytes(bytes[0x18 + 8 + 0x0C..0x18 + 8 + 0x10].try_into().unwrap())
                as usize;
        let mdl0 = u32::from_be_bytes(
            bytes[model_group + 8 + 0x0C..model_group + 8 + 0x10]
                .try_into()
                .unwrap(),
        ) as usize;
        assert_eq!(b"MDL0", &bytes[mdl0..mdl0 + 4]);

        let texture_group =
            u32::from_be_bytes(bytes[0x18 + 0x18 + 0x0C..0x18 + 0x18 + 0x10].try_into().unwrap())
                as usize;
        let tex0 = u32::from_be_bytes(
            bytes[texture_group + 8 + 0x0C..texture_group + 8 + 0x10]
                .try_into()
                .unwrap(),
        ) as usize;
        assert_eq!(b"TEX0", &bytes[tex0..tex0 + 4]);
    }

    #[test]
    fn string_pool_references_resolve() {
        let bytes = to_bytes(&sample_scene()).unwrap();

        // The model folder entry's name offset must address "course".
        let name_off = u32::from_be_bytes(bytes[0x18 + 8 + 8..0x18 + 8 + 0x0C].try_into().unwrap())
            as usize;
        let name = &bytes[name_off..name_off + "3DModels(NW4R)".len()];
        assert_eq!(b"3DModels(NW4R)", name);
        assert_eq!(0, bytes[name_off + name.len()]);
    }

    #[test]
    fn output_is_deterministic() {
        let scene = sample_scene();
        assert_eq!(to_bytes(&scene).unwrap(), to_bytes(&scene).unwrap());
    }

    #[test]
    fn draw_list_uses_draw_commands() {
        let scene = sample_scene();
        let bytes = to_bytes(&scene).unwrap();
        // One draw entry: 0x04 mat=0 obj=0 bone=1 prio=0 then terminator.
        let pattern = [0x04, 0, 0, 0, 0, 0, 1, 0, 0x01];
        assert!(bytes.windows(pattern.len()).any(|w| w == pattern));
    }
}
