//! Flattening of the decoded collision region into one co-indexed
//! vertex/flag mesh.
use log::info;

use crate::ctd::{Collision, COLLISION_VERTEX_SIZE};

/// The logical collision mesh: `face_count` triangles of three vertices
/// each, with one collision flag per triangle.
///
/// `vertex_data` holds the raw 0x24 byte triangles in face order, identical
/// for both collision region encodings.
#[derive(Debug, PartialEq, Clone)]
pub struct CollisionMesh {
    pub face_count: u32,
    pub vertex_data: Vec<u8>,
    pub flags: Vec<u16>,
}

/// Flattens either collision encoding into a [CollisionMesh].
///
/// Grouped regions expand each group's flag once per contained face, in
/// group order, so a grouped document and its flattened re-export produce
/// byte-identical meshes. Count consistency was already validated during
/// decoding, so flattening cannot fail.
pub fn assemble_collision(collision: &Collision) -> CollisionMesh {
    let mesh = match collision {
        Collision::Grouped { face_count, groups } => {
            let mut vertex_data =
                Vec::with_capacity(*face_count as usize * COLLISION_VERTEX_SIZE);
            let mut flags = Vec::with_capacity(*face_count as usize);
            for group in groups {
                vertex_data.extend_from_slice(&group.vertex_data);
                flags.extend(std::iter::repeat(group.flag).take(group.face_count as usize));
            }
            CollisionMesh {
                face_count: *face_count,
                vertex_data,
                flags,
            }
        }
        Collision::Flat {
            face_count,
            vertex_data,
            flags,
        } => CollisionMesh {
            face_count: *face_count,
            vertex_data: vertex_data.clone(),
            flags: flags.clone(),
        },
    };

    info!("collision mesh: {} faces", mesh.face_count);
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ctd::CollisionGroup;
    use pretty_assertions::assert_eq;

    fn face(fill: u8) -> Vec<u8> {
        vec![fill; COLLISION_VERTEX_SIZE]
    }

    #[test]
    fn grouped_and_flat_regions_flatten_identically() {
        // Two groups: 2 road faces, then 1 wall face.
        let grouped = Collision::Grouped {
            face_count: 3,
            groups: vec![
                CollisionGroup {
                    face_count: 2,
                    flag: 0x0000,
                    vertex_data: [face(1), face(2)].concat(),
                },
                CollisionGroup {
                    face_count: 1,
                    flag: 0x0C00,
                    vertex_data: face(3),
                },
            ],
        };
        let flat = Collision::Flat {
            face_count: 3,
            vertex_data: [face(1), face(2), face(3)].concat(),
            flags: vec![0x0000, 0x0000, 0x0C00],
        };

        assert_eq!(assemble_collision(&grouped), assemble_collision(&flat));
    }

    #[test]
    fn flags_repeat_per_face_within_each_group() {
        let grouped = Collision::Grouped {
            face_count: 10,
            groups: vec![
                CollisionGroup {
                    face_count: 4,
                    flag: 0x0001,
                    vertex_data: vec![0; 4 * COLLISION_VERTEX_SIZE],
                },
                CollisionGroup {
                    face_count: 6,
                    flag: 0x0002,
                    vertex_data: vec![0; 6 * COLLISION_VERTEX_SIZE],
                },
            ],
        };

        let mesh = assemble_collision(&grouped);
        let mut expected = vec![0x0001u16; 4];
        expected.extend(vec![0x0002; 6]);
        assert_eq!(expected, mesh.flags);
        assert_eq!(10 * COLLISION_VERTEX_SIZE, mesh.vertex_data.len());
    }

    #[test]
    fn group_order_defines_face_order() {
        let grouped = Collision::Grouped {
            face_count: 2,
            groups: vec![
                CollisionGroup {
                    face_count: 1,
                    flag: 7,
                    vertex_data: face(0xAA),
                },
                CollisionGroup {
                    face_count: 1,
                    flag: 9,
                    vertex_data: face(0xBB),
                },
            ],
        };

        let mesh = assemble_collision(&grouped);
        assert_eq!(vec![7, 9], mesh.flags);
        assert_eq!(0xAA, mesh.vertex_data[0]);
        assert_eq!(0xBB, mesh.vertex_data[COLLISION_VERTEX_SIZE]);
    }
}
