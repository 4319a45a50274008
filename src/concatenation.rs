use tracing::{debug, error};

use crate::error::MeshError;
use crate::structs_and_impls::{BoundingBox, Mesh};

/// Combine the given meshes into a single mesh.
///
/// Faces are renumbered by the running vertex offset and the bounding box is
/// the union of the inputs. Normals are kept only if every mesh has a complete
/// set; a mix of meshes with and without normals is an error.
pub fn concatenate_meshes<I>(meshes: I) -> Result<Mesh, MeshError>
where
    I: IntoIterator<Item = Mesh>,
{
    let meshes: Vec<Mesh> = meshes.into_iter().collect();
    if meshes.is_empty() {
        return Ok(Mesh::empty());
    }

    let vertex_total: usize = meshes.iter().map(Mesh::vertex_count).sum();
    let normal_total: usize = meshes.iter().map(|m| m.normals_zyx().len()).sum();
    let face_total: usize = meshes.iter().map(Mesh::face_count).sum();

    let keep_normals = if normal_total == 0 {
        false
    } else {
        let mismatched: Vec<usize> = meshes
            .iter()
            .enumerate()
            .filter(|(_, m)| m.normals_zyx().len() != m.vertex_count())
            .map(|(i, _)| i)
            .collect();
        if let Some(&first) = mismatched.first() {
            let bad = &meshes[first];
            error!(
                "Mesh normals do not correspond to vertices: {} of {} meshes mismatch. \
                 First offending mesh #{} has {} vertices, {} normals and {} faces",
                mismatched.len(),
                meshes.len(),
                first,
                bad.vertex_count(),
                bad.normals_zyx().len(),
                bad.face_count()
            );
            return Err(MeshError::NormalsMismatch {
                mismatches: mismatched.len(),
                meshes: meshes.len(),
                first,
            });
        }
        true
    };

    let mut vertices_zyx = Vec::with_capacity(vertex_total);
    let mut faces = Vec::with_capacity(face_total);
    let mut normals_zyx = Vec::with_capacity(if keep_normals { vertex_total } else { 0 });
    let mut bounding_box = BoundingBox::empty();

    let mesh_count = meshes.len();
    for mesh in meshes {
        let (mesh_vertices, mesh_faces, mesh_normals, mesh_box) = mesh.into_parts();
        let offset = vertices_zyx.len() as u32;
        faces.extend(mesh_faces.into_iter().map(|f| f.map(|v| v + offset)));
        vertices_zyx.extend(mesh_vertices);
        if keep_normals {
            normals_zyx.extend(mesh_normals);
        }
        bounding_box = bounding_box.union(&mesh_box);
    }

    debug!(
        "concatenated {} meshes into {} vertices and {} faces",
        mesh_count,
        vertices_zyx.len(),
        faces.len()
    );
    Ok(Mesh::from_parts_unchecked(vertices_zyx, faces, normals_zyx, bounding_box))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn triangle(offset: f32, with_normals: bool) -> Mesh {
        let normals = if with_normals { vec![[1.0, 0.0, 0.0]; 3] } else { Vec::new() };
        Mesh::new(
            vec![[offset, 0.0, 0.0], [offset, 0.0, 1.0], [offset, 1.0, 0.0]],
            vec![[0, 1, 2]],
            normals,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_input_gives_empty_mesh() {
        let mesh = concatenate_meshes(Vec::new()).unwrap();
        assert!(mesh.is_empty());
        assert_eq!(mesh.bounding_box(), BoundingBox::empty());
    }

    #[test]
    fn test_faces_are_offset_and_boxes_merged() {
        let mesh = concatenate_meshes(vec![triangle(0.0, true), triangle(5.0, true)]).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.faces(), &[[0, 1, 2], [3, 4, 5]]);
        assert_eq!(mesh.normals_zyx().len(), 6);
        assert_eq!(mesh.bounding_box(), BoundingBox::new([0, 0, 0], [5, 1, 1]));
    }

    #[test]
    fn test_mixed_normals_are_rejected() {
        let err = concatenate_meshes(vec![triangle(0.0, true), triangle(1.0, false), triangle(2.0, false)])
            .unwrap_err();
        match err {
            MeshError::NormalsMismatch { mismatches, meshes, first } => {
                assert_eq!((mismatches, meshes, first), (2, 3, 1));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_no_normals_anywhere_is_fine() {
        let mesh = concatenate_meshes(vec![triangle(0.0, false), Mesh::empty(), triangle(1.0, false)]).unwrap();
        assert_eq!(mesh.face_count(), 2);
        assert!(!mesh.has_normals());
        assert_eq!(mesh.faces()[1], [3, 4, 5]);
    }

    proptest! {
        #[test]
        fn prop_concatenation_preserves_counts_and_index_bounds(offsets in prop::collection::vec(-50.0f32..50.0, 0..12)) {
            let meshes: Vec<Mesh> = offsets.iter().map(|&o| triangle(o, false)).collect();
            let mesh = concatenate_meshes(meshes).unwrap();
            prop_assert_eq!(mesh.vertex_count(), offsets.len() * 3);
            prop_assert_eq!(mesh.face_count(), offsets.len());
            prop_assert!(mesh.faces().iter().flatten().all(|&v| (v as usize) < mesh.vertex_count()));
        }
    }
}
