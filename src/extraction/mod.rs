//! Surface extraction from binary volumes.

pub mod marching_tetrahedra;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::concatenation::concatenate_meshes;
use crate::error::MeshError;
use crate::structs_and_impls::{BoundingBox, Mesh};
use crate::volume::BinaryVolume;

pub use marching_tetrahedra::{extract_surface, Extraction};

impl Mesh {
    /// Mesh a binary volume, possibly stored at a downsampled resolution.
    ///
    /// `fullres_box` is the box the volume covers in full-resolution coordinates
    /// (default: `[0, 0, 0]..shape`). The mesh is scaled and translated into it.
    pub fn from_binary_vol(
        volume: &BinaryVolume,
        fullres_box: Option<BoundingBox>,
        step_size: usize,
    ) -> Result<Mesh, MeshError> {
        let shape = volume.shape();
        let fullres_box = fullres_box.unwrap_or_else(|| BoundingBox::from_shape(shape));

        if shape.iter().any(|&s| s == 0) {
            warn!("volume {:?} has a zero-length axis; returning an empty mesh", shape);
            return Ok(Mesh::empty_with_box(fullres_box));
        }

        // Infer the resolution of the downsampled volume
        let box_shape = fullres_box.shape();
        let resolution: [f32; 3] = [0, 1, 2].map(|axis| (box_shape[axis] / shape[axis] as i32) as f32);

        // Tiny volumes are padded with zeros, which closes the surface on those sides
        let padding: [usize; 3] = shape.map(|s| 2usize.saturating_sub(s));
        let needs_padding = padding.iter().any(|&p| p > 0);

        // Completely full boxes are open on all sides, leaving no vertices or faces
        if volume.is_empty() || (volume.is_full() && !needs_padding) {
            debug!("volume {:?} is uniform; returning an empty mesh", shape);
            return Ok(Mesh::empty_with_box(fullres_box));
        }

        let padded;
        let source = if needs_padding {
            padded = volume.padded(padding);
            &padded
        } else {
            volume
        };

        let Extraction {
            mut vertices_zyx,
            faces,
        } = extract_surface(source, step_size);

        // Undo padding, then upscale and translate the mesh into place
        for vertex in &mut vertices_zyx {
            for axis in 0..3 {
                vertex[axis] = (vertex[axis] - padding[axis] as f32) * resolution[axis]
                    + fullres_box.start[axis] as f32;
            }
        }

        let mut mesh = Mesh::from_parts_unchecked(vertices_zyx, faces, Vec::new(), fullres_box);
        mesh.recompute_normals(true);
        // recompute_normals may clear vertices if every face was degenerate; keep the box anyway
        mesh.bounding_box = fullres_box;
        Ok(mesh)
    }

    /// Mesh each block into its box, concatenate, and optionally stitch the seams.
    pub fn from_binary_blocks(
        blocks: &[BinaryVolume],
        fullres_boxes: &[BoundingBox],
        stitch: bool,
        step_size: usize,
    ) -> Result<Mesh, MeshError> {
        if blocks.len() != fullres_boxes.len() {
            return Err(MeshError::BlockCountMismatch {
                blocks: blocks.len(),
                boxes: fullres_boxes.len(),
            });
        }

        let meshes = blocks
            .par_iter()
            .zip(fullres_boxes.par_iter())
            .map(|(block, fullres_box)| Mesh::from_binary_vol(block, Some(*fullres_box), step_size))
            .collect::<Result<Vec<Mesh>, MeshError>>()?;

        let mut mesh = concatenate_meshes(meshes)?;
        if stitch {
            mesh.stitch_adjacent_faces(true, true);
        }
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(shape: [usize; 3], lo: usize, hi: usize) -> BinaryVolume {
        BinaryVolume::from_fn(shape, |z, y, x| {
            (lo..hi).contains(&z) && (lo..hi).contains(&y) && (lo..hi).contains(&x)
        })
    }

    #[test]
    fn test_binary_vol_is_scaled_into_box() {
        let vol = cube([6, 6, 6], 1, 5);
        let bb = BoundingBox::new([100, 200, 300], [112, 212, 312]);
        let mesh = Mesh::from_binary_vol(&vol, Some(bb), 1).unwrap();

        assert!(!mesh.is_empty());
        assert_eq!(mesh.bounding_box(), bb);
        assert_eq!(mesh.normals_zyx().len(), mesh.vertices_zyx().len());
        for v in mesh.vertices_zyx() {
            // resolution 2: voxel-unit coordinates 1..5 map to 102..110 (+/- one voxel of slack)
            assert!((100.0..=112.0).contains(&v[0]), "{:?}", v);
            assert!((200.0..=212.0).contains(&v[1]), "{:?}", v);
            assert!((300.0..=312.0).contains(&v[2]), "{:?}", v);
        }
    }

    #[test]
    fn test_full_and_empty_volumes_give_empty_mesh_with_box() {
        let bb = BoundingBox::new([0, 0, 0], [4, 4, 4]);
        let full = BinaryVolume::from_fn([4, 4, 4], |_, _, _| true);
        let mesh = Mesh::from_binary_vol(&full, Some(bb), 1).unwrap();
        assert!(mesh.is_empty());
        assert_eq!(mesh.bounding_box(), bb);

        let mesh = Mesh::from_binary_vol(&BinaryVolume::zeros([4, 4, 4]), None, 1).unwrap();
        assert!(mesh.is_empty());
        assert_eq!(mesh.bounding_box(), bb);
    }

    #[test]
    fn test_flat_volume_is_padded() {
        // A single slice of foreground would be open on both sides without padding
        let vol = BinaryVolume::from_fn([1, 4, 4], |_, y, x| (1..3).contains(&y) && (1..3).contains(&x));
        let mesh = Mesh::from_binary_vol(&vol, None, 1).unwrap();
        assert!(!mesh.is_empty());
        let min_z = mesh.vertices_zyx().iter().map(|v| v[0]).fold(f32::INFINITY, f32::min);
        let max_z = mesh.vertices_zyx().iter().map(|v| v[0]).fold(f32::NEG_INFINITY, f32::max);
        assert!(min_z >= 0.0 && max_z <= 1.0, "z range {}..{}", min_z, max_z);
    }

    #[test]
    fn test_blocks_require_matching_boxes() {
        let err = Mesh::from_binary_blocks(&[cube([4, 4, 4], 1, 3)], &[], true, 1).unwrap_err();
        assert!(matches!(err, MeshError::BlockCountMismatch { blocks: 1, boxes: 0 }));
    }

    #[test]
    fn test_adjacent_blocks_stitch_without_duplicates() {
        // One elongated object split into two blocks along x that overlap by two voxels
        let whole = BinaryVolume::from_fn([6, 6, 10], |z, y, x| {
            (1..5).contains(&z) && (1..5).contains(&y) && (1..9).contains(&x)
        });
        let left = BinaryVolume::from_fn([6, 6, 6], |z, y, x| whole.get(z, y, x));
        let right = BinaryVolume::from_fn([6, 6, 6], |z, y, x| whole.get(z, y, x + 4));
        let boxes = [
            BoundingBox::new([0, 0, 0], [6, 6, 6]),
            BoundingBox::new([0, 0, 4], [6, 6, 10]),
        ];

        let unstitched = Mesh::from_binary_blocks(&[left.clone(), right.clone()], &boxes, false, 1).unwrap();
        let stitched = Mesh::from_binary_blocks(&[left, right], &boxes, true, 1).unwrap();
        assert!(stitched.vertex_count() < unstitched.vertex_count());
        assert_eq!(stitched.bounding_box(), BoundingBox::new([0, 0, 0], [6, 6, 10]));

        let mut keys: Vec<[u32; 3]> = stitched.vertices_zyx().iter().map(|v| v.map(f32::to_bits)).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }
}
