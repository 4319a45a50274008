use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::warn;

use crate::mesh_analysis::normals::{length, triangle_normal_zyx};
use crate::structs_and_impls::*; // import Mesh, BoundingBox

/// Per-face quality measures
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceQuality {
    pub face_index: usize,  // position in mesh.faces()
    pub area: f64,          // triangle area in voxel units squared
    pub aspect_ratio: f64,  // 1.0 for equilateral, grows as the triangle gets thinner
}

/// Summary of surface quality for one mesh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshQualityReport {
    pub total_faces: usize,
    pub total_vertices: usize,
    pub degenerate_faces: usize,      // faces with zero area (skipped in the aspect statistics)
    pub boundary_edges: usize,        // edges used by exactly one face
    pub non_manifold_edges: usize,    // edges used by more than two faces
    pub surface_area: f64,
    pub min_aspect_ratio: f64,
    pub mean_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub bounding_box: BoundingBox,
    #[serde(skip)]
    pub face_qualities: Vec<FaceQuality>,
}

impl MeshQualityReport {
    /// A closed 2-manifold: every edge is shared by exactly two faces.
    pub fn is_watertight(&self) -> bool {
        self.total_faces > 0 && self.boundary_edges == 0 && self.non_manifold_edges == 0
    }
}

/// Geometry routines (areas, aspect ratios, edge topology)
pub struct GeometricAnalysis;

impl GeometricAnalysis {
    /// Analyze mesh quality over all faces.
    pub fn analyse_mesh_quality(mesh: &Mesh) -> MeshQualityReport {
        let vertices = mesh.vertices_zyx(); // borrow the vertex buffer once

        // per-face quality, in parallel (faces are independent)
        let face_qualities: Vec<FaceQuality> = mesh
            .faces()
            .par_iter()
            .enumerate()
            .map(|(face_index, face)| Self::calculate_face_quality(face_index, face, vertices))
            .collect();

        let degenerate_faces = face_qualities.iter().filter(|q| q.area == 0.0).count();
        let surface_area: f64 = face_qualities.iter().map(|q| q.area).sum();

        // aspect statistics over faces that actually have area
        let mut min_aspect_ratio = f64::INFINITY;
        let mut max_aspect_ratio = 0.0f64;
        let mut aspect_sum = 0.0;
        let mut counted = 0usize;
        for quality in face_qualities.iter().filter(|q| q.area > 0.0) {
            min_aspect_ratio = min_aspect_ratio.min(quality.aspect_ratio);
            max_aspect_ratio = max_aspect_ratio.max(quality.aspect_ratio);
            aspect_sum += quality.aspect_ratio;
            counted += 1;
        }
        let mean_aspect_ratio = if counted > 0 { aspect_sum / counted as f64 } else { 0.0 };
        if counted == 0 {
            min_aspect_ratio = 0.0; // nothing measured
        }

        let (boundary_edges, non_manifold_edges) = Self::count_open_and_shared_edges(mesh.faces());
        if non_manifold_edges > 0 {
            warn!("mesh has {} non-manifold edges", non_manifold_edges);
        }

        MeshQualityReport {
            total_faces: mesh.face_count(),
            total_vertices: mesh.vertex_count(),
            degenerate_faces,
            boundary_edges,
            non_manifold_edges,
            surface_area,
            min_aspect_ratio,
            mean_aspect_ratio,
            max_aspect_ratio,
            bounding_box: mesh.bounding_box(),
            face_qualities,
        }
    }

    /// Area and aspect ratio of a single triangle.
    fn calculate_face_quality(face_index: usize, face: &[u32; 3], vertices: &[[f32; 3]]) -> FaceQuality {
        let [a, b, c] = face.map(|v| vertices[v as usize]); // corner positions

        let area = 0.5 * length(triangle_normal_zyx(a, b, c)) as f64; // |cross| / 2

        // edge lengths
        let edge = |p: [f32; 3], q: [f32; 3]| length([q[0] - p[0], q[1] - p[1], q[2] - p[2]]) as f64;
        let lengths = [edge(a, b), edge(b, c), edge(c, a)];
        let longest = lengths.iter().cloned().fold(0.0, f64::max);
        let perimeter: f64 = lengths.iter().sum();

        // longest * perimeter / (4 sqrt(3) area) is 1 for an equilateral triangle
        let aspect_ratio = if area > 0.0 {
            longest * perimeter / (4.0 * 3f64.sqrt() * area)
        } else {
            f64::INFINITY
        };

        FaceQuality {
            face_index,
            area,
            aspect_ratio,
        }
    }

    /// Returns `(boundary, non_manifold)` edge counts.
    fn count_open_and_shared_edges(faces: &[[u32; 3]]) -> (usize, usize) {
        let mut uses: HashMap<(u32, u32), u32> = HashMap::with_capacity(faces.len() * 3 / 2);
        for face in faces {
            for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                *uses.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        let boundary = uses.values().filter(|&&n| n == 1).count();
        let non_manifold = uses.values().filter(|&&n| n > 2).count();
        (boundary, non_manifold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::BinaryVolume;

    #[test]
    fn test_equilateral_triangle_has_unit_aspect_ratio() {
        let h = 3f32.sqrt() / 2.0;
        let mesh = Mesh::new(
            vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, h, 0.5]],
            vec![[0, 1, 2]],
            Vec::new(),
            None,
        )
        .unwrap();
        let report = GeometricAnalysis::analyse_mesh_quality(&mesh);
        assert!((report.min_aspect_ratio - 1.0).abs() < 1e-5);
        assert!((report.surface_area - 3f64.sqrt() / 4.0).abs() < 1e-6);
        assert_eq!(report.boundary_edges, 3);
        assert!(!report.is_watertight());
    }

    #[test]
    fn test_voxel_box_surface_is_watertight() {
        let vol = BinaryVolume::from_fn([6, 6, 6], |z, y, x| {
            (1..5).contains(&z) && (1..5).contains(&y) && (1..5).contains(&x)
        });
        let mesh = Mesh::from_binary_vol(&vol, None, 1).unwrap();
        let report = GeometricAnalysis::analyse_mesh_quality(&mesh);

        assert!(report.is_watertight());
        assert_eq!(report.degenerate_faces, 0);
        assert_eq!(report.total_faces, mesh.face_count());
        assert_eq!(report.face_qualities.len(), mesh.face_count());
        assert!(report.min_aspect_ratio >= 1.0 - 1e-9);
        assert!(report.mean_aspect_ratio <= report.max_aspect_ratio);
        // roughly a 4x4x4 box with chamfered edges and corners
        assert!(report.surface_area > 40.0 && report.surface_area < 150.0, "{}", report.surface_area);
    }

    #[test]
    fn test_non_manifold_and_degenerate_faces_are_counted() {
        // three triangles sharing edge 0-1, plus a zero-area sliver
        let mesh = Mesh::new(
            vec![
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0],
                [1.0, 0.0, 0.0],
                [-1.0, 0.0, 0.0],
                [0.0, 0.0, 2.0],
            ],
            vec![[0, 1, 2], [0, 1, 3], [0, 1, 4], [0, 1, 5]],
            Vec::new(),
            None,
        )
        .unwrap();
        let report = GeometricAnalysis::analyse_mesh_quality(&mesh);
        assert_eq!(report.non_manifold_edges, 1);
        assert_eq!(report.degenerate_faces, 1);
        assert!(report.max_aspect_ratio.is_finite());
    }

    #[test]
    fn test_empty_mesh_report() {
        let report = GeometricAnalysis::analyse_mesh_quality(&Mesh::empty());
        assert_eq!(report.total_faces, 0);
        assert_eq!(report.min_aspect_ratio, 0.0);
        assert_eq!(report.mean_aspect_ratio, 0.0);
        assert!(!report.is_watertight());
    }
}
