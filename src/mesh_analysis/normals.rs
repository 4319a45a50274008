use rayon::prelude::*;
use tracing::debug;

use crate::structs_and_impls::Mesh;

/// Faces shorter than this (in normal length) are treated as degenerate.
const DEGENERATE_EPSILON: f32 = 1e-12;

/// Unnormalised triangle normal, computed in XYZ space but returned in ZYX order.
///
/// Vertices are stored ZYX, but winding is defined in XYZ (the file convention),
/// so the cross product is taken on the reversed components.
#[inline]
pub fn triangle_normal_zyx(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> [f32; 3] {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    // components as (x, y, z) = (u[2], u[1], u[0])
    let nx = u[1] * v[0] - u[0] * v[1];
    let ny = u[0] * v[2] - u[2] * v[0];
    let nz = u[2] * v[1] - u[1] * v[2];
    [nz, ny, nx]
}

#[inline]
pub(crate) fn length(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

#[inline]
fn normalized(v: [f32; 3]) -> [f32; 3] {
    let len = length(v);
    if len > DEGENERATE_EPSILON {
        [v[0] / len, v[1] / len, v[2] / len]
    } else {
        [0.0; 3]
    }
}

/// Unit normal per face; zero for faces with no area.
pub fn compute_face_normals(vertices_zyx: &[[f32; 3]], faces: &[[u32; 3]]) -> Vec<[f32; 3]> {
    faces
        .par_iter()
        .map(|f| {
            normalized(triangle_normal_zyx(
                vertices_zyx[f[0] as usize],
                vertices_zyx[f[1] as usize],
                vertices_zyx[f[2] as usize],
            ))
        })
        .collect()
}

/// Per-vertex normal: normalised sum of the adjacent face normals.
pub fn compute_vertex_normals(
    vertices_zyx: &[[f32; 3]],
    faces: &[[u32; 3]],
    face_normals: &[[f32; 3]],
) -> Vec<[f32; 3]> {
    let mut sums = vec![[0.0f32; 3]; vertices_zyx.len()];
    for (face, normal) in faces.iter().zip(face_normals) {
        for &v in face {
            let acc = &mut sums[v as usize];
            acc[0] += normal[0];
            acc[1] += normal[1];
            acc[2] += normal[2];
        }
    }
    sums.into_iter().map(normalized).collect()
}

impl Mesh {
    /// Compute the normals for this mesh.
    ///
    /// With `remove_degenerate_faces`, faces with no area (just lines) are removed.
    /// This may leave unused vertices behind; `stitch_adjacent_faces` or
    /// `drop_unused_vertices` removes those.
    pub fn recompute_normals(&mut self, remove_degenerate_faces: bool) {
        let mut face_normals = compute_face_normals(&self.vertices_zyx, &self.faces);

        if remove_degenerate_faces {
            let before = self.faces.len();
            let keep: Vec<bool> = face_normals.iter().map(|n| n.iter().any(|&c| c != 0.0)).collect();
            if keep.iter().any(|&k| !k) {
                let mut flags = keep.iter();
                self.faces.retain(|_| *flags.next().unwrap_or(&true));
                let mut flags = keep.iter();
                face_normals.retain(|_| *flags.next().unwrap_or(&true));
                debug!("removed {} degenerate faces", before - self.faces.len());
            }
        }

        if self.faces.is_empty() {
            // No faces left. Discard all remaining vertices and normals.
            self.vertices_zyx.clear();
            self.normals_zyx.clear();
        } else {
            self.normals_zyx = compute_vertex_normals(&self.vertices_zyx, &self.faces, &face_normals);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle_normal_follows_xyz_winding() {
        // Counter-clockwise in the XY plane (z = 0) when seen from +z
        let a = [0.0, 0.0, 0.0];
        let b = [0.0, 0.0, 1.0]; // x = 1
        let c = [0.0, 1.0, 0.0]; // y = 1
        let n = triangle_normal_zyx(a, b, c);
        assert_eq!(n, [1.0, 0.0, 0.0]); // +z, stored first
    }

    #[test]
    fn test_degenerate_face_gets_zero_normal() {
        let vertices = vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 2.0]];
        let normals = compute_face_normals(&vertices, &[[0, 1, 2]]);
        assert_eq!(normals, vec![[0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_recompute_removes_degenerate_faces() {
        let mut mesh = Mesh::new(
            vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 0.0, 2.0]],
            vec![[0, 1, 2], [0, 1, 3]],
            Vec::new(),
            None,
        )
        .unwrap();

        mesh.recompute_normals(true);
        assert_eq!(mesh.faces(), &[[0, 1, 2]]);
        assert_eq!(mesh.normals_zyx().len(), 4);
        for n in &mesh.normals_zyx()[..3] {
            assert!((length(*n) - 1.0).abs() < 1e-6);
        }
        // vertex 3 is no longer used by any face
        assert_eq!(mesh.normals_zyx()[3], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_recompute_clears_mesh_when_all_faces_are_degenerate() {
        let mut mesh = Mesh::new(
            vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 2.0]],
            vec![[0, 1, 2]],
            Vec::new(),
            None,
        )
        .unwrap();
        mesh.recompute_normals(true);
        assert!(mesh.is_empty());
        assert!(mesh.faces().is_empty());
        assert!(!mesh.has_normals());
    }
}
