use tracing::debug;

use crate::structs_and_impls::Mesh;

impl Mesh {
    /// Laplacian smoothing, in place.
    ///
    /// Each iteration relocates every vertex to the average of itself and its
    /// adjacent neighbours. More iterations give a smoother mesh but more shrinkage.
    /// Normals are recomputed afterwards and faces that became degenerate are dropped.
    pub fn laplacian_smooth(&mut self, iterations: usize) {
        if iterations == 0 {
            if !self.has_normals() {
                self.recompute_normals(true);
            }
            return;
        }

        // Always discard old normals
        self.drop_normals();

        // Unique undirected edges, sorted for better locality of the vertex lookups below
        let mut edges: Vec<(u32, u32)> = self
            .faces
            .iter()
            .flat_map(|f| [(f[0], f[1]), (f[1], f[2]), (f[2], f[0])])
            .map(|(a, b)| if a < b { (a, b) } else { (b, a) })
            .filter(|(a, b)| a != b)
            .collect();
        edges.sort_unstable();
        edges.dedup();

        // How many neighbours each vertex has == how many times it appears in the edge list
        let mut neighbor_counts = vec![0u32; self.vertices_zyx.len()];
        for &(a, b) in &edges {
            neighbor_counts[a as usize] += 1;
            neighbor_counts[b as usize] += 1;
        }

        let mut new_vertices = self.vertices_zyx.clone();
        for _ in 0..iterations {
            new_vertices.copy_from_slice(&self.vertices_zyx);

            for &(a, b) in &edges {
                let (va, vb) = (self.vertices_zyx[a as usize], self.vertices_zyx[b as usize]);
                for axis in 0..3 {
                    new_vertices[a as usize][axis] += vb[axis];
                    new_vertices[b as usize][axis] += va[axis];
                }
            }

            // plus one because each point itself is included in the sum
            for (vertex, &count) in new_vertices.iter_mut().zip(&neighbor_counts) {
                let denom = (count + 1) as f32;
                for c in vertex.iter_mut() {
                    *c /= denom;
                }
            }

            // Swap buffers to reuse the allocation between iterations
            std::mem::swap(&mut self.vertices_zyx, &mut new_vertices);
        }
        debug!(
            "smoothed {} vertices over {} iterations ({} edges)",
            self.vertices_zyx.len(),
            iterations,
            edges.len()
        );

        // Smoothing can collapse small features into degenerate faces:
        //
        //   1        1
        //  / \       |
        // 2---3 ==>  X (where X is occupied by both 2 and 3)
        //  \ /       |
        //   4        4
        self.recompute_normals(true);
        debug_assert!(self.normals_zyx.len() == self.vertices_zyx.len());
    }
}

#[cfg(test)]
mod tests {
    use crate::structs_and_impls::Mesh;
    use crate::volume::BinaryVolume;

    fn blob() -> Mesh {
        let vol = BinaryVolume::from_fn([8, 8, 8], |z, y, x| {
            (1..7).contains(&z) && (1..7).contains(&y) && (1..7).contains(&x)
        });
        Mesh::from_binary_vol(&vol, None, 1).unwrap()
    }

    #[test]
    fn test_zero_iterations_only_fills_normals() {
        let mut mesh = blob();
        mesh.drop_normals();
        let before = mesh.vertices_zyx().to_vec();
        mesh.laplacian_smooth(0);
        assert_eq!(mesh.vertices_zyx(), before.as_slice());
        assert_eq!(mesh.normals_zyx().len(), mesh.vertex_count());
    }

    #[test]
    fn test_smoothing_shrinks_towards_centroid() {
        let mut mesh = blob();
        // mean distance from the centre of the cube
        let spread = |m: &Mesh| -> f32 {
            let total: f32 = m
                .vertices_zyx()
                .iter()
                .map(|v| v.iter().map(|c| (c - 4.0) * (c - 4.0)).sum::<f32>().sqrt())
                .sum();
            total / m.vertex_count() as f32
        };
        let before = spread(&mesh);
        mesh.laplacian_smooth(3);
        assert!(spread(&mesh) < before);
        assert_eq!(mesh.normals_zyx().len(), mesh.vertex_count());
    }

    #[test]
    fn test_single_triangle_collapses_to_its_centroid() {
        let mut mesh = Mesh::new(
            vec![[0.0, 0.0, 0.0], [0.0, 0.0, 3.0], [0.0, 3.0, 0.0]],
            vec![[0, 1, 2]],
            Vec::new(),
            None,
        )
        .unwrap();
        // Every vertex neighbours the other two, so one pass moves all three onto the centroid
        mesh.laplacian_smooth(1);
        assert!(mesh.is_empty());
        assert!(mesh.faces().is_empty());
    }
}
