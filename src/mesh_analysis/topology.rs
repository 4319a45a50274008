use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::structs_and_impls::Mesh;

/// Find vertices with bit-identical coordinates.
///
/// Returns `(duplicate_index, original_index)` pairs, where the original is the
/// first occurrence of that position in the list.
pub fn remap_duplicates(vertices_zyx: &[[f32; 3]]) -> Vec<(u32, u32)> {
    let mut first_seen: HashMap<[u32; 3], u32> = HashMap::with_capacity(vertices_zyx.len());
    let mut pairs = Vec::new();
    for (i, vertex) in vertices_zyx.iter().enumerate() {
        // -0.0 and 0.0 are the same position
        let key = vertex.map(|c| if c == 0.0 { 0 } else { c.to_bits() });
        match first_seen.get(&key) {
            Some(&original) => pairs.push((i as u32, original)),
            None => {
                first_seen.insert(key, i as u32);
            }
        }
    }
    pairs
}

impl Mesh {
    /// Replace references to duplicate vertices with the first matching vertex.
    ///
    /// Normals are recomputed iff they were present originally.
    /// Returns `false` if no stitching was needed.
    pub fn stitch_adjacent_faces(&mut self, drop_unused_vertices: bool, drop_duplicate_faces: bool) -> bool {
        let need_normals = self.has_normals();

        let mapping_pairs = remap_duplicates(&self.vertices_zyx);
        if mapping_pairs.is_empty() {
            if need_normals {
                self.recompute_normals(true);
            }
            return false;
        }

        // Discard old normals
        self.drop_normals();

        // Remap faces to no longer refer to the duplicates
        let mapping: HashMap<u32, u32> = mapping_pairs.into_iter().collect();
        for face in &mut self.faces {
            for v in face.iter_mut() {
                if let Some(&original) = mapping.get(v) {
                    *v = original;
                }
            }
        }
        debug!("stitched {} duplicate vertices", mapping.len());

        if drop_unused_vertices {
            self.drop_unused_vertices();
        }

        if drop_duplicate_faces {
            self.drop_duplicate_faces();
        }

        if need_normals {
            self.recompute_normals(true);
        }

        true
    }

    /// Drop vertices (and their normals) that no face refers to, renumbering the faces.
    pub fn drop_unused_vertices(&mut self) {
        let vertex_count = self.vertices_zyx.len();
        let mut used = vec![false; vertex_count];
        for face in &self.faces {
            for &v in face {
                used[v as usize] = true;
            }
        }

        if used.iter().all(|&u| u) {
            return;
        }

        // New index of each kept vertex = number of kept vertices before it
        let mut shiftmap = vec![u32::MAX; vertex_count];
        let mut next = 0u32;
        for (i, &is_used) in used.iter().enumerate() {
            if is_used {
                shiftmap[i] = next;
                next += 1;
            }
        }

        for face in &mut self.faces {
            for v in face.iter_mut() {
                *v = shiftmap[*v as usize];
            }
        }

        let mut keep = used.iter();
        self.vertices_zyx.retain(|_| *keep.next().unwrap_or(&false));
        if !self.normals_zyx.is_empty() {
            let mut keep = used.iter();
            self.normals_zyx.retain(|_| *keep.next().unwrap_or(&false));
        }
        debug!("dropped {} unused vertices", vertex_count - self.vertices_zyx.len());
    }

    /// Remove faces whose vertex set repeats an earlier face.
    ///
    /// Vertex order is normalised first, so clockwise and counter-clockwise
    /// copies of the same triangle count as duplicates.
    pub fn drop_duplicate_faces(&mut self) {
        let before = self.faces.len();
        let mut seen: HashSet<[u32; 3]> = HashSet::with_capacity(before);
        self.faces.retain(|face| {
            let mut sorted = *face;
            sorted.sort_unstable();
            seen.insert(sorted)
        });
        if self.faces.len() != before {
            debug!("dropped {} duplicate faces", before - self.faces.len());
        }
    }
}
