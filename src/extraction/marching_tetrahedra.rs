use std::collections::HashMap;

use once_cell::sync::Lazy;
use rayon::prelude::*;
use tracing::debug;

use crate::volume::BinaryVolume;

/// Corner `c` of a lattice cube sits at offset `(c >> 2 & 1, c >> 1 & 1, c & 1)` in ZYX.
const CORNER_OFFSETS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [0, 0, 1],
    [0, 1, 0],
    [0, 1, 1],
    [1, 0, 0],
    [1, 0, 1],
    [1, 1, 0],
    [1, 1, 1],
];

/// Six tetrahedra sharing the main diagonal 0 -> 7 (Freudenthal/Kuhn split).
/// One tetrahedron per axis permutation: walk 0 -> +a -> +a+b -> 7.
/// The split is translation invariant, so neighbouring cubes agree on every shared face.
static KUHN_TETRAHEDRA: Lazy<[[usize; 4]; 6]> = Lazy::new(|| {
    // bit of the corner index that moves along each axis (z, y, x)
    let axis_bits = [4usize, 2, 1];
    let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

    let mut tetrahedra = [[0usize; 4]; 6];
    for (t, perm) in permutations.iter().enumerate() {
        let first = axis_bits[perm[0]];
        let second = first | axis_bits[perm[1]];
        tetrahedra[t] = [0, first, second, 7];
    }
    tetrahedra
});

/// Raw output of surface extraction, in voxel units (ZYX).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub vertices_zyx: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// Lattice edge identified by its two (sorted) lattice point indices.
type EdgeKey = (u64, u64);

/// Triangles produced by one Z layer of cubes, with layer-local vertex numbering.
struct LayerSurface {
    vertex_keys: Vec<EdgeKey>,
    vertex_positions: Vec<[f32; 3]>,
    faces: Vec<[u32; 3]>,
}

struct Lattice<'a> {
    volume: &'a BinaryVolume,
    step: usize,
    dims: [usize; 3],
}

impl<'a> Lattice<'a> {
    fn new(volume: &'a BinaryVolume, step: usize) -> Self {
        let shape = volume.shape();
        let dims = shape.map(|s| s.div_ceil(step));
        Self { volume, step, dims }
    }

    #[inline]
    fn value(&self, point: [usize; 3]) -> bool {
        self.volume.get(point[0] * self.step, point[1] * self.step, point[2] * self.step)
    }

    #[inline]
    fn linear(&self, point: [usize; 3]) -> u64 {
        ((point[0] * self.dims[1] + point[1]) * self.dims[2] + point[2]) as u64
    }

    /// Position of a lattice point in voxel units, with the origin at the voxel corner.
    #[inline]
    fn position(&self, point: [usize; 3]) -> [f32; 3] {
        point.map(|p| (p * self.step) as f32 + 0.5)
    }

    fn march_layer(&self, iz: usize) -> LayerSurface {
        let mut layer = LayerSurface {
            vertex_keys: Vec::new(),
            vertex_positions: Vec::new(),
            faces: Vec::new(),
        };
        let mut local: HashMap<EdgeKey, u32> = HashMap::new();

        for iy in 0..self.dims[1] - 1 {
            for ix in 0..self.dims[2] - 1 {
                let corners: [[usize; 3]; 8] = CORNER_OFFSETS.map(|o| [iz + o[0], iy + o[1], ix + o[2]]);
                let inside: [bool; 8] = corners.map(|c| self.value(c));

                // Uniform cubes contribute nothing
                if inside.iter().all(|&v| v) || !inside.iter().any(|&v| v) {
                    continue;
                }

                for tet in KUHN_TETRAHEDRA.iter() {
                    let points = tet.map(|c| corners[c]);
                    let flags = tet.map(|c| inside[c]);
                    self.march_tetrahedron(&points, &flags, &mut local, &mut layer);
                }
            }
        }
        layer
    }

    fn march_tetrahedron(
        &self,
        points: &[[usize; 3]; 4],
        flags: &[bool; 4],
        local: &mut HashMap<EdgeKey, u32>,
        layer: &mut LayerSurface,
    ) {
        let (ins, outs): (Vec<usize>, Vec<usize>) = (0..4).partition(|&i| flags[i]);
        if ins.is_empty() || outs.is_empty() {
            return;
        }

        let inside_point = self.position(points[ins[0]]);
        let outside_point = self.position(points[outs[0]]);

        let mut vertex = |a: usize, b: usize| -> u32 {
            let (ka, kb) = (self.linear(points[a]), self.linear(points[b]));
            let key = if ka < kb { (ka, kb) } else { (kb, ka) };
            *local.entry(key).or_insert_with(|| {
                let pa = self.position(points[a]);
                let pb = self.position(points[b]);
                layer.vertex_keys.push(key);
                layer
                    .vertex_positions
                    .push([(pa[0] + pb[0]) * 0.5, (pa[1] + pb[1]) * 0.5, (pa[2] + pb[2]) * 0.5]);
                (layer.vertex_positions.len() - 1) as u32
            })
        };

        let mut triangles: Vec<[u32; 3]> = Vec::with_capacity(2);
        match (ins.len(), outs.len()) {
            (1, 3) => {
                let i = ins[0];
                triangles.push([vertex(i, outs[0]), vertex(i, outs[1]), vertex(i, outs[2])]);
            }
            (3, 1) => {
                let o = outs[0];
                triangles.push([vertex(ins[0], o), vertex(ins[1], o), vertex(ins[2], o)]);
            }
            _ => {
                // Two in, two out: the four crossing edges form a planar quad
                let (i0, i1, o0, o1) = (ins[0], ins[1], outs[0], outs[1]);
                let q = [vertex(i0, o0), vertex(i0, o1), vertex(i1, o1), vertex(i1, o0)];
                triangles.push([q[0], q[1], q[2]]);
                triangles.push([q[0], q[2], q[3]]);
            }
        }

        for mut tri in triangles {
            orient_outward(&mut tri, &layer.vertex_positions, inside_point, outside_point);
            layer.faces.push(tri);
        }
    }
}

/// Winds `tri` so that its XYZ-space normal points from `inside` toward `outside`.
fn orient_outward(tri: &mut [u32; 3], positions: &[[f32; 3]], inside: [f32; 3], outside: [f32; 3]) {
    let a = positions[tri[0] as usize];
    let b = positions[tri[1] as usize];
    let c = positions[tri[2] as usize];
    let normal_zyx = crate::mesh_analysis::normals::triangle_normal_zyx(a, b, c);
    let direction = [outside[0] - inside[0], outside[1] - inside[1], outside[2] - inside[2]];
    let dot: f32 = (0..3).map(|axis| normal_zyx[axis] * direction[axis]).sum();
    if dot < 0.0 {
        tri.swap(1, 2);
    }
}

/// Extract the 0.5 iso-surface of a binary volume.
///
/// Vertices are shared between all triangles that touch the same lattice edge,
/// so the result is already stitched within the volume.
pub fn extract_surface(volume: &BinaryVolume, step_size: usize) -> Extraction {
    let step = step_size.max(1);
    let lattice = Lattice::new(volume, step);
    if lattice.dims.iter().any(|&d| d < 2) {
        return Extraction::default();
    }

    let layers: Vec<LayerSurface> = (0..lattice.dims[0] - 1)
        .into_par_iter()
        .map(|iz| lattice.march_layer(iz))
        .collect();

    // Merge layers; vertices on the seam between layers share edge keys
    let mut extraction = Extraction::default();
    let mut global: HashMap<EdgeKey, u32> = HashMap::new();
    for layer in layers {
        let remap: Vec<u32> = layer
            .vertex_keys
            .iter()
            .zip(&layer.vertex_positions)
            .map(|(key, position)| {
                *global.entry(*key).or_insert_with(|| {
                    extraction.vertices_zyx.push(*position);
                    (extraction.vertices_zyx.len() - 1) as u32
                })
            })
            .collect();
        extraction
            .faces
            .extend(layer.faces.iter().map(|f| f.map(|v| remap[v as usize])));
    }

    debug!(
        "extracted {} vertices and {} faces from volume {:?} (step {})",
        extraction.vertices_zyx.len(),
        extraction.faces.len(),
        volume.shape(),
        step
    );
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_use_counts(faces: &[[u32; 3]]) -> HashMap<(u32, u32), usize> {
        let mut counts = HashMap::new();
        for f in faces {
            for (a, b) in [(f[0], f[1]), (f[1], f[2]), (f[2], f[0])] {
                *counts.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }
        counts
    }

    #[test]
    fn test_kuhn_split_has_six_tetrahedra_on_the_diagonal() {
        assert_eq!(KUHN_TETRAHEDRA.len(), 6);
        for tet in KUHN_TETRAHEDRA.iter() {
            assert_eq!(tet[0], 0);
            assert_eq!(tet[3], 7);
            assert_eq!(tet[1].count_ones(), 1);
            assert_eq!(tet[2].count_ones(), 2);
        }
    }

    #[test]
    fn test_uniform_volumes_produce_nothing() {
        assert!(extract_surface(&BinaryVolume::zeros([4, 4, 4]), 1).is_empty());
        let full = BinaryVolume::from_fn([4, 4, 4], |_, _, _| true);
        assert!(extract_surface(&full, 1).is_empty());
    }

    #[test]
    fn test_single_voxel_gives_closed_surface() {
        let vol = BinaryVolume::from_fn([3, 3, 3], |z, y, x| (z, y, x) == (1, 1, 1));
        let ex = extract_surface(&vol, 1);
        assert!(!ex.is_empty());
        // Every edge is shared by exactly two triangles
        assert!(edge_use_counts(&ex.faces).values().all(|&n| n == 2));
        // Vertices stay within one voxel of the centre (1.5, 1.5, 1.5)
        for v in &ex.vertices_zyx {
            assert!(v.iter().all(|&c| (1.0..=2.0).contains(&c)), "{:?}", v);
        }
    }

    #[test]
    fn test_solid_box_is_watertight_and_outward() {
        let vol = BinaryVolume::from_fn([6, 7, 8], |z, y, x| {
            (1..5).contains(&z) && (1..6).contains(&y) && (1..7).contains(&x)
        });
        let ex = extract_surface(&vol, 1);
        assert!(edge_use_counts(&ex.faces).values().all(|&n| n == 2));

        // Signed volume (divergence theorem, XYZ order) must be positive for outward winding
        let xyz: Vec<[f64; 3]> = ex
            .vertices_zyx
            .iter()
            .map(|v| [v[2] as f64, v[1] as f64, v[0] as f64])
            .collect();
        let signed: f64 = ex
            .faces
            .iter()
            .map(|f| {
                let (a, b, c) = (xyz[f[0] as usize], xyz[f[1] as usize], xyz[f[2] as usize]);
                a[0] * (b[1] * c[2] - b[2] * c[1]) - a[1] * (b[0] * c[2] - b[2] * c[0])
                    + a[2] * (b[0] * c[1] - b[1] * c[0])
            })
            .sum::<f64>()
            / 6.0;
        assert!(signed > 0.0, "signed volume {}", signed);
    }

    #[test]
    fn test_vertices_are_not_duplicated_across_layers() {
        let vol = BinaryVolume::from_fn([8, 5, 5], |z, y, x| (1..7).contains(&z) && (1..4).contains(&y) && (1..4).contains(&x));
        let ex = extract_surface(&vol, 1);
        let mut keys: Vec<[u32; 3]> = ex.vertices_zyx.iter().map(|v| v.map(f32::to_bits)).collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_step_size_coarsens_the_lattice() {
        let vol = BinaryVolume::from_fn([9, 9, 9], |z, y, x| (2..7).contains(&z) && (2..7).contains(&y) && (2..7).contains(&x));
        let fine = extract_surface(&vol, 1);
        let coarse = extract_surface(&vol, 2);
        assert!(!coarse.is_empty());
        assert!(coarse.faces.len() < fine.faces.len());
    }
}
