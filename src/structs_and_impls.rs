use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::*;                     // Import error types from error module

/// Axis-aligned box in ZYX order: `start` inclusive, `stop` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub start: [i32; 3],
    pub stop: [i32; 3],
}

impl BoundingBox {
    pub fn new(start: [i32; 3], stop: [i32; 3]) -> Self {
        Self { start, stop }
    }

    /// Box spanning `[0, 0, 0]..shape`.
    pub fn from_shape(shape: [usize; 3]) -> Self {
        Self {
            start: [0, 0, 0],
            stop: shape.map(|s| s as i32),
        }
    }

    /// A box with huge "negative shape", so it has no effect when merged with other boxes.
    pub fn empty() -> Self {
        Self {
            start: [i32::MAX; 3],
            stop: [i32::MIN; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.stop[axis] <= self.start[axis])
    }

    pub fn shape(&self) -> [i32; 3] {
        [
            self.stop[0].saturating_sub(self.start[0]),
            self.stop[1].saturating_sub(self.start[1]),
            self.stop[2].saturating_sub(self.start[2]),
        ]
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut merged = *self;
        for axis in 0..3 {
            merged.start[axis] = merged.start[axis].min(other.start[axis]);
            merged.stop[axis] = merged.stop[axis].max(other.stop[axis]);
        }
        merged
    }

    /// Floor of the smallest vertex to ceiling of the largest vertex.
    pub fn enclosing(vertices_zyx: &[[f32; 3]]) -> BoundingBox {
        if vertices_zyx.is_empty() {
            return BoundingBox::empty();
        }

        let mut lo = [f32::INFINITY; 3];
        let mut hi = [f32::NEG_INFINITY; 3];
        for vertex in vertices_zyx {
            for axis in 0..3 {
                lo[axis] = lo[axis].min(vertex[axis]);
                hi[axis] = hi[axis].max(vertex[axis]);
            }
        }

        BoundingBox {
            start: lo.map(|v| v.floor() as i32),
            stop: hi.map(|v| v.ceil() as i32),
        }
    }
}

/// Mesh file formats we can read and/or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshFormat {
    Obj,        // Wavefront text format (read + write)
    Ngmesh,     // Legacy neuroglancer binary mesh (read + write)
    Vtu,        // VTK XML unstructured grid (write only)
}

impl MeshFormat {
    /// Resolves a format name or file extension (without the dot).
    pub fn from_name(name: &str) -> Result<MeshFormat, MeshError> {
        match name.to_ascii_lowercase().as_str() {
            "obj" => Ok(MeshFormat::Obj),
            "ngmesh" => Ok(MeshFormat::Ngmesh),
            "vtu" => Ok(MeshFormat::Vtu),
            "drc" => Err(MeshError::UnsupportedFormat(
                "drc (Draco encoding is not available)".to_string(),
            )),
            other => Err(MeshError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_path(path: &Path) -> Result<MeshFormat, MeshError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| MeshError::UnsupportedFormat(format!("{} has no extension", path.display())))?;
        Self::from_name(ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MeshFormat::Obj => "obj",
            MeshFormat::Ngmesh => "ngmesh",
            MeshFormat::Vtu => "vtu",
        }
    }

    /// True for formats that can also be parsed back into a [`Mesh`].
    pub fn is_readable(&self) -> bool {
        matches!(self, MeshFormat::Obj | MeshFormat::Ngmesh)
    }
}

/// How to compress the array members of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionMethod {
    None,       // Raw little-endian buffers
    #[default]
    Lz4,        // Lossless, compressed twice
}

/// A triangle surface mesh.
///
/// Vertices and normals are stored in ZYX order; faces index into the vertex list.
/// The bounding box is not stored in mesh files, but it is kept here for
/// programmatic manipulation (e.g. merging blocks).
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub(crate) vertices_zyx: Vec<[f32; 3]>,
    pub(crate) faces: Vec<[u32; 3]>,
    pub(crate) normals_zyx: Vec<[f32; 3]>,
    pub(crate) bounding_box: BoundingBox,
}

impl Mesh {
    /// Builds a mesh, validating normals length and face indices.
    ///
    /// `normals_zyx` may be empty. Without an explicit box, the box encloses the vertices.
    pub fn new(
        vertices_zyx: Vec<[f32; 3]>,
        faces: Vec<[u32; 3]>,
        normals_zyx: Vec<[f32; 3]>,
        bounding_box: Option<BoundingBox>,
    ) -> Result<Mesh, MeshError> {
        if !normals_zyx.is_empty() && normals_zyx.len() != vertices_zyx.len() {
            return Err(MeshError::NormalsMismatch {
                mismatches: 1,
                meshes: 1,
                first: 0,
            });
        }

        let vertex_count = vertices_zyx.len();
        if let Some((face, index)) = faces.iter().enumerate().find_map(|(i, face)| {
            face.iter().find(|&&v| v as usize >= vertex_count).map(|&v| (i, v))
        }) {
            return Err(MeshError::FaceIndexOutOfRange {
                face,
                index,
                vertex_count,
            });
        }

        let bounding_box = bounding_box.unwrap_or_else(|| BoundingBox::enclosing(&vertices_zyx));
        Ok(Mesh {
            vertices_zyx,
            faces,
            normals_zyx,
            bounding_box,
        })
    }

    /// Builds a mesh without validation. Callers guarantee the invariants.
    pub(crate) fn from_parts_unchecked(
        vertices_zyx: Vec<[f32; 3]>,
        faces: Vec<[u32; 3]>,
        normals_zyx: Vec<[f32; 3]>,
        bounding_box: BoundingBox,
    ) -> Mesh {
        debug_assert!(normals_zyx.is_empty() || normals_zyx.len() == vertices_zyx.len());
        Mesh {
            vertices_zyx,
            faces,
            normals_zyx,
            bounding_box,
        }
    }

    pub fn empty() -> Mesh {
        Self::empty_with_box(BoundingBox::empty())
    }

    pub fn empty_with_box(bounding_box: BoundingBox) -> Mesh {
        Mesh {
            vertices_zyx: Vec::new(),
            faces: Vec::new(),
            normals_zyx: Vec::new(),
            bounding_box,
        }
    }

    pub fn vertices_zyx(&self) -> &[[f32; 3]] {
        &self.vertices_zyx
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    pub fn normals_zyx(&self) -> &[[f32; 3]] {
        &self.normals_zyx
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn set_bounding_box(&mut self, bounding_box: BoundingBox) {
        self.bounding_box = bounding_box;
    }

    pub fn has_normals(&self) -> bool {
        !self.normals_zyx.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices_zyx.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices_zyx.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Vertices converted to XYZ order, as stored in mesh files.
    pub fn vertices_xyz(&self) -> Vec<[f32; 3]> {
        self.vertices_zyx.iter().map(|&v| reverse(v)).collect()
    }

    pub fn normals_xyz(&self) -> Vec<[f32; 3]> {
        self.normals_zyx.iter().map(|&n| reverse(n)).collect()
    }

    pub fn drop_normals(&mut self) {
        self.normals_zyx.clear();
    }

    /// Size of the raw vertex, face and normal buffers in bytes.
    pub fn uncompressed_nbytes(&self) -> usize {
        (self.vertices_zyx.len() + self.normals_zyx.len()) * 12 + self.faces.len() * 12
    }

    /// Consumes the mesh, returning `(vertices_zyx, faces, normals_zyx, box)`.
    pub fn into_parts(self) -> (Vec<[f32; 3]>, Vec<[u32; 3]>, Vec<[f32; 3]>, BoundingBox) {
        (self.vertices_zyx, self.faces, self.normals_zyx, self.bounding_box)
    }

    /// Moves every vertex by `offset_zyx` (and the box by its rounded value).
    pub fn translate(&mut self, offset_zyx: [f32; 3]) {
        for vertex in &mut self.vertices_zyx {
            for axis in 0..3 {
                vertex[axis] += offset_zyx[axis];
            }
        }
        if !self.bounding_box.is_empty() {
            for axis in 0..3 {
                let shift = offset_zyx[axis].round() as i32;
                self.bounding_box.start[axis] += shift;
                self.bounding_box.stop[axis] += shift;
            }
        }
        debug!("translated {} vertices by {:?}", self.vertices_zyx.len(), offset_zyx);
    }
}

/// Swap between ZYX and XYZ order.
pub(crate) fn reverse(v: [f32; 3]) -> [f32; 3] {
    [v[2], v[1], v[0]]
}
