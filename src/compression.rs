use lz4_flex::block::{compress_prepend_size, decompress};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MeshError;
use crate::structs_and_impls::{BoundingBox, CompressionMethod, Mesh};

/// A mesh whose buffers are held in compressed form.
///
/// Holding this instead of a [`Mesh`] saves RAM when many meshes are kept
/// around (e.g. before concatenation), and it serialises to a compact byte string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedMesh {
    method: CompressionMethod,
    bounding_box: BoundingBox,
    vertex_count: usize,
    normal_count: usize,
    face_count: usize,
    vertices: Vec<u8>,
    normals: Vec<u8>,
    faces: Vec<u8>,
}

fn f32_triples_to_bytes(values: &[[f32; 3]]) -> Vec<u8> {
    values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect()
}

fn u32_triples_to_bytes(values: &[[u32; 3]]) -> Vec<u8> {
    values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect()
}

fn expected_len(name: &str, count: usize) -> Result<usize, MeshError> {
    count
        .checked_mul(12)
        .ok_or_else(|| MeshError::Compression(format!("{} count {} is out of range", name, count)))
}

fn check_len(name: &str, bytes: &[u8], expected: usize) -> Result<(), MeshError> {
    if bytes.len() != expected {
        return Err(MeshError::Compression(format!(
            "{} buffer holds {} bytes, expected {}",
            name,
            bytes.len(),
            expected
        )));
    }
    Ok(())
}

fn bytes_to_f32_triples(bytes: &[u8]) -> Vec<[f32; 3]> {
    bytes
        .chunks_exact(12)
        .map(|c| {
            [
                f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                f32::from_le_bytes([c[8], c[9], c[10], c[11]]),
            ]
        })
        .collect()
}

fn bytes_to_u32_triples(bytes: &[u8]) -> Vec<[u32; 3]> {
    bytes
        .chunks_exact(12)
        .map(|c| {
            [
                u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                u32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                u32::from_le_bytes([c[8], c[9], c[10], c[11]]),
            ]
        })
        .collect()
}

// Compressing twice gains noticeably on mesh buffers
fn lz4_twice(raw: &[u8]) -> Vec<u8> {
    compress_prepend_size(&compress_prepend_size(raw))
}

// A block can expand at most ~255x, so a larger size prefix is forged
const MAX_LZ4_RATIO: usize = 255;

/// One `compress_prepend_size` layer, refusing sizes above `limit` before allocating.
fn unlz4_bounded(packed: &[u8], limit: usize) -> Result<Vec<u8>, MeshError> {
    if packed.len() < 4 {
        return Err(MeshError::Compression(format!("lz4 block of {} bytes has no size prefix", packed.len())));
    }
    let (prefix, body) = packed.split_at(4);
    let size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if size > limit {
        return Err(MeshError::Compression(format!(
            "lz4 block claims {} bytes, at most {} allowed",
            size, limit
        )));
    }
    Ok(decompress(body, size)?)
}

fn unlz4_twice(packed: &[u8], expected: usize) -> Result<Vec<u8>, MeshError> {
    let outer_limit = packed.len().saturating_mul(MAX_LZ4_RATIO).saturating_add(16);
    let inner = unlz4_bounded(packed, outer_limit)?;
    unlz4_bounded(&inner, expected)
}

impl Mesh {
    /// Compress the vertex, normal and face buffers, consuming the mesh.
    pub fn compress(self, method: CompressionMethod) -> CompressedMesh {
        let uncompressed = self.uncompressed_nbytes();
        let (vertices_zyx, faces, normals_zyx, bounding_box) = self.into_parts();

        let raw = [
            f32_triples_to_bytes(&vertices_zyx),
            f32_triples_to_bytes(&normals_zyx),
            u32_triples_to_bytes(&faces),
        ];
        let [vertices, normals, faces_bytes] = match method {
            CompressionMethod::None => raw,
            CompressionMethod::Lz4 => raw.map(|buf| lz4_twice(&buf)),
        };

        let compressed = CompressedMesh {
            method,
            bounding_box,
            vertex_count: vertices_zyx.len(),
            normal_count: normals_zyx.len(),
            face_count: faces.len(),
            vertices,
            normals,
            faces: faces_bytes,
        };
        debug!(
            "compressed mesh from {} to {} bytes ({:?})",
            uncompressed,
            compressed.nbytes(),
            method
        );
        compressed
    }
}

impl CompressedMesh {
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Approximate size of the compressed payload.
    pub fn nbytes(&self) -> usize {
        self.vertices.len() + self.normals.len() + self.faces.len()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    /// Restore the uncompressed mesh.
    pub fn decompress(self) -> Result<Mesh, MeshError> {
        let vertex_len = expected_len("vertex", self.vertex_count)?;
        let normal_len = expected_len("normal", self.normal_count)?;
        let face_len = expected_len("face", self.face_count)?;

        let (vertices, normals, faces) = match self.method {
            CompressionMethod::None => (self.vertices, self.normals, self.faces),
            CompressionMethod::Lz4 => (
                unlz4_twice(&self.vertices, vertex_len)?,
                unlz4_twice(&self.normals, normal_len)?,
                unlz4_twice(&self.faces, face_len)?,
            ),
        };
        check_len("vertex", &vertices, vertex_len)?;
        check_len("normal", &normals, normal_len)?;
        check_len("face", &faces, face_len)?;

        Mesh::new(
            bytes_to_f32_triples(&vertices),
            bytes_to_u32_triples(&faces),
            bytes_to_f32_triples(&normals),
            Some(self.bounding_box),
        )
    }

    /// Serialise the compressed form (`postcard` encoding).
    pub fn to_bytes(&self) -> Result<Vec<u8>, MeshError> {
        Ok(postcard::to_stdvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<CompressedMesh, MeshError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}
