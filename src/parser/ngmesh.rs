use std::fs;
use std::path::Path;

use crate::error::ParseError;
use crate::structs_and_impls::{reverse, BoundingBox, Mesh};

/// Legacy neuroglancer mesh reader.
///
/// Layout (little endian): `u32` vertex count, `count * 3` `f32` XYZ positions,
/// then `u32` index triples until the end of the buffer. No normals.
pub struct NgmeshParser;

impl NgmeshParser {
    pub fn parse_file(path: &Path) -> Result<Mesh, ParseError> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Mesh, ParseError> {
        let header: [u8; 4] = bytes
            .get(..4)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| ParseError::FormatError("ngmesh buffer is shorter than its header".to_string()))?;
        let vertex_count = u32::from_le_bytes(header) as usize;

        let vertex_bytes = vertex_count
            .checked_mul(12)
            .filter(|&n| n <= bytes.len() - 4)
            .ok_or_else(|| {
                ParseError::FormatError(format!(
                    "ngmesh declares {} vertices but holds only {} bytes",
                    vertex_count,
                    bytes.len()
                ))
            })?;
        let (vertex_data, face_data) = bytes[4..].split_at(vertex_bytes);

        if face_data.len() % 12 != 0 {
            return Err(ParseError::FormatError(format!(
                "ngmesh face data is {} bytes, not a whole number of triangles",
                face_data.len()
            )));
        }

        let vertices_zyx: Vec<[f32; 3]> = vertex_data
            .chunks_exact(12)
            .map(|c| {
                reverse([
                    f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                    f32::from_le_bytes([c[8], c[9], c[10], c[11]]),
                ])
            })
            .collect();

        let faces: Vec<[u32; 3]> = face_data
            .chunks_exact(12)
            .map(|c| {
                [
                    u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    u32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                    u32::from_le_bytes([c[8], c[9], c[10], c[11]]),
                ]
            })
            .collect();

        if let Some(bad) = faces.iter().flatten().find(|&&v| v as usize >= vertex_count) {
            return Err(ParseError::FormatError(format!(
                "ngmesh face refers to vertex {} of {}",
                bad, vertex_count
            )));
        }

        let bounding_box = BoundingBox::enclosing(&vertices_zyx);
        Ok(Mesh::from_parts_unchecked(vertices_zyx, faces, Vec::new(), bounding_box))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(vertices_xyz: &[[f32; 3]], faces: &[[u32; 3]]) -> Vec<u8> {
        let mut out = (vertices_xyz.len() as u32).to_le_bytes().to_vec();
        out.extend(vertices_xyz.iter().flatten().flat_map(|v| v.to_le_bytes()));
        out.extend(faces.iter().flatten().flat_map(|v| v.to_le_bytes()));
        out
    }

    #[test]
    fn test_parse_converts_to_zyx() {
        let bytes = encode(&[[1.0, 2.0, 3.0], [0.0, 0.0, 0.0], [5.0, 0.0, 0.0]], &[[0, 1, 2]]);
        let mesh = NgmeshParser::parse(&bytes).unwrap();
        assert_eq!(mesh.vertices_zyx()[0], [3.0, 2.0, 1.0]);
        assert_eq!(mesh.faces(), &[[0, 1, 2]]);
        assert!(!mesh.has_normals());
    }

    #[test]
    fn test_truncated_buffers_are_rejected() {
        assert!(NgmeshParser::parse(&[1, 0]).is_err());

        let bytes = encode(&[[1.0, 2.0, 3.0]], &[]);
        assert!(NgmeshParser::parse(&bytes[..10]).is_err());

        let mut bytes = encode(&[[0.0; 3]; 3], &[[0, 1, 2]]);
        bytes.pop();
        assert!(matches!(NgmeshParser::parse(&bytes), Err(ParseError::FormatError(_))));

        let bytes = encode(&[[0.0; 3]; 3], &[[0, 1, 3]]);
        assert!(matches!(NgmeshParser::parse(&bytes), Err(ParseError::FormatError(_))));
    }
}
