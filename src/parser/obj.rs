use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::error::ParseError;                       // Parser errors (I/O, format, numbers)
use crate::structs_and_impls::{reverse, BoundingBox, Mesh};

pub struct ObjParser;  // Wavefront OBJ reader (positions, normals, triangulated faces)

impl ObjParser {
    /// Parse an OBJ file from disk.
    pub fn parse_file(path: &Path) -> Result<Mesh, ParseError> {
        let obj_file = File::open(path)?;               // ? propagates I/O errors
        Self::parse_obj(BufReader::new(obj_file))       // Delegate to the reader-based parser
    }

    /// Parse an OBJ file held in memory.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Mesh, ParseError> {
        Self::parse_obj(bytes)                          // &[u8] implements BufRead
    }

    /// Parse OBJ records from any buffered reader.
    ///
    /// Only `v`, `vn` and `f` are interpreted; polygons are fan-triangulated and
    /// texture/normal references in face tokens are ignored.
    pub fn parse_obj<R: BufRead>(obj_reader: R) -> Result<Mesh, ParseError> {
        let mut vertices_zyx: Vec<[f32; 3]> = Vec::new();  // Positions, converted to ZYX
        let mut normals_zyx: Vec<[f32; 3]> = Vec::new();   // Normals, converted to ZYX
        let mut faces: Vec<[u32; 3]> = Vec::new();          // 0-based triangles

        for (line_index, line) in obj_reader.lines().enumerate() {
            let current_line = line?;                       // Reads next line, ? propagates errors
            let trimmed = current_line.trim();
            let line_number = line_index + 1;               // For error messages

            let mut tokens = trimmed.split_whitespace();
            match tokens.next() {
                Some("v") => {
                    let xyz = Self::parse_triple(&mut tokens, line_number, "vertex")?;
                    vertices_zyx.push(reverse(xyz));
                }
                Some("vn") => {
                    let xyz = Self::parse_triple(&mut tokens, line_number, "normal")?;
                    normals_zyx.push(reverse(xyz));
                }
                Some("f") => {
                    let corners = tokens
                        .map(|token| Self::parse_face_index(token, vertices_zyx.len(), line_number))
                        .collect::<Result<Vec<u32>, ParseError>>()?;
                    if corners.len() < 3 {
                        return Err(ParseError::FormatError(format!(
                            "line {}: face has {} vertices, need at least 3",
                            line_number,
                            corners.len()
                        )));
                    }
                    // Fan triangulation around the first corner
                    for k in 1..corners.len() - 1 {
                        faces.push([corners[0], corners[k], corners[k + 1]]);
                    }
                }
                // Comments, groups, smoothing, texture coordinates, materials, blank lines
                _ => {}
            }
        }

        // Faces may only refer to vertices that exist
        let vertex_count = vertices_zyx.len();
        if let Some(bad) = faces.iter().flatten().find(|&&v| v as usize >= vertex_count) {
            return Err(ParseError::FormatError(format!(
                "face refers to vertex {} but only {} vertices were read",
                bad + 1,
                vertex_count
            )));
        }

        if !normals_zyx.is_empty() && normals_zyx.len() != vertex_count {
            warn!(
                "OBJ has {} normals for {} vertices; discarding normals",
                normals_zyx.len(),
                vertex_count
            );
            normals_zyx.clear();
        }

        let bounding_box = BoundingBox::enclosing(&vertices_zyx);
        Ok(Mesh::from_parts_unchecked(vertices_zyx, faces, normals_zyx, bounding_box))
    }

    /// Read three floats (x y z) from the rest of a record; extra values (e.g. w) are ignored.
    fn parse_triple<'a>(
        tokens: &mut impl Iterator<Item = &'a str>,
        line_number: usize,
        what: &str,
    ) -> Result<[f32; 3], ParseError> {
        let mut xyz = [0.0f32; 3];
        for c in xyz.iter_mut() {
            let token = tokens.next().ok_or_else(|| {
                ParseError::FormatError(format!("line {}: {} needs 3 coordinates", line_number, what))
            })?;
            *c = token.parse::<f32>()?;                 // ? converts ParseFloatError
        }
        Ok(xyz)
    }

    /// Resolve one face token (`i`, `i/j`, `i//k`, `i/j/k`) to a 0-based vertex index.
    fn parse_face_index(token: &str, vertices_so_far: usize, line_number: usize) -> Result<u32, ParseError> {
        let vertex_part = token.split('/').next().unwrap_or(token);
        let index: i64 = vertex_part.parse()?;          // ? converts ParseIntError

        let resolved = match index {
            0 => {
                return Err(ParseError::FormatError(format!(
                    "line {}: face index 0 is invalid (OBJ indices start at 1)",
                    line_number
                )))
            }
            i if i > 0 => i - 1,                        // 1-based absolute
            i => vertices_so_far as i64 + i,            // Relative to the end of the list so far
        };
        if resolved < 0 {
            return Err(ParseError::FormatError(format!(
                "line {}: relative face index {} reaches before the first vertex",
                line_number, index
            )));
        }
        Ok(u32::try_from(resolved)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positions_normals_and_faces() {
        let obj = b"# OBJ file\n\
                    o thing\n\
                    v 1.0 2.0 3.0\n\
                    v 4.0 5.0 6.0\n\
                    v 7.0 8.0 9.0\n\
                    vn 0 0 1\nvn 0 0 1\nvn 0 0 1\n\
                    s off\n\
                    f 1//1 2//2 3//3\n";
        let mesh = ObjParser::parse_bytes(obj).unwrap();
        assert_eq!(mesh.vertices_zyx()[0], [3.0, 2.0, 1.0]);
        assert_eq!(mesh.normals_zyx()[2], [1.0, 0.0, 0.0]);
        assert_eq!(mesh.faces(), &[[0, 1, 2]]);
        assert_eq!(mesh.bounding_box(), BoundingBox::new([3, 2, 1], [9, 8, 7]));
    }

    #[test]
    fn test_polygons_are_fan_triangulated_and_relative_indices_resolve() {
        let obj = b"v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf -4/1 -3/2 -2/3 -1/4\n";
        let mesh = ObjParser::parse_bytes(obj).unwrap();
        assert_eq!(mesh.faces(), &[[0, 1, 2], [0, 2, 3]]);
        assert!(!mesh.has_normals());
    }

    #[test]
    fn test_mismatched_normals_are_dropped() {
        let obj = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1 2 3\n";
        let mesh = ObjParser::parse_bytes(obj).unwrap();
        assert!(!mesh.has_normals());
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_bad_records_are_errors() {
        assert!(matches!(
            ObjParser::parse_bytes(b"v 0 0\n"),
            Err(ParseError::FormatError(_))
        ));
        assert!(matches!(
            ObjParser::parse_bytes(b"v 0 0 zero\n"),
            Err(ParseError::NumberParseError(_))
        ));
        assert!(matches!(
            ObjParser::parse_bytes(b"v 0 0 0\nv 1 0 0\nf 1 2 3\n"),
            Err(ParseError::FormatError(_))
        ));
        assert!(matches!(
            ObjParser::parse_bytes(b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 0 1 2\n"),
            Err(ParseError::FormatError(_))
        ));
        assert!(matches!(
            ObjParser::parse_bytes(b"v 0 0 0\nf 1 -2 1\n"),
            Err(ParseError::FormatError(_))
        ));
    }
}
