use std::io::Write;

use crate::error::WriterError;
use crate::structs_and_impls::Mesh;

pub struct ObjWriter;  // Wavefront OBJ text output

impl ObjWriter {
    pub fn write<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<(), WriterError> {
        Self::write_parts(mesh.vertices_zyx(), mesh.faces(), mesh.normals_zyx(), writer)
    }

    /// Write raw ZYX buffers as OBJ (XYZ, 1-based faces). `normals_zyx` may be empty.
    pub fn write_parts<W: Write>(
        vertices_zyx: &[[f32; 3]],
        faces: &[[u32; 3]],
        normals_zyx: &[[f32; 3]],
        writer: &mut W,
    ) -> Result<(), WriterError> {
        if !normals_zyx.is_empty() && normals_zyx.len() != vertices_zyx.len() {
            return Err(WriterError::InvalidData(format!(
                "{} normals for {} vertices",
                normals_zyx.len(),
                vertices_zyx.len()
            )));
        }

        writeln!(writer, "# OBJ file")?;
        for [z, y, x] in vertices_zyx {
            writeln!(writer, "v {:.7} {:.7} {:.7}", x, y, z)?;
        }
        for [z, y, x] in normals_zyx {
            writeln!(writer, "vn {:.7} {:.7} {:.7}", x, y, z)?;
        }

        if normals_zyx.is_empty() {
            for [a, b, c] in faces {
                writeln!(writer, "f {} {} {}", a + 1, b + 1, c + 1)?;
            }
        } else {
            for [a, b, c] in faces {
                let (a, b, c) = (a + 1, b + 1, c + 1);
                writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}")?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
