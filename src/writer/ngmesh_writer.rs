use std::io::Write;

use crate::error::WriterError;
use crate::structs_and_impls::Mesh;

/// Legacy neuroglancer mesh output. Normals are not part of the format.
pub struct NgmeshWriter;

impl NgmeshWriter {
    pub fn write<W: Write>(mesh: &Mesh, writer: &mut W) -> Result<(), WriterError> {
        let vertex_count = u32::try_from(mesh.vertex_count())
            .map_err(|_| WriterError::InvalidData(format!("{} vertices do not fit in ngmesh", mesh.vertex_count())))?;

        writer.write_all(&vertex_count.to_le_bytes())?;
        for v in mesh.vertices_xyz() {
            for c in v {
                writer.write_all(&c.to_le_bytes())?;
            }
        }
        for face in mesh.faces() {
            for i in face {
                writer.write_all(&i.to_le_bytes())?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}
