//! Mesh serialisation.

pub mod ngmesh_writer;
pub mod obj_writer;
pub mod xml_writer;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::MeshError;
use crate::structs_and_impls::{Mesh, MeshFormat};

pub use ngmesh_writer::NgmeshWriter;
pub use obj_writer::ObjWriter;
pub use xml_writer::VTUWriter;

impl Mesh {
    /// Serialise to an in-memory buffer.
    ///
    /// An empty mesh is an empty buffer regardless of format.
    pub fn serialize(&self, format: MeshFormat) -> Result<Vec<u8>, MeshError> {
        let mut buf = Vec::new();
        self.write_to(format, &mut buf)?;
        Ok(buf)
    }

    /// Write to a file, choosing the format from its extension.
    ///
    /// The mesh goes to a temporary file next to `path` that is renamed into
    /// place once complete, so `path` never holds a partial mesh.
    pub fn write_file(&self, path: &Path) -> Result<(), MeshError> {
        let format = MeshFormat::from_path(path)?;
        write_atomically(path, |writer| self.write_to(format, writer))?;
        debug!(
            "wrote {} vertices and {} faces to {}",
            self.vertex_count(),
            self.face_count(),
            path.display()
        );
        Ok(())
    }

    fn write_to<W: Write>(&self, format: MeshFormat, writer: &mut W) -> Result<(), MeshError> {
        if self.is_empty() {
            return Ok(());
        }
        match format {
            MeshFormat::Obj => ObjWriter::write(self, writer)?,
            MeshFormat::Ngmesh => NgmeshWriter::write(self, writer)?,
            MeshFormat::Vtu => VTUWriter::write_vtu(self, writer)?,
        }
        Ok(())
    }
}

fn write_atomically<F>(path: &Path, fill: F) -> Result<(), MeshError>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<(), MeshError>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staged = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(staged.as_file());
        fill(&mut writer)?;
        writer.flush()?;
    }
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn quad() -> Mesh {
        Mesh::new(
            vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]],
            vec![[0, 1, 2], [0, 2, 3]],
            Vec::new(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_mesh_serializes_to_nothing() {
        for format in [MeshFormat::Obj, MeshFormat::Ngmesh, MeshFormat::Vtu] {
            assert!(Mesh::empty().serialize(format).unwrap().is_empty());
        }
    }

    #[test]
    fn test_file_round_trip_through_each_readable_format() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = quad();
        for name in ["quad.obj", "quad.ngmesh"] {
            let path = dir.path().join(name);
            mesh.write_file(&path).unwrap();
            let read = Mesh::from_file(&path).unwrap();
            assert_eq!(read.faces(), mesh.faces());
            assert_eq!(read.vertices_zyx(), mesh.vertices_zyx());
        }

        let vtu = dir.path().join("quad.vtu");
        mesh.write_file(&vtu).unwrap();
        assert!(fs::metadata(&vtu).unwrap().len() > 0);
    }

    #[test]
    fn test_unknown_extension_is_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.drc");
        assert!(matches!(quad().write_file(&path), Err(MeshError::UnsupportedFormat(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_write_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        let result = write_atomically(&path, |writer| {
            writer.write_all(b"# OBJ file\nv 0 0")?;
            Err(MeshError::UnsupportedFormat("interrupted".to_string()))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_rewrite_replaces_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        fs::write(&path, "stale contents that are longer than nothing").unwrap();
        Mesh::empty().write_file(&path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);

        quad().write_file(&path).unwrap();
        assert_eq!(Mesh::from_file(&path).unwrap().face_count(), 2);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
