//! Readers for mesh files, mesh collections and TIFF label stacks.

pub mod ngmesh;
pub mod obj;
pub mod tiff_stack;

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::concatenation::concatenate_meshes;
use crate::error::{MeshError, ParseError};
use crate::structs_and_impls::{Mesh, MeshFormat};

pub use ngmesh::NgmeshParser;
pub use obj::ObjParser;
pub use tiff_stack::{LabelStack, TiffStackParser};

impl Mesh {
    /// Read a mesh from an in-memory buffer in the given format.
    ///
    /// An empty buffer is an empty mesh, whatever the format.
    pub fn from_buffer(bytes: &[u8], format: MeshFormat) -> Result<Mesh, MeshError> {
        if bytes.is_empty() {
            return Ok(Mesh::empty());
        }
        match format {
            MeshFormat::Obj => Ok(ObjParser::parse_bytes(bytes)?),
            MeshFormat::Ngmesh => Ok(NgmeshParser::parse(bytes)?),
            MeshFormat::Vtu => Err(MeshError::UnsupportedFormat("vtu files can be written but not read".to_string())),
        }
    }

    /// Read a mesh file, choosing the format from its extension.
    ///
    /// By convention a 0-byte file is an empty mesh.
    pub fn from_file(path: &Path) -> Result<Mesh, MeshError> {
        let format = MeshFormat::from_path(path)?;
        if fs::metadata(path)?.len() == 0 {
            debug!("{} is empty", path.display());
            return Ok(Mesh::empty());
        }
        match format {
            MeshFormat::Obj => Ok(ObjParser::parse_file(path)?),
            MeshFormat::Ngmesh => Ok(NgmeshParser::parse_file(path)?),
            MeshFormat::Vtu => Err(MeshError::UnsupportedFormat("vtu files can be written but not read".to_string())),
        }
    }

    /// Read every `.obj` and `.ngmesh` file in a directory (not recursive) and
    /// concatenate them, in sorted path order.
    pub fn from_directory(path: &Path) -> Result<Mesh, MeshError> {
        let escaped = glob::Pattern::escape(&path.to_string_lossy());
        let mut mesh_paths: Vec<PathBuf> = Vec::new();
        for ext in ["obj", "ngmesh"] {
            let pattern = format!("{}/*.{}", escaped, ext);
            let entries =
                glob::glob(&pattern).map_err(|e| ParseError::FormatError(format!("bad pattern {}: {}", pattern, e)))?;
            for entry in entries {
                mesh_paths.push(entry.map_err(|e| ParseError::IoError(e.into_error()))?);
            }
        }
        mesh_paths.sort();
        debug!("reading {} mesh files from {}", mesh_paths.len(), path.display());

        let meshes = mesh_paths
            .par_iter()
            .map(|p| Mesh::from_file(p))
            .collect::<Result<Vec<Mesh>, MeshError>>()?;
        concatenate_meshes(meshes)
    }

    /// Read every mesh member of a `.tar` file and concatenate them.
    ///
    /// Members are sorted by name first, so the archive's storage order does not
    /// affect vertex order. Non-mesh and empty members are skipped.
    pub fn from_tarfile(path: &Path) -> Result<Mesh, MeshError> {
        let tar_file = File::open(path)?;
        Self::from_tar_reader(tar_file)
    }

    pub fn from_tar_bytes(bytes: &[u8]) -> Result<Mesh, MeshError> {
        Self::from_tar_reader(bytes)
    }

    fn from_tar_reader<R: Read>(reader: R) -> Result<Mesh, MeshError> {
        let mut archive = tar::Archive::new(reader);
        let mut members: Vec<(PathBuf, MeshFormat, Vec<u8>)> = Vec::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.into_owned();
            let Ok(format) = MeshFormat::from_path(&name) else {
                continue;
            };
            if !format.is_readable() || entry.size() == 0 {
                continue;
            }
            if name.components().count() > 1 {
                warn!("tar member {} is not at the top level", name.display());
            }
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            members.push((name, format, buf));
        }

        members.sort_by(|a, b| a.0.cmp(&b.0));
        debug!("reading {} mesh members from tar", members.len());

        let meshes = members
            .par_iter()
            .map(|(_, format, buf)| Mesh::from_buffer(buf, *format))
            .collect::<Result<Vec<Mesh>, MeshError>>()?;
        concatenate_meshes(meshes)
    }
}
