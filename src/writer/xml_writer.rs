use std::io::Write;

use vtkio::model::*; // import model definition of a VTK file

use crate::error::WriterError;
use crate::structs_and_impls::Mesh;

pub struct VTUWriter;  // Writes a surface mesh as a VTK XML unstructured grid of triangles

impl VTUWriter {
    pub fn write_vtu<W: Write>(mesh: &Mesh, writer: W) -> Result<(), WriterError> {
        // 1. Prepare points data (VTK wants XYZ)
        let points_data: Vec<f32> = mesh.vertices_xyz().into_iter().flatten().collect();

        // 2. Connectivity and offsets: every cell is a triangle
        let connectivity: Vec<u64> = mesh.faces().iter().flatten().map(|&v| v as u64).collect();
        let offsets: Vec<u64> = (1..=mesh.face_count() as u64).map(|i| i * 3).collect();
        let cell_types = vec![CellType::Triangle; mesh.face_count()];

        // 3. Normals become a point attribute when present
        let mut point_attributes = Vec::new();
        if mesh.has_normals() {
            let normals: Vec<f32> = mesh.normals_xyz().into_iter().flatten().collect();
            point_attributes.push(Attribute::vectors("Normals").with_data(IOBuffer::F32(normals)));
        }

        Vtk {
            version: Version::new_xml(2, 2),
            title: String::new(),
            byte_order: ByteOrder::LittleEndian,
            file_path: None,
            data: DataSet::inline(UnstructuredGridPiece {
                points: IOBuffer::F32(points_data),
                cells: Cells {
                    cell_verts: VertexNumbers::XML {
                        connectivity,
                        offsets,
                    },
                    types: cell_types,
                },
                data: Attributes {
                    point: point_attributes,
                    ..Default::default()
                },
            }),
        }
        .write_xml(writer)?;

        Ok(())
    }
}
