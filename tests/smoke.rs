use vol2mesh::{BoundingBox, Mesh, MeshFormat};

#[test]
fn test_library_links() {
    let mesh = Mesh::new(
        vec![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        vec![[0, 1, 2]],
        Vec::new(),
        None,
    )
    .unwrap();
    assert_eq!(mesh.face_count(), 1);
    assert_eq!(mesh.bounding_box(), BoundingBox::new([0, 0, 0], [0, 1, 1]));
    assert!(!mesh.serialize(MeshFormat::Obj).unwrap().is_empty());
}

#[test]
fn test_tempdir_is_writable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.ngmesh");
    Mesh::empty().write_file(&path).unwrap();
    assert!(Mesh::from_file(&path).unwrap().is_empty());
}
