//! Document → native → Document through the in-memory kernel.

use std::path::Path;

use skp_core::material::MaterialId;
use skp_core::{
    load_document, save_document, Color, ComponentDefinition, Document, Face, Guid, Instance,
    Layer, Material, MemoryKernel, ModelVersion, ReadOptions, Transform, WriteOptions,
};
use skp_math::DVec3;

/// Definition "Chair" (GUID g1) holding one red 1 m × 0.5 m rectangle,
/// placed twice at the root.
fn chair() -> Document {
    let mut document = Document::new("Dining");
    let red = document
        .materials
        .insert(Material::new("Red", Color::rgb(255, 0, 0)));
    document.layers.push(Layer::new("Furniture"));

    let mut g1 = ComponentDefinition::new("Chair", "g1");
    g1.entities.faces.push(
        Face::from_points(&[
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 0.5, 0.0),
            DVec3::new(0.0, 0.5, 0.0),
        ])
        .with_materials(red, MaterialId::NONE)
        .with_layer("Furniture"),
    );
    document.add_definition(g1);

    document.entities.instances.push(Instance::new(
        "guid-i1",
        "g1",
        Transform::IDENTITY,
    ));
    document.entities.instances.push(Instance::new(
        "guid-i2",
        "g1",
        Transform::from_translation(DVec3::new(2.0, 0.0, 0.0)),
    ));
    document.link_instances().unwrap();
    document
}

fn round_trip(kernel: &MemoryKernel, document: &Document) -> Document {
    save_document(
        kernel,
        document,
        "chair.skp",
        ModelVersion::default(),
        &WriteOptions::default(),
    )
    .unwrap();
    load_document(kernel, "chair.skp", &ReadOptions::default()).unwrap()
}

#[test]
fn test_chair_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let kernel = MemoryKernel::new();
    let original = chair();
    let read = round_trip(&kernel, &original);

    assert_eq!(read.name, "Dining");
    assert_eq!(read.materials.len(), 1);
    assert_eq!(read.definitions.len(), 1);
    assert_eq!(read.entities.instances.len(), 2);
    assert_eq!(kernel.saved_version(Path::new("chair.skp")), Some(ModelVersion::V2021));

    let g1 = &read.definitions[&Guid::new("g1")];
    assert_eq!(g1.name, "Chair");
    assert_eq!(g1.entities.faces.len(), 1);
    assert_eq!(
        g1.instances,
        vec![Guid::new("guid-i1"), Guid::new("guid-i2")]
    );

    let face = &g1.entities.faces[0];
    let expected = &original.definitions[&Guid::new("g1")].entities.faces[0];
    assert_eq!(face.vertices.len(), expected.vertices.len());
    for (a, b) in face.vertices.iter().zip(&expected.vertices) {
        assert!((*a - *b).length() < 1e-6, "{a} != {b}");
    }
    assert!((face.area - 0.5).abs() < 1e-6);
    assert_eq!(face.layer, "Furniture");

    let material = read.materials.resolve(face.front_material);
    assert_eq!(material.name, "Red");
    assert_eq!(material.color, Color::rgb(255, 0, 0));
    assert!(face.back_material.is_none());

    let second = read.entities.instances[1].transform.translation();
    assert!((second - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-9);

    // no native objects outlive load and save
    assert_eq!(kernel.live_count(), 0);
}

#[test]
fn test_instances_share_one_definition() {
    let kernel = MemoryKernel::new();
    let read = round_trip(&kernel, &chair());

    let first = read.definition_for(&read.entities.instances[0]).unwrap();
    let second = read.definition_for(&read.entities.instances[1]).unwrap();
    assert!(std::ptr::eq(first, second));
    assert_eq!(read.world_faces().len(), 2);
}

#[test]
fn test_extreme_coordinates_survive() {
    let kernel = MemoryKernel::new();
    let points = [
        DVec3::new(-123.456, 0.0, 0.0),
        DVec3::new(1e6, 0.0, 0.0),
        DVec3::new(0.0, 1.0, 0.0),
    ];
    let mut document = Document::new("far");
    document.entities.faces.push(Face::from_points(&points));

    let read = round_trip(&kernel, &document);
    let face = &read.entities.faces[0];
    for (a, b) in face.vertices.iter().zip(&points) {
        assert!((*a - *b).length() <= 1e-6 * b.length().max(1.0));
    }
}

#[test]
fn test_json_form_of_read_document() {
    let kernel = MemoryKernel::new();
    let read = round_trip(&kernel, &chair());
    let json = read.to_json().unwrap();
    assert_eq!(Document::from_json(&json).unwrap(), read);
}
