//! Definition links, ownership on failure, and transform composition.

use skp_core::convert::{ReadError, SceneGraphReader, SceneGraphWriter, WriteError};
use skp_core::kernel::{Kernel, LoopInput, Owned, RefType};
use skp_core::{
    ComponentDefinition, Document, Face, Group, Guid, Instance, LengthUnit, MemoryKernel,
    ReadOptions, Transform, WriteOptions,
};
use skp_math::DVec3;

fn square(size: f64) -> Vec<DVec3> {
    vec![
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(size, 0.0, 0.0),
        DVec3::new(size, size, 0.0),
        DVec3::new(0.0, size, 0.0),
    ]
}

#[test]
fn test_unlisted_definition_is_dangling_on_read() {
    let kernel = MemoryKernel::new();
    let model = Owned::new(&kernel, kernel.model_create().unwrap());
    let entities = kernel.model_entities(model.get()).unwrap();

    // the definition is never added to the model
    let orphan = kernel.definition_create().unwrap();
    kernel.definition_set_guid(orphan, "orphan").unwrap();
    let instance = kernel.definition_create_instance(orphan).unwrap();
    kernel.instance_set_guid(instance, "placed").unwrap();
    kernel.entities_add_instance(entities, instance).unwrap();

    let err = SceneGraphReader::new(&kernel, &ReadOptions::default())
        .read(model.get())
        .unwrap_err();
    assert_eq!(
        err,
        ReadError::DanglingReference {
            instance: Guid::new("placed"),
            definition: Guid::new("orphan"),
        }
    );
}

#[test]
fn test_forward_reference_resolves() {
    let kernel = MemoryKernel::new();
    let model = Owned::new(&kernel, kernel.model_create().unwrap());

    let a = kernel.definition_create().unwrap();
    let b = kernel.definition_create().unwrap();
    kernel.definition_set_guid(a, "def-a").unwrap();
    kernel.definition_set_guid(b, "def-b").unwrap();

    // A places B, and A is listed first
    let inner = kernel.definition_create_instance(b).unwrap();
    kernel.instance_set_guid(inner, "a-places-b").unwrap();
    kernel
        .entities_add_instance(kernel.definition_entities(a).unwrap(), inner)
        .unwrap();
    kernel.model_add_definitions(model.get(), &[a, b]).unwrap();

    let document = SceneGraphReader::new(&kernel, &ReadOptions::default())
        .read(model.get())
        .unwrap();

    let def_a = &document.definitions[&Guid::new("def-a")];
    let def_b = &document.definitions[&Guid::new("def-b")];
    assert_eq!(def_a.entities.instances[0].definition, Guid::new("def-b"));
    assert_eq!(def_b.instances, vec![Guid::new("a-places-b")]);
    assert!(def_a.instances.is_empty());
}

#[test]
fn test_dangling_reference_on_write_leaves_nothing_alive() {
    let kernel = MemoryKernel::new();
    let mut document = Document::new("broken");
    let mut def = ComponentDefinition::new("box", "def-box");
    def.entities.faces.push(Face::from_points(&square(1.0)));
    document.add_definition(def);
    document.entities.faces.push(Face::from_points(&square(2.0)));
    document
        .entities
        .instances
        .push(Instance::new("stray", "def-missing", Transform::IDENTITY));

    let err = SceneGraphWriter::new(&kernel, &WriteOptions::default())
        .write(&document)
        .unwrap_err();
    assert_eq!(
        err,
        WriteError::DanglingReference {
            instance: Guid::new("stray"),
            definition: Guid::new("def-missing"),
        }
    );
    assert_eq!(kernel.live_count(), 0);
}

#[test]
fn test_loop_input_ownership() {
    let kernel = MemoryKernel::new();

    // consumed on success
    let face = LoopInput::sequential(&kernel, 4)
        .unwrap()
        .create_face(&square(10.0))
        .unwrap();
    assert_eq!(kernel.live_count_of(RefType::LoopInput), 0);

    // released by the guard on failure
    let collinear = [DVec3::ZERO, DVec3::X, DVec3::X * 2.0];
    assert!(LoopInput::sequential(&kernel, 3)
        .unwrap()
        .create_face(&collinear)
        .is_err());
    assert_eq!(kernel.live_count_of(RefType::LoopInput), 0);

    drop(face);
    assert_eq!(kernel.live_count(), 0);
}

#[test]
fn test_group_and_instance_transforms_compose() {
    let kernel = MemoryKernel::new();
    let options = WriteOptions::default().with_units(LengthUnit::Inches);

    let mut document = Document::new("nested");
    let mut def = ComponentDefinition::new("tile", "def-tile");
    def.entities.faces.push(Face::from_points(&square(1.0)));
    document.add_definition(def);

    let instance_transform = Transform::compose(
        &Transform::from_translation(DVec3::new(5.0, 0.0, 0.0)),
        &Transform::from_uniform_scale(2.0),
    );
    let group_transform = Transform::from_translation(DVec3::new(0.0, 0.0, 3.0));
    let mut group = Group {
        name: "holder".into(),
        guid: Guid::new("group-1"),
        transform: group_transform,
        ..Default::default()
    };
    group.entities.instances.push(Instance::new(
        "inst-1",
        "def-tile",
        instance_transform,
    ));
    document.entities.groups.push(group);

    let model = SceneGraphWriter::new(&kernel, &options)
        .write(&document)
        .unwrap();
    let read = SceneGraphReader::new(&kernel, &ReadOptions::default().with_units(LengthUnit::Inches))
        .read(model)
        .unwrap();
    kernel.model_release(model).unwrap();

    let faces = read.world_faces();
    assert_eq!(faces.len(), 1);
    let world = Transform::compose(&group_transform, &instance_transform);
    for (placed, local) in faces[0].vertices.iter().zip(square(1.0)) {
        let expected = world.apply(local);
        assert!((*placed - expected).length() < 1e-9, "{placed} != {expected}");
    }
    assert!((faces[0].vertices[2] - DVec3::new(7.0, 2.0, 3.0)).length() < 1e-9);
}
