//! The portable document tree.
//!
//! A [`Document`] owns its top-level [`Entities`], a registry of
//! [`ComponentDefinition`]s keyed by [`Guid`], a [`MaterialTable`], layers
//! and scenes. Groups own their entities directly. Instances refer to their
//! definition by GUID and never own it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use skp_math::{Aabb, Transform};

use crate::geometry::{Curve, Edge, Face};
use crate::material::{MaterialId, MaterialTable};

/// Kernel-assigned identity of a definition, instance or group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Guid {
    fn from(value: &str) -> Self {
        Guid::new(value)
    }
}

/// Value stored under an attribute key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

/// Named key/value store attached to an entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDictionary {
    pub name: String,
    /// Entries in kernel order
    pub entries: Vec<(String, AttributeValue)>,
}

impl AttributeDictionary {
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Contents of a container: the root, a group, or a definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub faces: Vec<Face>,
    /// Standalone edges (edges bound to faces live in their loops)
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub curves: Vec<Curve>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
            && self.edges.is_empty()
            && self.curves.is_empty()
            && self.groups.is_empty()
            && self.instances.is_empty()
    }

    /// Faces here and in nested groups (instances not expanded).
    pub fn face_count(&self) -> usize {
        self.faces.len() + self.groups.iter().map(|g| g.entities.face_count()).sum::<usize>()
    }

    /// Visit every instance here and in nested groups.
    fn visit_instances<'a>(&'a self, out: &mut Vec<&'a Instance>) {
        out.extend(self.instances.iter());
        for group in &self.groups {
            group.entities.visit_instances(out);
        }
    }
}

/// Shared geometry placed by instances.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    pub name: String,
    pub guid: Guid,
    #[serde(default)]
    pub description: String,
    pub entities: Entities,
    #[serde(default)]
    pub attributes: Vec<AttributeDictionary>,
    /// GUIDs of the instances placing this definition (non-owning)
    #[serde(default)]
    pub instances: Vec<Guid>,
}

impl ComponentDefinition {
    pub fn new(name: impl Into<String>, guid: impl Into<Guid>) -> Self {
        Self {
            name: name.into(),
            guid: guid.into(),
            ..Default::default()
        }
    }
}

/// Placement of a definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub guid: Guid,
    /// Key into [`Document::definitions`]
    pub definition: Guid,
    /// Local-to-parent transform
    pub transform: Transform,
    #[serde(default)]
    pub material: MaterialId,
    #[serde(default)]
    pub layer: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDictionary>,
}

impl Instance {
    pub fn new(guid: impl Into<Guid>, definition: impl Into<Guid>, transform: Transform) -> Self {
        Self {
            guid: guid.into(),
            definition: definition.into(),
            transform,
            ..Default::default()
        }
    }
}

/// Anonymous container that owns its geometry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub guid: Guid,
    pub transform: Transform,
    pub entities: Entities,
    #[serde(default)]
    pub material: MaterialId,
    #[serde(default)]
    pub layer: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDictionary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
        }
    }
}

/// Saved view state: a name and the entities it hides.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub name: String,
    /// Persistent ids of hidden entities
    pub hidden: Vec<i64>,
}

/// An instance whose definition is not in the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DanglingLink {
    pub instance: Guid,
    pub definition: Guid,
}

/// Root of the document tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub entities: Entities,
    pub definitions: BTreeMap<Guid, ComponentDefinition>,
    pub materials: MaterialTable,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl Document {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Register a definition under its GUID, replacing any previous one.
    pub fn add_definition(&mut self, definition: ComponentDefinition) -> Guid {
        let guid = definition.guid.clone();
        self.definitions.insert(guid.clone(), definition);
        guid
    }

    pub fn definition_for(&self, instance: &Instance) -> Option<&ComponentDefinition> {
        self.definitions.get(&instance.definition)
    }

    /// Every instance in the tree: root, groups, and definition contents.
    pub fn instances(&self) -> Vec<&Instance> {
        let mut out = Vec::new();
        self.entities.visit_instances(&mut out);
        for definition in self.definitions.values() {
            definition.entities.visit_instances(&mut out);
        }
        out
    }

    pub fn instance_count(&self) -> usize {
        self.instances().len()
    }

    /// Rebuild every definition's back-reference list from the tree.
    ///
    /// Fails on the first instance whose definition is missing; the
    /// back-references are left cleared in that case.
    pub fn link_instances(&mut self) -> Result<(), DanglingLink> {
        let links: Vec<(Guid, Guid)> = self
            .instances()
            .into_iter()
            .map(|i| (i.guid.clone(), i.definition.clone()))
            .collect();

        for definition in self.definitions.values_mut() {
            definition.instances.clear();
        }

        for (instance, definition) in links {
            match self.definitions.get_mut(&definition) {
                Some(def) => def.instances.push(instance),
                None => {
                    for def in self.definitions.values_mut() {
                        def.instances.clear();
                    }
                    return Err(DanglingLink {
                        instance,
                        definition,
                    });
                }
            }
        }
        Ok(())
    }

    /// All faces placed in world space.
    ///
    /// Transforms compose from the root down through groups and instances.
    /// Instances of missing definitions, and recursive placements, are
    /// skipped.
    pub fn world_faces(&self) -> Vec<Face> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        self.collect_faces(&self.entities, &Transform::IDENTITY, &mut stack, &mut out);
        out
    }

    fn collect_faces<'a>(
        &'a self,
        entities: &'a Entities,
        parent: &Transform,
        stack: &mut Vec<&'a Guid>,
        out: &mut Vec<Face>,
    ) {
        out.extend(entities.faces.iter().map(|f| f.transformed(parent)));

        for group in &entities.groups {
            let world = Transform::compose(parent, &group.transform);
            self.collect_faces(&group.entities, &world, stack, out);
        }

        for instance in &entities.instances {
            let Some(definition) = self.definition_for(instance) else {
                log::warn!(
                    "Instance {} refers to missing definition {}",
                    instance.guid,
                    instance.definition
                );
                continue;
            };
            if stack.contains(&&definition.guid) {
                log::warn!("Definition {} places itself, skipping", definition.guid);
                continue;
            }
            let world = Transform::compose(parent, &instance.transform);
            stack.push(&definition.guid);
            self.collect_faces(&definition.entities, &world, stack, out);
            stack.pop();
        }
    }

    /// Bounding box of every world-space face vertex.
    pub fn world_bounds(&self) -> Aabb {
        self.world_faces()
            .iter()
            .flat_map(|f| f.vertices.iter().copied())
            .fold(Aabb::EMPTY, |aabb, p| aabb.extended(p))
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Document> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Color, Material};
    use skp_math::DVec3;

    fn unit_square() -> Vec<DVec3> {
        vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ]
    }

    fn document_with_box() -> Document {
        let mut doc = Document::new("test");
        let mut def = ComponentDefinition::new("box", "def-1");
        def.entities.faces.push(Face::from_points(&unit_square()));
        doc.add_definition(def);

        doc.entities.instances.push(Instance::new(
            "inst-1",
            "def-1",
            Transform::from_translation(DVec3::new(10.0, 0.0, 0.0)),
        ));
        let mut group = Group {
            guid: Guid::new("group-1"),
            transform: Transform::from_translation(DVec3::new(0.0, 5.0, 0.0)),
            ..Default::default()
        };
        group.entities.instances.push(Instance::new(
            "inst-2",
            "def-1",
            Transform::IDENTITY,
        ));
        doc.entities.groups.push(group);
        doc
    }

    #[test]
    fn test_instances_and_links() {
        let mut doc = document_with_box();
        assert_eq!(doc.instance_count(), 2);
        doc.link_instances().unwrap();
        let def = &doc.definitions[&Guid::new("def-1")];
        assert_eq!(def.instances, vec![Guid::new("inst-1"), Guid::new("inst-2")]);
    }

    #[test]
    fn test_dangling_link() {
        let mut doc = document_with_box();
        doc.entities
            .instances
            .push(Instance::new("inst-3", "missing", Transform::IDENTITY));
        let err = doc.link_instances().unwrap_err();
        assert_eq!(err.instance, Guid::new("inst-3"));
        assert_eq!(err.definition, Guid::new("missing"));
    }

    #[test]
    fn test_world_faces_compose_through_groups() {
        let doc = document_with_box();
        let faces = doc.world_faces();
        assert_eq!(faces.len(), 2);
        assert!((faces[0].vertices[0] - DVec3::new(0.0, 5.0, 0.0)).length() < 1e-12);
        assert!((faces[1].vertices[0] - DVec3::new(10.0, 0.0, 0.0)).length() < 1e-12);

        let bounds = doc.world_bounds();
        assert_eq!(bounds.min, DVec3::new(0.0, 0.0, 0.0));
        assert_eq!(bounds.max, DVec3::new(11.0, 6.0, 0.0));
    }

    #[test]
    fn test_self_placing_definition_is_skipped() {
        let mut doc = document_with_box();
        doc.definitions
            .get_mut(&Guid::new("def-1"))
            .unwrap()
            .entities
            .instances
            .push(Instance::new("loop", "def-1", Transform::IDENTITY));
        assert_eq!(doc.world_faces().len(), 2);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut doc = document_with_box();
        let red = doc.materials.insert(Material::new("Red", Color::rgb(255, 0, 0)));
        doc.definitions
            .get_mut(&Guid::new("def-1"))
            .unwrap()
            .entities
            .faces[0]
            .front_material = red;
        doc.layers.push(Layer::new("Layer0"));

        let json = doc.to_json().unwrap();
        let back = Document::from_json(&json).unwrap();
        assert_eq!(back, doc);
    }
}
