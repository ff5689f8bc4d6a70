//! Native model → [`Document`].
//!
//! Reading runs in two passes. The bulk pass converts materials, layers,
//! scenes, every component definition and the root entities, leaving
//! instance links as bare GUIDs. The link pass then resolves every instance
//! against the definition registry, so an instance may refer to a
//! definition that was listed after the one containing it.

use skp_math::Transform;
use thiserror::Error;

use crate::document::{
    AttributeDictionary, ComponentDefinition, Document, Entities, Group, Guid, Instance, Layer,
    Scene,
};
use crate::kernel::{
    kind::IsEntity, Bridge, BridgeError, ComponentDefinitionRef, ComponentInstanceRef,
    EntitiesRef, GroupRef, Kernel, ModelRef, Query, Ref, SceneRef,
};

use super::geometry::GeometryReader;
use super::materials::MaterialRegistry;
use super::options::ReadOptions;

/// Errors that abort a read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    #[error("Instance {instance} refers to unknown definition {definition}")]
    DanglingReference { instance: Guid, definition: Guid },

    #[error("Kernel error: {0}")]
    Bridge(#[from] BridgeError),
}

pub type ReadResult<T> = Result<T, ReadError>;

/// Builds a [`Document`] from a native model.
pub struct SceneGraphReader<'k, K: Kernel + ?Sized> {
    bridge: Bridge<'k, K>,
    geometry: GeometryReader<'k, K>,
    materials: MaterialRegistry,
}

impl<'k, K: Kernel + ?Sized> SceneGraphReader<'k, K> {
    pub fn new(kernel: &'k K, options: &ReadOptions) -> Self {
        let bridge = Bridge::new(kernel);
        Self {
            bridge,
            geometry: GeometryReader::new(bridge, options.converter(), options.include_meshes),
            materials: MaterialRegistry::new(),
        }
    }

    /// Convert the whole model. The model itself is left untouched.
    pub fn read(mut self, model: ModelRef) -> ReadResult<Document> {
        let bridge = self.bridge;
        bridge.require(model)?;

        let mut document = Document::new(bridge.model_name(model)?);

        // bulk pass
        for material in bridge.list(Query::materials(model))? {
            self.materials.resolve(bridge, material)?;
        }

        for layer in bridge.list(Query::layers(model))? {
            document.layers.push(Layer {
                name: bridge.layer_name(layer)?,
                visible: bridge.layer_visible(layer)?,
            });
        }

        for scene in bridge.list(Query::scenes(model))? {
            document.scenes.push(self.read_scene(scene)?);
        }

        for definition in bridge.list(Query::definitions(model))? {
            let guid = Guid::new(bridge.definition_guid(definition)?);
            if document.definitions.contains_key(&guid) {
                log::debug!("Definition {} already read, skipping", guid);
                continue;
            }
            let converted = self.read_definition(definition, guid)?;
            log::debug!(
                "Definition '{}': {} faces, {} instances",
                converted.name,
                converted.entities.face_count(),
                converted.entities.instances.len()
            );
            document.add_definition(converted);
        }

        document.entities = self.read_entities(bridge.model_entities(model)?)?;

        // link pass
        document
            .link_instances()
            .map_err(|link| ReadError::DanglingReference {
                instance: link.instance,
                definition: link.definition,
            })?;

        document.materials = self.materials.into_table();

        log::info!(
            "Read '{}': {} definitions, {} instances, {} materials, {} layers",
            document.name,
            document.definitions.len(),
            document.instance_count(),
            document.materials.len(),
            document.layers.len()
        );

        Ok(document)
    }

    fn read_definition(
        &mut self,
        definition: ComponentDefinitionRef,
        guid: Guid,
    ) -> ReadResult<ComponentDefinition> {
        let bridge = self.bridge;
        Ok(ComponentDefinition {
            name: bridge.definition_name(definition)?,
            guid,
            description: bridge.definition_description(definition)?,
            entities: self.read_entities(bridge.definition_entities(definition)?)?,
            attributes: self.read_attributes(definition)?,
            instances: Vec::new(),
        })
    }

    /// Read a container. Instances keep their definition GUID unresolved.
    fn read_entities(&mut self, entities: EntitiesRef) -> ReadResult<Entities> {
        let bridge = self.bridge;
        let mut out = Entities::default();

        for face in bridge.list(Query::faces(entities))? {
            out.faces.push(self.geometry.read_face(face, &mut self.materials)?);
        }

        for edge in bridge.list(Query::edges(entities))? {
            // curve members come in through their curve
            if bridge.is_valid(bridge.edge_curve(edge)?) {
                continue;
            }
            out.edges.push(self.geometry.read_edge(edge)?);
        }

        for curve in bridge.list(Query::curves(entities))? {
            out.curves.push(self.geometry.read_curve(curve)?);
        }

        for group in bridge.list(Query::groups(entities))? {
            out.groups.push(self.read_group(group)?);
        }

        for instance in bridge.list(Query::instances(entities))? {
            out.instances.push(self.read_instance(instance)?);
        }

        Ok(out)
    }

    fn read_group(&mut self, group: GroupRef) -> ReadResult<Group> {
        let bridge = self.bridge;
        let units = self.geometry.units();
        let element = group.to_drawing_element();

        Ok(Group {
            name: bridge.group_name(group)?,
            guid: Guid::new(bridge.group_guid(group)?),
            transform: Transform::from_native(&bridge.group_transform(group)?, &units),
            entities: self.read_entities(bridge.group_entities(group)?)?,
            material: self
                .materials
                .resolve(bridge, bridge.element_material(element)?)?,
            layer: self.geometry.layer_name(element)?,
            attributes: self.read_attributes(group)?,
        })
    }

    fn read_instance(&mut self, instance: ComponentInstanceRef) -> ReadResult<Instance> {
        let bridge = self.bridge;
        let units = self.geometry.units();
        let element = instance.to_drawing_element();

        let definition = bridge.instance_definition(instance)?;
        let definition = if bridge.is_valid(definition) {
            Guid::new(bridge.definition_guid(definition)?)
        } else {
            Guid::default()
        };

        Ok(Instance {
            name: bridge.instance_name(instance)?,
            guid: Guid::new(bridge.instance_guid(instance)?),
            definition,
            transform: Transform::from_native(&bridge.instance_transform(instance)?, &units),
            material: self
                .materials
                .resolve(bridge, bridge.element_material(element)?)?,
            layer: self.geometry.layer_name(element)?,
            attributes: self.read_attributes(instance)?,
        })
    }

    fn read_scene(&self, scene: SceneRef) -> ReadResult<Scene> {
        let bridge = self.bridge;
        let hidden = bridge
            .list(Query::hidden_entities(scene))?
            .into_iter()
            .map(|entity| bridge.entity_persistent_id(entity))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Scene {
            name: bridge.scene_name(scene)?,
            hidden,
        })
    }

    fn read_attributes<E: IsEntity>(&self, entity: Ref<E>) -> ReadResult<Vec<AttributeDictionary>> {
        let bridge = self.bridge;
        let mut dictionaries = Vec::new();

        for dict in bridge.list(Query::attribute_dictionaries(entity))? {
            let keys = bridge.sequence(
                |k| k.dictionary_key_count(dict),
                |k, out| k.dictionary_keys(dict, out),
            )?;
            let mut entries = Vec::with_capacity(keys.len());
            for key in keys {
                let value = bridge.dictionary_value(dict, &key)?;
                entries.push((key, value));
            }
            dictionaries.push(AttributeDictionary {
                name: bridge.dictionary_name(dict)?,
                entries,
            });
        }

        Ok(dictionaries)
    }
}
