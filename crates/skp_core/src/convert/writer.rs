//! [`Document`] → native model.
//!
//! Definitions are created as empty shells and added to the model before any
//! entities are written, so instances can be placed regardless of the order
//! definitions are filled in. Any failure releases the partially built model.

use std::collections::HashMap;

use skp_math::{DVec3, UnitConverter};
use thiserror::Error;

use crate::document::{ComponentDefinition, Document, Entities, Group, Guid, Instance};
use crate::geometry::{Curve, Edge, Face};
use crate::kernel::{
    kind, Bridge, BridgeError, ComponentDefinitionRef, DrawingElementRef, EntitiesRef, Kernel,
    LayerRef, LoopInput, MaterialRef, ModelRef, Owned, Query,
};
use crate::material::MaterialId;

use super::materials::build_native_material;
use super::options::WriteOptions;

/// Errors that abort a write.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    #[error("Face {index} (persistent id {persistent_id}) could not be built: {reason}")]
    GeometryConstruction {
        persistent_id: i64,
        index: usize,
        reason: String,
    },

    #[error("Instance {instance} refers to unknown definition {definition}")]
    DanglingReference { instance: Guid, definition: Guid },

    #[error("Kernel error: {0}")]
    Bridge(#[from] BridgeError),
}

pub type WriteResult<T> = Result<T, WriteError>;

/// Builds a native model from a [`Document`].
pub struct SceneGraphWriter<'k, K: Kernel + ?Sized> {
    kernel: &'k K,
    options: WriteOptions,
    units: UnitConverter,
    materials: HashMap<MaterialId, MaterialRef>,
    layers: HashMap<String, LayerRef>,
    definitions: HashMap<Guid, ComponentDefinitionRef>,
}

impl<'k, K: Kernel + ?Sized> SceneGraphWriter<'k, K> {
    pub fn new(kernel: &'k K, options: &WriteOptions) -> Self {
        Self {
            kernel,
            units: options.converter(),
            options: options.clone(),
            materials: HashMap::new(),
            layers: HashMap::new(),
            definitions: HashMap::new(),
        }
    }

    /// Build the model. The caller owns the returned handle.
    pub fn write(mut self, document: &Document) -> WriteResult<ModelRef> {
        let model = self.kernel.model_create()?;
        match self.write_into(model, document) {
            Ok(()) => Ok(model),
            Err(e) => {
                if let Err(release) = self.kernel.model_release(model) {
                    log::warn!("Failed to release partially written model: {}", release);
                }
                Err(e)
            }
        }
    }

    /// Add the document's contents to an existing model.
    ///
    /// Materials and layers already in the model are reused by name and the
    /// model keeps its own name. On failure the model is left partly
    /// written; the caller discards it instead of saving.
    pub fn append(mut self, model: ModelRef, document: &Document) -> WriteResult<()> {
        self.write_contents(model, document)
    }

    fn write_into(&mut self, model: ModelRef, document: &Document) -> WriteResult<()> {
        self.kernel.model_set_name(model, &document.name)?;
        self.write_contents(model, document)
    }

    fn write_contents(&mut self, model: ModelRef, document: &Document) -> WriteResult<()> {
        let kernel = self.kernel;
        let bridge = Bridge::new(kernel);

        let mut existing = HashMap::new();
        for material in bridge.list(Query::materials(model))? {
            existing.insert(kernel.material_name(material)?, material);
        }
        for (id, material) in document.materials.iter() {
            if let Some(&native) = existing.get(&material.name) {
                self.materials.insert(id, native);
                continue;
            }
            let native = build_native_material(kernel, material, &self.options)?;
            kernel.model_add_materials(model, &[native.get()])?;
            self.materials.insert(id, native.transfer());
        }

        // reuse layers already in the model (e.g. the default layer)
        for layer in bridge.list(Query::layers(model))? {
            self.layers.insert(kernel.layer_name(layer)?, layer);
        }
        for layer in &document.layers {
            let native = self.layer(model, &layer.name)?;
            kernel.layer_set_visible(native, layer.visible)?;
        }

        // a definition the model already holds is placed, not rebuilt
        let mut placed = HashMap::new();
        for definition in bridge.list(Query::definitions(model))? {
            placed.insert(Guid::new(kernel.definition_guid(definition)?), definition);
        }
        let mut shells = Vec::with_capacity(document.definitions.len());
        for definition in document.definitions.values() {
            if let Some(&native) = placed.get(&definition.guid) {
                self.definitions.insert(definition.guid.clone(), native);
                continue;
            }
            let native = self.definition_shell(definition)?;
            kernel.model_add_definitions(model, &[native.get()])?;
            let handle = native.transfer();
            self.definitions.insert(definition.guid.clone(), handle);
            shells.push((definition, handle));
        }

        for (definition, native) in shells {
            let entities = kernel.definition_entities(native)?;
            self.write_entities(model, entities, &definition.entities)?;
        }

        self.write_entities(model, kernel.model_entities(model)?, &document.entities)?;

        log::info!(
            "Wrote '{}': {} definitions, {} materials, {} layers",
            document.name,
            self.definitions.len(),
            self.materials.len(),
            self.layers.len()
        );
        Ok(())
    }

    fn definition_shell(
        &self,
        definition: &ComponentDefinition,
    ) -> WriteResult<Owned<'k, K, kind::ComponentDefinition>> {
        let kernel = self.kernel;
        let native = Owned::new(kernel, kernel.definition_create()?);
        kernel.definition_set_name(native.get(), &definition.name)?;
        kernel.definition_set_description(native.get(), &definition.description)?;

        if !definition.guid.is_empty() {
            match kernel.definition_set_guid(native.get(), definition.guid.as_str()) {
                Ok(()) => {}
                Err(BridgeError::Unsupported(what)) => log::warn!(
                    "Definition '{}' keeps a new GUID: {} is not supported",
                    definition.name,
                    what
                ),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(native)
    }

    /// Native layer named `name`, created on first use.
    fn layer(&mut self, model: ModelRef, name: &str) -> WriteResult<LayerRef> {
        if let Some(&layer) = self.layers.get(name) {
            return Ok(layer);
        }
        let kernel = self.kernel;
        let native = Owned::new(kernel, kernel.layer_create()?);
        kernel.layer_set_name(native.get(), name)?;
        kernel.model_add_layers(model, &[native.get()])?;
        let layer = native.transfer();
        self.layers.insert(name.to_string(), layer);
        Ok(layer)
    }

    fn assign(
        &mut self,
        model: ModelRef,
        element: DrawingElementRef,
        layer: &str,
        material: MaterialId,
    ) -> WriteResult<()> {
        if !layer.is_empty() {
            let layer = self.layer(model, layer)?;
            self.kernel.element_set_layer(element, layer)?;
        }
        if let Some(&material) = self.materials.get(&material) {
            self.kernel.element_set_material(element, material)?;
        }
        Ok(())
    }

    fn write_entities(
        &mut self,
        model: ModelRef,
        target: EntitiesRef,
        entities: &Entities,
    ) -> WriteResult<()> {
        let kernel = self.kernel;

        for (index, face) in entities.faces.iter().enumerate() {
            let native = self.write_face(model, face, index)?;
            kernel.entities_add_faces(target, &[native.get()])?;
            native.transfer();
        }

        for edge in &entities.edges {
            let native = self.write_edge(model, edge)?;
            kernel.entities_add_edges(target, &[native.get()])?;
            native.transfer();
        }

        for curve in &entities.curves {
            let native = self.write_curve(model, curve)?;
            kernel.entities_add_curves(target, &[native.get()])?;
            native.transfer();
        }

        for group in &entities.groups {
            self.write_group(model, target, group)?;
        }

        for instance in &entities.instances {
            let native = self.write_instance(model, instance)?;
            kernel.entities_add_instance(target, native.get())?;
            native.transfer();
        }

        log::debug!(
            "Wrote {} faces, {} edges, {} curves, {} groups, {} instances",
            entities.faces.len(),
            entities.edges.len(),
            entities.curves.len(),
            entities.groups.len(),
            entities.instances.len()
        );
        Ok(())
    }

    fn native_points(&self, points: &[DVec3]) -> Vec<DVec3> {
        points
            .iter()
            .map(|p| self.units.point_from_canonical(*p))
            .collect()
    }

    fn write_face(
        &mut self,
        model: ModelRef,
        face: &Face,
        index: usize,
    ) -> WriteResult<Owned<'k, K, kind::Face>> {
        let kernel = self.kernel;
        let failed = |e: BridgeError| WriteError::GeometryConstruction {
            persistent_id: face.persistent_id,
            index,
            reason: e.to_string(),
        };

        let outer = self.native_points(&face.outer_points());
        let native = LoopInput::sequential(kernel, outer.len())?
            .create_face(&outer)
            .map_err(failed)?;

        for hole in &face.inner_loops {
            let points = self.native_points(&hole.points());
            LoopInput::sequential(kernel, points.len())?
                .add_to_face(native.get(), &points)
                .map_err(failed)?;
        }

        if let Some(&material) = self.materials.get(&face.front_material) {
            kernel.face_set_front_material(native.get(), material)?;
        }
        if let Some(&material) = self.materials.get(&face.back_material) {
            kernel.face_set_back_material(native.get(), material)?;
        }
        if !face.layer.is_empty() {
            let layer = self.layer(model, &face.layer)?;
            kernel.element_set_layer(native.get().to_drawing_element(), layer)?;
        }

        Ok(native)
    }

    fn write_edge(&mut self, model: ModelRef, edge: &Edge) -> WriteResult<Owned<'k, K, kind::Edge>> {
        let kernel = self.kernel;
        let native = Owned::new(
            kernel,
            kernel.edge_create(
                self.units.point_from_canonical(edge.start),
                self.units.point_from_canonical(edge.end),
            )?,
        );
        self.assign(model, native.get().to_drawing_element(), &edge.layer, MaterialId::NONE)?;
        Ok(native)
    }

    fn write_curve(
        &mut self,
        model: ModelRef,
        curve: &Curve,
    ) -> WriteResult<Owned<'k, K, kind::Curve>> {
        let edges = curve
            .edges
            .iter()
            .map(|edge| self.write_edge(model, edge))
            .collect::<WriteResult<Vec<_>>>()?;
        let handles: Vec<_> = edges.iter().map(Owned::get).collect();

        let native = Owned::new(self.kernel, self.kernel.curve_create_with_edges(&handles)?);
        for edge in edges {
            edge.transfer();
        }
        Ok(native)
    }

    /// Groups cannot be released on their own, so the group goes into
    /// `target` as soon as it exists; a later failure is cleaned up with the
    /// model.
    fn write_group(
        &mut self,
        model: ModelRef,
        target: EntitiesRef,
        group: &Group,
    ) -> WriteResult<()> {
        let kernel = self.kernel;
        let native = Owned::new(kernel, kernel.group_create()?);
        kernel.entities_add_group(target, native.get())?;
        let handle = native.transfer();

        kernel.group_set_name(handle, &group.name)?;
        if !group.guid.is_empty() {
            kernel.group_set_guid(handle, group.guid.as_str())?;
        }
        kernel.group_set_transform(handle, &group.transform.to_native(&self.units))?;
        self.assign(model, handle.to_drawing_element(), &group.layer, group.material)?;
        self.write_entities(model, kernel.group_entities(handle)?, &group.entities)
    }

    fn write_instance(
        &mut self,
        model: ModelRef,
        instance: &Instance,
    ) -> WriteResult<Owned<'k, K, kind::ComponentInstance>> {
        let kernel = self.kernel;
        let definition = *self.definitions.get(&instance.definition).ok_or_else(|| {
            WriteError::DanglingReference {
                instance: instance.guid.clone(),
                definition: instance.definition.clone(),
            }
        })?;

        let native = Owned::new(kernel, kernel.definition_create_instance(definition)?);
        let handle = native.get();
        kernel.instance_set_name(handle, &instance.name)?;
        if !instance.guid.is_empty() {
            kernel.instance_set_guid(handle, instance.guid.as_str())?;
        }
        kernel.instance_set_transform(handle, &instance.transform.to_native(&self.units))?;
        self.assign(model, handle.to_drawing_element(), &instance.layer, instance.material)?;
        Ok(native)
    }
}
