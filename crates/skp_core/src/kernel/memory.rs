//! In-process kernel backend.
//!
//! Objects live in a slot arena; a handle is the slot index plus one, and a
//! released slot is never reused, so stale handles stay invalid. Geometry
//! construction applies the same checks the native kernel does (planar,
//! non-degenerate loops). Saved models are kept as detached snapshots keyed
//! by path and can be reopened.
//!
//! Uses `RefCell`, so it is `!Sync`: one conversion at a time.

use std::cell::{Ref as CellRef, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use glam::DVec3;
use skp_math::polygon;

use super::handle::kind::{IsEntity, Kind};
use super::*;
use crate::document::AttributeValue;
use crate::material::Color;
use crate::texture;

/// Planarity and coincidence tolerance in native units (inches).
const TOLERANCE: f64 = 1e-3;

#[derive(Clone, Debug)]
struct ModelData {
    name: String,
    entities: usize,
    materials: Vec<usize>,
    layers: Vec<usize>,
    definitions: Vec<usize>,
    scenes: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
struct EntitiesData {
    faces: Vec<usize>,
    edges: Vec<usize>,
    curves: Vec<usize>,
    groups: Vec<usize>,
    instances: Vec<usize>,
}

#[derive(Clone, Debug)]
struct FaceData {
    outer: usize,
    inner: Vec<usize>,
    openings: Vec<usize>,
    back_material: usize,
    normal: DVec3,
    area: f64,
}

#[derive(Clone, Debug)]
struct LoopData {
    edges: Vec<usize>,
    vertices: Vec<usize>,
}

#[derive(Clone, Debug)]
struct EdgeData {
    start: usize,
    end: usize,
    curve: usize,
}

#[derive(Clone, Debug)]
struct CurveData {
    edges: Vec<usize>,
    ty: CurveType,
}

#[derive(Clone, Debug)]
struct MaterialData {
    name: String,
    color: Color,
    opacity: f64,
    use_opacity: bool,
    ty: MaterialType,
    texture: usize,
}

#[derive(Clone, Debug)]
struct TextureData {
    file_name: String,
    dimensions: TextureDimensions,
    average_color: Color,
    use_alpha: bool,
}

#[derive(Clone, Debug)]
struct LayerData {
    name: String,
    visible: bool,
}

#[derive(Clone, Debug)]
struct DefinitionData {
    name: String,
    guid: String,
    description: String,
    entities: usize,
}

#[derive(Clone, Debug)]
struct InstanceData {
    definition: usize,
    name: String,
    guid: String,
    transform: [f64; 16],
}

#[derive(Clone, Debug)]
struct GroupData {
    name: String,
    guid: String,
    transform: [f64; 16],
    entities: usize,
}

#[derive(Clone, Debug)]
struct MeshData {
    vertices: Vec<DVec3>,
    normals: Vec<DVec3>,
    indices: Vec<usize>,
}

#[derive(Clone, Debug)]
struct DictionaryData {
    name: String,
    entries: Vec<(String, AttributeValue)>,
}

#[derive(Clone, Debug)]
struct SceneData {
    name: String,
    hidden: Vec<usize>,
}

#[derive(Clone, Debug)]
enum Object {
    Model(ModelData),
    Entities(EntitiesData),
    Face(FaceData),
    Loop(LoopData),
    Edge(EdgeData),
    Vertex(DVec3),
    Curve(CurveData),
    Material(MaterialData),
    Texture(TextureData),
    Layer(LayerData),
    Definition(DefinitionData),
    Instance(InstanceData),
    Group(GroupData),
    LoopInput(Vec<usize>),
    MeshHelper(MeshData),
    Opening(Vec<DVec3>),
    Dictionary(DictionaryData),
    Scene(SceneData),
}

impl Object {
    fn ref_type(&self) -> RefType {
        match self {
            Object::Model(_) => RefType::Model,
            Object::Entities(_) => RefType::Entities,
            Object::Face(_) => RefType::Face,
            Object::Loop(_) => RefType::Loop,
            Object::Edge(_) => RefType::Edge,
            Object::Vertex(_) => RefType::Vertex,
            Object::Curve(_) => RefType::Curve,
            Object::Material(_) => RefType::Material,
            Object::Texture(_) => RefType::Texture,
            Object::Layer(_) => RefType::Layer,
            Object::Definition(_) => RefType::ComponentDefinition,
            Object::Instance(_) => RefType::ComponentInstance,
            Object::Group(_) => RefType::Group,
            Object::LoopInput(_) => RefType::LoopInput,
            Object::MeshHelper(_) => RefType::MeshHelper,
            Object::Opening(_) => RefType::Opening,
            Object::Dictionary(_) => RefType::AttributeDictionary,
            Object::Scene(_) => RefType::Scene,
        }
    }
}

#[derive(Clone, Debug)]
struct Slot {
    object: Object,
    persistent_id: i64,
    /// Adopted by a parent; only the parent's release frees it.
    attached: bool,
    /// Drawing element layer (faces, edges, instances, groups)
    layer: usize,
    /// Drawing element material; a face's front material
    material: usize,
    dictionaries: Vec<usize>,
}

impl Slot {
    /// Visit every handle field; `owned` marks fields whose target is freed
    /// and snapshotted together with this slot.
    fn visit_refs(&mut self, f: &mut impl FnMut(&mut usize, bool)) {
        f(&mut self.layer, false);
        f(&mut self.material, false);
        for d in &mut self.dictionaries {
            f(d, true);
        }

        fn all(list: &mut [usize], owned: bool, f: &mut impl FnMut(&mut usize, bool)) {
            for r in list {
                f(r, owned);
            }
        }

        match &mut self.object {
            Object::Model(m) => {
                f(&mut m.entities, true);
                all(&mut m.materials, true, f);
                all(&mut m.layers, true, f);
                all(&mut m.definitions, true, f);
                all(&mut m.scenes, true, f);
            }
            Object::Entities(e) => {
                all(&mut e.faces, true, f);
                all(&mut e.edges, true, f);
                all(&mut e.curves, true, f);
                all(&mut e.groups, true, f);
                all(&mut e.instances, true, f);
            }
            Object::Face(face) => {
                f(&mut face.outer, true);
                all(&mut face.inner, true, f);
                all(&mut face.openings, true, f);
                f(&mut face.back_material, false);
            }
            Object::Loop(l) => {
                all(&mut l.edges, true, f);
                all(&mut l.vertices, true, f);
            }
            Object::Edge(e) => {
                f(&mut e.start, true);
                f(&mut e.end, true);
                f(&mut e.curve, false);
            }
            Object::Curve(c) => all(&mut c.edges, true, f),
            Object::Material(m) => f(&mut m.texture, true),
            Object::Definition(d) => f(&mut d.entities, true),
            Object::Instance(i) => f(&mut i.definition, false),
            Object::Group(g) => f(&mut g.entities, true),
            Object::Scene(s) => all(&mut s.hidden, false, f),
            Object::Vertex(_)
            | Object::Texture(_)
            | Object::Layer(_)
            | Object::LoopInput(_)
            | Object::MeshHelper(_)
            | Object::Opening(_)
            | Object::Dictionary(_) => {}
        }
    }

    fn owned_children(&self) -> Vec<usize> {
        let mut children = Vec::new();
        self.clone().visit_refs(&mut |r, owned| {
            if owned && *r != 0 {
                children.push(*r);
            }
        });
        children
    }
}

/// Detached copy of a saved model. Handles inside are 1-based positions in
/// `slots`; the model is always the first slot.
#[derive(Clone, Debug)]
struct Snapshot {
    slots: Vec<Slot>,
    version: ModelVersion,
}

#[derive(Debug, Default)]
struct State {
    slots: Vec<Option<Slot>>,
    saved: HashMap<PathBuf, Snapshot>,
    initialized: bool,
    /// Mirror the native kernel, which cannot release a detached group.
    refuse_group_release: bool,
    next_persistent_id: i64,
    next_guid: u64,
}

macro_rules! typed_access {
    ($($get:ident, $get_mut:ident => $variant:ident($ty:ty);)*) => {
        impl State {
            $(
                #[allow(dead_code)]
                fn $get(&self, raw: RawRef) -> BridgeResult<&$ty> {
                    match self.slot(raw).map(|s| &s.object) {
                        Some(Object::$variant(data)) => Ok(data),
                        _ => Err(BridgeError::InvalidHandle),
                    }
                }

                #[allow(dead_code)]
                fn $get_mut(&mut self, raw: RawRef) -> BridgeResult<&mut $ty> {
                    match self.slot_mut(raw).map(|s| &mut s.object) {
                        Some(Object::$variant(data)) => Ok(data),
                        _ => Err(BridgeError::InvalidHandle),
                    }
                }
            )*
        }
    };
}

typed_access! {
    model, model_mut => Model(ModelData);
    entities, entities_mut => Entities(EntitiesData);
    face, face_mut => Face(FaceData);
    lp, lp_mut => Loop(LoopData);
    edge, edge_mut => Edge(EdgeData);
    vertex, vertex_mut => Vertex(DVec3);
    curve, curve_mut => Curve(CurveData);
    material, material_mut => Material(MaterialData);
    texture, texture_mut => Texture(TextureData);
    layer, layer_mut => Layer(LayerData);
    definition, definition_mut => Definition(DefinitionData);
    instance, instance_mut => Instance(InstanceData);
    group, group_mut => Group(GroupData);
    loop_input, loop_input_mut => LoopInput(Vec<usize>);
    mesh, mesh_mut => MeshHelper(MeshData);
    opening, opening_mut => Opening(Vec<DVec3>);
    dictionary, dictionary_mut => Dictionary(DictionaryData);
    scene, scene_mut => Scene(SceneData);
}

impl State {
    fn slot(&self, raw: RawRef) -> Option<&Slot> {
        raw.get()
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, raw: RawRef) -> Option<&mut Slot> {
        raw.get()
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::as_mut)
    }

    fn live_slot(&self, raw: RawRef) -> BridgeResult<&Slot> {
        self.slot(raw).ok_or(BridgeError::InvalidHandle)
    }

    fn ref_type(&self, raw: RawRef) -> RefType {
        self.slot(raw)
            .map(|s| s.object.ref_type())
            .unwrap_or(RefType::Unknown)
    }

    fn insert(&mut self, object: Object) -> RawRef {
        self.next_persistent_id += 1;
        self.slots.push(Some(Slot {
            object,
            persistent_id: self.next_persistent_id,
            attached: false,
            layer: 0,
            material: 0,
            dictionaries: Vec::new(),
        }));
        RawRef::new(self.slots.len())
    }

    fn insert_attached(&mut self, object: Object) -> RawRef {
        let raw = self.insert(object);
        if let Some(slot) = self.slot_mut(raw) {
            slot.attached = true;
        }
        raw
    }

    fn new_guid(&mut self) -> String {
        self.next_guid += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.next_guid)
    }

    /// Mark `raw` as adopted. Fails if it is dead, of the wrong type, or
    /// already owned by someone else.
    fn attach(&mut self, raw: RawRef, expected: RefType) -> BridgeResult<()> {
        let slot = self.slot_mut(raw).ok_or(BridgeError::InvalidHandle)?;
        if slot.object.ref_type() != expected {
            return Err(BridgeError::InvalidHandle);
        }
        if slot.attached {
            return Err(BridgeError::InvalidInput(format!(
                "{:?} already belongs to a parent",
                expected
            )));
        }
        slot.attached = true;
        Ok(())
    }

    /// Validate a batch before adopting any of it.
    fn attach_all(&mut self, raws: &[usize], expected: RefType) -> BridgeResult<()> {
        for &r in raws {
            let slot = self.live_slot(RawRef::new(r))?;
            if slot.object.ref_type() != expected {
                return Err(BridgeError::InvalidHandle);
            }
            if slot.attached {
                return Err(BridgeError::InvalidInput(format!(
                    "{:?} already belongs to a parent",
                    expected
                )));
            }
        }
        for &r in raws {
            self.attach(RawRef::new(r), expected)?;
        }
        Ok(())
    }

    /// Free a slot and everything it owns. Already freed slots are skipped.
    fn free(&mut self, raw: RawRef) {
        let mut pending = vec![raw.get()];
        while let Some(r) = pending.pop() {
            let Some(index) = r.checked_sub(1) else {
                continue;
            };
            if let Some(slot) = self.slots.get_mut(index).and_then(Option::take) {
                pending.extend(slot.owned_children());
            }
        }
    }

    fn collection(&self, source: RawRef, collection: Collection) -> BridgeResult<Vec<usize>> {
        let ty = self.ref_type(source);
        if ty == RefType::Unknown {
            return Err(BridgeError::InvalidHandle);
        }
        if !collection.accepts_source(ty) {
            return Err(BridgeError::InvalidInput(format!(
                "{:?} has no {:?}",
                ty, collection
            )));
        }

        let items = match collection {
            Collection::Materials => self.model(source)?.materials.clone(),
            Collection::Layers => self.model(source)?.layers.clone(),
            Collection::ComponentDefinitions => self.model(source)?.definitions.clone(),
            Collection::Scenes => self.model(source)?.scenes.clone(),
            Collection::Faces => self.entities(source)?.faces.clone(),
            Collection::Edges => self.entities(source)?.edges.clone(),
            Collection::Curves => self.entities(source)?.curves.clone(),
            Collection::Groups => self.entities(source)?.groups.clone(),
            Collection::Instances => self.entities(source)?.instances.clone(),
            Collection::FaceVertices => {
                let outer = self.face(source)?.outer;
                self.lp(RawRef::new(outer))?.vertices.clone()
            }
            Collection::InnerLoops => self.face(source)?.inner.clone(),
            Collection::Openings => self.face(source)?.openings.clone(),
            Collection::LoopEdges => self.lp(source)?.edges.clone(),
            Collection::CurveEdges => self.curve(source)?.edges.clone(),
            Collection::AttributeDictionaries => self.live_slot(source)?.dictionaries.clone(),
            Collection::HiddenEntities => self
                .scene(source)?
                .hidden
                .iter()
                .copied()
                .filter(|&r| self.slot(RawRef::new(r)).is_some())
                .collect(),
        };
        Ok(items)
    }

    /// Points of a loop input, validated as a face boundary.
    fn loop_points(&self, points: &[DVec3], input: RawRef) -> BridgeResult<Vec<DVec3>> {
        let indices = self.loop_input(input)?;
        if indices.len() < 3 {
            return Err(BridgeError::InvalidInput(format!(
                "loop has {} vertices, at least 3 are required",
                indices.len()
            )));
        }

        let mut seen = HashSet::new();
        let mut ring = Vec::with_capacity(indices.len());
        for &index in indices {
            if !seen.insert(index) {
                return Err(BridgeError::InvalidInput(format!(
                    "vertex index {} repeats in loop",
                    index
                )));
            }
            let point = points.get(index).ok_or(BridgeError::OutOfRange)?;
            ring.push(*point);
        }

        if polygon::has_coincident_points(&ring, TOLERANCE) {
            return Err(BridgeError::InvalidInput("loop has coincident points".into()));
        }
        if polygon::normal(&ring).is_none() {
            return Err(BridgeError::InvalidInput("loop is degenerate".into()));
        }
        if !polygon::is_planar(&ring, TOLERANCE) {
            return Err(BridgeError::InvalidInput("loop is not planar".into()));
        }
        Ok(ring)
    }

    /// Vertices, edges and the loop object for a validated ring.
    fn build_loop(&mut self, ring: &[DVec3]) -> RawRef {
        let vertices: Vec<usize> = ring
            .iter()
            .map(|p| self.insert_attached(Object::Vertex(*p)).get())
            .collect();
        let edges: Vec<usize> = (0..vertices.len())
            .map(|i| {
                let edge = EdgeData {
                    start: vertices[i],
                    end: vertices[(i + 1) % vertices.len()],
                    curve: 0,
                };
                self.insert_attached(Object::Edge(edge)).get()
            })
            .collect();
        self.insert_attached(Object::Loop(LoopData { edges, vertices }))
    }

    fn loop_ring(&self, raw: RawRef) -> BridgeResult<Vec<DVec3>> {
        self.lp(raw)?
            .vertices
            .iter()
            .map(|&v| self.vertex(RawRef::new(v)).copied())
            .collect()
    }

    /// Copy everything reachable from `model` into a detached snapshot.
    fn snapshot(&self, model: RawRef, version: ModelVersion) -> BridgeResult<Snapshot> {
        self.model(model)?;

        let mut order = Vec::new();
        let mut map = HashMap::new();
        let mut pending = vec![model.get()];
        while let Some(r) = pending.pop() {
            if map.contains_key(&r) {
                continue;
            }
            let Some(slot) = self.slot(RawRef::new(r)) else {
                continue;
            };
            map.insert(r, order.len() + 1);
            order.push(r);
            let mut children = slot.owned_children();
            children.reverse();
            pending.extend(children);
        }

        let slots = order
            .iter()
            .filter_map(|&r| self.slot(RawRef::new(r)).cloned())
            .map(|mut slot| {
                slot.visit_refs(&mut |r, _| *r = map.get(r).copied().unwrap_or(0));
                slot
            })
            .collect();

        Ok(Snapshot { slots, version })
    }

    fn restore(&mut self, snapshot: &Snapshot) -> RawRef {
        let base = self.slots.len();
        for slot in &snapshot.slots {
            let mut slot = slot.clone();
            slot.visit_refs(&mut |r, _| {
                if *r != 0 {
                    *r += base;
                }
            });
            self.slots.push(Some(slot));
        }
        RawRef::new(base + 1)
    }
}

/// Kernel backed by an in-process object arena.
#[derive(Debug, Default)]
pub struct MemoryKernel {
    state: RefCell<State>,
}

impl MemoryKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A kernel that, like the native one, refuses to release groups.
    pub fn refusing_group_release() -> Self {
        let kernel = Self::default();
        kernel.state_mut().refuse_group_release = true;
        kernel
    }

    fn state(&self) -> CellRef<'_, State> {
        self.state.borrow()
    }

    fn state_mut(&self) -> RefMut<'_, State> {
        self.state.borrow_mut()
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    /// Number of live objects, saved snapshots excluded.
    pub fn live_count(&self) -> usize {
        self.state().slots.iter().filter(|s| s.is_some()).count()
    }

    /// Live objects of one type.
    pub fn live_count_of(&self, ty: RefType) -> usize {
        self.state()
            .slots
            .iter()
            .flatten()
            .filter(|s| s.object.ref_type() == ty)
            .count()
    }

    /// Version a path was last saved with.
    pub fn saved_version(&self, path: &Path) -> Option<ModelVersion> {
        self.state().saved.get(path).map(|s| s.version)
    }

    /// Attach an attribute dictionary to an entity.
    pub fn add_attribute_dictionary<E: IsEntity>(
        &self,
        entity: Ref<E>,
        name: &str,
        entries: Vec<(String, AttributeValue)>,
    ) -> BridgeResult<AttributeDictionaryRef> {
        let mut state = self.state_mut();
        if !state.ref_type(entity.raw()).is_entity() {
            return Err(BridgeError::InvalidHandle);
        }
        let dict = state.insert_attached(Object::Dictionary(DictionaryData {
            name: name.to_string(),
            entries,
        }));
        if let Some(slot) = state.slot_mut(entity.raw()) {
            slot.dictionaries.push(dict.get());
        }
        Ok(Ref::from_raw(dict))
    }

    /// Add a scene hiding `hidden`.
    pub fn add_scene(
        &self,
        model: ModelRef,
        name: &str,
        hidden: &[EntityRef],
    ) -> BridgeResult<SceneRef> {
        let mut state = self.state_mut();
        state.model(model.raw())?;
        let scene = state.insert_attached(Object::Scene(SceneData {
            name: name.to_string(),
            hidden: hidden.iter().map(|e| e.raw().get()).collect(),
        }));
        state.model_mut(model.raw())?.scenes.push(scene.get());
        Ok(Ref::from_raw(scene))
    }

    /// Record an opening cut into `face`.
    pub fn add_opening(&self, face: FaceRef, points: &[DVec3]) -> BridgeResult<OpeningRef> {
        let mut state = self.state_mut();
        state.face(face.raw())?;
        let opening = state.insert_attached(Object::Opening(points.to_vec()));
        state.face_mut(face.raw())?.openings.push(opening.get());
        Ok(Ref::from_raw(opening))
    }

    fn set_drawing_layer(&self, raw: RawRef, layer: LayerRef) -> BridgeResult<()> {
        let mut state = self.state_mut();
        if !layer.is_null() {
            state.layer(layer.raw())?;
        }
        let slot = state.slot_mut(raw).ok_or(BridgeError::InvalidHandle)?;
        slot.layer = layer.raw().get();
        Ok(())
    }

    fn set_drawing_material(&self, raw: RawRef, material: MaterialRef) -> BridgeResult<()> {
        let mut state = self.state_mut();
        if !material.is_null() {
            state.material(material.raw())?;
        }
        let slot = state.slot_mut(raw).ok_or(BridgeError::InvalidHandle)?;
        slot.material = material.raw().get();
        Ok(())
    }

    /// Handle field of a slot, or invalid if the target has gone away.
    fn live_link<T: Kind>(&self, target: usize) -> Ref<T> {
        let raw = RawRef::new(target);
        if self.state().slot(raw).is_some() {
            Ref::from_raw(raw)
        } else {
            Ref::invalid()
        }
    }

    fn drawing_element_slot<R>(
        &self,
        element: DrawingElementRef,
        f: impl FnOnce(&Slot) -> R,
    ) -> BridgeResult<R> {
        let state = self.state();
        let slot = state.live_slot(element.raw())?;
        if !slot.object.ref_type().is_drawing_element() {
            return Err(BridgeError::InvalidHandle);
        }
        Ok(f(slot))
    }
}

fn copy_out<T: Clone>(items: &[T], out: &mut [T]) -> BridgeResult<usize> {
    check_capacity(out.len(), items.len())?;
    out[..items.len()].clone_from_slice(items);
    Ok(items.len())
}

impl Kernel for MemoryKernel {
    fn initialize(&self) -> BridgeResult<()> {
        self.state_mut().initialized = true;
        Ok(())
    }

    fn terminate(&self) {
        self.state_mut().initialized = false;
    }

    fn is_valid(&self, raw: RawRef) -> bool {
        self.state().slot(raw).is_some()
    }

    fn ref_type(&self, raw: RawRef) -> RefType {
        self.state().ref_type(raw)
    }

    fn release(&self, raw: RawRef) -> BridgeResult<()> {
        let mut state = self.state_mut();
        let slot = state.live_slot(raw)?;
        if slot.attached {
            return Err(BridgeError::InvalidInput(
                "object belongs to a parent and cannot be released".into(),
            ));
        }
        if state.refuse_group_release && slot.object.ref_type() == RefType::Group {
            return Err(BridgeError::Unsupported("releasing a group"));
        }
        state.free(raw);
        Ok(())
    }

    fn count(&self, source: RawRef, collection: Collection) -> BridgeResult<usize> {
        Ok(self.state().collection(source, collection)?.len())
    }

    fn fetch(
        &self,
        source: RawRef,
        collection: Collection,
        out: &mut [RawRef],
    ) -> BridgeResult<usize> {
        let items = self.state().collection(source, collection)?;
        check_capacity(out.len(), items.len())?;
        for (slot, item) in out.iter_mut().zip(items.iter()) {
            *slot = RawRef::new(*item);
        }
        Ok(items.len())
    }

    // --- Model ---

    fn model_create(&self) -> BridgeResult<ModelRef> {
        let mut state = self.state_mut();
        let entities = state.insert_attached(Object::Entities(EntitiesData::default()));
        let model = state.insert(Object::Model(ModelData {
            name: String::new(),
            entities: entities.get(),
            materials: Vec::new(),
            layers: Vec::new(),
            definitions: Vec::new(),
            scenes: Vec::new(),
        }));
        Ok(Ref::from_raw(model))
    }

    fn model_open(&self, path: &Path) -> BridgeResult<ModelRef> {
        let mut state = self.state_mut();
        let snapshot = state
            .saved
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::FileNotFound(path.display().to_string()))?;
        Ok(Ref::from_raw(state.restore(&snapshot)))
    }

    fn model_save(&self, model: ModelRef, path: &Path, version: ModelVersion) -> BridgeResult<()> {
        let mut state = self.state_mut();
        let snapshot = state.snapshot(model.raw(), version)?;
        let is_skp = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("skp"));
        if !is_skp {
            return Err(BridgeError::Serialization(format!(
                "cannot write {}: not a .skp path",
                path.display()
            )));
        }
        state.saved.insert(path.to_path_buf(), snapshot);
        Ok(())
    }

    fn model_release(&self, model: ModelRef) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.model(model.raw())?;
        state.free(model.raw());
        Ok(())
    }

    fn model_entities(&self, model: ModelRef) -> BridgeResult<EntitiesRef> {
        Ok(Ref::from_raw(RawRef::new(
            self.state().model(model.raw())?.entities,
        )))
    }

    fn model_name(&self, model: ModelRef) -> BridgeResult<String> {
        Ok(self.state().model(model.raw())?.name.clone())
    }

    fn model_set_name(&self, model: ModelRef, name: &str) -> BridgeResult<()> {
        self.state_mut().model_mut(model.raw())?.name = name.to_string();
        Ok(())
    }

    // --- Entity / drawing element ---

    fn entity_persistent_id(&self, entity: EntityRef) -> BridgeResult<i64> {
        let state = self.state();
        let slot = state.live_slot(entity.raw())?;
        if !slot.object.ref_type().is_entity() {
            return Err(BridgeError::InvalidHandle);
        }
        Ok(slot.persistent_id)
    }

    fn element_layer(&self, element: DrawingElementRef) -> BridgeResult<LayerRef> {
        let layer = self.drawing_element_slot(element, |s| s.layer)?;
        Ok(self.live_link(layer))
    }

    fn element_material(&self, element: DrawingElementRef) -> BridgeResult<MaterialRef> {
        let material = self.drawing_element_slot(element, |s| s.material)?;
        Ok(self.live_link(material))
    }

    fn element_set_layer(&self, element: DrawingElementRef, layer: LayerRef) -> BridgeResult<()> {
        self.drawing_element_slot(element, |_| ())?;
        self.set_drawing_layer(element.raw(), layer)
    }

    fn element_set_material(
        &self,
        element: DrawingElementRef,
        material: MaterialRef,
    ) -> BridgeResult<()> {
        self.drawing_element_slot(element, |_| ())?;
        self.set_drawing_material(element.raw(), material)
    }

    // --- Component definitions ---

    fn definition_create(&self) -> BridgeResult<ComponentDefinitionRef> {
        let mut state = self.state_mut();
        let entities = state.insert_attached(Object::Entities(EntitiesData::default()));
        let guid = state.new_guid();
        let def = state.insert(Object::Definition(DefinitionData {
            name: String::new(),
            guid,
            description: String::new(),
            entities: entities.get(),
        }));
        Ok(Ref::from_raw(def))
    }

    fn definition_name(&self, def: ComponentDefinitionRef) -> BridgeResult<String> {
        Ok(self.state().definition(def.raw())?.name.clone())
    }

    fn definition_set_name(&self, def: ComponentDefinitionRef, name: &str) -> BridgeResult<()> {
        self.state_mut().definition_mut(def.raw())?.name = name.to_string();
        Ok(())
    }

    fn definition_guid(&self, def: ComponentDefinitionRef) -> BridgeResult<String> {
        Ok(self.state().definition(def.raw())?.guid.clone())
    }

    fn definition_set_guid(&self, def: ComponentDefinitionRef, guid: &str) -> BridgeResult<()> {
        self.state_mut().definition_mut(def.raw())?.guid = guid.to_string();
        Ok(())
    }

    fn definition_description(&self, def: ComponentDefinitionRef) -> BridgeResult<String> {
        Ok(self.state().definition(def.raw())?.description.clone())
    }

    fn definition_set_description(
        &self,
        def: ComponentDefinitionRef,
        description: &str,
    ) -> BridgeResult<()> {
        self.state_mut().definition_mut(def.raw())?.description = description.to_string();
        Ok(())
    }

    fn definition_entities(&self, def: ComponentDefinitionRef) -> BridgeResult<EntitiesRef> {
        Ok(Ref::from_raw(RawRef::new(
            self.state().definition(def.raw())?.entities,
        )))
    }

    fn model_add_definitions(
        &self,
        model: ModelRef,
        defs: &[ComponentDefinitionRef],
    ) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.model(model.raw())?;
        let raws: Vec<usize> = defs.iter().map(|d| d.raw().get()).collect();
        state.attach_all(&raws, RefType::ComponentDefinition)?;
        state.model_mut(model.raw())?.definitions.extend(raws);
        Ok(())
    }

    // --- Component instances ---

    fn definition_create_instance(
        &self,
        def: ComponentDefinitionRef,
    ) -> BridgeResult<ComponentInstanceRef> {
        let mut state = self.state_mut();
        state.definition(def.raw())?;
        let guid = state.new_guid();
        let instance = state.insert(Object::Instance(InstanceData {
            definition: def.raw().get(),
            name: String::new(),
            guid,
            transform: skp_math::Transform::IDENTITY.to_cols_array(),
        }));
        Ok(Ref::from_raw(instance))
    }

    fn instance_definition(
        &self,
        inst: ComponentInstanceRef,
    ) -> BridgeResult<ComponentDefinitionRef> {
        let def = self.state().instance(inst.raw())?.definition;
        Ok(self.live_link(def))
    }

    fn instance_name(&self, inst: ComponentInstanceRef) -> BridgeResult<String> {
        Ok(self.state().instance(inst.raw())?.name.clone())
    }

    fn instance_set_name(&self, inst: ComponentInstanceRef, name: &str) -> BridgeResult<()> {
        self.state_mut().instance_mut(inst.raw())?.name = name.to_string();
        Ok(())
    }

    fn instance_guid(&self, inst: ComponentInstanceRef) -> BridgeResult<String> {
        Ok(self.state().instance(inst.raw())?.guid.clone())
    }

    fn instance_set_guid(&self, inst: ComponentInstanceRef, guid: &str) -> BridgeResult<()> {
        self.state_mut().instance_mut(inst.raw())?.guid = guid.to_string();
        Ok(())
    }

    fn instance_transform(&self, inst: ComponentInstanceRef) -> BridgeResult<[f64; 16]> {
        Ok(self.state().instance(inst.raw())?.transform)
    }

    fn instance_set_transform(
        &self,
        inst: ComponentInstanceRef,
        transform: &[f64; 16],
    ) -> BridgeResult<()> {
        self.state_mut().instance_mut(inst.raw())?.transform = *transform;
        Ok(())
    }

    fn entities_add_instance(
        &self,
        entities: EntitiesRef,
        inst: ComponentInstanceRef,
    ) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.entities(entities.raw())?;
        state.attach(inst.raw(), RefType::ComponentInstance)?;
        state
            .entities_mut(entities.raw())?
            .instances
            .push(inst.raw().get());
        Ok(())
    }

    // --- Groups ---

    fn group_create(&self) -> BridgeResult<GroupRef> {
        let mut state = self.state_mut();
        let entities = state.insert_attached(Object::Entities(EntitiesData::default()));
        let guid = state.new_guid();
        let group = state.insert(Object::Group(GroupData {
            name: String::new(),
            guid,
            transform: skp_math::Transform::IDENTITY.to_cols_array(),
            entities: entities.get(),
        }));
        Ok(Ref::from_raw(group))
    }

    fn group_name(&self, group: GroupRef) -> BridgeResult<String> {
        Ok(self.state().group(group.raw())?.name.clone())
    }

    fn group_set_name(&self, group: GroupRef, name: &str) -> BridgeResult<()> {
        self.state_mut().group_mut(group.raw())?.name = name.to_string();
        Ok(())
    }

    fn group_guid(&self, group: GroupRef) -> BridgeResult<String> {
        Ok(self.state().group(group.raw())?.guid.clone())
    }

    fn group_set_guid(&self, group: GroupRef, guid: &str) -> BridgeResult<()> {
        self.state_mut().group_mut(group.raw())?.guid = guid.to_string();
        Ok(())
    }

    fn group_transform(&self, group: GroupRef) -> BridgeResult<[f64; 16]> {
        Ok(self.state().group(group.raw())?.transform)
    }

    fn group_set_transform(&self, group: GroupRef, transform: &[f64; 16]) -> BridgeResult<()> {
        self.state_mut().group_mut(group.raw())?.transform = *transform;
        Ok(())
    }

    fn group_entities(&self, group: GroupRef) -> BridgeResult<EntitiesRef> {
        Ok(Ref::from_raw(RawRef::new(
            self.state().group(group.raw())?.entities,
        )))
    }

    fn entities_add_group(&self, entities: EntitiesRef, group: GroupRef) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.entities(entities.raw())?;
        state.attach(group.raw(), RefType::Group)?;
        state
            .entities_mut(entities.raw())?
            .groups
            .push(group.raw().get());
        Ok(())
    }

    // --- Faces, loops, vertices ---

    fn face_outer_loop(&self, face: FaceRef) -> BridgeResult<LoopRef> {
        Ok(Ref::from_raw(RawRef::new(self.state().face(face.raw())?.outer)))
    }

    fn face_normal(&self, face: FaceRef) -> BridgeResult<DVec3> {
        Ok(self.state().face(face.raw())?.normal)
    }

    fn face_area(&self, face: FaceRef) -> BridgeResult<f64> {
        Ok(self.state().face(face.raw())?.area)
    }

    fn face_front_material(&self, face: FaceRef) -> BridgeResult<MaterialRef> {
        let state = self.state();
        state.face(face.raw())?;
        let material = state.live_slot(face.raw())?.material;
        drop(state);
        Ok(self.live_link(material))
    }

    fn face_back_material(&self, face: FaceRef) -> BridgeResult<MaterialRef> {
        let material = self.state().face(face.raw())?.back_material;
        Ok(self.live_link(material))
    }

    fn face_set_front_material(&self, face: FaceRef, material: MaterialRef) -> BridgeResult<()> {
        self.state().face(face.raw())?;
        self.set_drawing_material(face.raw(), material)
    }

    fn face_set_back_material(&self, face: FaceRef, material: MaterialRef) -> BridgeResult<()> {
        let mut state = self.state_mut();
        if !material.is_null() {
            state.material(material.raw())?;
        }
        state.face_mut(face.raw())?.back_material = material.raw().get();
        Ok(())
    }

    fn vertex_position(&self, vertex: VertexRef) -> BridgeResult<DVec3> {
        Ok(*self.state().vertex(vertex.raw())?)
    }

    fn loop_input_create(&self) -> BridgeResult<LoopInputRef> {
        Ok(Ref::from_raw(
            self.state_mut().insert(Object::LoopInput(Vec::new())),
        ))
    }

    fn loop_input_add_vertex_index(&self, input: LoopInputRef, index: usize) -> BridgeResult<()> {
        self.state_mut().loop_input_mut(input.raw())?.push(index);
        Ok(())
    }

    fn face_create(&self, points: &[DVec3], outer: LoopInputRef) -> BridgeResult<FaceRef> {
        let mut state = self.state_mut();
        let ring = state.loop_points(points, outer.raw())?;
        let normal = polygon::normal(&ring).unwrap_or(DVec3::Z);
        let area = polygon::area(&ring);

        // consumed on success
        state.free(outer.raw());

        let outer_loop = state.build_loop(&ring);
        let face = state.insert(Object::Face(FaceData {
            outer: outer_loop.get(),
            inner: Vec::new(),
            openings: Vec::new(),
            back_material: 0,
            normal,
            area,
        }));
        Ok(Ref::from_raw(face))
    }

    fn face_add_inner_loop(
        &self,
        face: FaceRef,
        points: &[DVec3],
        input: LoopInputRef,
    ) -> BridgeResult<()> {
        let mut state = self.state_mut();
        let (outer, normal) = {
            let data = state.face(face.raw())?;
            (data.outer, data.normal)
        };
        let ring = state.loop_points(points, input.raw())?;

        let outer_ring = state.loop_ring(RawRef::new(outer))?;
        let origin = outer_ring.first().copied().unwrap_or(DVec3::ZERO);
        if ring.iter().any(|p| (*p - origin).dot(normal).abs() > TOLERANCE) {
            return Err(BridgeError::InvalidInput(
                "inner loop is not in the plane of the face".into(),
            ));
        }

        state.free(input.raw());

        let hole = polygon::area(&ring);
        let inner_loop = state.build_loop(&ring);
        let data = state.face_mut(face.raw())?;
        data.inner.push(inner_loop.get());
        data.area -= hole;
        Ok(())
    }

    fn entities_add_faces(&self, entities: EntitiesRef, faces: &[FaceRef]) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.entities(entities.raw())?;
        let raws: Vec<usize> = faces.iter().map(|f| f.raw().get()).collect();
        state.attach_all(&raws, RefType::Face)?;
        state.entities_mut(entities.raw())?.faces.extend(raws);
        Ok(())
    }

    // --- Edges and curves ---

    fn edge_start(&self, edge: EdgeRef) -> BridgeResult<VertexRef> {
        Ok(Ref::from_raw(RawRef::new(self.state().edge(edge.raw())?.start)))
    }

    fn edge_end(&self, edge: EdgeRef) -> BridgeResult<VertexRef> {
        Ok(Ref::from_raw(RawRef::new(self.state().edge(edge.raw())?.end)))
    }

    fn edge_curve(&self, edge: EdgeRef) -> BridgeResult<CurveRef> {
        let curve = self.state().edge(edge.raw())?.curve;
        Ok(self.live_link(curve))
    }

    fn edge_create(&self, start: DVec3, end: DVec3) -> BridgeResult<EdgeRef> {
        if start.distance(end) <= TOLERANCE {
            return Err(BridgeError::InvalidInput("edge has zero length".into()));
        }
        let mut state = self.state_mut();
        let start = state.insert_attached(Object::Vertex(start));
        let end = state.insert_attached(Object::Vertex(end));
        let edge = state.insert(Object::Edge(EdgeData {
            start: start.get(),
            end: end.get(),
            curve: 0,
        }));
        Ok(Ref::from_raw(edge))
    }

    fn curve_type(&self, curve: CurveRef) -> BridgeResult<CurveType> {
        Ok(self.state().curve(curve.raw())?.ty)
    }

    fn curve_create_with_edges(&self, edges: &[EdgeRef]) -> BridgeResult<CurveRef> {
        if edges.is_empty() {
            return Err(BridgeError::InvalidInput("curve needs at least one edge".into()));
        }
        let mut state = self.state_mut();
        let raws: Vec<usize> = edges.iter().map(|e| e.raw().get()).collect();
        state.attach_all(&raws, RefType::Edge)?;
        let curve = state.insert(Object::Curve(CurveData {
            edges: raws.clone(),
            ty: CurveType::Simple,
        }));
        for raw in raws {
            state.edge_mut(RawRef::new(raw))?.curve = curve.get();
        }
        Ok(Ref::from_raw(curve))
    }

    fn entities_add_edges(&self, entities: EntitiesRef, edges: &[EdgeRef]) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.entities(entities.raw())?;
        let raws: Vec<usize> = edges.iter().map(|e| e.raw().get()).collect();
        state.attach_all(&raws, RefType::Edge)?;
        state.entities_mut(entities.raw())?.edges.extend(raws);
        Ok(())
    }

    fn entities_add_curves(&self, entities: EntitiesRef, curves: &[CurveRef]) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.entities(entities.raw())?;
        let raws: Vec<usize> = curves.iter().map(|c| c.raw().get()).collect();
        state.attach_all(&raws, RefType::Curve)?;
        state.entities_mut(entities.raw())?.curves.extend(raws);
        Ok(())
    }

    // --- Openings ---

    fn opening_point_count(&self, opening: OpeningRef) -> BridgeResult<usize> {
        Ok(self.state().opening(opening.raw())?.len())
    }

    fn opening_points(&self, opening: OpeningRef, out: &mut [DVec3]) -> BridgeResult<usize> {
        copy_out(self.state().opening(opening.raw())?, out)
    }

    // --- Triangulation helper ---

    fn mesh_helper_create(&self, face: FaceRef) -> BridgeResult<MeshHelperRef> {
        let mut state = self.state_mut();
        let (outer, normal) = {
            let data = state.face(face.raw())?;
            (data.outer, data.normal)
        };
        let vertices = state.loop_ring(RawRef::new(outer))?;
        let indices = polygon::fan_triangles(vertices.len())
            .into_iter()
            .flatten()
            .collect();
        let normals = vec![normal; vertices.len()];
        let helper = state.insert(Object::MeshHelper(MeshData {
            vertices,
            normals,
            indices,
        }));
        Ok(Ref::from_raw(helper))
    }

    fn mesh_vertex_count(&self, helper: MeshHelperRef) -> BridgeResult<usize> {
        Ok(self.state().mesh(helper.raw())?.vertices.len())
    }

    fn mesh_vertices(&self, helper: MeshHelperRef, out: &mut [DVec3]) -> BridgeResult<usize> {
        copy_out(&self.state().mesh(helper.raw())?.vertices, out)
    }

    fn mesh_normals(&self, helper: MeshHelperRef, out: &mut [DVec3]) -> BridgeResult<usize> {
        copy_out(&self.state().mesh(helper.raw())?.normals, out)
    }

    fn mesh_index_count(&self, helper: MeshHelperRef) -> BridgeResult<usize> {
        Ok(self.state().mesh(helper.raw())?.indices.len())
    }

    fn mesh_indices(&self, helper: MeshHelperRef, out: &mut [usize]) -> BridgeResult<usize> {
        copy_out(&self.state().mesh(helper.raw())?.indices, out)
    }

    // --- Materials and textures ---

    fn material_create(&self) -> BridgeResult<MaterialRef> {
        Ok(Ref::from_raw(self.state_mut().insert(Object::Material(
            MaterialData {
                name: String::new(),
                color: Color::WHITE,
                opacity: 1.0,
                use_opacity: false,
                ty: MaterialType::Colored,
                texture: 0,
            },
        ))))
    }

    fn material_name(&self, material: MaterialRef) -> BridgeResult<String> {
        Ok(self.state().material(material.raw())?.name.clone())
    }

    fn material_set_name(&self, material: MaterialRef, name: &str) -> BridgeResult<()> {
        self.state_mut().material_mut(material.raw())?.name = name.to_string();
        Ok(())
    }

    fn material_color(&self, material: MaterialRef) -> BridgeResult<Color> {
        Ok(self.state().material(material.raw())?.color)
    }

    fn material_set_color(&self, material: MaterialRef, color: Color) -> BridgeResult<()> {
        self.state_mut().material_mut(material.raw())?.color = color;
        Ok(())
    }

    fn material_opacity(&self, material: MaterialRef) -> BridgeResult<f64> {
        Ok(self.state().material(material.raw())?.opacity)
    }

    fn material_set_opacity(&self, material: MaterialRef, opacity: f64) -> BridgeResult<()> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(BridgeError::OutOfRange);
        }
        self.state_mut().material_mut(material.raw())?.opacity = opacity;
        Ok(())
    }

    fn material_use_opacity(&self, material: MaterialRef) -> BridgeResult<bool> {
        Ok(self.state().material(material.raw())?.use_opacity)
    }

    fn material_set_use_opacity(
        &self,
        material: MaterialRef,
        use_opacity: bool,
    ) -> BridgeResult<()> {
        self.state_mut().material_mut(material.raw())?.use_opacity = use_opacity;
        Ok(())
    }

    fn material_type(&self, material: MaterialRef) -> BridgeResult<MaterialType> {
        Ok(self.state().material(material.raw())?.ty)
    }

    fn material_set_type(&self, material: MaterialRef, ty: MaterialType) -> BridgeResult<()> {
        let mut state = self.state_mut();
        let has_texture = {
            let data = state.material(material.raw())?;
            state.slot(RawRef::new(data.texture)).is_some()
        };
        if ty.uses_texture() && !has_texture {
            return Err(BridgeError::NoData);
        }
        state.material_mut(material.raw())?.ty = ty;
        Ok(())
    }

    fn material_texture(&self, material: MaterialRef) -> BridgeResult<TextureRef> {
        let texture = self.state().material(material.raw())?.texture;
        Ok(self.live_link(texture))
    }

    fn material_set_texture(&self, material: MaterialRef, texture: TextureRef) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.material(material.raw())?;
        state.attach(texture.raw(), RefType::Texture)?;
        let previous = std::mem::replace(
            &mut state.material_mut(material.raw())?.texture,
            texture.raw().get(),
        );
        if previous != 0 {
            state.free(RawRef::new(previous));
        }
        let data = state.material_mut(material.raw())?;
        if !data.ty.uses_texture() {
            data.ty = MaterialType::Textured;
        }
        Ok(())
    }

    fn model_add_materials(&self, model: ModelRef, materials: &[MaterialRef]) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.model(model.raw())?;
        let raws: Vec<usize> = materials.iter().map(|m| m.raw().get()).collect();
        state.attach_all(&raws, RefType::Material)?;
        state.model_mut(model.raw())?.materials.extend(raws);
        Ok(())
    }

    fn texture_create_from_file(
        &self,
        path: &Path,
        s_scale: f64,
        t_scale: f64,
    ) -> BridgeResult<TextureRef> {
        let info = texture::probe_image(path).map_err(|e| match e {
            texture::TextureError::NotFound(p) => BridgeError::FileNotFound(p.display().to_string()),
            other => BridgeError::InvalidInput(other.to_string()),
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let texture = self.state_mut().insert(Object::Texture(TextureData {
            file_name,
            dimensions: TextureDimensions {
                width: info.width as usize,
                height: info.height as usize,
                s_scale,
                t_scale,
            },
            average_color: info.average_color,
            use_alpha: info.has_alpha,
        }));
        Ok(Ref::from_raw(texture))
    }

    fn texture_file_name(&self, texture: TextureRef) -> BridgeResult<String> {
        Ok(self.state().texture(texture.raw())?.file_name.clone())
    }

    fn texture_dimensions(&self, texture: TextureRef) -> BridgeResult<TextureDimensions> {
        Ok(self.state().texture(texture.raw())?.dimensions)
    }

    fn texture_average_color(&self, texture: TextureRef) -> BridgeResult<Color> {
        Ok(self.state().texture(texture.raw())?.average_color)
    }

    fn texture_use_alpha(&self, texture: TextureRef) -> BridgeResult<bool> {
        Ok(self.state().texture(texture.raw())?.use_alpha)
    }

    // --- Layers ---

    fn layer_create(&self) -> BridgeResult<LayerRef> {
        Ok(Ref::from_raw(self.state_mut().insert(Object::Layer(
            LayerData {
                name: String::new(),
                visible: true,
            },
        ))))
    }

    fn layer_name(&self, layer: LayerRef) -> BridgeResult<String> {
        Ok(self.state().layer(layer.raw())?.name.clone())
    }

    fn layer_set_name(&self, layer: LayerRef, name: &str) -> BridgeResult<()> {
        self.state_mut().layer_mut(layer.raw())?.name = name.to_string();
        Ok(())
    }

    fn layer_visible(&self, layer: LayerRef) -> BridgeResult<bool> {
        Ok(self.state().layer(layer.raw())?.visible)
    }

    fn layer_set_visible(&self, layer: LayerRef, visible: bool) -> BridgeResult<()> {
        self.state_mut().layer_mut(layer.raw())?.visible = visible;
        Ok(())
    }

    fn model_add_layers(&self, model: ModelRef, layers: &[LayerRef]) -> BridgeResult<()> {
        let mut state = self.state_mut();
        state.model(model.raw())?;
        let raws: Vec<usize> = layers.iter().map(|l| l.raw().get()).collect();
        state.attach_all(&raws, RefType::Layer)?;
        state.model_mut(model.raw())?.layers.extend(raws);
        Ok(())
    }

    // --- Scenes and attributes ---

    fn scene_name(&self, scene: SceneRef) -> BridgeResult<String> {
        Ok(self.state().scene(scene.raw())?.name.clone())
    }

    fn dictionary_name(&self, dict: AttributeDictionaryRef) -> BridgeResult<String> {
        Ok(self.state().dictionary(dict.raw())?.name.clone())
    }

    fn dictionary_key_count(&self, dict: AttributeDictionaryRef) -> BridgeResult<usize> {
        Ok(self.state().dictionary(dict.raw())?.entries.len())
    }

    fn dictionary_keys(
        &self,
        dict: AttributeDictionaryRef,
        out: &mut [String],
    ) -> BridgeResult<usize> {
        let state = self.state();
        let keys: Vec<String> = state
            .dictionary(dict.raw())?
            .entries
            .iter()
            .map(|(k, _)| k.clone())
            .collect();
        copy_out(&keys, out)
    }

    fn dictionary_value(
        &self,
        dict: AttributeDictionaryRef,
        key: &str,
    ) -> BridgeResult<AttributeValue> {
        self.state()
            .dictionary(dict.raw())?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .ok_or(BridgeError::NoData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<DVec3> {
        vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(size, 0.0, 0.0),
            DVec3::new(size, size, 0.0),
            DVec3::new(0.0, size, 0.0),
        ]
    }

    fn face_from(kernel: &MemoryKernel, points: &[DVec3]) -> BridgeResult<FaceRef> {
        let input = kernel.loop_input_create()?;
        for i in 0..points.len() {
            kernel.loop_input_add_vertex_index(input, i)?;
        }
        let result = kernel.face_create(points, input);
        if result.is_err() {
            kernel.release(input.raw())?;
        }
        result
    }

    #[test]
    fn test_face_create_consumes_loop_input() {
        let kernel = MemoryKernel::new();
        let input = kernel.loop_input_create().unwrap();
        for i in 0..4 {
            kernel.loop_input_add_vertex_index(input, i).unwrap();
        }
        let face = kernel.face_create(&square(10.0), input).unwrap();

        assert!(!kernel.is_valid(input.raw()));
        assert_eq!(kernel.ref_type(face.raw()), RefType::Face);
        assert!((kernel.face_area(face).unwrap() - 100.0).abs() < 1e-9);
        assert!((kernel.face_normal(face).unwrap() - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn test_face_create_rejects_bad_loops() {
        let kernel = MemoryKernel::new();

        let mut bent = square(10.0);
        bent[2].z = 1.0;
        assert!(matches!(
            face_from(&kernel, &bent),
            Err(BridgeError::InvalidInput(_))
        ));

        let line = [DVec3::ZERO, DVec3::X, DVec3::X * 2.0];
        assert!(face_from(&kernel, &line).is_err());

        assert!(face_from(&kernel, &square(10.0)[..2]).is_err());

        // rejected inputs were released by the caller, nothing is left behind
        assert_eq!(kernel.live_count(), 0);
    }

    #[test]
    fn test_failed_face_keeps_loop_input_alive() {
        let kernel = MemoryKernel::new();
        let input = kernel.loop_input_create().unwrap();
        kernel.loop_input_add_vertex_index(input, 0).unwrap();
        kernel.loop_input_add_vertex_index(input, 9).unwrap();
        kernel.loop_input_add_vertex_index(input, 1).unwrap();

        assert!(kernel.face_create(&square(1.0), input).is_err());
        assert!(kernel.is_valid(input.raw()));
        kernel.release(input.raw()).unwrap();
        assert!(!kernel.is_valid(input.raw()));
    }

    #[test]
    fn test_inner_loop_reduces_area() {
        let kernel = MemoryKernel::new();
        let face = face_from(&kernel, &square(10.0)).unwrap();

        let hole: Vec<DVec3> = square(2.0)
            .into_iter()
            .map(|p| p + DVec3::new(4.0, 4.0, 0.0))
            .collect();
        let input = kernel.loop_input_create().unwrap();
        for i in 0..4 {
            kernel.loop_input_add_vertex_index(input, i).unwrap();
        }
        kernel.face_add_inner_loop(face, &hole, input).unwrap();

        assert!(!kernel.is_valid(input.raw()));
        assert!((kernel.face_area(face).unwrap() - 96.0).abs() < 1e-9);
        assert_eq!(kernel.count(face.raw(), Collection::InnerLoops).unwrap(), 1);
    }

    #[test]
    fn test_fetch_never_writes_past_capacity() {
        let kernel = MemoryKernel::new();
        let model = kernel.model_create().unwrap();
        let materials: Vec<MaterialRef> = (0..3).map(|_| kernel.material_create().unwrap()).collect();
        kernel.model_add_materials(model, &materials).unwrap();

        assert_eq!(kernel.count(model.raw(), Collection::Materials).unwrap(), 3);

        let sentinel = RawRef::new(usize::MAX);
        let mut out = [sentinel; 4];
        let err = kernel
            .fetch(model.raw(), Collection::Materials, &mut out[..2])
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::InsufficientCapacity {
                capacity: 2,
                actual: 3
            }
        );
        assert!(out.iter().all(|r| *r == sentinel));

        let written = kernel
            .fetch(model.raw(), Collection::Materials, &mut out)
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(out[3], sentinel);
    }

    #[test]
    fn test_collection_rejects_wrong_source() {
        let kernel = MemoryKernel::new();
        let model = kernel.model_create().unwrap();
        assert!(matches!(
            kernel.count(model.raw(), Collection::Faces),
            Err(BridgeError::InvalidInput(_))
        ));
        assert_eq!(
            kernel.count(RawRef::new(999), Collection::Faces),
            Err(BridgeError::InvalidHandle)
        );
    }

    #[test]
    fn test_attached_objects_cannot_be_released() {
        let kernel = MemoryKernel::new();
        let model = kernel.model_create().unwrap();
        let layer = kernel.layer_create().unwrap();
        kernel.model_add_layers(model, &[layer]).unwrap();

        assert!(kernel.release(layer.raw()).is_err());
        assert!(kernel.model_add_layers(model, &[layer]).is_err());

        kernel.model_release(model).unwrap();
        assert!(!kernel.is_valid(layer.raw()));
        assert_eq!(kernel.live_count(), 0);
    }

    #[test]
    fn test_group_release_can_be_refused() {
        let kernel = MemoryKernel::new();
        let group = kernel.group_create().unwrap();
        kernel.release(group.raw()).unwrap();

        let kernel = MemoryKernel::refusing_group_release();
        let group = kernel.group_create().unwrap();
        assert_eq!(
            kernel.release(group.raw()),
            Err(BridgeError::Unsupported("releasing a group"))
        );
        assert!(kernel.is_valid(group.raw()));

        // attached to a model, the group goes away with it
        let model = kernel.model_create().unwrap();
        let entities = kernel.model_entities(model).unwrap();
        kernel.entities_add_group(entities, group).unwrap();
        kernel.model_release(model).unwrap();
        assert_eq!(kernel.live_count(), 0);
    }

    #[test]
    fn test_save_and_reopen() {
        let kernel = MemoryKernel::new();
        let model = kernel.model_create().unwrap();
        kernel.model_set_name(model, "box").unwrap();
        let entities = kernel.model_entities(model).unwrap();
        let face = face_from(&kernel, &square(5.0)).unwrap();
        kernel.entities_add_faces(entities, &[face]).unwrap();
        let pid = kernel.entity_persistent_id(face.to_entity()).unwrap();

        let path = Path::new("memory/box.skp");
        kernel.model_save(model, path, ModelVersion::V2017).unwrap();
        kernel.model_release(model).unwrap();
        assert_eq!(kernel.live_count(), 0);
        assert_eq!(kernel.saved_version(path), Some(ModelVersion::V2017));

        let reopened = kernel.model_open(path).unwrap();
        assert_eq!(kernel.model_name(reopened).unwrap(), "box");
        let entities = kernel.model_entities(reopened).unwrap();
        let mut faces = [RawRef::INVALID; 1];
        kernel
            .fetch(entities.raw(), Collection::Faces, &mut faces)
            .unwrap();
        let face = FaceRef::from_raw(faces[0]);
        assert_eq!(kernel.entity_persistent_id(face.to_entity()).unwrap(), pid);
        assert!((kernel.face_area(face).unwrap() - 25.0).abs() < 1e-9);
        assert_eq!(kernel.count(face.raw(), Collection::FaceVertices).unwrap(), 4);
    }

    #[test]
    fn test_save_rejects_other_extensions() {
        let kernel = MemoryKernel::new();
        let model = kernel.model_create().unwrap();
        assert!(matches!(
            kernel.model_save(model, Path::new("out.obj"), ModelVersion::default()),
            Err(BridgeError::Serialization(_))
        ));
        assert!(matches!(
            kernel.model_open(Path::new("never-saved.skp")),
            Err(BridgeError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_mesh_helper_fans_outer_loop() {
        let kernel = MemoryKernel::new();
        let face = face_from(&kernel, &square(1.0)).unwrap();
        let helper = kernel.mesh_helper_create(face).unwrap();
        assert_eq!(kernel.mesh_vertex_count(helper).unwrap(), 4);
        assert_eq!(kernel.mesh_index_count(helper).unwrap(), 6);

        let mut indices = [0usize; 6];
        kernel.mesh_indices(helper, &mut indices).unwrap();
        assert_eq!(indices, [0, 1, 2, 0, 2, 3]);
        kernel.release(helper.raw()).unwrap();
    }

    #[test]
    fn test_curve_edges_are_not_standalone() {
        let kernel = MemoryKernel::new();
        let model = kernel.model_create().unwrap();
        let entities = kernel.model_entities(model).unwrap();

        let a = kernel.edge_create(DVec3::ZERO, DVec3::X).unwrap();
        let b = kernel.edge_create(DVec3::X, DVec3::new(1.0, 1.0, 0.0)).unwrap();
        let curve = kernel.curve_create_with_edges(&[a, b]).unwrap();
        kernel.entities_add_curves(entities, &[curve]).unwrap();

        assert_eq!(kernel.count(entities.raw(), Collection::Edges).unwrap(), 0);
        assert_eq!(kernel.count(curve.raw(), Collection::CurveEdges).unwrap(), 2);
        assert_eq!(kernel.edge_curve(a).unwrap(), curve);
        assert_eq!(kernel.curve_type(curve).unwrap(), CurveType::Simple);
    }

    #[test]
    fn test_drawing_element_links() {
        let kernel = MemoryKernel::new();
        let face = face_from(&kernel, &square(1.0)).unwrap();
        let material = kernel.material_create().unwrap();
        let layer = kernel.layer_create().unwrap();

        assert!(kernel.element_layer(face.to_drawing_element()).unwrap().is_null());
        kernel
            .element_set_layer(face.to_drawing_element(), layer)
            .unwrap();
        kernel.face_set_front_material(face, material).unwrap();

        assert_eq!(kernel.element_layer(face.to_drawing_element()).unwrap(), layer);
        assert_eq!(kernel.face_front_material(face).unwrap(), material);
        assert!(kernel.face_back_material(face).unwrap().is_null());

        // layers are not drawing elements
        assert!(kernel
            .element_layer(DrawingElementRef::from_raw(layer.raw()))
            .is_err());
    }
}
