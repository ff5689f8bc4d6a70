//! Bridge to the CAD kernel.
//!
//! [`Kernel`] mirrors the native C API one call per method, in native units
//! (inches). Every collection goes through the two-phase `count`/`fetch`
//! protocol; [`Bridge`] wraps that protocol into single calls returning
//! `Vec`s. Two backends exist: [`MemoryKernel`] (always available) and
//! `NativeKernel` behind the `native` feature.

mod handle;
mod memory;
#[cfg(feature = "native")]
mod native;
mod owned;
mod query;
mod session;

use std::path::Path;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::AttributeValue;
use crate::material::Color;

pub use handle::*;
pub use memory::MemoryKernel;
#[cfg(feature = "native")]
pub use native::NativeKernel;
pub use owned::{LoopInput, Owned};
pub use query::{Bridge, Query};
pub use session::Session;

// ============================================================================
// Error Types
// ============================================================================

/// Errors reported by a kernel call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Invalid or released handle")]
    InvalidHandle,

    #[error("Output capacity {capacity} is smaller than the {actual} available items")]
    InsufficientCapacity { capacity: usize, actual: usize },

    #[error("Null pointer passed to kernel")]
    NullPointer,

    #[error("Index out of range")]
    OutOfRange,

    #[error("No data available")]
    NoData,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Model is invalid")]
    ModelInvalid,

    #[error("Model was written by a newer version")]
    ModelVersion,

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("A kernel session is already active")]
    SessionActive,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Kernel error: {0}")]
    Generic(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

// ============================================================================
// Value Types
// ============================================================================

/// Collections reachable through the count/fetch protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Model → Material
    Materials,
    /// Model → Layer
    Layers,
    /// Model → ComponentDefinition
    ComponentDefinitions,
    /// Model → Scene
    Scenes,
    /// Entities → Face
    Faces,
    /// Entities → Edge, standalone only (edges bound to faces are excluded)
    Edges,
    /// Entities → Curve
    Curves,
    /// Entities → Group
    Groups,
    /// Entities → ComponentInstance
    Instances,
    /// Face → Vertex, boundary vertices in outer loop order
    FaceVertices,
    /// Face → Loop
    InnerLoops,
    /// Face → Opening
    Openings,
    /// Loop → Edge
    LoopEdges,
    /// Curve → Edge
    CurveEdges,
    /// Entity → AttributeDictionary
    AttributeDictionaries,
    /// Scene → Entity
    HiddenEntities,
}

impl Collection {
    /// Whether `source` may own this collection.
    pub fn accepts_source(self, source: RefType) -> bool {
        match self {
            Collection::Materials
            | Collection::Layers
            | Collection::ComponentDefinitions
            | Collection::Scenes => source == RefType::Model,
            Collection::Faces
            | Collection::Edges
            | Collection::Curves
            | Collection::Groups
            | Collection::Instances => source == RefType::Entities,
            Collection::FaceVertices | Collection::InnerLoops | Collection::Openings => {
                source == RefType::Face
            }
            Collection::LoopEdges => source == RefType::Loop,
            Collection::CurveEdges => source == RefType::Curve,
            Collection::AttributeDictionaries => source.is_entity(),
            Collection::HiddenEntities => source == RefType::Scene,
        }
    }
}

/// How a material paints: flat color, texture, or tinted texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MaterialType {
    #[default]
    Colored,
    Textured,
    ColorizedTexture,
}

impl MaterialType {
    pub fn from_flags(uses_color: bool, uses_texture: bool) -> Self {
        match (uses_color, uses_texture) {
            (true, true) => MaterialType::ColorizedTexture,
            (false, true) => MaterialType::Textured,
            _ => MaterialType::Colored,
        }
    }

    pub fn uses_color(self) -> bool {
        matches!(self, MaterialType::Colored | MaterialType::ColorizedTexture)
    }

    pub fn uses_texture(self) -> bool {
        matches!(self, MaterialType::Textured | MaterialType::ColorizedTexture)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurveType {
    #[default]
    Simple,
    Arc,
}

/// Pixel size and per-axis scale of a texture image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextureDimensions {
    pub width: usize,
    pub height: usize,
    pub s_scale: f64,
    pub t_scale: f64,
}

/// File format version used when saving a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelVersion {
    V2013,
    V2014,
    V2015,
    V2016,
    V2017,
    V2018,
    V2019,
    V2020,
    #[default]
    V2021,
}

// ============================================================================
// Kernel
// ============================================================================

/// The native kernel surface.
///
/// Lengths are native (inches). Getters on an invalid handle fail with
/// [`BridgeError::InvalidHandle`]; getters for optional links (layer,
/// material, texture, curve) return an invalid ref when the link is absent.
/// Handles obtained from queries are borrowed and must not be released;
/// handles from `*_create` are owned by the caller until added to a parent.
pub trait Kernel {
    // --- Session and validity ---

    fn initialize(&self) -> BridgeResult<()>;
    fn terminate(&self);
    fn is_valid(&self, raw: RawRef) -> bool;
    /// Concrete type of a live object, `Unknown` for invalid handles.
    fn ref_type(&self, raw: RawRef) -> RefType;
    /// Release an owned object that was never handed to a parent.
    fn release(&self, raw: RawRef) -> BridgeResult<()>;

    // --- Two-phase collections ---

    fn count(&self, source: RawRef, collection: Collection) -> BridgeResult<usize>;
    /// Write up to `out.len()` handles and return the number written.
    ///
    /// Fails with `InsufficientCapacity` when `out` is too short, without
    /// touching `out`.
    fn fetch(&self, source: RawRef, collection: Collection, out: &mut [RawRef])
        -> BridgeResult<usize>;

    // --- Model ---

    fn model_create(&self) -> BridgeResult<ModelRef>;
    fn model_open(&self, path: &Path) -> BridgeResult<ModelRef>;
    fn model_save(&self, model: ModelRef, path: &Path, version: ModelVersion) -> BridgeResult<()>;
    fn model_release(&self, model: ModelRef) -> BridgeResult<()>;
    fn model_entities(&self, model: ModelRef) -> BridgeResult<EntitiesRef>;
    fn model_name(&self, model: ModelRef) -> BridgeResult<String>;
    fn model_set_name(&self, model: ModelRef, name: &str) -> BridgeResult<()>;

    // --- Entity / drawing element ---

    fn entity_persistent_id(&self, entity: EntityRef) -> BridgeResult<i64>;
    fn element_layer(&self, element: DrawingElementRef) -> BridgeResult<LayerRef>;
    fn element_material(&self, element: DrawingElementRef) -> BridgeResult<MaterialRef>;
    fn element_set_layer(&self, element: DrawingElementRef, layer: LayerRef) -> BridgeResult<()>;
    fn element_set_material(
        &self,
        element: DrawingElementRef,
        material: MaterialRef,
    ) -> BridgeResult<()>;

    // --- Component definitions ---

    fn definition_create(&self) -> BridgeResult<ComponentDefinitionRef>;
    fn definition_name(&self, def: ComponentDefinitionRef) -> BridgeResult<String>;
    fn definition_set_name(&self, def: ComponentDefinitionRef, name: &str) -> BridgeResult<()>;
    fn definition_guid(&self, def: ComponentDefinitionRef) -> BridgeResult<String>;
    /// May fail with `Unsupported`; callers treat that as non-fatal.
    fn definition_set_guid(&self, def: ComponentDefinitionRef, guid: &str) -> BridgeResult<()>;
    fn definition_description(&self, def: ComponentDefinitionRef) -> BridgeResult<String>;
    fn definition_set_description(
        &self,
        def: ComponentDefinitionRef,
        description: &str,
    ) -> BridgeResult<()>;
    fn definition_entities(&self, def: ComponentDefinitionRef) -> BridgeResult<EntitiesRef>;
    /// Takes ownership of the definitions.
    fn model_add_definitions(
        &self,
        model: ModelRef,
        defs: &[ComponentDefinitionRef],
    ) -> BridgeResult<()>;

    // --- Component instances ---

    fn definition_create_instance(
        &self,
        def: ComponentDefinitionRef,
    ) -> BridgeResult<ComponentInstanceRef>;
    fn instance_definition(&self, inst: ComponentInstanceRef)
        -> BridgeResult<ComponentDefinitionRef>;
    fn instance_name(&self, inst: ComponentInstanceRef) -> BridgeResult<String>;
    fn instance_set_name(&self, inst: ComponentInstanceRef, name: &str) -> BridgeResult<()>;
    fn instance_guid(&self, inst: ComponentInstanceRef) -> BridgeResult<String>;
    fn instance_set_guid(&self, inst: ComponentInstanceRef, guid: &str) -> BridgeResult<()>;
    fn instance_transform(&self, inst: ComponentInstanceRef) -> BridgeResult<[f64; 16]>;
    fn instance_set_transform(
        &self,
        inst: ComponentInstanceRef,
        transform: &[f64; 16],
    ) -> BridgeResult<()>;
    /// Takes ownership of the instance.
    fn entities_add_instance(
        &self,
        entities: EntitiesRef,
        inst: ComponentInstanceRef,
    ) -> BridgeResult<()>;

    // --- Groups ---

    fn group_create(&self) -> BridgeResult<GroupRef>;
    fn group_name(&self, group: GroupRef) -> BridgeResult<String>;
    fn group_set_name(&self, group: GroupRef, name: &str) -> BridgeResult<()>;
    fn group_guid(&self, group: GroupRef) -> BridgeResult<String>;
    fn group_set_guid(&self, group: GroupRef, guid: &str) -> BridgeResult<()>;
    fn group_transform(&self, group: GroupRef) -> BridgeResult<[f64; 16]>;
    fn group_set_transform(&self, group: GroupRef, transform: &[f64; 16]) -> BridgeResult<()>;
    fn group_entities(&self, group: GroupRef) -> BridgeResult<EntitiesRef>;
    /// Takes ownership of the group.
    fn entities_add_group(&self, entities: EntitiesRef, group: GroupRef) -> BridgeResult<()>;

    // --- Faces, loops, vertices ---

    fn face_outer_loop(&self, face: FaceRef) -> BridgeResult<LoopRef>;
    fn face_normal(&self, face: FaceRef) -> BridgeResult<DVec3>;
    fn face_area(&self, face: FaceRef) -> BridgeResult<f64>;
    fn face_front_material(&self, face: FaceRef) -> BridgeResult<MaterialRef>;
    fn face_back_material(&self, face: FaceRef) -> BridgeResult<MaterialRef>;
    fn face_set_front_material(&self, face: FaceRef, material: MaterialRef) -> BridgeResult<()>;
    fn face_set_back_material(&self, face: FaceRef, material: MaterialRef) -> BridgeResult<()>;
    fn vertex_position(&self, vertex: VertexRef) -> BridgeResult<DVec3>;

    fn loop_input_create(&self) -> BridgeResult<LoopInputRef>;
    fn loop_input_add_vertex_index(&self, input: LoopInputRef, index: usize) -> BridgeResult<()>;
    /// Build a face from `points` bounded by `outer`.
    ///
    /// Consumes `outer` on success. On failure `outer` is still owned by the
    /// caller.
    fn face_create(&self, points: &[DVec3], outer: LoopInputRef) -> BridgeResult<FaceRef>;
    /// Cut a hole. Same ownership rule for `input` as [`Kernel::face_create`].
    fn face_add_inner_loop(
        &self,
        face: FaceRef,
        points: &[DVec3],
        input: LoopInputRef,
    ) -> BridgeResult<()>;
    /// Takes ownership of the faces.
    fn entities_add_faces(&self, entities: EntitiesRef, faces: &[FaceRef]) -> BridgeResult<()>;

    // --- Edges and curves ---

    fn edge_start(&self, edge: EdgeRef) -> BridgeResult<VertexRef>;
    fn edge_end(&self, edge: EdgeRef) -> BridgeResult<VertexRef>;
    fn edge_curve(&self, edge: EdgeRef) -> BridgeResult<CurveRef>;
    fn edge_create(&self, start: DVec3, end: DVec3) -> BridgeResult<EdgeRef>;
    fn curve_type(&self, curve: CurveRef) -> BridgeResult<CurveType>;
    /// Takes ownership of the edges.
    fn curve_create_with_edges(&self, edges: &[EdgeRef]) -> BridgeResult<CurveRef>;
    /// Takes ownership of the edges.
    fn entities_add_edges(&self, entities: EntitiesRef, edges: &[EdgeRef]) -> BridgeResult<()>;
    /// Takes ownership of the curves.
    fn entities_add_curves(&self, entities: EntitiesRef, curves: &[CurveRef]) -> BridgeResult<()>;

    // --- Openings ---

    fn opening_point_count(&self, opening: OpeningRef) -> BridgeResult<usize>;
    fn opening_points(&self, opening: OpeningRef, out: &mut [DVec3]) -> BridgeResult<usize>;

    // --- Triangulation helper ---

    fn mesh_helper_create(&self, face: FaceRef) -> BridgeResult<MeshHelperRef>;
    fn mesh_vertex_count(&self, helper: MeshHelperRef) -> BridgeResult<usize>;
    fn mesh_vertices(&self, helper: MeshHelperRef, out: &mut [DVec3]) -> BridgeResult<usize>;
    fn mesh_normals(&self, helper: MeshHelperRef, out: &mut [DVec3]) -> BridgeResult<usize>;
    /// Number of triangle corner indices (three per triangle).
    fn mesh_index_count(&self, helper: MeshHelperRef) -> BridgeResult<usize>;
    fn mesh_indices(&self, helper: MeshHelperRef, out: &mut [usize]) -> BridgeResult<usize>;

    // --- Materials and textures ---

    fn material_create(&self) -> BridgeResult<MaterialRef>;
    fn material_name(&self, material: MaterialRef) -> BridgeResult<String>;
    fn material_set_name(&self, material: MaterialRef, name: &str) -> BridgeResult<()>;
    fn material_color(&self, material: MaterialRef) -> BridgeResult<Color>;
    fn material_set_color(&self, material: MaterialRef, color: Color) -> BridgeResult<()>;
    fn material_opacity(&self, material: MaterialRef) -> BridgeResult<f64>;
    fn material_set_opacity(&self, material: MaterialRef, opacity: f64) -> BridgeResult<()>;
    fn material_use_opacity(&self, material: MaterialRef) -> BridgeResult<bool>;
    fn material_set_use_opacity(&self, material: MaterialRef, use_opacity: bool)
        -> BridgeResult<()>;
    fn material_type(&self, material: MaterialRef) -> BridgeResult<MaterialType>;
    fn material_set_type(&self, material: MaterialRef, ty: MaterialType) -> BridgeResult<()>;
    fn material_texture(&self, material: MaterialRef) -> BridgeResult<TextureRef>;
    /// Takes ownership of the texture.
    fn material_set_texture(&self, material: MaterialRef, texture: TextureRef)
        -> BridgeResult<()>;
    /// Takes ownership of the materials.
    fn model_add_materials(&self, model: ModelRef, materials: &[MaterialRef]) -> BridgeResult<()>;

    fn texture_create_from_file(
        &self,
        path: &Path,
        s_scale: f64,
        t_scale: f64,
    ) -> BridgeResult<TextureRef>;
    fn texture_file_name(&self, texture: TextureRef) -> BridgeResult<String>;
    fn texture_dimensions(&self, texture: TextureRef) -> BridgeResult<TextureDimensions>;
    fn texture_average_color(&self, texture: TextureRef) -> BridgeResult<Color>;
    fn texture_use_alpha(&self, texture: TextureRef) -> BridgeResult<bool>;

    // --- Layers ---

    fn layer_create(&self) -> BridgeResult<LayerRef>;
    fn layer_name(&self, layer: LayerRef) -> BridgeResult<String>;
    fn layer_set_name(&self, layer: LayerRef, name: &str) -> BridgeResult<()>;
    fn layer_visible(&self, layer: LayerRef) -> BridgeResult<bool>;
    fn layer_set_visible(&self, layer: LayerRef, visible: bool) -> BridgeResult<()>;
    /// Takes ownership of the layers.
    fn model_add_layers(&self, model: ModelRef, layers: &[LayerRef]) -> BridgeResult<()>;

    // --- Scenes and attributes (read-only) ---

    fn scene_name(&self, scene: SceneRef) -> BridgeResult<String>;
    fn dictionary_name(&self, dict: AttributeDictionaryRef) -> BridgeResult<String>;
    fn dictionary_key_count(&self, dict: AttributeDictionaryRef) -> BridgeResult<usize>;
    fn dictionary_keys(&self, dict: AttributeDictionaryRef, out: &mut [String])
        -> BridgeResult<usize>;
    fn dictionary_value(&self, dict: AttributeDictionaryRef, key: &str)
        -> BridgeResult<AttributeValue>;
}

/// Shared capacity check for `fetch`-style calls.
pub(crate) fn check_capacity(capacity: usize, actual: usize) -> BridgeResult<()> {
    if capacity < actual {
        Err(BridgeError::InsufficientCapacity { capacity, actual })
    } else {
        Ok(())
    }
}
