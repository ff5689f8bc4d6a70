//! SketchUp C API backend.
//!
//! Binds the `SketchUpAPI` library directly. Every SDK reference is a
//! struct wrapping one pointer, so all of them share [`SuRef`] here. The C
//! API cannot report the type behind an arbitrary pointer, so the kernel
//! records the type of every handle it hands out and answers
//! [`Kernel::ref_type`] from that table.
//!
//! Linking is set up by `build.rs` from `SKETCHUP_SDK_DIR`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_char, c_void, CString};
use std::path::Path;
use std::ptr;

use glam::DVec3;

use super::handle::kind::Kind;
use super::*;

// ============================================================================
// FFI Declarations
// ============================================================================

/// Any `SU*Ref` (matches `struct { void* ptr; }`)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct SuRef {
    ptr: *mut c_void,
}

impl SuRef {
    const NULL: Self = Self {
        ptr: ptr::null_mut(),
    };

    fn of(raw: RawRef) -> Self {
        Self {
            ptr: raw.get() as *mut c_void,
        }
    }

    fn raw(self) -> RawRef {
        RawRef::new(self.ptr as usize)
    }

    fn is_null(self) -> bool {
        self.ptr.is_null()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct SUPoint3D {
    x: f64,
    y: f64,
    z: f64,
}

impl From<DVec3> for SUPoint3D {
    fn from(p: DVec3) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}

impl From<SUPoint3D> for DVec3 {
    fn from(p: SUPoint3D) -> Self {
        DVec3::new(p.x, p.y, p.z)
    }
}

/// Same layout as a point
type SUVector3D = SUPoint3D;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct SUTransformation {
    values: [f64; 16],
}

/// `SUColor` is four bytes in RGBA order, identical to [`Color`].
type SUColor = Color;

/// C enums cross the boundary as `int`
type SUResult = i32;

const SU_ERROR_NONE: SUResult = 0;
const SU_ERROR_NULL_POINTER_INPUT: SUResult = 1;
const SU_ERROR_INVALID_INPUT: SUResult = 2;
const SU_ERROR_NULL_POINTER_OUTPUT: SUResult = 3;
const SU_ERROR_INVALID_OUTPUT: SUResult = 4;
const SU_ERROR_OVERWRITE_VALID: SUResult = 5;
const SU_ERROR_GENERIC: SUResult = 6;
const SU_ERROR_SERIALIZATION: SUResult = 7;
const SU_ERROR_OUT_OF_RANGE: SUResult = 8;
const SU_ERROR_NO_DATA: SUResult = 9;
const SU_ERROR_INSUFFICIENT_SIZE: SUResult = 10;
const SU_ERROR_MODEL_INVALID: SUResult = 12;
const SU_ERROR_MODEL_VERSION: SUResult = 13;
const SU_ERROR_UNSUPPORTED: SUResult = 17;
const SU_ERROR_INVALID_ARGUMENT: SUResult = 18;

// SURefType
const SU_REF_ATTRIBUTE_DICTIONARY: i32 = 1;
const SU_REF_COMPONENT_DEFINITION: i32 = 3;
const SU_REF_COMPONENT_INSTANCE: i32 = 4;
const SU_REF_CURVE: i32 = 5;
const SU_REF_EDGE: i32 = 6;
const SU_REF_FACE: i32 = 9;
const SU_REF_GROUP: i32 = 10;
const SU_REF_LAYER: i32 = 12;
const SU_REF_LOOP: i32 = 14;
const SU_REF_MATERIAL: i32 = 16;
const SU_REF_SCENE: i32 = 19;
const SU_REF_TEXTURE: i32 = 20;
const SU_REF_VERTEX: i32 = 24;
const SU_REF_ARC_CURVE: i32 = 32;

// SUMaterialType
const SU_MATERIAL_COLORED: i32 = 0;
const SU_MATERIAL_TEXTURED: i32 = 1;
const SU_MATERIAL_COLORIZED_TEXTURED: i32 = 2;

// SUCurveType
const SU_CURVE_ARC: i32 = 1;

// SUTypedValueType
const SU_TYPED_EMPTY: i32 = 0;
const SU_TYPED_BYTE: i32 = 1;
const SU_TYPED_SHORT: i32 = 2;
const SU_TYPED_INT32: i32 = 3;
const SU_TYPED_FLOAT: i32 = 4;
const SU_TYPED_DOUBLE: i32 = 5;
const SU_TYPED_BOOL: i32 = 6;
const SU_TYPED_TIME: i32 = 8;
const SU_TYPED_STRING: i32 = 9;

extern "C" {
    fn SUInitialize();
    fn SUTerminate();

    // strings
    fn SUStringCreate(out: *mut SuRef) -> SUResult;
    fn SUStringRelease(string: *mut SuRef) -> SUResult;
    fn SUStringGetUTF8Length(string: SuRef, out_length: *mut usize) -> SUResult;
    fn SUStringGetUTF8(
        string: SuRef,
        char_array_length: usize,
        out_char_array: *mut c_char,
        out_number_of_chars_copied: *mut usize,
    ) -> SUResult;

    // model
    fn SUModelCreate(model: *mut SuRef) -> SUResult;
    fn SUModelCreateFromFile(model: *mut SuRef, file_path: *const c_char) -> SUResult;
    fn SUModelSaveToFileWithVersion(
        model: SuRef,
        file_path: *const c_char,
        version: i32,
    ) -> SUResult;
    fn SUModelRelease(model: *mut SuRef) -> SUResult;
    fn SUModelGetEntities(model: SuRef, entities: *mut SuRef) -> SUResult;
    fn SUModelGetName(model: SuRef, name: *mut SuRef) -> SUResult;
    fn SUModelSetName(model: SuRef, name: *const c_char) -> SUResult;
    fn SUModelGetNumMaterials(model: SuRef, count: *mut usize) -> SUResult;
    fn SUModelGetMaterials(model: SuRef, len: usize, out: *mut SuRef, count: *mut usize)
        -> SUResult;
    fn SUModelGetNumLayers(model: SuRef, count: *mut usize) -> SUResult;
    fn SUModelGetLayers(model: SuRef, len: usize, out: *mut SuRef, count: *mut usize) -> SUResult;
    fn SUModelGetNumComponentDefinitions(model: SuRef, count: *mut usize) -> SUResult;
    fn SUModelGetComponentDefinitions(
        model: SuRef,
        len: usize,
        out: *mut SuRef,
        count: *mut usize,
    ) -> SUResult;
    fn SUModelGetNumScenes(model: SuRef, count: *mut usize) -> SUResult;
    fn SUModelGetScenes(model: SuRef, len: usize, out: *mut SuRef, count: *mut usize) -> SUResult;
    fn SUModelAddComponentDefinitions(model: SuRef, len: usize, defs: *const SuRef) -> SUResult;
    fn SUModelAddMaterials(model: SuRef, len: usize, materials: *const SuRef) -> SUResult;
    fn SUModelAddLayers(model: SuRef, len: usize, layers: *const SuRef) -> SUResult;

    // entities
    fn SUEntitiesGetNumFaces(entities: SuRef, count: *mut usize) -> SUResult;
    fn SUEntitiesGetFaces(entities: SuRef, len: usize, out: *mut SuRef, count: *mut usize)
        -> SUResult;
    fn SUEntitiesGetNumEdges(entities: SuRef, standalone_only: bool, count: *mut usize)
        -> SUResult;
    fn SUEntitiesGetEdges(
        entities: SuRef,
        standalone_only: bool,
        len: usize,
        out: *mut SuRef,
        count: *mut usize,
    ) -> SUResult;
    fn SUEntitiesGetNumCurves(entities: SuRef, count: *mut usize) -> SUResult;
    fn SUEntitiesGetCurves(entities: SuRef, len: usize, out: *mut SuRef, count: *mut usize)
        -> SUResult;
    fn SUEntitiesGetNumGroups(entities: SuRef, count: *mut usize) -> SUResult;
    fn SUEntitiesGetGroups(entities: SuRef, len: usize, out: *mut SuRef, count: *mut usize)
        -> SUResult;
    fn SUEntitiesGetNumInstances(entities: SuRef, count: *mut usize) -> SUResult;
    fn SUEntitiesGetInstances(
        entities: SuRef,
        len: usize,
        out: *mut SuRef,
        count: *mut usize,
    ) -> SUResult;
    fn SUEntitiesAddFaces(entities: SuRef, len: usize, faces: *const SuRef) -> SUResult;
    fn SUEntitiesAddEdges(entities: SuRef, len: usize, edges: *const SuRef) -> SUResult;
    fn SUEntitiesAddCurves(entities: SuRef, len: usize, curves: *const SuRef) -> SUResult;
    fn SUEntitiesAddGroup(entities: SuRef, group: SuRef) -> SUResult;
    fn SUEntitiesAddInstance(entities: SuRef, instance: SuRef, name: *mut SuRef) -> SUResult;

    // entity and drawing element
    fn SUEntityGetType(entity: SuRef) -> i32;
    fn SUEntityGetPersistentID(entity: SuRef, pid: *mut i64) -> SUResult;
    fn SUEntityGetNumAttributeDictionaries(entity: SuRef, count: *mut usize) -> SUResult;
    fn SUEntityGetAttributeDictionaries(
        entity: SuRef,
        len: usize,
        out: *mut SuRef,
        count: *mut usize,
    ) -> SUResult;
    fn SUDrawingElementGetLayer(element: SuRef, layer: *mut SuRef) -> SUResult;
    fn SUDrawingElementSetLayer(element: SuRef, layer: SuRef) -> SUResult;
    fn SUDrawingElementGetMaterial(element: SuRef, material: *mut SuRef) -> SUResult;
    fn SUDrawingElementSetMaterial(element: SuRef, material: SuRef) -> SUResult;

    // component definitions and instances
    fn SUComponentDefinitionCreate(def: *mut SuRef) -> SUResult;
    fn SUComponentDefinitionRelease(def: *mut SuRef) -> SUResult;
    fn SUComponentDefinitionGetName(def: SuRef, name: *mut SuRef) -> SUResult;
    fn SUComponentDefinitionSetName(def: SuRef, name: *const c_char) -> SUResult;
    fn SUComponentDefinitionGetGuid(def: SuRef, guid: *mut SuRef) -> SUResult;
    fn SUComponentDefinitionGetDescription(def: SuRef, desc: *mut SuRef) -> SUResult;
    fn SUComponentDefinitionSetDescription(def: SuRef, desc: *const c_char) -> SUResult;
    fn SUComponentDefinitionGetEntities(def: SuRef, entities: *mut SuRef) -> SUResult;
    fn SUComponentDefinitionCreateInstance(def: SuRef, instance: *mut SuRef) -> SUResult;
    fn SUComponentInstanceRelease(instance: *mut SuRef) -> SUResult;
    fn SUComponentInstanceGetDefinition(instance: SuRef, def: *mut SuRef) -> SUResult;
    fn SUComponentInstanceGetName(instance: SuRef, name: *mut SuRef) -> SUResult;
    fn SUComponentInstanceSetName(instance: SuRef, name: *const c_char) -> SUResult;
    fn SUComponentInstanceGetGuid(instance: SuRef, guid: *mut SuRef) -> SUResult;
    fn SUComponentInstanceSetGuid(instance: SuRef, guid: *const c_char) -> SUResult;
    fn SUComponentInstanceGetTransform(instance: SuRef, t: *mut SUTransformation) -> SUResult;
    fn SUComponentInstanceSetTransform(instance: SuRef, t: *const SUTransformation) -> SUResult;

    // groups
    fn SUGroupCreate(group: *mut SuRef) -> SUResult;
    fn SUGroupGetName(group: SuRef, name: *mut SuRef) -> SUResult;
    fn SUGroupSetName(group: SuRef, name: *const c_char) -> SUResult;
    fn SUGroupGetGuid(group: SuRef, guid: *mut SuRef) -> SUResult;
    fn SUGroupSetGuid(group: SuRef, guid: *const c_char) -> SUResult;
    fn SUGroupGetTransform(group: SuRef, t: *mut SUTransformation) -> SUResult;
    fn SUGroupSetTransform(group: SuRef, t: *const SUTransformation) -> SUResult;
    fn SUGroupGetEntities(group: SuRef, entities: *mut SuRef) -> SUResult;

    // faces, loops, vertices
    fn SUFaceCreate(face: *mut SuRef, vertices: *const SUPoint3D, outer: *mut SuRef) -> SUResult;
    fn SUFaceAddInnerLoop(face: SuRef, vertices: *const SUPoint3D, input: *mut SuRef)
        -> SUResult;
    fn SUFaceRelease(face: *mut SuRef) -> SUResult;
    fn SUFaceGetOuterLoop(face: SuRef, lp: *mut SuRef) -> SUResult;
    fn SUFaceGetNormal(face: SuRef, normal: *mut SUVector3D) -> SUResult;
    fn SUFaceGetArea(face: SuRef, area: *mut f64) -> SUResult;
    fn SUFaceGetFrontMaterial(face: SuRef, material: *mut SuRef) -> SUResult;
    fn SUFaceGetBackMaterial(face: SuRef, material: *mut SuRef) -> SUResult;
    fn SUFaceSetFrontMaterial(face: SuRef, material: SuRef) -> SUResult;
    fn SUFaceSetBackMaterial(face: SuRef, material: SuRef) -> SUResult;
    fn SUFaceGetNumVertices(face: SuRef, count: *mut usize) -> SUResult;
    fn SUFaceGetVertices(face: SuRef, len: usize, out: *mut SuRef, count: *mut usize) -> SUResult;
    fn SUFaceGetNumInnerLoops(face: SuRef, count: *mut usize) -> SUResult;
    fn SUFaceGetInnerLoops(face: SuRef, len: usize, out: *mut SuRef, count: *mut usize)
        -> SUResult;
    fn SUFaceGetNumOpenings(face: SuRef, count: *mut usize) -> SUResult;
    fn SUFaceGetOpenings(face: SuRef, len: usize, out: *mut SuRef, count: *mut usize) -> SUResult;
    fn SULoopGetNumVertices(lp: SuRef, count: *mut usize) -> SUResult;
    fn SULoopGetEdges(lp: SuRef, len: usize, out: *mut SuRef, count: *mut usize) -> SUResult;
    fn SULoopInputCreate(input: *mut SuRef) -> SUResult;
    fn SULoopInputRelease(input: *mut SuRef) -> SUResult;
    fn SULoopInputAddVertexIndex(input: SuRef, index: usize) -> SUResult;
    fn SUVertexGetPosition(vertex: SuRef, position: *mut SUPoint3D) -> SUResult;

    // openings
    fn SUOpeningRelease(opening: *mut SuRef) -> SUResult;
    fn SUOpeningGetNumPoints(opening: SuRef, count: *mut usize) -> SUResult;
    fn SUOpeningGetPoints(
        opening: SuRef,
        len: usize,
        out: *mut SUPoint3D,
        count: *mut usize,
    ) -> SUResult;

    // edges and curves
    fn SUEdgeCreate(edge: *mut SuRef, start: *const SUPoint3D, end: *const SUPoint3D)
        -> SUResult;
    fn SUEdgeRelease(edge: *mut SuRef) -> SUResult;
    fn SUEdgeGetStartVertex(edge: SuRef, vertex: *mut SuRef) -> SUResult;
    fn SUEdgeGetEndVertex(edge: SuRef, vertex: *mut SuRef) -> SUResult;
    fn SUEdgeGetCurve(edge: SuRef, curve: *mut SuRef) -> SUResult;
    fn SUCurveCreateWithEdges(curve: *mut SuRef, edges: *const SuRef, len: usize) -> SUResult;
    fn SUCurveRelease(curve: *mut SuRef) -> SUResult;
    fn SUCurveGetType(curve: SuRef, ty: *mut i32) -> SUResult;
    fn SUCurveGetNumEdges(curve: SuRef, count: *mut usize) -> SUResult;
    fn SUCurveGetEdges(curve: SuRef, len: usize, out: *mut SuRef, count: *mut usize) -> SUResult;

    // mesh helper
    fn SUMeshHelperCreate(helper: *mut SuRef, face: SuRef) -> SUResult;
    fn SUMeshHelperRelease(helper: *mut SuRef) -> SUResult;
    fn SUMeshHelperGetNumVertices(helper: SuRef, count: *mut usize) -> SUResult;
    fn SUMeshHelperGetNumTriangles(helper: SuRef, count: *mut usize) -> SUResult;
    fn SUMeshHelperGetVertices(
        helper: SuRef,
        len: usize,
        out: *mut SUPoint3D,
        count: *mut usize,
    ) -> SUResult;
    fn SUMeshHelperGetNormals(
        helper: SuRef,
        len: usize,
        out: *mut SUVector3D,
        count: *mut usize,
    ) -> SUResult;
    fn SUMeshHelperGetVertexIndices(
        helper: SuRef,
        len: usize,
        out: *mut usize,
        count: *mut usize,
    ) -> SUResult;

    // materials and textures
    fn SUMaterialCreate(material: *mut SuRef) -> SUResult;
    fn SUMaterialRelease(material: *mut SuRef) -> SUResult;
    fn SUMaterialGetName(material: SuRef, name: *mut SuRef) -> SUResult;
    fn SUMaterialSetName(material: SuRef, name: *const c_char) -> SUResult;
    fn SUMaterialGetColor(material: SuRef, color: *mut SUColor) -> SUResult;
    fn SUMaterialSetColor(material: SuRef, color: *const SUColor) -> SUResult;
    fn SUMaterialGetOpacity(material: SuRef, alpha: *mut f64) -> SUResult;
    fn SUMaterialSetOpacity(material: SuRef, alpha: f64) -> SUResult;
    fn SUMaterialGetUseOpacity(material: SuRef, use_opacity: *mut bool) -> SUResult;
    fn SUMaterialSetUseOpacity(material: SuRef, use_opacity: bool) -> SUResult;
    fn SUMaterialGetType(material: SuRef, ty: *mut i32) -> SUResult;
    fn SUMaterialSetType(material: SuRef, ty: i32) -> SUResult;
    fn SUMaterialGetTexture(material: SuRef, texture: *mut SuRef) -> SUResult;
    fn SUMaterialSetTexture(material: SuRef, texture: SuRef) -> SUResult;
    fn SUTextureCreateFromFile(
        texture: *mut SuRef,
        file_path: *const c_char,
        s_scale: f64,
        t_scale: f64,
    ) -> SUResult;
    fn SUTextureRelease(texture: *mut SuRef) -> SUResult;
    fn SUTextureGetFileName(texture: SuRef, name: *mut SuRef) -> SUResult;
    fn SUTextureGetDimensions(
        texture: SuRef,
        width: *mut usize,
        height: *mut usize,
        s_scale: *mut f64,
        t_scale: *mut f64,
    ) -> SUResult;
    fn SUTextureGetAverageColor(texture: SuRef, color: *mut SUColor) -> SUResult;
    fn SUTextureGetUseAlphaChannel(texture: SuRef, alpha: *mut bool) -> SUResult;

    // layers
    fn SULayerCreate(layer: *mut SuRef) -> SUResult;
    fn SULayerRelease(layer: *mut SuRef) -> SUResult;
    fn SULayerGetName(layer: SuRef, name: *mut SuRef) -> SUResult;
    fn SULayerSetName(layer: SuRef, name: *const c_char) -> SUResult;
    fn SULayerGetVisibility(layer: SuRef, visible: *mut bool) -> SUResult;
    fn SULayerSetVisibility(layer: SuRef, visible: bool) -> SUResult;

    // scenes and attributes
    fn SUSceneGetName(scene: SuRef, name: *mut SuRef) -> SUResult;
    fn SUSceneGetNumHiddenEntities(scene: SuRef, count: *mut usize) -> SUResult;
    fn SUSceneGetHiddenEntities(
        scene: SuRef,
        len: usize,
        out: *mut SuRef,
        count: *mut usize,
    ) -> SUResult;
    fn SUAttributeDictionaryGetName(dict: SuRef, name: *mut SuRef) -> SUResult;
    fn SUAttributeDictionaryGetNumKeys(dict: SuRef, count: *mut usize) -> SUResult;
    fn SUAttributeDictionaryGetKeys(
        dict: SuRef,
        len: usize,
        keys: *mut SuRef,
        count: *mut usize,
    ) -> SUResult;
    fn SUAttributeDictionaryGetValue(
        dict: SuRef,
        key: *const c_char,
        value: *mut SuRef,
    ) -> SUResult;

    // typed values
    fn SUTypedValueCreate(value: *mut SuRef) -> SUResult;
    fn SUTypedValueRelease(value: *mut SuRef) -> SUResult;
    fn SUTypedValueGetType(value: SuRef, ty: *mut i32) -> SUResult;
    fn SUTypedValueGetByte(value: SuRef, out: *mut c_char) -> SUResult;
    fn SUTypedValueGetInt16(value: SuRef, out: *mut i16) -> SUResult;
    fn SUTypedValueGetInt32(value: SuRef, out: *mut i32) -> SUResult;
    fn SUTypedValueGetFloat(value: SuRef, out: *mut f32) -> SUResult;
    fn SUTypedValueGetDouble(value: SuRef, out: *mut f64) -> SUResult;
    fn SUTypedValueGetBool(value: SuRef, out: *mut bool) -> SUResult;
    fn SUTypedValueGetTime(value: SuRef, out: *mut i64) -> SUResult;
    fn SUTypedValueGetString(value: SuRef, out: *mut SuRef) -> SUResult;
}

// ============================================================================
// Conversions
// ============================================================================

fn check(code: SUResult) -> BridgeResult<()> {
    match code {
        SU_ERROR_NONE => Ok(()),
        SU_ERROR_NULL_POINTER_INPUT | SU_ERROR_NULL_POINTER_OUTPUT => {
            Err(BridgeError::NullPointer)
        }
        SU_ERROR_INVALID_INPUT | SU_ERROR_INVALID_ARGUMENT => {
            Err(BridgeError::InvalidInput(format!("SUResult {}", code)))
        }
        SU_ERROR_INVALID_OUTPUT | SU_ERROR_OVERWRITE_VALID => Err(BridgeError::InvalidHandle),
        SU_ERROR_SERIALIZATION => Err(BridgeError::Serialization(
            "the kernel could not write the file".into(),
        )),
        SU_ERROR_OUT_OF_RANGE => Err(BridgeError::OutOfRange),
        SU_ERROR_NO_DATA => Err(BridgeError::NoData),
        SU_ERROR_INSUFFICIENT_SIZE => Err(BridgeError::InsufficientCapacity {
            capacity: 0,
            actual: 0,
        }),
        SU_ERROR_MODEL_INVALID => Err(BridgeError::ModelInvalid),
        SU_ERROR_MODEL_VERSION => Err(BridgeError::ModelVersion),
        SU_ERROR_UNSUPPORTED => Err(BridgeError::Unsupported("rejected by the kernel")),
        SU_ERROR_GENERIC => Err(BridgeError::Generic("generic kernel failure".into())),
        other => Err(BridgeError::Generic(format!("SUResult {}", other))),
    }
}

/// Map `SUEntityGetType` output onto [`RefType`].
fn ref_type_of(su_type: i32) -> RefType {
    match su_type {
        SU_REF_ATTRIBUTE_DICTIONARY => RefType::AttributeDictionary,
        SU_REF_COMPONENT_DEFINITION => RefType::ComponentDefinition,
        SU_REF_COMPONENT_INSTANCE => RefType::ComponentInstance,
        SU_REF_CURVE | SU_REF_ARC_CURVE => RefType::Curve,
        SU_REF_EDGE => RefType::Edge,
        SU_REF_FACE => RefType::Face,
        SU_REF_GROUP => RefType::Group,
        SU_REF_LAYER => RefType::Layer,
        SU_REF_LOOP => RefType::Loop,
        SU_REF_MATERIAL => RefType::Material,
        SU_REF_SCENE => RefType::Scene,
        SU_REF_TEXTURE => RefType::Texture,
        SU_REF_VERTEX => RefType::Vertex,
        _ => RefType::Unknown,
    }
}

/// Element type of a collection; `None` when it is heterogeneous.
fn item_type(collection: Collection) -> Option<RefType> {
    Some(match collection {
        Collection::Materials => RefType::Material,
        Collection::Layers => RefType::Layer,
        Collection::ComponentDefinitions => RefType::ComponentDefinition,
        Collection::Scenes => RefType::Scene,
        Collection::Faces => RefType::Face,
        Collection::Edges | Collection::LoopEdges | Collection::CurveEdges => RefType::Edge,
        Collection::Curves => RefType::Curve,
        Collection::Groups => RefType::Group,
        Collection::Instances => RefType::ComponentInstance,
        Collection::FaceVertices => RefType::Vertex,
        Collection::InnerLoops => RefType::Loop,
        Collection::Openings => RefType::Opening,
        Collection::AttributeDictionaries => RefType::AttributeDictionary,
        Collection::HiddenEntities => return None,
    })
}

fn su_version(version: ModelVersion) -> i32 {
    match version {
        ModelVersion::V2013 => 6,
        ModelVersion::V2014 => 7,
        ModelVersion::V2015 => 8,
        ModelVersion::V2016 => 9,
        ModelVersion::V2017 => 10,
        ModelVersion::V2018 => 11,
        ModelVersion::V2019 => 12,
        ModelVersion::V2020 => 13,
        ModelVersion::V2021 => 14,
    }
}

fn c_string(value: &str) -> BridgeResult<CString> {
    CString::new(value)
        .map_err(|_| BridgeError::InvalidInput(format!("interior NUL in {:?}", value)))
}

fn c_path(path: &Path) -> BridgeResult<CString> {
    let s = path
        .to_str()
        .ok_or_else(|| BridgeError::InvalidInput(format!("non UTF-8 path {}", path.display())))?;
    c_string(s)
}

fn to_points(points: &[DVec3]) -> Vec<SUPoint3D> {
    points.iter().map(|&p| p.into()).collect()
}

/// Owned `SUStringRef`, released on drop.
struct SuString(SuRef);

impl SuString {
    fn new() -> BridgeResult<Self> {
        let mut s = SuRef::NULL;
        check(unsafe { SUStringCreate(&mut s) })?;
        Ok(Self(s))
    }

    fn read(&self) -> BridgeResult<String> {
        let mut len = 0usize;
        check(unsafe { SUStringGetUTF8Length(self.0, &mut len) })?;
        let mut buf = vec![0u8; len + 1];
        let mut copied = 0usize;
        check(unsafe {
            SUStringGetUTF8(self.0, buf.len(), buf.as_mut_ptr() as *mut c_char, &mut copied)
        })?;
        buf.truncate(copied.min(len));
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl Drop for SuString {
    fn drop(&mut self) {
        unsafe {
            SUStringRelease(&mut self.0);
        }
    }
}

/// Run a getter that fills an `SUStringRef`.
fn read_string(get: impl FnOnce(*mut SuRef) -> SUResult) -> BridgeResult<String> {
    let mut s = SuString::new()?;
    let out: *mut SuRef = &mut s.0;
    check(get(out))?;
    s.read()
}

/// Owned `SUTypedValueRef`, released on drop.
struct TypedValue(SuRef);

impl TypedValue {
    fn new() -> BridgeResult<Self> {
        let mut v = SuRef::NULL;
        check(unsafe { SUTypedValueCreate(&mut v) })?;
        Ok(Self(v))
    }

    fn read(&self) -> BridgeResult<AttributeValue> {
        let v = self.0;
        let mut ty = 0i32;
        check(unsafe { SUTypedValueGetType(v, &mut ty) })?;

        let value = match ty {
            SU_TYPED_EMPTY => AttributeValue::Empty,
            SU_TYPED_BYTE => {
                let mut b: c_char = 0;
                check(unsafe { SUTypedValueGetByte(v, &mut b) })?;
                AttributeValue::Int(b as i64)
            }
            SU_TYPED_SHORT => {
                let mut n = 0i16;
                check(unsafe { SUTypedValueGetInt16(v, &mut n) })?;
                AttributeValue::Int(n as i64)
            }
            SU_TYPED_INT32 => {
                let mut n = 0i32;
                check(unsafe { SUTypedValueGetInt32(v, &mut n) })?;
                AttributeValue::Int(n as i64)
            }
            SU_TYPED_TIME => {
                let mut n = 0i64;
                check(unsafe { SUTypedValueGetTime(v, &mut n) })?;
                AttributeValue::Int(n)
            }
            SU_TYPED_FLOAT => {
                let mut x = 0f32;
                check(unsafe { SUTypedValueGetFloat(v, &mut x) })?;
                AttributeValue::Double(x as f64)
            }
            SU_TYPED_DOUBLE => {
                let mut x = 0f64;
                check(unsafe { SUTypedValueGetDouble(v, &mut x) })?;
                AttributeValue::Double(x)
            }
            SU_TYPED_BOOL => {
                let mut b = false;
                check(unsafe { SUTypedValueGetBool(v, &mut b) })?;
                AttributeValue::Bool(b)
            }
            SU_TYPED_STRING => {
                AttributeValue::String(read_string(|s| unsafe { SUTypedValueGetString(v, s) })?)
            }
            other => {
                log::debug!("Attribute value of type {} read as empty", other);
                AttributeValue::Empty
            }
        };
        Ok(value)
    }
}

impl Drop for TypedValue {
    fn drop(&mut self) {
        unsafe {
            SUTypedValueRelease(&mut self.0);
        }
    }
}

// ============================================================================
// NativeKernel
// ============================================================================

/// [`Kernel`] over the SketchUp C API.
#[derive(Debug, Default)]
pub struct NativeKernel {
    /// Every pointer handed out, with its concrete type
    handles: RefCell<HashMap<usize, RefType>>,
}

impl NativeKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer behind `r`, if it is live and of an acceptable kind.
    fn handle<T: Kind>(&self, r: Ref<T>) -> BridgeResult<SuRef> {
        if T::accepts(self.ref_type(r.raw())) {
            Ok(SuRef::of(r.raw()))
        } else {
            Err(BridgeError::InvalidHandle)
        }
    }

    fn track_raw(&self, su: SuRef, ty: RefType) -> RawRef {
        if !su.is_null() {
            self.handles.borrow_mut().insert(su.ptr as usize, ty);
        }
        su.raw()
    }

    fn track<T: Kind>(&self, su: SuRef, ty: RefType) -> Ref<T> {
        Ref::from_raw(self.track_raw(su, ty))
    }

    /// Result of a `*Create` call.
    fn created<T: Kind>(&self, code: SUResult, su: SuRef, ty: RefType) -> BridgeResult<Ref<T>> {
        check(code)?;
        if su.is_null() {
            return Err(BridgeError::NullPointer);
        }
        Ok(self.track(su, ty))
    }

    /// Result of a getter for a link that may be absent.
    fn optional<T: Kind>(&self, code: SUResult, su: SuRef, ty: RefType) -> BridgeResult<Ref<T>> {
        if code == SU_ERROR_NO_DATA || (code == SU_ERROR_NONE && su.is_null()) {
            return Ok(Ref::invalid());
        }
        check(code)?;
        Ok(self.track(su, ty))
    }

    /// Result of a getter for a link that always exists.
    fn linked<T: Kind>(&self, code: SUResult, su: SuRef, ty: RefType) -> BridgeResult<Ref<T>> {
        check(code)?;
        if su.is_null() {
            return Err(BridgeError::NoData);
        }
        Ok(self.track(su, ty))
    }

    fn forget(&self, raw: RawRef) {
        self.handles.borrow_mut().remove(&raw.get());
    }

    fn handles_of<T: Kind>(&self, refs: &[Ref<T>]) -> BridgeResult<Vec<SuRef>> {
        refs.iter().map(|&r| self.handle(r)).collect()
    }

    fn set_string(
        &self,
        value: &str,
        set: impl FnOnce(*const c_char) -> SUResult,
    ) -> BridgeResult<()> {
        let value = c_string(value)?;
        check(set(value.as_ptr()))
    }

    fn read_points(
        &self,
        count: usize,
        out: &mut [DVec3],
        get: impl FnOnce(usize, *mut SUPoint3D, *mut usize) -> SUResult,
    ) -> BridgeResult<usize> {
        check_capacity(out.len(), count)?;
        let mut buf = vec![SUPoint3D::default(); count];
        let mut written = 0usize;
        let w: *mut usize = &mut written;
        check(get(count, buf.as_mut_ptr(), w))?;
        for (slot, p) in out.iter_mut().zip(&buf[..written]) {
            *slot = (*p).into();
        }
        Ok(written)
    }
}

impl Kernel for NativeKernel {
    // --- Session and validity ---

    fn initialize(&self) -> BridgeResult<()> {
        unsafe { SUInitialize() };
        log::debug!("SketchUp API initialized");
        Ok(())
    }

    fn terminate(&self) {
        self.handles.borrow_mut().clear();
        unsafe { SUTerminate() };
        log::debug!("SketchUp API terminated");
    }

    fn is_valid(&self, raw: RawRef) -> bool {
        !raw.is_null() && self.handles.borrow().contains_key(&raw.get())
    }

    fn ref_type(&self, raw: RawRef) -> RefType {
        self.handles
            .borrow()
            .get(&raw.get())
            .copied()
            .unwrap_or(RefType::Unknown)
    }

    fn release(&self, raw: RawRef) -> BridgeResult<()> {
        let mut su = SuRef::of(raw);
        let code = unsafe {
            match self.ref_type(raw) {
                RefType::Model => return self.model_release(Ref::from_raw(raw)),
                RefType::Face => SUFaceRelease(&mut su),
                RefType::Edge => SUEdgeRelease(&mut su),
                RefType::Curve => SUCurveRelease(&mut su),
                RefType::Material => SUMaterialRelease(&mut su),
                RefType::Texture => SUTextureRelease(&mut su),
                RefType::Layer => SULayerRelease(&mut su),
                RefType::ComponentDefinition => SUComponentDefinitionRelease(&mut su),
                RefType::ComponentInstance => SUComponentInstanceRelease(&mut su),
                RefType::LoopInput => SULoopInputRelease(&mut su),
                RefType::MeshHelper => SUMeshHelperRelease(&mut su),
                RefType::Opening => SUOpeningRelease(&mut su),
                RefType::Group => return Err(BridgeError::Unsupported("releasing a group")),
                RefType::Unknown => return Err(BridgeError::InvalidHandle),
                _ => return Err(BridgeError::Unsupported("releasing a borrowed object")),
            }
        };
        check(code)?;
        self.forget(raw);
        Ok(())
    }

    // --- Two-phase collections ---

    fn count(&self, source: RawRef, collection: Collection) -> BridgeResult<usize> {
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
        let s = SuRef::of(source);
        let mut n = 0usize;
        let code = unsafe {
            match collection {
                Collection::Materials => SUModelGetNumMaterials(s, &mut n),
                Collection::Layers => SUModelGetNumLayers(s, &mut n),
                Collection::ComponentDefinitions => SUModelGetNumComponentDefinitions(s, &mut n),
                Collection::Scenes => SUModelGetNumScenes(s, &mut n),
                Collection::Faces => SUEntitiesGetNumFaces(s, &mut n),
                Collection::Edges => SUEntitiesGetNumEdges(s, true, &mut n),
                Collection::Curves => SUEntitiesGetNumCurves(s, &mut n),
                Collection::Groups => SUEntitiesGetNumGroups(s, &mut n),
                Collection::Instances => SUEntitiesGetNumInstances(s, &mut n),
                Collection::FaceVertices => SUFaceGetNumVertices(s, &mut n),
                Collection::InnerLoops => SUFaceGetNumInnerLoops(s, &mut n),
                Collection::Openings => SUFaceGetNumOpenings(s, &mut n),
                // a closed loop has as many edges as vertices
                Collection::LoopEdges => SULoopGetNumVertices(s, &mut n),
                Collection::CurveEdges => SUCurveGetNumEdges(s, &mut n),
                Collection::AttributeDictionaries => SUEntityGetNumAttributeDictionaries(s, &mut n),
                Collection::HiddenEntities => SUSceneGetNumHiddenEntities(s, &mut n),
            }
        };
        check(code)?;
        Ok(n)
    }

    fn fetch(
        &self,
        source: RawRef,
        collection: Collection,
        out: &mut [RawRef],
    ) -> BridgeResult<usize> {
        let actual = self.count(source, collection)?;
        check_capacity(out.len(), actual)?;

        let s = SuRef::of(source);
        let mut buf = vec![SuRef::NULL; actual];
        let p = buf.as_mut_ptr();
        let mut written = 0usize;
        let w = &mut written;
        let code = unsafe {
            match collection {
                Collection::Materials => SUModelGetMaterials(s, actual, p, w),
                Collection::Layers => SUModelGetLayers(s, actual, p, w),
                Collection::ComponentDefinitions => {
                    SUModelGetComponentDefinitions(s, actual, p, w)
                }
                Collection::Scenes => SUModelGetScenes(s, actual, p, w),
                Collection::Faces => SUEntitiesGetFaces(s, actual, p, w),
                Collection::Edges => SUEntitiesGetEdges(s, true, actual, p, w),
                Collection::Curves => SUEntitiesGetCurves(s, actual, p, w),
                Collection::Groups => SUEntitiesGetGroups(s, actual, p, w),
                Collection::Instances => SUEntitiesGetInstances(s, actual, p, w),
                Collection::FaceVertices => SUFaceGetVertices(s, actual, p, w),
                Collection::InnerLoops => SUFaceGetInnerLoops(s, actual, p, w),
                Collection::Openings => SUFaceGetOpenings(s, actual, p, w),
                Collection::LoopEdges => SULoopGetEdges(s, actual, p, w),
                Collection::CurveEdges => SUCurveGetEdges(s, actual, p, w),
                Collection::AttributeDictionaries => {
                    SUEntityGetAttributeDictionaries(s, actual, p, w)
                }
                Collection::HiddenEntities => SUSceneGetHiddenEntities(s, actual, p, w),
            }
        };
        check(code)?;

        let fixed = item_type(collection);
        for (slot, &su) in out.iter_mut().zip(&buf[..written]) {
            let ty = match fixed {
                Some(ty) => ty,
                None => ref_type_of(unsafe { SUEntityGetType(su) }),
            };
            *slot = self.track_raw(su, ty);
        }
        Ok(written)
    }

    // --- Model ---

    fn model_create(&self) -> BridgeResult<ModelRef> {
        let mut model = SuRef::NULL;
        let code = unsafe { SUModelCreate(&mut model) };
        self.created(code, model, RefType::Model)
    }

    fn model_open(&self, path: &Path) -> BridgeResult<ModelRef> {
        if !path.exists() {
            return Err(BridgeError::FileNotFound(path.display().to_string()));
        }
        let file = c_path(path)?;
        let mut model = SuRef::NULL;
        let code = unsafe { SUModelCreateFromFile(&mut model, file.as_ptr()) };
        self.created(code, model, RefType::Model)
    }

    fn model_save(&self, model: ModelRef, path: &Path, version: ModelVersion) -> BridgeResult<()> {
        let m = self.handle(model)?;
        let file = c_path(path)?;
        check(unsafe { SUModelSaveToFileWithVersion(m, file.as_ptr(), su_version(version)) })
    }

    fn model_release(&self, model: ModelRef) -> BridgeResult<()> {
        let mut m = self.handle(model)?;
        check(unsafe { SUModelRelease(&mut m) })?;
        // everything reached through the model died with it
        self.handles
            .borrow_mut()
            .retain(|&ptr, ty| *ty == RefType::Model && ptr != model.raw().get());
        Ok(())
    }

    fn model_entities(&self, model: ModelRef) -> BridgeResult<EntitiesRef> {
        let m = self.handle(model)?;
        let mut entities = SuRef::NULL;
        let code = unsafe { SUModelGetEntities(m, &mut entities) };
        self.linked(code, entities, RefType::Entities)
    }

    fn model_name(&self, model: ModelRef) -> BridgeResult<String> {
        let m = self.handle(model)?;
        read_string(|s| unsafe { SUModelGetName(m, s) })
    }

    fn model_set_name(&self, model: ModelRef, name: &str) -> BridgeResult<()> {
        let m = self.handle(model)?;
        self.set_string(name, |n| unsafe { SUModelSetName(m, n) })
    }

    // --- Entity / drawing element ---

    fn entity_persistent_id(&self, entity: EntityRef) -> BridgeResult<i64> {
        let e = self.handle(entity)?;
        let mut pid = 0i64;
        check(unsafe { SUEntityGetPersistentID(e, &mut pid) })?;
        Ok(pid)
    }

    fn element_layer(&self, element: DrawingElementRef) -> BridgeResult<LayerRef> {
        let e = self.handle(element)?;
        let mut layer = SuRef::NULL;
        let code = unsafe { SUDrawingElementGetLayer(e, &mut layer) };
        self.optional(code, layer, RefType::Layer)
    }

    fn element_material(&self, element: DrawingElementRef) -> BridgeResult<MaterialRef> {
        let e = self.handle(element)?;
        let mut material = SuRef::NULL;
        let code = unsafe { SUDrawingElementGetMaterial(e, &mut material) };
        self.optional(code, material, RefType::Material)
    }

    fn element_set_layer(&self, element: DrawingElementRef, layer: LayerRef) -> BridgeResult<()> {
        let e = self.handle(element)?;
        let l = self.handle(layer)?;
        check(unsafe { SUDrawingElementSetLayer(e, l) })
    }

    fn element_set_material(
        &self,
        element: DrawingElementRef,
        material: MaterialRef,
    ) -> BridgeResult<()> {
        let e = self.handle(element)?;
        let m = self.handle(material)?;
        check(unsafe { SUDrawingElementSetMaterial(e, m) })
    }

    // --- Component definitions ---

    fn definition_create(&self) -> BridgeResult<ComponentDefinitionRef> {
        let mut def = SuRef::NULL;
        let code = unsafe { SUComponentDefinitionCreate(&mut def) };
        self.created(code, def, RefType::ComponentDefinition)
    }

    fn definition_name(&self, def: ComponentDefinitionRef) -> BridgeResult<String> {
        let d = self.handle(def)?;
        read_string(|s| unsafe { SUComponentDefinitionGetName(d, s) })
    }

    fn definition_set_name(&self, def: ComponentDefinitionRef, name: &str) -> BridgeResult<()> {
        let d = self.handle(def)?;
        self.set_string(name, |n| unsafe { SUComponentDefinitionSetName(d, n) })
    }

    fn definition_guid(&self, def: ComponentDefinitionRef) -> BridgeResult<String> {
        let d = self.handle(def)?;
        read_string(|s| unsafe { SUComponentDefinitionGetGuid(d, s) })
    }

    fn definition_set_guid(&self, def: ComponentDefinitionRef, _guid: &str) -> BridgeResult<()> {
        self.handle(def)?;
        Err(BridgeError::Unsupported("setting a definition GUID"))
    }

    fn definition_description(&self, def: ComponentDefinitionRef) -> BridgeResult<String> {
        let d = self.handle(def)?;
        read_string(|s| unsafe { SUComponentDefinitionGetDescription(d, s) })
    }

    fn definition_set_description(
        &self,
        def: ComponentDefinitionRef,
        description: &str,
    ) -> BridgeResult<()> {
        let d = self.handle(def)?;
        self.set_string(description, |n| unsafe {
            SUComponentDefinitionSetDescription(d, n)
        })
    }

    fn definition_entities(&self, def: ComponentDefinitionRef) -> BridgeResult<EntitiesRef> {
        let d = self.handle(def)?;
        let mut entities = SuRef::NULL;
        let code = unsafe { SUComponentDefinitionGetEntities(d, &mut entities) };
        self.linked(code, entities, RefType::Entities)
    }

    fn model_add_definitions(
        &self,
        model: ModelRef,
        defs: &[ComponentDefinitionRef],
    ) -> BridgeResult<()> {
        let m = self.handle(model)?;
        let defs = self.handles_of(defs)?;
        check(unsafe { SUModelAddComponentDefinitions(m, defs.len(), defs.as_ptr()) })
    }

    // --- Component instances ---

    fn definition_create_instance(
        &self,
        def: ComponentDefinitionRef,
    ) -> BridgeResult<ComponentInstanceRef> {
        let d = self.handle(def)?;
        let mut instance = SuRef::NULL;
        let code = unsafe { SUComponentDefinitionCreateInstance(d, &mut instance) };
        self.created(code, instance, RefType::ComponentInstance)
    }

    fn instance_definition(
        &self,
        inst: ComponentInstanceRef,
    ) -> BridgeResult<ComponentDefinitionRef> {
        let i = self.handle(inst)?;
        let mut def = SuRef::NULL;
        let code = unsafe { SUComponentInstanceGetDefinition(i, &mut def) };
        self.optional(code, def, RefType::ComponentDefinition)
    }

    fn instance_name(&self, inst: ComponentInstanceRef) -> BridgeResult<String> {
        let i = self.handle(inst)?;
        read_string(|s| unsafe { SUComponentInstanceGetName(i, s) })
    }

    fn instance_set_name(&self, inst: ComponentInstanceRef, name: &str) -> BridgeResult<()> {
        let i = self.handle(inst)?;
        self.set_string(name, |n| unsafe { SUComponentInstanceSetName(i, n) })
    }

    fn instance_guid(&self, inst: ComponentInstanceRef) -> BridgeResult<String> {
        let i = self.handle(inst)?;
        read_string(|s| unsafe { SUComponentInstanceGetGuid(i, s) })
    }

    fn instance_set_guid(&self, inst: ComponentInstanceRef, guid: &str) -> BridgeResult<()> {
        let i = self.handle(inst)?;
        self.set_string(guid, |g| unsafe { SUComponentInstanceSetGuid(i, g) })
    }

    fn instance_transform(&self, inst: ComponentInstanceRef) -> BridgeResult<[f64; 16]> {
        let i = self.handle(inst)?;
        let mut t = SUTransformation { values: [0.0; 16] };
        check(unsafe { SUComponentInstanceGetTransform(i, &mut t) })?;
        Ok(t.values)
    }

    fn instance_set_transform(
        &self,
        inst: ComponentInstanceRef,
        transform: &[f64; 16],
    ) -> BridgeResult<()> {
        let i = self.handle(inst)?;
        let t = SUTransformation { values: *transform };
        check(unsafe { SUComponentInstanceSetTransform(i, &t) })
    }

    fn entities_add_instance(
        &self,
        entities: EntitiesRef,
        inst: ComponentInstanceRef,
    ) -> BridgeResult<()> {
        let e = self.handle(entities)?;
        let i = self.handle(inst)?;
        check(unsafe { SUEntitiesAddInstance(e, i, ptr::null_mut()) })
    }

    // --- Groups ---

    fn group_create(&self) -> BridgeResult<GroupRef> {
        let mut group = SuRef::NULL;
        let code = unsafe { SUGroupCreate(&mut group) };
        self.created(code, group, RefType::Group)
    }

    fn group_name(&self, group: GroupRef) -> BridgeResult<String> {
        let g = self.handle(group)?;
        read_string(|s| unsafe { SUGroupGetName(g, s) })
    }

    fn group_set_name(&self, group: GroupRef, name: &str) -> BridgeResult<()> {
        let g = self.handle(group)?;
        self.set_string(name, |n| unsafe { SUGroupSetName(g, n) })
    }

    fn group_guid(&self, group: GroupRef) -> BridgeResult<String> {
        let g = self.handle(group)?;
        read_string(|s| unsafe { SUGroupGetGuid(g, s) })
    }

    fn group_set_guid(&self, group: GroupRef, guid: &str) -> BridgeResult<()> {
        let g = self.handle(group)?;
        self.set_string(guid, |n| unsafe { SUGroupSetGuid(g, n) })
    }

    fn group_transform(&self, group: GroupRef) -> BridgeResult<[f64; 16]> {
        let g = self.handle(group)?;
        let mut t = SUTransformation { values: [0.0; 16] };
        check(unsafe { SUGroupGetTransform(g, &mut t) })?;
        Ok(t.values)
    }

    fn group_set_transform(&self, group: GroupRef, transform: &[f64; 16]) -> BridgeResult<()> {
        let g = self.handle(group)?;
        let t = SUTransformation { values: *transform };
        check(unsafe { SUGroupSetTransform(g, &t) })
    }

    fn group_entities(&self, group: GroupRef) -> BridgeResult<EntitiesRef> {
        let g = self.handle(group)?;
        let mut entities = SuRef::NULL;
        let code = unsafe { SUGroupGetEntities(g, &mut entities) };
        self.linked(code, entities, RefType::Entities)
    }

    fn entities_add_group(&self, entities: EntitiesRef, group: GroupRef) -> BridgeResult<()> {
        let e = self.handle(entities)?;
        let g = self.handle(group)?;
        check(unsafe { SUEntitiesAddGroup(e, g) })
    }

    // --- Faces, loops, vertices ---

    fn face_outer_loop(&self, face: FaceRef) -> BridgeResult<LoopRef> {
        let f = self.handle(face)?;
        let mut lp = SuRef::NULL;
        let code = unsafe { SUFaceGetOuterLoop(f, &mut lp) };
        self.linked(code, lp, RefType::Loop)
    }

    fn face_normal(&self, face: FaceRef) -> BridgeResult<DVec3> {
        let f = self.handle(face)?;
        let mut normal = SUVector3D::default();
        check(unsafe { SUFaceGetNormal(f, &mut normal) })?;
        Ok(normal.into())
    }

    fn face_area(&self, face: FaceRef) -> BridgeResult<f64> {
        let f = self.handle(face)?;
        let mut area = 0.0;
        check(unsafe { SUFaceGetArea(f, &mut area) })?;
        Ok(area)
    }

    fn face_front_material(&self, face: FaceRef) -> BridgeResult<MaterialRef> {
        let f = self.handle(face)?;
        let mut material = SuRef::NULL;
        let code = unsafe { SUFaceGetFrontMaterial(f, &mut material) };
        self.optional(code, material, RefType::Material)
    }

    fn face_back_material(&self, face: FaceRef) -> BridgeResult<MaterialRef> {
        let f = self.handle(face)?;
        let mut material = SuRef::NULL;
        let code = unsafe { SUFaceGetBackMaterial(f, &mut material) };
        self.optional(code, material, RefType::Material)
    }

    fn face_set_front_material(&self, face: FaceRef, material: MaterialRef) -> BridgeResult<()> {
        let f = self.handle(face)?;
        let m = self.handle(material)?;
        check(unsafe { SUFaceSetFrontMaterial(f, m) })
    }

    fn face_set_back_material(&self, face: FaceRef, material: MaterialRef) -> BridgeResult<()> {
        let f = self.handle(face)?;
        let m = self.handle(material)?;
        check(unsafe { SUFaceSetBackMaterial(f, m) })
    }

    fn vertex_position(&self, vertex: VertexRef) -> BridgeResult<DVec3> {
        let v = self.handle(vertex)?;
        let mut p = SUPoint3D::default();
        check(unsafe { SUVertexGetPosition(v, &mut p) })?;
        Ok(p.into())
    }

    fn loop_input_create(&self) -> BridgeResult<LoopInputRef> {
        let mut input = SuRef::NULL;
        let code = unsafe { SULoopInputCreate(&mut input) };
        self.created(code, input, RefType::LoopInput)
    }

    fn loop_input_add_vertex_index(&self, input: LoopInputRef, index: usize) -> BridgeResult<()> {
        let i = self.handle(input)?;
        check(unsafe { SULoopInputAddVertexIndex(i, index) })
    }

    fn face_create(&self, points: &[DVec3], outer: LoopInputRef) -> BridgeResult<FaceRef> {
        let mut input = self.handle(outer)?;
        let points = to_points(points);
        let mut face = SuRef::NULL;
        let code = unsafe { SUFaceCreate(&mut face, points.as_ptr(), &mut input) };
        let face = self.created(code, face, RefType::Face)?;
        self.forget(outer.raw());
        Ok(face)
    }

    fn face_add_inner_loop(
        &self,
        face: FaceRef,
        points: &[DVec3],
        input: LoopInputRef,
    ) -> BridgeResult<()> {
        let f = self.handle(face)?;
        let mut lp = self.handle(input)?;
        let points = to_points(points);
        check(unsafe { SUFaceAddInnerLoop(f, points.as_ptr(), &mut lp) })?;
        self.forget(input.raw());
        Ok(())
    }

    fn entities_add_faces(&self, entities: EntitiesRef, faces: &[FaceRef]) -> BridgeResult<()> {
        let e = self.handle(entities)?;
        let faces = self.handles_of(faces)?;
        check(unsafe { SUEntitiesAddFaces(e, faces.len(), faces.as_ptr()) })
    }

    // --- Edges and curves ---

    fn edge_start(&self, edge: EdgeRef) -> BridgeResult<VertexRef> {
        let e = self.handle(edge)?;
        let mut vertex = SuRef::NULL;
        let code = unsafe { SUEdgeGetStartVertex(e, &mut vertex) };
        self.linked(code, vertex, RefType::Vertex)
    }

    fn edge_end(&self, edge: EdgeRef) -> BridgeResult<VertexRef> {
        let e = self.handle(edge)?;
        let mut vertex = SuRef::NULL;
        let code = unsafe { SUEdgeGetEndVertex(e, &mut vertex) };
        self.linked(code, vertex, RefType::Vertex)
    }

    fn edge_curve(&self, edge: EdgeRef) -> BridgeResult<CurveRef> {
        let e = self.handle(edge)?;
        let mut curve = SuRef::NULL;
        let code = unsafe { SUEdgeGetCurve(e, &mut curve) };
        self.optional(code, curve, RefType::Curve)
    }

    fn edge_create(&self, start: DVec3, end: DVec3) -> BridgeResult<EdgeRef> {
        let (start, end) = (SUPoint3D::from(start), SUPoint3D::from(end));
        let mut edge = SuRef::NULL;
        let code = unsafe { SUEdgeCreate(&mut edge, &start, &end) };
        self.created(code, edge, RefType::Edge)
    }

    fn curve_type(&self, curve: CurveRef) -> BridgeResult<CurveType> {
        let c = self.handle(curve)?;
        let mut ty = 0i32;
        check(unsafe { SUCurveGetType(c, &mut ty) })?;
        Ok(if ty == SU_CURVE_ARC {
            CurveType::Arc
        } else {
            CurveType::Simple
        })
    }

    fn curve_create_with_edges(&self, edges: &[EdgeRef]) -> BridgeResult<CurveRef> {
        let handles = self.handles_of(edges)?;
        let mut curve = SuRef::NULL;
        let code = unsafe { SUCurveCreateWithEdges(&mut curve, handles.as_ptr(), handles.len()) };
        self.created(code, curve, RefType::Curve)
    }

    fn entities_add_edges(&self, entities: EntitiesRef, edges: &[EdgeRef]) -> BridgeResult<()> {
        let e = self.handle(entities)?;
        let edges = self.handles_of(edges)?;
        check(unsafe { SUEntitiesAddEdges(e, edges.len(), edges.as_ptr()) })
    }

    fn entities_add_curves(&self, entities: EntitiesRef, curves: &[CurveRef]) -> BridgeResult<()> {
        let e = self.handle(entities)?;
        let curves = self.handles_of(curves)?;
        check(unsafe { SUEntitiesAddCurves(e, curves.len(), curves.as_ptr()) })
    }

    // --- Openings ---

    fn opening_point_count(&self, opening: OpeningRef) -> BridgeResult<usize> {
        let o = self.handle(opening)?;
        let mut n = 0usize;
        check(unsafe { SUOpeningGetNumPoints(o, &mut n) })?;
        Ok(n)
    }

    fn opening_points(&self, opening: OpeningRef, out: &mut [DVec3]) -> BridgeResult<usize> {
        let o = self.handle(opening)?;
        let count = self.opening_point_count(opening)?;
        self.read_points(count, out, |len, p, w| unsafe {
            SUOpeningGetPoints(o, len, p, w)
        })
    }

    // --- Triangulation helper ---

    fn mesh_helper_create(&self, face: FaceRef) -> BridgeResult<MeshHelperRef> {
        let f = self.handle(face)?;
        let mut helper = SuRef::NULL;
        let code = unsafe { SUMeshHelperCreate(&mut helper, f) };
        self.created(code, helper, RefType::MeshHelper)
    }

    fn mesh_vertex_count(&self, helper: MeshHelperRef) -> BridgeResult<usize> {
        let h = self.handle(helper)?;
        let mut n = 0usize;
        check(unsafe { SUMeshHelperGetNumVertices(h, &mut n) })?;
        Ok(n)
    }

    fn mesh_vertices(&self, helper: MeshHelperRef, out: &mut [DVec3]) -> BridgeResult<usize> {
        let h = self.handle(helper)?;
        let count = self.mesh_vertex_count(helper)?;
        self.read_points(count, out, |len, p, w| unsafe {
            SUMeshHelperGetVertices(h, len, p, w)
        })
    }

    fn mesh_normals(&self, helper: MeshHelperRef, out: &mut [DVec3]) -> BridgeResult<usize> {
        let h = self.handle(helper)?;
        let count = self.mesh_vertex_count(helper)?;
        self.read_points(count, out, |len, p, w| unsafe {
            SUMeshHelperGetNormals(h, len, p, w)
        })
    }

    fn mesh_index_count(&self, helper: MeshHelperRef) -> BridgeResult<usize> {
        let h = self.handle(helper)?;
        let mut triangles = 0usize;
        check(unsafe { SUMeshHelperGetNumTriangles(h, &mut triangles) })?;
        Ok(triangles * 3)
    }

    fn mesh_indices(&self, helper: MeshHelperRef, out: &mut [usize]) -> BridgeResult<usize> {
        let h = self.handle(helper)?;
        let count = self.mesh_index_count(helper)?;
        check_capacity(out.len(), count)?;
        let mut written = 0usize;
        check(unsafe { SUMeshHelperGetVertexIndices(h, count, out.as_mut_ptr(), &mut written) })?;
        Ok(written)
    }

    // --- Materials and textures ---

    fn material_create(&self) -> BridgeResult<MaterialRef> {
        let mut material = SuRef::NULL;
        let code = unsafe { SUMaterialCreate(&mut material) };
        self.created(code, material, RefType::Material)
    }

    fn material_name(&self, material: MaterialRef) -> BridgeResult<String> {
        let m = self.handle(material)?;
        read_string(|s| unsafe { SUMaterialGetName(m, s) })
    }

    fn material_set_name(&self, material: MaterialRef, name: &str) -> BridgeResult<()> {
        let m = self.handle(material)?;
        self.set_string(name, |n| unsafe { SUMaterialSetName(m, n) })
    }

    fn material_color(&self, material: MaterialRef) -> BridgeResult<Color> {
        let m = self.handle(material)?;
        let mut color = Color::default();
        check(unsafe { SUMaterialGetColor(m, &mut color) })?;
        Ok(color)
    }

    fn material_set_color(&self, material: MaterialRef, color: Color) -> BridgeResult<()> {
        let m = self.handle(material)?;
        check(unsafe { SUMaterialSetColor(m, &color) })
    }

    fn material_opacity(&self, material: MaterialRef) -> BridgeResult<f64> {
        let m = self.handle(material)?;
        let mut opacity = 1.0;
        check(unsafe { SUMaterialGetOpacity(m, &mut opacity) })?;
        Ok(opacity)
    }

    fn material_set_opacity(&self, material: MaterialRef, opacity: f64) -> BridgeResult<()> {
        let m = self.handle(material)?;
        check(unsafe { SUMaterialSetOpacity(m, opacity) })
    }

    fn material_use_opacity(&self, material: MaterialRef) -> BridgeResult<bool> {
        let m = self.handle(material)?;
        let mut use_opacity = false;
        check(unsafe { SUMaterialGetUseOpacity(m, &mut use_opacity) })?;
        Ok(use_opacity)
    }

    fn material_set_use_opacity(
        &self,
        material: MaterialRef,
        use_opacity: bool,
    ) -> BridgeResult<()> {
        let m = self.handle(material)?;
        check(unsafe { SUMaterialSetUseOpacity(m, use_opacity) })
    }

    fn material_type(&self, material: MaterialRef) -> BridgeResult<MaterialType> {
        let m = self.handle(material)?;
        let mut ty = SU_MATERIAL_COLORED;
        check(unsafe { SUMaterialGetType(m, &mut ty) })?;
        Ok(match ty {
            SU_MATERIAL_TEXTURED => MaterialType::Textured,
            SU_MATERIAL_COLORIZED_TEXTURED => MaterialType::ColorizedTexture,
            _ => MaterialType::Colored,
        })
    }

    fn material_set_type(&self, material: MaterialRef, ty: MaterialType) -> BridgeResult<()> {
        let m = self.handle(material)?;
        let ty = match ty {
            MaterialType::Colored => SU_MATERIAL_COLORED,
            MaterialType::Textured => SU_MATERIAL_TEXTURED,
            MaterialType::ColorizedTexture => SU_MATERIAL_COLORIZED_TEXTURED,
        };
        check(unsafe { SUMaterialSetType(m, ty) })
    }

    fn material_texture(&self, material: MaterialRef) -> BridgeResult<TextureRef> {
        let m = self.handle(material)?;
        let mut texture = SuRef::NULL;
        let code = unsafe { SUMaterialGetTexture(m, &mut texture) };
        self.optional(code, texture, RefType::Texture)
    }

    fn material_set_texture(
        &self,
        material: MaterialRef,
        texture: TextureRef,
    ) -> BridgeResult<()> {
        let m = self.handle(material)?;
        let t = self.handle(texture)?;
        check(unsafe { SUMaterialSetTexture(m, t) })
    }

    fn model_add_materials(&self, model: ModelRef, materials: &[MaterialRef]) -> BridgeResult<()> {
        let m = self.handle(model)?;
        let materials = self.handles_of(materials)?;
        check(unsafe { SUModelAddMaterials(m, materials.len(), materials.as_ptr()) })
    }

    fn texture_create_from_file(
        &self,
        path: &Path,
        s_scale: f64,
        t_scale: f64,
    ) -> BridgeResult<TextureRef> {
        if !path.exists() {
            return Err(BridgeError::FileNotFound(path.display().to_string()));
        }
        let file = c_path(path)?;
        let mut texture = SuRef::NULL;
        let code =
            unsafe { SUTextureCreateFromFile(&mut texture, file.as_ptr(), s_scale, t_scale) };
        self.created(code, texture, RefType::Texture)
    }

    fn texture_file_name(&self, texture: TextureRef) -> BridgeResult<String> {
        let t = self.handle(texture)?;
        read_string(|s| unsafe { SUTextureGetFileName(t, s) })
    }

    fn texture_dimensions(&self, texture: TextureRef) -> BridgeResult<TextureDimensions> {
        let t = self.handle(texture)?;
        let mut dims = TextureDimensions::default();
        check(unsafe {
            SUTextureGetDimensions(
                t,
                &mut dims.width,
                &mut dims.height,
                &mut dims.s_scale,
                &mut dims.t_scale,
            )
        })?;
        Ok(dims)
    }

    fn texture_average_color(&self, texture: TextureRef) -> BridgeResult<Color> {
        let t = self.handle(texture)?;
        let mut color = Color::default();
        check(unsafe { SUTextureGetAverageColor(t, &mut color) })?;
        Ok(color)
    }

    fn texture_use_alpha(&self, texture: TextureRef) -> BridgeResult<bool> {
        let t = self.handle(texture)?;
        let mut alpha = false;
        check(unsafe { SUTextureGetUseAlphaChannel(t, &mut alpha) })?;
        Ok(alpha)
    }

    // --- Layers ---

    fn layer_create(&self) -> BridgeResult<LayerRef> {
        let mut layer = SuRef::NULL;
        let code = unsafe { SULayerCreate(&mut layer) };
        self.created(code, layer, RefType::Layer)
    }

    fn layer_name(&self, layer: LayerRef) -> BridgeResult<String> {
        let l = self.handle(layer)?;
        read_string(|s| unsafe { SULayerGetName(l, s) })
    }

    fn layer_set_name(&self, layer: LayerRef, name: &str) -> BridgeResult<()> {
        let l = self.handle(layer)?;
        self.set_string(name, |n| unsafe { SULayerSetName(l, n) })
    }

    fn layer_visible(&self, layer: LayerRef) -> BridgeResult<bool> {
        let l = self.handle(layer)?;
        let mut visible = true;
        check(unsafe { SULayerGetVisibility(l, &mut visible) })?;
        Ok(visible)
    }

    fn layer_set_visible(&self, layer: LayerRef, visible: bool) -> BridgeResult<()> {
        let l = self.handle(layer)?;
        check(unsafe { SULayerSetVisibility(l, visible) })
    }

    fn model_add_layers(&self, model: ModelRef, layers: &[LayerRef]) -> BridgeResult<()> {
        let m = self.handle(model)?;
        let layers = self.handles_of(layers)?;
        check(unsafe { SUModelAddLayers(m, layers.len(), layers.as_ptr()) })
    }

    // --- Scenes and attributes ---

    fn scene_name(&self, scene: SceneRef) -> BridgeResult<String> {
        let s = self.handle(scene)?;
        read_string(|out| unsafe { SUSceneGetName(s, out) })
    }

    fn dictionary_name(&self, dict: AttributeDictionaryRef) -> BridgeResult<String> {
        let d = self.handle(dict)?;
        read_string(|s| unsafe { SUAttributeDictionaryGetName(d, s) })
    }

    fn dictionary_key_count(&self, dict: AttributeDictionaryRef) -> BridgeResult<usize> {
        let d = self.handle(dict)?;
        let mut n = 0usize;
        check(unsafe { SUAttributeDictionaryGetNumKeys(d, &mut n) })?;
        Ok(n)
    }

    fn dictionary_keys(
        &self,
        dict: AttributeDictionaryRef,
        out: &mut [String],
    ) -> BridgeResult<usize> {
        let d = self.handle(dict)?;
        let count = self.dictionary_key_count(dict)?;
        check_capacity(out.len(), count)?;

        let keys = (0..count)
            .map(|_| SuString::new())
            .collect::<BridgeResult<Vec<_>>>()?;
        let mut raw: Vec<SuRef> = keys.iter().map(|k| k.0).collect();
        let mut written = 0usize;
        check(unsafe { SUAttributeDictionaryGetKeys(d, count, raw.as_mut_ptr(), &mut written) })?;

        for (slot, key) in out.iter_mut().zip(&keys[..written]) {
            *slot = key.read()?;
        }
        Ok(written)
    }

    fn dictionary_value(
        &self,
        dict: AttributeDictionaryRef,
        key: &str,
    ) -> BridgeResult<AttributeValue> {
        let d = self.handle(dict)?;
        let key = c_string(key)?;
        let mut value = TypedValue::new()?;
        check(unsafe { SUAttributeDictionaryGetValue(d, key.as_ptr(), &mut value.0) })?;
        value.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_mapping() {
        assert!(check(SU_ERROR_NONE).is_ok());
        assert_eq!(check(SU_ERROR_NO_DATA), Err(BridgeError::NoData));
        assert_eq!(check(SU_ERROR_OUT_OF_RANGE), Err(BridgeError::OutOfRange));
        assert_eq!(check(SU_ERROR_MODEL_VERSION), Err(BridgeError::ModelVersion));
        assert!(matches!(
            check(SU_ERROR_SERIALIZATION),
            Err(BridgeError::Serialization(_))
        ));
    }

    #[test]
    fn test_version_codes() {
        assert_eq!(su_version(ModelVersion::V2013), 6);
        assert_eq!(su_version(ModelVersion::default()), 14);
    }

    #[test]
    fn test_untracked_handles_are_invalid() {
        let kernel = NativeKernel::new();
        let stray = RawRef::new(0xdead_beef);
        assert!(!kernel.is_valid(stray));
        assert_eq!(kernel.ref_type(stray), RefType::Unknown);
        assert_eq!(kernel.release(stray), Err(BridgeError::InvalidHandle));
        assert_eq!(
            kernel.face_area(FaceRef::from_raw(stray)),
            Err(BridgeError::InvalidHandle)
        );
    }

    #[test]
    fn test_entity_type_mapping() {
        assert_eq!(ref_type_of(SU_REF_FACE), RefType::Face);
        assert_eq!(ref_type_of(SU_REF_ARC_CURVE), RefType::Curve);
        assert_eq!(ref_type_of(999), RefType::Unknown);
        assert_eq!(item_type(Collection::LoopEdges), Some(RefType::Edge));
        assert_eq!(item_type(Collection::HiddenEntities), None);
    }
}
