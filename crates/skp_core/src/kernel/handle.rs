//! Typed opaque references into a kernel.
//!
//! A [`RawRef`] is whatever the backend uses to name an object (a pointer for
//! the native kernel, an arena slot for the memory kernel). [`Ref<T>`] adds a
//! zero-sized kind marker so a face handle cannot be passed where a material
//! is expected. Upcasts are free; downcasts go through the kernel's
//! `ref_type` and yield an invalid handle on mismatch.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Untyped kernel reference. Zero is never a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct RawRef(usize);

impl RawRef {
    pub const INVALID: RawRef = RawRef(0);

    pub const fn new(value: usize) -> Self {
        RawRef(value)
    }

    pub const fn get(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Concrete object types a kernel reports for a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefType {
    Unknown,
    Model,
    Entities,
    Face,
    Loop,
    Edge,
    Vertex,
    Curve,
    Material,
    Texture,
    Layer,
    ComponentDefinition,
    ComponentInstance,
    Group,
    LoopInput,
    MeshHelper,
    Opening,
    AttributeDictionary,
    Scene,
}

impl RefType {
    /// Objects that carry a persistent id and attribute dictionaries.
    pub fn is_entity(self) -> bool {
        !matches!(
            self,
            RefType::Unknown
                | RefType::Model
                | RefType::Entities
                | RefType::LoopInput
                | RefType::MeshHelper
                | RefType::Opening
        )
    }

    /// Entities that can be placed on a layer and painted.
    pub fn is_drawing_element(self) -> bool {
        matches!(
            self,
            RefType::Face
                | RefType::Edge
                | RefType::ComponentInstance
                | RefType::Group
        )
    }
}

/// Kind markers used as the type parameter of [`Ref`].
pub mod kind {
    use super::RefType;

    pub trait Kind: 'static {
        const NAME: &'static str;

        /// Whether an object of type `ty` may be viewed as this kind.
        fn accepts(ty: RefType) -> bool;
    }

    /// Kinds that upcast to [`Entity`].
    pub trait IsEntity: Kind {}

    /// Kinds that upcast to [`DrawingElement`].
    pub trait IsDrawingElement: IsEntity {}

    macro_rules! concrete_kinds {
        ($($name:ident),* $(,)?) => {
            $(
                #[derive(Debug)]
                pub enum $name {}

                impl Kind for $name {
                    const NAME: &'static str = stringify!($name);

                    fn accepts(ty: RefType) -> bool {
                        ty == RefType::$name
                    }
                }
            )*
        };
    }

    concrete_kinds!(
        Model,
        Entities,
        Face,
        Loop,
        Edge,
        Vertex,
        Curve,
        Material,
        Texture,
        Layer,
        ComponentDefinition,
        ComponentInstance,
        Group,
        LoopInput,
        MeshHelper,
        Opening,
        AttributeDictionary,
        Scene,
    );

    #[derive(Debug)]
    pub enum Entity {}

    impl Kind for Entity {
        const NAME: &'static str = "Entity";

        fn accepts(ty: RefType) -> bool {
            ty.is_entity()
        }
    }

    #[derive(Debug)]
    pub enum DrawingElement {}

    impl Kind for DrawingElement {
        const NAME: &'static str = "DrawingElement";

        fn accepts(ty: RefType) -> bool {
            ty.is_drawing_element()
        }
    }

    impl IsEntity for Entity {}
    impl IsEntity for DrawingElement {}
    impl IsEntity for Face {}
    impl IsEntity for Loop {}
    impl IsEntity for Edge {}
    impl IsEntity for Vertex {}
    impl IsEntity for Curve {}
    impl IsEntity for Material {}
    impl IsEntity for Texture {}
    impl IsEntity for Layer {}
    impl IsEntity for ComponentDefinition {}
    impl IsEntity for ComponentInstance {}
    impl IsEntity for Group {}
    impl IsEntity for AttributeDictionary {}
    impl IsEntity for Scene {}

    impl IsDrawingElement for DrawingElement {}
    impl IsDrawingElement for Face {}
    impl IsDrawingElement for Edge {}
    impl IsDrawingElement for ComponentInstance {}
    impl IsDrawingElement for Group {}
}

use kind::{IsDrawingElement, IsEntity, Kind};

/// A kernel reference tagged with its kind.
pub struct Ref<T: Kind> {
    raw: RawRef,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Kind> Ref<T> {
    pub const fn from_raw(raw: RawRef) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    pub const fn invalid() -> Self {
        Self::from_raw(RawRef::INVALID)
    }

    pub const fn raw(self) -> RawRef {
        self.raw
    }

    /// Null check only. Use `Bridge::is_valid` to ask the kernel.
    pub const fn is_null(self) -> bool {
        self.raw.is_null()
    }
}

impl<T: IsEntity> Ref<T> {
    pub fn to_entity(self) -> EntityRef {
        Ref::from_raw(self.raw)
    }
}

impl<T: IsDrawingElement> Ref<T> {
    pub fn to_drawing_element(self) -> DrawingElementRef {
        Ref::from_raw(self.raw)
    }
}

impl<T: Kind> Clone for Ref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Kind> Copy for Ref<T> {}

impl<T: Kind> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: Kind> Eq for Ref<T> {}

impl<T: Kind> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: Kind> Default for Ref<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T: Kind> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Ref({:#x})", T::NAME, self.raw.get())
    }
}

pub type ModelRef = Ref<kind::Model>;
pub type EntitiesRef = Ref<kind::Entities>;
pub type FaceRef = Ref<kind::Face>;
pub type LoopRef = Ref<kind::Loop>;
pub type EdgeRef = Ref<kind::Edge>;
pub type VertexRef = Ref<kind::Vertex>;
pub type CurveRef = Ref<kind::Curve>;
pub type MaterialRef = Ref<kind::Material>;
pub type TextureRef = Ref<kind::Texture>;
pub type LayerRef = Ref<kind::Layer>;
pub type ComponentDefinitionRef = Ref<kind::ComponentDefinition>;
pub type ComponentInstanceRef = Ref<kind::ComponentInstance>;
pub type GroupRef = Ref<kind::Group>;
pub type LoopInputRef = Ref<kind::LoopInput>;
pub type MeshHelperRef = Ref<kind::MeshHelper>;
pub type OpeningRef = Ref<kind::Opening>;
pub type AttributeDictionaryRef = Ref<kind::AttributeDictionary>;
pub type SceneRef = Ref<kind::Scene>;
pub type EntityRef = Ref<kind::Entity>;
pub type DrawingElementRef = Ref<kind::DrawingElement>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ref() {
        let face = FaceRef::invalid();
        assert!(face.is_null());
        assert_eq!(face.raw(), RawRef::INVALID);
        assert_eq!(face, FaceRef::default());
    }

    #[test]
    fn test_upcast_keeps_raw() {
        let face = FaceRef::from_raw(RawRef::new(42));
        assert_eq!(face.to_entity().raw(), RawRef::new(42));
        assert_eq!(face.to_drawing_element().raw(), RawRef::new(42));
    }

    #[test]
    fn test_kind_acceptance() {
        assert!(kind::Face::accepts(RefType::Face));
        assert!(!kind::Face::accepts(RefType::Edge));
        assert!(kind::Entity::accepts(RefType::Material));
        assert!(!kind::Entity::accepts(RefType::MeshHelper));
        assert!(kind::DrawingElement::accepts(RefType::Group));
        assert!(!kind::DrawingElement::accepts(RefType::Layer));
    }

    #[test]
    fn test_debug_names_kind() {
        let edge = EdgeRef::from_raw(RawRef::new(16));
        assert_eq!(format!("{:?}", edge), "EdgeRef(0x10)");
    }
}
