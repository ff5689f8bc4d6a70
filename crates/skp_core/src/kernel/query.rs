//! Bounded-sequence access on top of the count/fetch protocol.

use std::marker::PhantomData;
use std::ops::Deref;

use super::handle::kind::{self, IsEntity, Kind};
use super::{BridgeError, BridgeResult, Collection, Kernel, RawRef, Ref};
use super::{CurveRef, EntitiesRef, FaceRef, LoopRef, ModelRef, SceneRef};

/// A typed collection request: which collection of which source object.
#[derive(Debug)]
pub struct Query<T: Kind> {
    source: RawRef,
    collection: Collection,
    _item: PhantomData<fn() -> T>,
}

impl<T: Kind> Clone for Query<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Kind> Copy for Query<T> {}

impl<T: Kind> Query<T> {
    fn new(source: RawRef, collection: Collection) -> Self {
        Self {
            source,
            collection,
            _item: PhantomData,
        }
    }

    pub fn source(&self) -> RawRef {
        self.source
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }
}

impl Query<kind::Material> {
    pub fn materials(model: ModelRef) -> Self {
        Self::new(model.raw(), Collection::Materials)
    }
}

impl Query<kind::Layer> {
    pub fn layers(model: ModelRef) -> Self {
        Self::new(model.raw(), Collection::Layers)
    }
}

impl Query<kind::ComponentDefinition> {
    pub fn definitions(model: ModelRef) -> Self {
        Self::new(model.raw(), Collection::ComponentDefinitions)
    }
}

impl Query<kind::Scene> {
    pub fn scenes(model: ModelRef) -> Self {
        Self::new(model.raw(), Collection::Scenes)
    }
}

impl Query<kind::Face> {
    pub fn faces(entities: EntitiesRef) -> Self {
        Self::new(entities.raw(), Collection::Faces)
    }
}

impl Query<kind::Edge> {
    /// Standalone edges of a container.
    pub fn edges(entities: EntitiesRef) -> Self {
        Self::new(entities.raw(), Collection::Edges)
    }

    pub fn loop_edges(lp: LoopRef) -> Self {
        Self::new(lp.raw(), Collection::LoopEdges)
    }

    pub fn curve_edges(curve: CurveRef) -> Self {
        Self::new(curve.raw(), Collection::CurveEdges)
    }
}

impl Query<kind::Curve> {
    pub fn curves(entities: EntitiesRef) -> Self {
        Self::new(entities.raw(), Collection::Curves)
    }
}

impl Query<kind::Group> {
    pub fn groups(entities: EntitiesRef) -> Self {
        Self::new(entities.raw(), Collection::Groups)
    }
}

impl Query<kind::ComponentInstance> {
    pub fn instances(entities: EntitiesRef) -> Self {
        Self::new(entities.raw(), Collection::Instances)
    }
}

impl Query<kind::Vertex> {
    pub fn face_vertices(face: FaceRef) -> Self {
        Self::new(face.raw(), Collection::FaceVertices)
    }
}

impl Query<kind::Loop> {
    pub fn inner_loops(face: FaceRef) -> Self {
        Self::new(face.raw(), Collection::InnerLoops)
    }
}

impl Query<kind::Opening> {
    pub fn openings(face: FaceRef) -> Self {
        Self::new(face.raw(), Collection::Openings)
    }
}

impl Query<kind::AttributeDictionary> {
    pub fn attribute_dictionaries<E: IsEntity>(entity: Ref<E>) -> Self {
        Self::new(entity.raw(), Collection::AttributeDictionaries)
    }
}

impl Query<kind::Entity> {
    pub fn hidden_entities(scene: SceneRef) -> Self {
        Self::new(scene.raw(), Collection::HiddenEntities)
    }
}

/// Borrowing view over a kernel with the sequence helpers.
///
/// Derefs to the kernel so single-value calls read naturally.
pub struct Bridge<'k, K: ?Sized> {
    kernel: &'k K,
}

impl<K: ?Sized> Clone for Bridge<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: ?Sized> Copy for Bridge<'_, K> {}

impl<K: ?Sized> Deref for Bridge<'_, K> {
    type Target = K;

    fn deref(&self) -> &K {
        self.kernel
    }
}

impl<'k, K: Kernel + ?Sized> Bridge<'k, K> {
    pub fn new(kernel: &'k K) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &'k K {
        self.kernel
    }

    /// Every item of a collection, in kernel order.
    pub fn list<T: Kind>(&self, query: Query<T>) -> BridgeResult<Vec<Ref<T>>> {
        let raw = self.sequence(
            |k| k.count(query.source, query.collection),
            |k, out| k.fetch(query.source, query.collection, out),
        )?;
        Ok(raw.into_iter().map(Ref::from_raw).collect())
    }

    /// Count, allocate, fetch.
    ///
    /// If the collection grew between the two calls the fetch reports
    /// `InsufficientCapacity`; the count is taken again and the fetch retried
    /// once. A second shortfall is returned to the caller.
    pub fn sequence<V, C, F>(&self, count: C, fetch: F) -> BridgeResult<Vec<V>>
    where
        V: Clone + Default,
        C: Fn(&K) -> BridgeResult<usize>,
        F: Fn(&K, &mut [V]) -> BridgeResult<usize>,
    {
        let expected = count(self.kernel)?;
        if expected == 0 {
            return Ok(Vec::new());
        }

        let mut out = vec![V::default(); expected];
        let written = match fetch(self.kernel, &mut out) {
            Ok(written) => written,
            Err(BridgeError::InsufficientCapacity { capacity, actual }) => {
                log::debug!(
                    "Collection grew from {} to {} between count and fetch, retrying",
                    capacity,
                    actual
                );
                let expected = count(self.kernel)?;
                out = vec![V::default(); expected];
                fetch(self.kernel, &mut out)?
            }
            Err(e) => return Err(e),
        };

        out.truncate(written);
        Ok(out)
    }

    /// Checked downcast; an invalid handle on kind mismatch.
    pub fn downcast<T: Kind, F: Kind>(&self, from: Ref<F>) -> Ref<T> {
        if from.is_null() {
            return Ref::invalid();
        }
        if T::accepts(self.kernel.ref_type(from.raw())) {
            Ref::from_raw(from.raw())
        } else {
            Ref::invalid()
        }
    }

    pub fn is_valid<T: Kind>(&self, r: Ref<T>) -> bool {
        !r.is_null() && self.kernel.is_valid(r.raw())
    }

    /// Pass a live handle through, or fail with `InvalidHandle`.
    pub fn require<T: Kind>(&self, r: Ref<T>) -> BridgeResult<Ref<T>> {
        if self.is_valid(r) {
            Ok(r)
        } else {
            Err(BridgeError::InvalidHandle)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{check_capacity, MemoryKernel};
    use std::cell::Cell;

    #[test]
    fn test_sequence_empty_skips_fetch() {
        let kernel = MemoryKernel::new();
        let bridge = Bridge::new(&kernel);
        let fetched = Cell::new(false);
        let items: Vec<u32> = bridge
            .sequence(
                |_| Ok(0),
                |_, _| {
                    fetched.set(true);
                    Ok(0)
                },
            )
            .unwrap();
        assert!(items.is_empty());
        assert!(!fetched.get());
    }

    #[test]
    fn test_sequence_retries_once_after_growth() {
        let kernel = MemoryKernel::new();
        let bridge = Bridge::new(&kernel);
        let counts = Cell::new(0usize);

        // first count says 1, the collection really holds 3
        let items: Vec<u32> = bridge
            .sequence(
                |_| {
                    counts.set(counts.get() + 1);
                    Ok(if counts.get() == 1 { 1 } else { 3 })
                },
                |_, out| {
                    check_capacity(out.len(), 3)?;
                    out[..3].copy_from_slice(&[7, 8, 9]);
                    Ok(3)
                },
            )
            .unwrap();

        assert_eq!(items, vec![7, 8, 9]);
        assert_eq!(counts.get(), 2);
    }

    #[test]
    fn test_sequence_gives_up_after_second_shortfall() {
        let kernel = MemoryKernel::new();
        let bridge = Bridge::new(&kernel);
        let growing = Cell::new(1usize);

        let result: BridgeResult<Vec<u32>> = bridge.sequence(
            |_| Ok(growing.get()),
            |_, out| {
                growing.set(growing.get() + 1);
                check_capacity(out.len(), growing.get())?;
                Ok(0)
            },
        );

        assert!(matches!(
            result,
            Err(BridgeError::InsufficientCapacity { .. })
        ));
    }

    #[test]
    fn test_require_rejects_null() {
        let kernel = MemoryKernel::new();
        let bridge = Bridge::new(&kernel);
        assert_eq!(
            bridge.require(FaceRef::invalid()),
            Err(BridgeError::InvalidHandle)
        );
    }
}
