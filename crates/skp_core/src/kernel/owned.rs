//! Ownership guards for objects the caller created.

use glam::DVec3;

use super::handle::kind::{self, Kind};
use super::{BridgeResult, FaceRef, Kernel, Ref};

/// A created kernel object not yet handed to a parent.
///
/// Released on drop unless [`Owned::transfer`] was called, so early returns
/// through `?` never leak native objects.
pub struct Owned<'k, K: Kernel + ?Sized, T: Kind> {
    kernel: &'k K,
    handle: Ref<T>,
    armed: bool,
}

impl<'k, K: Kernel + ?Sized, T: Kind> Owned<'k, K, T> {
    pub fn new(kernel: &'k K, handle: Ref<T>) -> Self {
        Self {
            kernel,
            handle,
            armed: true,
        }
    }

    pub fn get(&self) -> Ref<T> {
        self.handle
    }

    /// Give up ownership after the kernel has adopted the object.
    pub fn transfer(mut self) -> Ref<T> {
        self.armed = false;
        self.handle
    }
}

impl<K: Kernel + ?Sized, T: Kind> Drop for Owned<'_, K, T> {
    fn drop(&mut self) {
        if self.armed && !self.handle.is_null() {
            if let Err(e) = self.kernel.release(self.handle.raw()) {
                log::warn!("Failed to release {:?}: {}", self.handle, e);
            }
        }
    }
}

/// Move-only builder for one face boundary.
///
/// Consumed by [`LoopInput::create_face`] or [`LoopInput::add_to_face`]. On
/// success the kernel owns the native loop input; on failure it is released
/// here.
pub struct LoopInput<'k, K: Kernel + ?Sized> {
    inner: Owned<'k, K, kind::LoopInput>,
    len: usize,
}

impl<'k, K: Kernel + ?Sized> LoopInput<'k, K> {
    pub fn create(kernel: &'k K) -> BridgeResult<Self> {
        let handle = kernel.loop_input_create()?;
        Ok(Self {
            inner: Owned::new(kernel, handle),
            len: 0,
        })
    }

    /// Loop over `points[0..count]` in order.
    pub fn sequential(kernel: &'k K, count: usize) -> BridgeResult<Self> {
        let mut input = Self::create(kernel)?;
        for index in 0..count {
            input.add_vertex_index(index)?;
        }
        Ok(input)
    }

    pub fn add_vertex_index(&mut self, index: usize) -> BridgeResult<()> {
        self.inner
            .kernel
            .loop_input_add_vertex_index(self.inner.get(), index)?;
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Build a face bounded by this loop. The face is returned owned.
    pub fn create_face(self, points: &[DVec3]) -> BridgeResult<Owned<'k, K, kind::Face>> {
        let kernel = self.inner.kernel;
        let face = kernel.face_create(points, self.inner.get())?;
        self.inner.transfer();
        Ok(Owned::new(kernel, face))
    }

    /// Cut this loop as a hole into `face`.
    pub fn add_to_face(self, face: FaceRef, points: &[DVec3]) -> BridgeResult<()> {
        self.inner
            .kernel
            .face_add_inner_loop(face, points, self.inner.get())?;
        self.inner.transfer();
        Ok(())
    }
}
