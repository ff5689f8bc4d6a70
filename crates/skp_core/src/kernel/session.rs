use std::sync::atomic::{AtomicBool, Ordering};

use super::{Bridge, BridgeError, BridgeResult, Kernel};

/// The kernel is process-global; initialize/terminate must not nest.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Initialize/terminate bracket around a batch of kernel work.
///
/// Terminates the kernel when dropped.
pub struct Session<'k, K: Kernel + ?Sized> {
    kernel: &'k K,
}

impl<'k, K: Kernel + ?Sized> Session<'k, K> {
    /// Initialize the kernel. Fails with `SessionActive` while another
    /// session is alive anywhere in the process.
    pub fn begin(kernel: &'k K) -> BridgeResult<Self> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BridgeError::SessionActive);
        }

        if let Err(e) = kernel.initialize() {
            ACTIVE.store(false, Ordering::Release);
            return Err(e);
        }

        log::debug!("Kernel session started");
        Ok(Self { kernel })
    }

    pub fn bridge(&self) -> Bridge<'k, K> {
        Bridge::new(self.kernel)
    }

    pub fn kernel(&self) -> &'k K {
        self.kernel
    }
}

impl<K: Kernel + ?Sized> Drop for Session<'_, K> {
    fn drop(&mut self) {
        self.kernel.terminate();
        ACTIVE.store(false, Ordering::Release);
        log::debug!("Kernel session terminated");
    }
}
