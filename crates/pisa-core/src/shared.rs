//! `Responder` is mutated by the single-threaded head-processing cycle and
//! read by concurrently arriving relay-mode admissions (spec.md §5:
//! "Admission... synchronizes with the Responder through the queue's own
//! operations, which are copy-on-write"). `parking_lot::Mutex` gives that
//! synchronization without an async hold-across-await, since every access
//! here is a quick synchronous queue read or reducer step.

use parking_lot::Mutex;
use pisa_admission::RelayCapacity;
use pisa_responder::Responder;
use std::sync::Arc;

/// Shared ownership of the one `Responder` a `PisaService` drives.
#[derive(Debug)]
pub struct SharedResponder {
    inner: Mutex<Responder>,
}

impl SharedResponder {
    pub fn new(responder: Responder) -> Self {
        Self { inner: Mutex::new(responder) }
    }

    /// Runs `f` against the responder under the lock. Kept short-lived on
    /// purpose: every `Responder` method is itself synchronous and
    /// non-suspending (spec.md §5 "reducers never suspend").
    pub fn with<R>(&self, f: impl FnOnce(&mut Responder) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

/// The `RelayCapacity` seam `pisa-admission` checks before accepting a
/// relay-mode job, backed by the live `Responder`'s queue depth (spec.md
/// §4.3, §6 `maxConcurrentResponses`).
#[derive(Debug, Clone)]
pub struct RelayCapacityHandle(pub(crate) Arc<SharedResponder>);

impl RelayCapacityHandle {
    pub fn new(responder: Arc<SharedResponder>) -> Self {
        Self(responder)
    }
}

impl RelayCapacity for RelayCapacityHandle {
    fn has_capacity(&self) -> bool {
        self.0.with(|responder| !responder.queue().depth_reached())
    }
}
