use std::sync::{Arc, PoisonError, RwLock};

use super::snapshot::Snapshot;

/// Holder of the current [`Snapshot`].
///
/// The lock only guards the `Arc` itself: readers clone it and release the
/// lock immediately, so a swap never waits on a slow reader and a reader
/// never sees a half-installed table set.
#[derive(Debug)]
pub struct ReferenceStore {
    current: RwLock<Arc<Snapshot>>,
}

impl ReferenceStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current snapshot and returns the one it replaced.
    pub fn install(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let next = Arc::new(snapshot);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }
}
