//! Busy gate raised while a bulk index run is in progress.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Count of index runs in flight.
#[derive(Debug, Default)]
pub struct IndexingState {
    active: AtomicUsize,
}

impl IndexingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_indexing(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    /// Raise the gate until the returned guard is dropped.
    pub fn begin(self: &Arc<Self>) -> IndexingGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        IndexingGuard {
            state: Arc::clone(self),
        }
    }
}

/// Keeps `is_indexing()` true while alive.
#[must_use = "indexing ends as soon as the guard is dropped"]
pub struct IndexingGuard {
    state: Arc<IndexingState>,
}

impl Drop for IndexingGuard {
    fn drop(&mut self) {
        self.state.active.fetch_sub(1, Ordering::AcqRel);
    }
}
