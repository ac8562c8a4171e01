//! Single-slot holder for the current index.

use super::VectorIndex;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds the single current index.
///
/// Readers clone the `Arc` under a short read lock and search without holding it, so a swap
/// never waits on an in-flight query and a query never observes a half-built index.
#[derive(Debug, Default)]
pub struct IndexManager {
    current: RwLock<Option<Arc<VectorIndex>>>,
}

impl IndexManager {
    /// Create an empty manager; no index is available until the first [`replace`](Self::replace).
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current index, if one has been built.
    pub async fn current(&self) -> Option<Arc<VectorIndex>> {
        self.current.read().await.clone()
    }

    /// Install `index` as the current index, returning the one it replaced.
    pub async fn replace(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        let mut slot = self.current.write().await;
        slot.replace(Arc::new(index))
    }

    /// Whether an index has been built.
    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }
}
