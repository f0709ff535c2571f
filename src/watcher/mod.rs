//! Watcher module
//!
//! The ordered update channel plus the tasks that feed it. One task follows
//! each collection through a [`ClusterSource`]; external transports can push
//! wire messages through [`UpdateIngestor::push_raw`].

pub mod kube_watch;
mod notification;

pub use kube_watch::{KnownVersions, known_versions};
pub use notification::*;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::kube::{ClusterSource, FetchedCollection};
use crate::models::CollectionSpec;

/// Manages one watch task per collection
pub struct ResourceWatcher {
    source: Arc<dyn ClusterSource>,
    updates: UpdateIngestor,
    handles: Vec<JoinHandle<()>>,
}

impl ResourceWatcher {
    pub fn new(source: Arc<dyn ClusterSource>, updates: UpdateIngestor) -> Self {
        Self {
            source,
            updates,
            handles: Vec::new(),
        }
    }

    /// Start following one collection; `known` objects are not reported again
    pub fn watch(&mut self, spec: &'static CollectionSpec, known: KnownVersions) {
        let source = Arc::clone(&self.source);
        let updates = self.updates.clone();

        let handle = tokio::spawn(async move {
            match source.watch(spec, known, updates).await {
                Ok(()) => debug!(kind = %spec.kind, "watch task finished"),
                Err(e) => warn!(kind = %spec.kind, error = %e, "watch task stopped"),
            }
        });
        self.handles.push(handle);
    }

    /// Follow every fetched collection, starting from what it listed
    pub fn watch_all(&mut self, collections: &[FetchedCollection]) {
        for collection in collections {
            self.watch(collection.spec, known_versions(&collection.items));
        }
    }

    /// Number of watch tasks started and not stopped
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Abort all watcher tasks
    pub fn stop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
        self.handles.clear();
    }
}

impl Drop for ResourceWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
