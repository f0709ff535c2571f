//! Graph store
//!
//! Holds the current graph behind an [`ArcSwap`] so readers always get a
//! complete value, never a half-applied update. Every publish bumps the
//! revision, signals the revision channel and then runs the registered
//! callbacks in registration order.
//!
//! There is exactly one writer (the reconciler, or the session when it
//! installs a snapshot); `publish` is not meant to be raced.

use std::sync::{Arc, PoisonError, RwLock};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::debug;

use crate::graph::model::Graph;

type GraphCallback = Arc<dyn Fn(&Graph) + Send + Sync>;

pub struct GraphStore {
    current: ArcSwap<Graph>,
    revision_tx: watch::Sender<u64>,
    callbacks: RwLock<Vec<GraphCallback>>,
}

impl GraphStore {
    /// Empty store at revision 0
    pub fn new() -> Self {
        let (revision_tx, _) = watch::channel(0u64);
        Self {
            current: ArcSwap::from_pointee(Graph::default()),
            revision_tx,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// The current graph
    pub fn current(&self) -> Arc<Graph> {
        self.current.load_full()
    }

    pub fn revision(&self) -> u64 {
        self.current.load().revision
    }

    /// Replace the current graph
    ///
    /// The stored revision is the previous one plus one, whatever the
    /// incoming graph carried.
    pub fn publish(&self, mut graph: Graph) -> Arc<Graph> {
        graph.revision = self.revision().saturating_add(1);
        let next = Arc::new(graph);
        self.current.store(Arc::clone(&next));
        self.revision_tx.send_replace(next.revision);

        // Callbacks may register further callbacks; run them unlocked
        let callbacks: Vec<GraphCallback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in &callbacks {
            callback(&next);
        }

        debug!(
            revision = next.revision,
            resources = next.resources.len(),
            links = next.links.len(),
            "graph published"
        );
        next
    }

    /// Revision channel; resolves on every publish
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    /// Register a callback run after every publish
    ///
    /// A callback registered while a publish is running first fires on the
    /// next publish.
    pub fn on_graph_changed<F>(&self, callback: F)
    where
        F: Fn(&Graph) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}
