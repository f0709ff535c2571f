//! kubetopo library
//!
//! Builds a topology graph of cluster resources from one snapshot of every
//! tracked collection, then keeps it current from a stream of change
//! notifications without rebuilding it.

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod kube;
pub mod models;
pub mod services;
pub mod watcher;

// Re-export commonly used types for convenience
pub use error::{TopologyError, TopologyResult};
pub use graph::{Graph, GraphStore, Link, RelationKind, Resource};
pub use models::{KindPayload, ResourceKind};
pub use services::TopologySession;
pub use watcher::{ChangeNotification, ChangeType, ResourcePayload, UpdateIngestor};
