//! Topology graph
//!
//! The snapshot builder produces the first graph, the reconciler keeps it
//! current and the store publishes every version to readers.

pub mod builder;
pub mod model;
pub mod reconciler;
pub mod render;
pub mod selector;
pub mod status;
pub mod store;

pub use builder::{SnapshotBuilder, build_snapshot};
pub use model::{Graph, GraphSummary, Link, RelationKind, Resource};
pub use reconciler::{Reconciler, apply};
pub use store::GraphStore;
