//! Service layer
//!
//! Ties the Kubernetes adapters and the topology graph together into a
//! session that library consumers and the CLI drive.

pub mod topology_session;

pub use topology_session::{SessionOptions, TopologySession, fetch_snapshot};
