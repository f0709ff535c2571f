//! Resource model layer
//!
//! - `resource_kind.rs` - tracked kinds and the collections they are listed from
//! - `payload.rs` - typed per-kind access to raw payloads

pub mod payload;
pub mod resource_kind;

pub use payload::{Dependency, KindPayload};
pub use resource_kind::{CollectionSpec, ResourceKind};
