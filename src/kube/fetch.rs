//! Detail fetching
//!
//! Full payload of a single resource, used to backfill `raw` on resources
//! that only ever arrived through partial updates.

use serde_json::Value;

use crate::error::{TopologyError, TopologyResult};
use crate::kube::ClusterSource;
use crate::models::ResourceKind;

/// Fetch one resource by (namespace, kind, name)
pub async fn fetch_detail(
    source: &dyn ClusterSource,
    namespace: &str,
    kind: ResourceKind,
    name: &str,
) -> TopologyResult<Value> {
    let spec = kind
        .collection()
        .ok_or_else(|| TopologyError::UnknownKind(kind.to_string()))?;
    tracing::debug!(kind = %kind, namespace, name, "fetching resource detail");
    source.get(spec, namespace, name).await
}
