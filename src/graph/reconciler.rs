//! Incremental reconciler
//!
//! Applies one change notification at a time to the current graph and
//! publishes the result. Partial payloads are merged into what is stored:
//! a missing `raw` keeps the previous one, and relations the payload cannot
//! re-derive are left in place.
//!
//! Per notification:
//! - outgoing ownership links are replaced from the merged owner ids, plus
//!   the pod placement link
//! - a Service with a selector has its outgoing network links recomputed
//! - a Pod has its incoming network links recomputed
//! - config and storage references are only derived for a fresh `ADDED`
//!   carrying `raw`

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::TopologyResult;
use crate::graph::builder::{ownership_links, placement_link, reference_links};
use crate::graph::model::{
    Graph, Link, RelationKind, Resource, extract_created_at, extract_labels, extract_owner_ids,
};
use crate::graph::selector;
use crate::graph::status::derive_status;
use crate::graph::store::GraphStore;
use crate::models::{KindPayload, ResourceKind};
use crate::watcher::{ChangeNotification, ChangeType, ResourcePayload, UpdateStream};

/// Single consumer of the update stream
pub struct Reconciler {
    store: Arc<GraphStore>,
}

impl Reconciler {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Consume the stream until it closes
    pub async fn run(self, mut updates: UpdateStream) {
        let mut applied = 0u64;
        while let Some(notification) = updates.recv().await {
            if self.handle(notification) {
                applied += 1;
            }
        }
        info!(applied, "update stream closed, reconciler stopped");
    }

    /// Apply one notification and publish if the graph changed
    ///
    /// Returns whether a new graph was published.
    pub fn handle(&self, notification: ChangeNotification) -> bool {
        let change_type = notification.change_type;
        let mut graph = Graph::clone(&self.store.current());
        match apply(&mut graph, notification) {
            Ok(true) => {
                self.store.publish(graph);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(change = %change_type, error = %e, "dropping notification");
                false
            }
        }
    }
}

/// Apply one notification to `graph`
///
/// Returns `Ok(false)` when nothing changed (DELETED of an unknown id) and an
/// error for notifications that cannot be applied at all.
pub fn apply(graph: &mut Graph, notification: ChangeNotification) -> TopologyResult<bool> {
    let id = notification.resource.resolve_id()?;
    match notification.change_type {
        ChangeType::Deleted => Ok(delete(graph, &id)),
        ChangeType::Added | ChangeType::Modified => {
            upsert(graph, id, notification.change_type, notification.resource);
            Ok(true)
        }
    }
}

fn delete(graph: &mut Graph, id: &str) -> bool {
    let Some(removed) = graph.resources.remove(id) else {
        debug!(id = %id, "delete for unknown id ignored");
        return false;
    };
    graph.remove_links_touching(id);
    debug!(id = %id, kind = %removed.kind, name = %removed.name, "resource deleted");
    true
}

fn upsert(graph: &mut Graph, id: String, change_type: ChangeType, incoming: ResourcePayload) {
    let existing = graph.resources.get(&id);
    let fresh = existing.is_none();
    let resource_kind = incoming.resource_kind();
    let ResourcePayload {
        name,
        namespace,
        labels,
        owner_ids,
        created_at,
        raw: incoming_raw,
        ..
    } = incoming;

    let kind = resource_kind
        .or(existing.map(|e| e.kind))
        .unwrap_or(ResourceKind::Generic);

    let derived_from_raw = incoming_raw.is_some();
    let labels = labels
        .or_else(|| incoming_raw.as_ref().map(extract_labels))
        .or_else(|| existing.map(|e| e.labels.clone()))
        .unwrap_or_default();
    let owner_ids = owner_ids
        .or_else(|| incoming_raw.as_ref().map(extract_owner_ids))
        .or_else(|| existing.map(|e| e.owner_ids.clone()))
        .unwrap_or_default();
    let raw = incoming_raw.or_else(|| existing.and_then(|e| e.raw.clone()));

    let meta_text = |key: &str| {
        raw.as_ref()
            .and_then(|r| r.get("metadata"))
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let name = name
        .or_else(|| meta_text("name"))
        .or_else(|| existing.map(|e| e.name.clone()))
        .unwrap_or_default();
    let namespace = namespace
        .or_else(|| meta_text("namespace"))
        .or_else(|| existing.map(|e| e.namespace.clone()))
        .unwrap_or_default();
    let created_at = created_at
        .or_else(|| raw.as_ref().and_then(extract_created_at))
        .or_else(|| existing.and_then(|e| e.created_at));

    let payload = KindPayload::decode_opt(kind, raw.as_ref());
    let resource = Resource {
        id,
        name,
        kind,
        namespace,
        status: derive_status(&payload, raw.as_ref()),
        labels,
        owner_ids,
        created_at,
        raw,
    };

    // Everything below reads the graph as it was before this notification
    let mut ownership: Vec<Link> = ownership_links(&resource).collect();
    ownership.extend(placement_link(&resource, &payload, &*graph));

    let references = if fresh && derived_from_raw {
        reference_links(&resource, &payload, &*graph)
    } else {
        Vec::new()
    };

    let outgoing_network = match (resource.kind, payload.selector()) {
        (ResourceKind::Service, Some(sel)) => Some(
            graph
                .in_namespace(ResourceKind::Pod, &resource.namespace)
                .filter(|pod| pod.id != resource.id && selector::matches(sel, &pod.labels))
                .map(|pod| Link::new(&resource.id, &pod.id, RelationKind::Network))
                .collect::<Vec<_>>(),
        ),
        _ => None,
    };

    let incoming_network = (resource.kind == ResourceKind::Pod).then(|| {
        graph
            .in_namespace(ResourceKind::Service, &resource.namespace)
            .filter(|svc| {
                service_selector(svc).is_some_and(|sel| selector::matches(&sel, &resource.labels))
            })
            .map(|svc| Link::new(&svc.id, &resource.id, RelationKind::Network))
            .collect::<Vec<_>>()
    });

    graph.remove_links_from(&resource.id, RelationKind::Ownership);
    for link in ownership {
        graph.add_link(link);
    }
    for link in references {
        graph.add_link(link);
    }
    if let Some(links) = outgoing_network {
        graph.remove_links_from(&resource.id, RelationKind::Network);
        for link in links {
            graph.add_link(link);
        }
    }
    if let Some(links) = incoming_network {
        graph.remove_links_to(&resource.id, RelationKind::Network);
        for link in links {
            graph.add_link(link);
        }
    }

    debug!(
        change = %change_type,
        id = %resource.id,
        kind = %resource.kind,
        fresh,
        "resource applied"
    );
    graph.insert(resource);
}

/// Selector of a stored Service, read from its retained payload
fn service_selector(service: &Resource) -> Option<std::collections::BTreeMap<String, String>> {
    KindPayload::decode_opt(ResourceKind::Service, service.raw.as_ref())
        .selector()
        .cloned()
}
