//! Snapshot builder
//!
//! Turns the fetched collections into the initial graph in one pass:
//! resources first, then every derivable relation (owner references, pod
//! placement, selector matches, name references, pod dependencies).
//!
//! The name-reference rules are shared with the reconciler through
//! [`reference_links`] and [`placement_link`], which only need a way to
//! resolve `(kind, namespace, name)` to an id.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::graph::model::{Graph, Link, RelationKind, Resource};
use crate::graph::selector;
use crate::models::{KindPayload, ResourceKind};

/// Resolves a named resource to its id
pub(crate) trait Resolve {
    fn resolve(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<String>;
}

impl Resolve for Graph {
    fn resolve(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<String> {
        self.find_by_name(kind, namespace, name).map(|r| r.id.clone())
    }
}

type NameKey = (ResourceKind, String, String);

struct NameIndex(HashMap<NameKey, String>);

impl Resolve for NameIndex {
    fn resolve(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<String> {
        self.0
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }
}

/// Ownership links for a resource: one per owner id
pub(crate) fn ownership_links(resource: &Resource) -> impl Iterator<Item = Link> + '_ {
    resource
        .owner_ids
        .iter()
        .map(|owner| Link::new(&resource.id, owner, RelationKind::Ownership))
}

/// Pod → node placement, when the pod is scheduled and the node is known
pub(crate) fn placement_link(
    resource: &Resource,
    payload: &KindPayload,
    resolver: &impl Resolve,
) -> Option<Link> {
    let node = payload.node_name()?;
    let node_id = resolver.resolve(ResourceKind::Node, "", node)?;
    Some(Link::new(&resource.id, node_id, RelationKind::Ownership))
}

/// Outgoing name-reference links: pod dependencies, claim → storage class,
/// ingress → service
pub(crate) fn reference_links(
    resource: &Resource,
    payload: &KindPayload,
    resolver: &impl Resolve,
) -> Vec<Link> {
    let mut links = Vec::new();
    let ns = resource.namespace.as_str();

    for dep in payload.dependencies() {
        let relation = match dep.kind {
            ResourceKind::PersistentVolumeClaim => RelationKind::StorageReference,
            _ => RelationKind::ConfigReference,
        };
        if let Some(target) = resolver.resolve(dep.kind, ns, &dep.name) {
            links.push(Link::new(&resource.id, target, relation));
        }
    }

    if let Some(class) = payload.storage_class() {
        if let Some(target) = resolver.resolve(ResourceKind::StorageClass, "", class) {
            links.push(Link::new(&resource.id, target, RelationKind::StorageReference));
        }
    }

    for service in payload.backend_services() {
        if let Some(target) = resolver.resolve(ResourceKind::Service, ns, service) {
            links.push(Link::new(&resource.id, target, RelationKind::Network));
        }
    }

    links
}

/// Accumulates collections and builds the initial graph
#[derive(Default)]
pub struct SnapshotBuilder {
    entries: Vec<(Resource, KindPayload)>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the listed items of one collection
    ///
    /// Items without a usable id are skipped with a warning.
    pub fn add_items(&mut self, kind: ResourceKind, items: &[Value]) -> &mut Self {
        for item in items {
            match Resource::from_object_with_payload(kind, item) {
                Ok(entry) => self.entries.push(entry),
                Err(e) => warn!(kind = %kind, error = %e, "skipping undecodable item"),
            }
        }
        self
    }

    /// Number of resources accumulated so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the graph from everything added
    pub fn build(self) -> Graph {
        let mut graph = Graph::new();

        let index = NameIndex(
            self.entries
                .iter()
                .map(|(r, _)| ((r.kind, r.namespace.clone(), r.name.clone()), r.id.clone()))
                .collect(),
        );

        // Pods per namespace, for selector matching
        let mut pods_by_ns: HashMap<&str, Vec<&Resource>> = HashMap::new();
        for (resource, _) in &self.entries {
            if resource.kind == ResourceKind::Pod {
                pods_by_ns
                    .entry(resource.namespace.as_str())
                    .or_default()
                    .push(resource);
            }
        }

        for (resource, payload) in &self.entries {
            for link in ownership_links(resource) {
                graph.add_link(link);
            }
            if let Some(link) = placement_link(resource, payload, &index) {
                graph.add_link(link);
            }
            for link in reference_links(resource, payload, &index) {
                graph.add_link(link);
            }

            let Some(selector) = payload.selector() else {
                continue;
            };
            let pods = pods_by_ns
                .get(resource.namespace.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            let matching = pods.iter().filter(|pod| selector::matches(selector, &pod.labels));

            match resource.kind {
                ResourceKind::Service => {
                    for pod in matching {
                        graph.add_link(Link::new(&resource.id, &pod.id, RelationKind::Network));
                    }
                }
                ResourceKind::StatefulSet | ResourceKind::DaemonSet => {
                    for pod in matching {
                        if graph.has_link(&pod.id, &resource.id, RelationKind::Ownership) {
                            continue;
                        }
                        graph.add_link(Link::new(&pod.id, &resource.id, RelationKind::Ownership));
                    }
                }
                _ => {}
            }
        }

        for (resource, _) in self.entries {
            if let Some(previous) = graph.insert(resource) {
                debug!(id = %previous.id, kind = %previous.kind, "duplicate id in snapshot, keeping last");
            }
        }

        debug!(
            resources = graph.resources.len(),
            links = graph.links.len(),
            "snapshot graph built"
        );
        graph
    }
}

/// Build a graph from `(kind, items)` collections
pub fn build_snapshot<'a>(collections: impl IntoIterator<Item = (ResourceKind, &'a [Value])>) -> Graph {
    let mut builder = SnapshotBuilder::new();
    for (kind, items) in collections {
        builder.add_items(kind, items);
    }
    builder.build()
}
