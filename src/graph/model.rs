//! Graph data structures
//!
//! Resources are keyed by their cluster-assigned id. Links are kept in an
//! ordered set, which makes every `(source, target, relation)` tuple unique
//! and gives readers a stable iteration order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{TopologyError, TopologyResult};
use crate::graph::status::derive_status;
use crate::models::{KindPayload, ResourceKind};

/// A node in the topology graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub kind: ResourceKind,
    /// Empty for cluster-scoped resources
    pub namespace: String,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    pub owner_ids: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl Resource {
    /// Shape a raw cluster object of a known kind into a resource
    pub fn from_object(kind: ResourceKind, obj: &Value) -> TopologyResult<Self> {
        Self::from_object_with_payload(kind, obj).map(|(resource, _)| resource)
    }

    /// Like [`Resource::from_object`], also returning the decoded payload
    pub fn from_object_with_payload(
        kind: ResourceKind,
        obj: &Value,
    ) -> TopologyResult<(Self, KindPayload)> {
        let meta = obj
            .get("metadata")
            .ok_or_else(|| TopologyError::Decode(format!("{} object without metadata", kind)))?;
        let id = meta
            .get("uid")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TopologyError::Decode(format!("{} object without metadata.uid", kind)))?
            .to_string();

        let payload = KindPayload::decode(kind, obj);
        let resource = Resource {
            id,
            name: str_field(meta, "name"),
            kind,
            namespace: str_field(meta, "namespace"),
            status: derive_status(&payload, Some(obj)),
            labels: extract_labels(obj),
            owner_ids: extract_owner_ids(obj),
            created_at: extract_created_at(obj),
            raw: Some(obj.clone()),
        };
        Ok((resource, payload))
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

fn str_field(meta: &Value, key: &str) -> String {
    meta.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// `metadata.labels` as an ordered map; non-string values are skipped
pub fn extract_labels(obj: &Value) -> BTreeMap<String, String> {
    obj.get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(|l| l.as_object())
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Owner ids from `metadata.ownerReferences`, in declaration order
pub fn extract_owner_ids(obj: &Value) -> Vec<String> {
    obj.get("metadata")
        .and_then(|m| m.get("ownerReferences"))
        .and_then(|o| o.as_array())
        .map(|owners| {
            owners
                .iter()
                .filter_map(|o| o.get("uid").and_then(|u| u.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub fn extract_created_at(obj: &Value) -> Option<DateTime<Utc>> {
    obj.get("metadata")
        .and_then(|m| m.get("creationTimestamp"))
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Type of relationship a link represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    /// Owner reference, or pod placement onto a node
    Ownership,
    /// Service selecting a pod, ingress routing to a service
    Network,
    /// Pod consuming a ConfigMap or Secret
    ConfigReference,
    /// Pod mounting a claim, claim requesting a storage class
    StorageReference,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Ownership => "ownership",
            RelationKind::Network => "network",
            RelationKind::ConfigReference => "config-reference",
            RelationKind::StorageReference => "storage-reference",
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed edge between two resource ids
///
/// Either endpoint may name an id that is not in the resource map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub source: String,
    pub target: String,
    pub relation: RelationKind,
}

impl Link {
    pub fn new(source: impl Into<String>, target: impl Into<String>, relation: RelationKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation,
        }
    }
}

/// The topology graph: resource map plus link set
///
/// Resources are shared between revisions; cloning a graph copies the map of
/// pointers, never the payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    /// Bumped by the store on every publish
    pub revision: u64,
    pub resources: BTreeMap<String, Arc<Resource>>,
    pub links: BTreeSet<Link>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id).map(Arc::as_ref)
    }

    /// Insert or replace a resource; returns the one previously stored
    pub fn insert(&mut self, resource: Resource) -> Option<Arc<Resource>> {
        self.resources.insert(resource.id.clone(), Arc::new(resource))
    }

    /// Add a link; returns false if an identical link already exists
    pub fn add_link(&mut self, link: Link) -> bool {
        self.links.insert(link)
    }

    pub fn has_link(&self, source: &str, target: &str, relation: RelationKind) -> bool {
        self.links.contains(&Link::new(source, target, relation))
    }

    /// Links leaving `id` with the given relation
    pub fn links_from<'a>(
        &'a self,
        id: &'a str,
        relation: RelationKind,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        self.links
            .iter()
            .filter(move |l| l.source == id && l.relation == relation)
    }

    /// Links arriving at `id` with the given relation
    pub fn links_to<'a>(
        &'a self,
        id: &'a str,
        relation: RelationKind,
    ) -> impl Iterator<Item = &'a Link> + 'a {
        self.links
            .iter()
            .filter(move |l| l.target == id && l.relation == relation)
    }

    /// Remove links leaving `id` with the given relation
    pub fn remove_links_from(&mut self, id: &str, relation: RelationKind) {
        self.links
            .retain(|l| !(l.source == id && l.relation == relation));
    }

    /// Remove links arriving at `id` with the given relation
    pub fn remove_links_to(&mut self, id: &str, relation: RelationKind) {
        self.links
            .retain(|l| !(l.target == id && l.relation == relation));
    }

    /// Remove every link that has `id` as source or target
    pub fn remove_links_touching(&mut self, id: &str) {
        self.links.retain(|l| l.source != id && l.target != id);
    }

    /// Resources of a kind within a namespace
    pub fn in_namespace<'a>(
        &'a self,
        kind: ResourceKind,
        namespace: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .values()
            .filter(move |r| r.kind == kind && r.namespace == namespace)
            .map(Arc::as_ref)
    }

    /// Look up a resource by kind, namespace and name
    pub fn find_by_name(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<&Resource> {
        self.resources
            .values()
            .map(Arc::as_ref)
            .find(|r| r.kind == kind && r.namespace == namespace && r.name == name)
    }

    /// Counts per kind and per relation
    pub fn summary(&self) -> GraphSummary {
        let mut summary = GraphSummary {
            revision: self.revision,
            resources: self.resources.len(),
            links: self.links.len(),
            ..Default::default()
        };
        for resource in self.resources.values() {
            *summary.by_kind.entry(resource.kind).or_insert(0) += 1;
        }
        for link in &self.links {
            *summary.by_relation.entry(link.relation).or_insert(0) += 1;
            if !self.resources.contains_key(&link.source) || !self.resources.contains_key(&link.target)
            {
                summary.dangling += 1;
            }
        }
        summary
    }
}

/// Aggregate counts over a graph, used for CLI output and logging
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub revision: u64,
    pub resources: usize,
    pub links: usize,
    pub dangling: usize,
    pub by_kind: BTreeMap<ResourceKind, usize>,
    pub by_relation: BTreeMap<RelationKind, usize>,
}

impl std::fmt::Display for GraphSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rev {}: {} resources, {} links ({} dangling)",
            self.revision, self.resources, self.links, self.dangling
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_object_requires_uid() {
        let obj = json!({ "metadata": { "name": "orphan" } });
        assert!(matches!(
            Resource::from_object(ResourceKind::ConfigMap, &obj),
            Err(TopologyError::Decode(_))
        ));
    }

    #[test]
    fn test_from_object_extracts_metadata() {
        let obj = json!({
            "metadata": {
                "uid": "u-1",
                "name": "web",
                "namespace": "shop",
                "labels": { "app": "web", "replicas": 3 },
                "ownerReferences": [{ "uid": "rs-1" }, { "uid": "rs-2" }],
                "creationTimestamp": "2024-05-01T10:00:00Z"
            }
        });
        let resource = Resource::from_object(ResourceKind::ConfigMap, &obj).unwrap();
        assert_eq!(resource.id, "u-1");
        assert_eq!(resource.namespace, "shop");
        assert_eq!(resource.labels.len(), 1);
        assert_eq!(resource.owner_ids, vec!["rs-1", "rs-2"]);
        assert!(resource.created_at.is_some());
        assert_eq!(resource.status, "Active");
        assert!(resource.raw.is_some());
    }

    #[test]
    fn test_links_are_unique() {
        let mut graph = Graph::new();
        assert!(graph.add_link(Link::new("a", "b", RelationKind::Ownership)));
        assert!(!graph.add_link(Link::new("a", "b", RelationKind::Ownership)));
        assert!(graph.add_link(Link::new("a", "b", RelationKind::Network)));
        assert_eq!(graph.links.len(), 2);
    }

    #[test]
    fn test_find_by_name_is_scoped_by_kind_and_namespace() {
        let mut graph = Graph::new();
        for (uid, kind, ns) in [
            ("c1", "ConfigMap", "a"),
            ("c2", "ConfigMap", "b"),
            ("s1", "Secret", "a"),
        ] {
            let obj = json!({ "metadata": { "uid": uid, "name": "shared", "namespace": ns } });
            let kind = ResourceKind::parse_optional(kind).unwrap();
            graph.insert(Resource::from_object(kind, &obj).unwrap());
        }

        let namespace = String::from("b");
        let found = graph.find_by_name(ResourceKind::ConfigMap, &namespace, "shared");
        drop(namespace);
        assert_eq!(found.map(|r| r.id.as_str()), Some("c2"));
        assert_eq!(
            graph.find_by_name(ResourceKind::Secret, "a", "shared").map(|r| r.id.as_str()),
            Some("s1")
        );
        assert!(graph.find_by_name(ResourceKind::Secret, "b", "shared").is_none());
    }

    #[test]
    fn test_clone_shares_resources() {
        let mut graph = Graph::new();
        let obj = json!({ "metadata": { "uid": "u-1", "name": "web" }, "data": { "k": "v" } });
        graph.insert(Resource::from_object(ResourceKind::ConfigMap, &obj).unwrap());

        let copy = graph.clone();
        assert!(Arc::ptr_eq(&graph.resources["u-1"], &copy.resources["u-1"]));
    }

    #[test]
    fn test_relation_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&RelationKind::ConfigReference).unwrap();
        assert_eq!(json, "\"config-reference\"");
    }
}
