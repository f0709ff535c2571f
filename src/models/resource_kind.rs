//! Resource kind definitions
//!
//! Centralized enum for the Kubernetes kinds tracked by the topology graph.
//! Every tracked kind knows the collection it is listed from (group, version,
//! plural, scope). Kinds outside this set decode to [`ResourceKind::Generic`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Enumeration of tracked resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    // Cluster-scoped infrastructure
    Namespace,
    Node,
    PersistentVolume,
    StorageClass,
    // Workloads
    Pod,
    Deployment,
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    // Networking
    Service,
    Ingress,
    // Configuration and storage
    ConfigMap,
    Secret,
    PersistentVolumeClaim,
    /// Anything the graph does not have typed rules for
    Generic,
}

/// Collection endpoint a kind is listed and watched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSpec {
    pub kind: ResourceKind,
    pub group: &'static str,
    pub version: &'static str,
    pub plural: &'static str,
    pub namespaced: bool,
}

impl CollectionSpec {
    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

macro_rules! collection {
    ($kind:ident, $group:expr, $version:expr, $plural:expr, $namespaced:expr) => {
        CollectionSpec {
            kind: ResourceKind::$kind,
            group: $group,
            version: $version,
            plural: $plural,
            namespaced: $namespaced,
        }
    };
}

/// Built-in collections, in snapshot order
const COLLECTIONS: &[CollectionSpec] = &[
    collection!(Namespace, "", "v1", "namespaces", false),
    collection!(Node, "", "v1", "nodes", false),
    collection!(PersistentVolume, "", "v1", "persistentvolumes", false),
    collection!(StorageClass, "storage.k8s.io", "v1", "storageclasses", false),
    collection!(Pod, "", "v1", "pods", true),
    collection!(Deployment, "apps", "v1", "deployments", true),
    collection!(ReplicaSet, "apps", "v1", "replicasets", true),
    collection!(StatefulSet, "apps", "v1", "statefulsets", true),
    collection!(DaemonSet, "apps", "v1", "daemonsets", true),
    collection!(Job, "batch", "v1", "jobs", true),
    collection!(CronJob, "batch", "v1", "cronjobs", true),
    collection!(Service, "", "v1", "services", true),
    collection!(Ingress, "networking.k8s.io", "v1", "ingresses", true),
    collection!(ConfigMap, "", "v1", "configmaps", true),
    collection!(Secret, "", "v1", "secrets", true),
    collection!(PersistentVolumeClaim, "", "v1", "persistentvolumeclaims", true),
];

impl ResourceKind {
    /// Get the kind name as it appears in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Node => "Node",
            ResourceKind::PersistentVolume => "PersistentVolume",
            ResourceKind::StorageClass => "StorageClass",
            ResourceKind::Pod => "Pod",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::ReplicaSet => "ReplicaSet",
            ResourceKind::StatefulSet => "StatefulSet",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::Job => "Job",
            ResourceKind::CronJob => "CronJob",
            ResourceKind::Service => "Service",
            ResourceKind::Ingress => "Ingress",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::Generic => "Generic",
        }
    }

    /// Try to parse a manifest kind name, returning None if it is not tracked
    ///
    /// `Generic` is a fallback, not a manifest kind, and never parses.
    pub fn parse_optional(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    /// Collection this kind is listed from; `None` for [`ResourceKind::Generic`]
    pub fn collection(&self) -> Option<&'static CollectionSpec> {
        COLLECTIONS.iter().find(|c| c.kind == *self)
    }

    /// All built-in collections
    pub fn collections() -> &'static [CollectionSpec] {
        COLLECTIONS
    }

    /// Parse user input (kind name, plural or short name), case-insensitive
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "namespace" | "namespaces" | "ns" => Some(ResourceKind::Namespace),
            "node" | "nodes" | "no" => Some(ResourceKind::Node),
            "persistentvolume" | "persistentvolumes" | "pv" => Some(ResourceKind::PersistentVolume),
            "storageclass" | "storageclasses" | "sc" => Some(ResourceKind::StorageClass),
            "pod" | "pods" | "po" => Some(ResourceKind::Pod),
            "deployment" | "deployments" | "deploy" => Some(ResourceKind::Deployment),
            "replicaset" | "replicasets" | "rs" => Some(ResourceKind::ReplicaSet),
            "statefulset" | "statefulsets" | "sts" => Some(ResourceKind::StatefulSet),
            "daemonset" | "daemonsets" | "ds" => Some(ResourceKind::DaemonSet),
            "job" | "jobs" => Some(ResourceKind::Job),
            "cronjob" | "cronjobs" | "cj" => Some(ResourceKind::CronJob),
            "service" | "services" | "svc" => Some(ResourceKind::Service),
            "ingress" | "ingresses" | "ing" => Some(ResourceKind::Ingress),
            "configmap" | "configmaps" | "cm" => Some(ResourceKind::ConfigMap),
            "secret" | "secrets" => Some(ResourceKind::Secret),
            "persistentvolumeclaim" | "persistentvolumeclaims" | "pvc" => {
                Some(ResourceKind::PersistentVolumeClaim)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Lenient conversion used when decoding payloads: unknown kinds become `Generic`
impl From<String> for ResourceKind {
    fn from(s: String) -> Self {
        ResourceKind::parse_optional(&s).unwrap_or(ResourceKind::Generic)
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Namespace" => Ok(ResourceKind::Namespace),
            "Node" => Ok(ResourceKind::Node),
            "PersistentVolume" => Ok(ResourceKind::PersistentVolume),
            "StorageClass" => Ok(ResourceKind::StorageClass),
            "Pod" => Ok(ResourceKind::Pod),
            "Deployment" => Ok(ResourceKind::Deployment),
            "ReplicaSet" => Ok(ResourceKind::ReplicaSet),
            "StatefulSet" => Ok(ResourceKind::StatefulSet),
            "DaemonSet" => Ok(ResourceKind::DaemonSet),
            "Job" => Ok(ResourceKind::Job),
            "CronJob" => Ok(ResourceKind::CronJob),
            "Service" => Ok(ResourceKind::Service),
            "Ingress" => Ok(ResourceKind::Ingress),
            "ConfigMap" => Ok(ResourceKind::ConfigMap),
            "Secret" => Ok(ResourceKind::Secret),
            "PersistentVolumeClaim" => Ok(ResourceKind::PersistentVolumeClaim),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(ResourceKind::parse_optional("Pod"), Some(ResourceKind::Pod));
        assert_eq!(
            ResourceKind::parse_optional("StorageClass"),
            Some(ResourceKind::StorageClass)
        );
        assert_eq!(ResourceKind::parse_optional("Kustomization"), None);
        assert_eq!(ResourceKind::parse_optional("Generic"), None);
    }

    #[test]
    fn test_unknown_kind_decodes_to_generic() {
        let kind: ResourceKind = serde_json::from_str("\"Kustomization\"").unwrap();
        assert_eq!(kind, ResourceKind::Generic);
        let kind: ResourceKind = serde_json::from_str("\"Service\"").unwrap();
        assert_eq!(kind, ResourceKind::Service);
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!(
            ResourceKind::from_str_case_insensitive("svc"),
            Some(ResourceKind::Service)
        );
        assert_eq!(
            ResourceKind::from_str_case_insensitive("PVC"),
            Some(ResourceKind::PersistentVolumeClaim)
        );
        assert_eq!(ResourceKind::from_str_case_insensitive("bogus"), None);
    }

    #[test]
    fn test_every_tracked_kind_has_a_collection() {
        for spec in ResourceKind::collections() {
            assert_eq!(spec.kind.collection(), Some(spec));
        }
        assert!(ResourceKind::Generic.collection().is_none());
    }

    #[test]
    fn test_api_version() {
        let pods = ResourceKind::Pod.collection().unwrap();
        assert_eq!(pods.api_version(), "v1");
        let ingresses = ResourceKind::Ingress.collection().unwrap();
        assert_eq!(ingresses.api_version(), "networking.k8s.io/v1");
    }
}
