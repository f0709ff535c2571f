//! Typed access to per-kind resource payloads
//!
//! Raw payloads arrive as untyped JSON. `KindPayload` decodes the kinds the
//! graph derives relations or status from into their `k8s-openapi` types and
//! exposes the handful of fields the derivation rules read. Everything else,
//! and any payload that fails to decode, is carried as `Generic`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{
    Container, Node, PersistentVolumeClaim, Pod, Service, Volume,
};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend};
use serde::Deserialize;
use serde_json::Value;

use super::ResourceKind;

/// A name reference from a pod to a ConfigMap, Secret or PersistentVolumeClaim
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Dependency {
    pub kind: ResourceKind,
    pub name: String,
}

impl Dependency {
    fn new(kind: ResourceKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
        }
    }
}

/// Discriminated union over the kinds with typed derivation rules
#[derive(Debug, Clone)]
pub enum KindPayload {
    Pod(Box<Pod>),
    Node(Box<Node>),
    Service(Box<Service>),
    Deployment(Box<Deployment>),
    StatefulSet(Box<StatefulSet>),
    DaemonSet(Box<DaemonSet>),
    Ingress(Box<Ingress>),
    PersistentVolumeClaim(Box<PersistentVolumeClaim>),
    /// Untyped fallback: unknown kinds, kinds without typed rules, undecodable payloads
    Generic,
}

/// Reference names are `String` or `Option<String>` depending on the API
/// revision; both read as "absent" when empty.
trait RefName {
    fn ref_name(&self) -> Option<&str>;
}

impl RefName for String {
    fn ref_name(&self) -> Option<&str> {
        (!self.is_empty()).then_some(self.as_str())
    }
}

impl RefName for Option<String> {
    fn ref_name(&self) -> Option<&str> {
        self.as_deref().filter(|s| !s.is_empty())
    }
}

impl KindPayload {
    /// Decode a raw payload for the given kind
    ///
    /// A payload that does not fit the kind's schema degrades to `Generic`;
    /// status derivation still works on the raw JSON in that case.
    pub fn decode(kind: ResourceKind, raw: &Value) -> Self {
        fn typed<T: for<'de> Deserialize<'de>>(
            kind: ResourceKind,
            raw: &Value,
            wrap: fn(Box<T>) -> KindPayload,
        ) -> KindPayload {
            match T::deserialize(raw) {
                Ok(obj) => wrap(Box::new(obj)),
                Err(e) => {
                    tracing::debug!(kind = %kind, error = %e, "payload did not decode, using generic shape");
                    KindPayload::Generic
                }
            }
        }

        match kind {
            ResourceKind::Pod => typed(kind, raw, KindPayload::Pod),
            ResourceKind::Node => typed(kind, raw, KindPayload::Node),
            ResourceKind::Service => typed(kind, raw, KindPayload::Service),
            ResourceKind::Deployment => typed(kind, raw, KindPayload::Deployment),
            ResourceKind::StatefulSet => typed(kind, raw, KindPayload::StatefulSet),
            ResourceKind::DaemonSet => typed(kind, raw, KindPayload::DaemonSet),
            ResourceKind::Ingress => typed(kind, raw, KindPayload::Ingress),
            ResourceKind::PersistentVolumeClaim => {
                typed(kind, raw, KindPayload::PersistentVolumeClaim)
            }
            _ => KindPayload::Generic,
        }
    }

    /// Decode an optional payload; a missing payload is `Generic`
    pub fn decode_opt(kind: ResourceKind, raw: Option<&Value>) -> Self {
        raw.map(|raw| Self::decode(kind, raw))
            .unwrap_or(KindPayload::Generic)
    }

    /// Match-labels selector of a Service, StatefulSet or DaemonSet
    ///
    /// Expression-form selectors are not evaluated. An empty selector is
    /// reported as absent: it would otherwise match every pod.
    pub fn selector(&self) -> Option<&BTreeMap<String, String>> {
        let selector = match self {
            KindPayload::Service(svc) => svc.spec.as_ref()?.selector.as_ref(),
            KindPayload::StatefulSet(sts) => sts.spec.as_ref()?.selector.match_labels.as_ref(),
            KindPayload::DaemonSet(ds) => ds.spec.as_ref()?.selector.match_labels.as_ref(),
            _ => None,
        };
        selector.filter(|s| !s.is_empty())
    }

    /// Node a pod is scheduled onto
    pub fn node_name(&self) -> Option<&str> {
        match self {
            KindPayload::Pod(pod) => pod.spec.as_ref()?.node_name.ref_name(),
            _ => None,
        }
    }

    /// Storage class a PersistentVolumeClaim requests
    pub fn storage_class(&self) -> Option<&str> {
        match self {
            KindPayload::PersistentVolumeClaim(pvc) => {
                pvc.spec.as_ref()?.storage_class_name.ref_name()
            }
            _ => None,
        }
    }

    /// Services an Ingress routes to (default backend and every rule path)
    pub fn backend_services(&self) -> Vec<&str> {
        let KindPayload::Ingress(ingress) = self else {
            return Vec::new();
        };
        let Some(spec) = ingress.spec.as_ref() else {
            return Vec::new();
        };

        fn service_of(backend: &IngressBackend) -> Option<&str> {
            backend.service.as_ref()?.name.ref_name()
        }

        let mut names: Vec<&str> = spec.default_backend.iter().filter_map(service_of).collect();
        for rule in spec.rules.iter().flatten() {
            if let Some(http) = &rule.http {
                names.extend(http.paths.iter().filter_map(|p| service_of(&p.backend)));
            }
        }
        names.sort_unstable();
        names.dedup();
        names
    }

    /// ConfigMaps, Secrets and PersistentVolumeClaims a pod references
    ///
    /// Scans volumes, projected volume sources, `envFrom` and per-variable
    /// `valueFrom` key references of every container (init containers included).
    pub fn dependencies(&self) -> Vec<Dependency> {
        let KindPayload::Pod(pod) = self else {
            return Vec::new();
        };
        let Some(spec) = pod.spec.as_ref() else {
            return Vec::new();
        };

        let mut deps = Vec::new();
        for volume in spec.volumes.iter().flatten() {
            volume_dependencies(volume, &mut deps);
        }
        for container in spec.containers.iter().chain(spec.init_containers.iter().flatten()) {
            container_dependencies(container, &mut deps);
        }
        deps.sort();
        deps.dedup();
        deps
    }

    /// Pod phase (`Running`, `Pending`, ...)
    pub fn pod_phase(&self) -> Option<&str> {
        match self {
            KindPayload::Pod(pod) => pod.status.as_ref()?.phase.ref_name(),
            _ => None,
        }
    }

    /// Status of the node's `Ready` condition
    pub fn node_ready(&self) -> Option<bool> {
        let KindPayload::Node(node) = self else {
            return None;
        };
        node.status
            .as_ref()?
            .conditions
            .iter()
            .flatten()
            .find(|c| c.type_ == "Ready")
            .map(|c| c.status == "True")
    }

    /// `(ready, desired)` replica counts for Deployment, StatefulSet and DaemonSet
    pub fn replica_counts(&self) -> Option<(i32, i32)> {
        match self {
            KindPayload::Deployment(deploy) => {
                let status = deploy.status.as_ref();
                let available = status.and_then(|s| s.available_replicas).unwrap_or(0);
                let replicas = status.and_then(|s| s.replicas).unwrap_or(0);
                Some((available, replicas))
            }
            KindPayload::StatefulSet(sts) => {
                let ready = sts.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0);
                let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                Some((ready, desired))
            }
            KindPayload::DaemonSet(ds) => {
                let status = ds.status.as_ref();
                let ready = status.map(|s| s.number_ready).unwrap_or(0);
                let desired = status.map(|s| s.desired_number_scheduled).unwrap_or(0);
                Some((ready, desired))
            }
            _ => None,
        }
    }
}

fn volume_dependencies(volume: &Volume, deps: &mut Vec<Dependency>) {
    if let Some(pvc) = &volume.persistent_volume_claim {
        if let Some(name) = pvc.claim_name.ref_name() {
            deps.push(Dependency::new(ResourceKind::PersistentVolumeClaim, name));
        }
    }
    if let Some(name) = volume.config_map.as_ref().and_then(|cm| cm.name.ref_name()) {
        deps.push(Dependency::new(ResourceKind::ConfigMap, name));
    }
    if let Some(name) = volume.secret.as_ref().and_then(|s| s.secret_name.ref_name()) {
        deps.push(Dependency::new(ResourceKind::Secret, name));
    }
    if let Some(projected) = &volume.projected {
        for source in projected.sources.iter().flatten() {
            if let Some(name) = source.config_map.as_ref().and_then(|cm| cm.name.ref_name()) {
                deps.push(Dependency::new(ResourceKind::ConfigMap, name));
            }
            if let Some(name) = source.secret.as_ref().and_then(|s| s.name.ref_name()) {
                deps.push(Dependency::new(ResourceKind::Secret, name));
            }
        }
    }
}

fn container_dependencies(container: &Container, deps: &mut Vec<Dependency>) {
    for env_from in container.env_from.iter().flatten() {
        if let Some(name) = env_from.config_map_ref.as_ref().and_then(|r| r.name.ref_name()) {
            deps.push(Dependency::new(ResourceKind::ConfigMap, name));
        }
        if let Some(name) = env_from.secret_ref.as_ref().and_then(|r| r.name.ref_name()) {
            deps.push(Dependency::new(ResourceKind::Secret, name));
        }
    }
    for var in container.env.iter().flatten() {
        let Some(source) = &var.value_from else {
            continue;
        };
        if let Some(name) = source.config_map_key_ref.as_ref().and_then(|r| r.name.ref_name()) {
            deps.push(Dependency::new(ResourceKind::ConfigMap, name));
        }
        if let Some(name) = source.secret_key_ref.as_ref().and_then(|r| r.name.ref_name()) {
            deps.push(Dependency::new(ResourceKind::Secret, name));
        }
    }
}
