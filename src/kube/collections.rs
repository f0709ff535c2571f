//! Collection fetching
//!
//! [`ClusterSource`] is the seam between the topology engine and the API
//! server: list a collection, get one object, follow a collection's changes.
//! [`CollectionFetcher`] lists every requested collection in parallel; a kind
//! that errors or exceeds the timeout degrades to an empty collection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use kube::Client;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{TopologyError, TopologyResult};
use crate::models::CollectionSpec;
use crate::watcher::{KnownVersions, UpdateIngestor};

/// Read access to a cluster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterSource: Send + Sync {
    /// Connectivity check run before any collection is listed
    async fn probe(&self) -> TopologyResult<()>;

    /// Every object of the collection as cluster JSON
    async fn list(&self, spec: &CollectionSpec) -> TopologyResult<Vec<Value>>;

    /// Full payload of one object; `namespace` is ignored for cluster-scoped kinds
    async fn get(&self, spec: &CollectionSpec, namespace: &str, name: &str)
    -> TopologyResult<Value>;

    /// Push changes of a collection into `updates` until the channel closes
    ///
    /// `known` holds the objects already in the graph; they are only
    /// reported again once they change or disappear.
    async fn watch(
        &self,
        spec: &CollectionSpec,
        known: KnownVersions,
        updates: UpdateIngestor,
    ) -> TopologyResult<()>;
}

/// [`ClusterSource`] backed by a kube client
#[derive(Clone)]
pub struct KubeClusterSource {
    client: Client,
}

impl KubeClusterSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, spec: &CollectionSpec, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = api_resource(spec);
        match namespace {
            Some(ns) if spec.namespaced => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }
}

/// Dynamic API descriptor for a collection
pub fn api_resource(spec: &CollectionSpec) -> ApiResource {
    let gvk = GroupVersionKind::gvk(spec.group, spec.version, spec.kind.as_str());
    ApiResource::from_gvk_with_plural(&gvk, spec.plural)
}

fn fetch_error(spec: &CollectionSpec, e: impl std::fmt::Display) -> TopologyError {
    TopologyError::Fetch {
        kind: spec.kind.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl ClusterSource for KubeClusterSource {
    async fn probe(&self) -> TopologyResult<()> {
        super::probe(&self.client).await
    }

    async fn list(&self, spec: &CollectionSpec) -> TopologyResult<Vec<Value>> {
        let list = self
            .api(spec, None)
            .list(&ListParams::default())
            .await
            .map_err(|e| fetch_error(spec, e))?;

        list.items
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| fetch_error(spec, e))
    }

    async fn get(
        &self,
        spec: &CollectionSpec,
        namespace: &str,
        name: &str,
    ) -> TopologyResult<Value> {
        let obj = self
            .api(spec, Some(namespace))
            .get(name)
            .await
            .map_err(|e| fetch_error(spec, e))?;
        serde_json::to_value(&obj).map_err(|e| fetch_error(spec, e))
    }

    async fn watch(
        &self,
        spec: &CollectionSpec,
        known: KnownVersions,
        updates: UpdateIngestor,
    ) -> TopologyResult<()> {
        crate::watcher::kube_watch::follow_collection(
            self.api(spec, None),
            spec.kind,
            known,
            updates,
        )
        .await
    }
}

/// Result of listing one collection
#[derive(Debug, Clone)]
pub struct FetchedCollection {
    pub spec: &'static CollectionSpec,
    pub items: Vec<Value>,
    /// Set when the collection degraded to empty
    pub error: Option<String>,
}

impl FetchedCollection {
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Parallel, failure-isolated listing of collections
pub struct CollectionFetcher {
    source: Arc<dyn ClusterSource>,
    timeout: Duration,
}

impl CollectionFetcher {
    pub fn new(source: Arc<dyn ClusterSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// List every collection; never fails as a whole
    ///
    /// The result keeps the order of `specs`.
    pub async fn fetch_all(&self, specs: &[&'static CollectionSpec]) -> Vec<FetchedCollection> {
        let fetched = join_all(specs.iter().map(|spec| self.fetch_one(*spec))).await;
        let degraded = fetched.iter().filter(|c| c.is_degraded()).count();
        debug!(
            collections = fetched.len(),
            degraded, "collection fetch settled"
        );
        fetched
    }

    async fn fetch_one(&self, spec: &'static CollectionSpec) -> FetchedCollection {
        let error = match tokio::time::timeout(self.timeout, self.source.list(spec)).await {
            Ok(Ok(items)) => {
                debug!(kind = %spec.kind, items = items.len(), "collection listed");
                return FetchedCollection {
                    spec,
                    items,
                    error: None,
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}s", self.timeout.as_secs_f32()),
        };

        warn!(kind = %spec.kind, error = %error, "collection unavailable, continuing with empty list");
        FetchedCollection {
            spec,
            items: Vec::new(),
            error: Some(error),
        }
    }
}
