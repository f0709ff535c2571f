//! Kubernetes client module
//!
//! Client construction, the connectivity probe and the read-only adapters the
//! topology engine uses to list, get and follow collections.
//!
//! Uses the default kubeconfig loading strategy:
//! 1. In-cluster config (if running in a pod)
//! 2. KUBECONFIG environment variable
//! 3. ~/.kube/config

pub mod collections;
pub mod fetch;

pub use collections::{
    ClusterSource, CollectionFetcher, FetchedCollection, KubeClusterSource,
};
pub use fetch::fetch_detail;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::error::{TopologyError, TopologyResult};

/// Client for the current kubeconfig context
pub async fn create_client() -> Result<Client> {
    let config = Config::infer()
        .await
        .context("Failed to load Kubernetes configuration")?;
    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Client for a named kubeconfig context
pub async fn create_client_for_context(context: &str) -> Result<Client> {
    let options = KubeConfigOptions {
        context: Some(context.to_string()),
        ..Default::default()
    };
    let config = Config::from_kubeconfig(&options)
        .await
        .with_context(|| format!("Failed to load kubeconfig context '{}'", context))?;
    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Client for `context` when given, otherwise the current context
pub async fn client_for(context: Option<&str>) -> Result<Client> {
    match context {
        Some(context) => create_client_for_context(context).await,
        None => create_client().await,
    }
}

/// Name of the current kubeconfig context, if a kubeconfig can be read
pub fn current_context() -> Option<String> {
    Kubeconfig::read().ok()?.current_context
}

/// Connectivity check: ask the API server for its version
pub async fn probe(client: &Client) -> TopologyResult<()> {
    let info = client
        .apiserver_version()
        .await
        .map_err(|e| TopologyError::Unreachable(e.to_string()))?;
    debug!(version = %info.git_version, "API server reachable");
    Ok(())
}
