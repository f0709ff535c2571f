//! Headless topology session
//!
//! `TopologySession` wires the pieces together for one cluster connection:
//! probe, fetch every collection, build and publish the snapshot, then start
//! the reconciler and one watch task per collection. The graph store lives
//! exactly as long as the session.
//!
//! # Example
//!
//! ```rust,no_run
//! use kubetopo::config::Config;
//! use kubetopo::services::TopologySession;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let session = TopologySession::connect(&Config::default()).await?;
//! session.on_graph_changed(|graph| println!("{}", graph.summary()));
//!
//! let graph = session.current_graph();
//! println!("{} resources", graph.resources.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{TopologyError, TopologyResult};
use crate::graph::{Graph, GraphStore, Reconciler, build_snapshot};
use crate::kube::{ClusterSource, CollectionFetcher, FetchedCollection, KubeClusterSource};
use crate::models::{CollectionSpec, ResourceKind};
use crate::watcher::{
    ChangeNotification, ChangeType, ResourcePayload, ResourceWatcher, UpdateIngestor,
    update_channel,
};

/// Connection parameters for a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub collections: Vec<&'static CollectionSpec>,
    pub fetch_timeout: Duration,
    pub channel_capacity: usize,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            collections: config.collections(),
            fetch_timeout: Duration::from_secs(config.fetch.timeout_secs),
            channel_capacity: config.updates.channel_capacity,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Probe, then list every collection and build a graph
///
/// Only an unreachable cluster is an error; failing collections come back
/// empty and marked degraded.
pub async fn fetch_snapshot(
    source: Arc<dyn ClusterSource>,
    options: &SessionOptions,
) -> TopologyResult<(Graph, Vec<FetchedCollection>)> {
    source.probe().await.map_err(|e| match e {
        TopologyError::Unreachable(_) => e,
        other => TopologyError::Unreachable(other.to_string()),
    })?;

    let fetched = CollectionFetcher::new(source, options.fetch_timeout)
        .fetch_all(&options.collections)
        .await;
    let graph = build_snapshot(fetched.iter().map(|c| (c.spec.kind, c.items.as_slice())));
    Ok((graph, fetched))
}

/// Live pipeline pieces that are rebuilt on reconnect
struct Pipeline {
    ingestor: UpdateIngestor,
    watcher: ResourceWatcher,
    reconciler: JoinHandle<()>,
    degraded: Vec<ResourceKind>,
}

impl Pipeline {
    async fn start(
        source: &Arc<dyn ClusterSource>,
        options: &SessionOptions,
        store: &Arc<GraphStore>,
    ) -> TopologyResult<Self> {
        let (graph, fetched) = fetch_snapshot(Arc::clone(source), options).await?;
        let degraded = fetched
            .iter()
            .filter(|c| c.is_degraded())
            .map(|c| c.spec.kind)
            .collect();
        let published = store.publish(graph);
        info!(summary = %published.summary(), "snapshot published");

        // Updates only flow once the snapshot is in place
        let (ingestor, stream) = update_channel(options.channel_capacity);
        let reconciler = tokio::spawn(Reconciler::new(Arc::clone(store)).run(stream));
        let mut watcher = ResourceWatcher::new(Arc::clone(source), ingestor.clone());
        watcher.watch_all(&fetched);

        Ok(Self {
            ingestor,
            watcher,
            reconciler,
            degraded,
        })
    }

    async fn shutdown(mut self) {
        self.watcher.stop();
        self.reconciler.abort();
        // Wait so a late publish cannot land after whatever comes next
        let _ = self.reconciler.await;
    }
}

/// A live topology graph for one cluster
pub struct TopologySession {
    source: Arc<dyn ClusterSource>,
    options: SessionOptions,
    store: Arc<GraphStore>,
    /// `None` after a failed reconnect
    pipeline: Option<Pipeline>,
}

impl TopologySession {
    /// Connect to the cluster selected by `config`
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let client = crate::kube::client_for(config.context()).await?;
        let source = Arc::new(KubeClusterSource::new(client));
        Ok(Self::connect_with(source, SessionOptions::from_config(config)).await?)
    }

    /// Connect through any cluster source
    pub async fn connect_with(
        source: Arc<dyn ClusterSource>,
        options: SessionOptions,
    ) -> TopologyResult<Self> {
        let store = Arc::new(GraphStore::new());
        let pipeline = Pipeline::start(&source, &options, &store).await?;
        Ok(Self {
            source,
            options,
            store,
            pipeline: Some(pipeline),
        })
    }

    /// The current graph
    pub fn current_graph(&self) -> Arc<Graph> {
        self.store.current()
    }

    /// Register a callback run after every applied snapshot or reconciliation
    pub fn on_graph_changed<F>(&self, callback: F)
    where
        F: Fn(&Graph) + Send + Sync + 'static,
    {
        self.store.on_graph_changed(callback);
    }

    /// Revision channel of the graph store
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Producer handle for notifications from an external transport
    pub fn ingestor(&self) -> Option<UpdateIngestor> {
        self.pipeline.as_ref().map(|p| p.ingestor.clone())
    }

    /// Kinds whose snapshot listing failed
    pub fn degraded_kinds(&self) -> &[ResourceKind] {
        self.pipeline
            .as_ref()
            .map(|p| p.degraded.as_slice())
            .unwrap_or_default()
    }

    /// Number of collections being followed
    pub fn watch_count(&self) -> usize {
        self.pipeline.as_ref().map_or(0, |p| p.watcher.len())
    }

    /// Fetch the full payload of a resource and feed it in as `MODIFIED`
    ///
    /// Goes through the update channel so the reconciler stays the only
    /// writer.
    pub async fn backfill_raw(&self, id: &str) -> TopologyResult<()> {
        let ingestor = self
            .pipeline
            .as_ref()
            .map(|p| &p.ingestor)
            .ok_or(TopologyError::ChannelClosed)?;
        let graph = self.store.current();
        let resource = graph
            .get(id)
            .ok_or_else(|| TopologyError::NotFound(id.to_string()))?;

        let raw = crate::kube::fetch_detail(
            self.source.as_ref(),
            &resource.namespace,
            resource.kind,
            &resource.name,
        )
        .await?;

        let payload = ResourcePayload {
            id: resource.id.clone(),
            kind: Some(resource.kind.to_string()),
            raw: Some(raw),
            ..Default::default()
        };
        debug!(id = %id, kind = %resource.kind, "backfilling raw payload");
        ingestor
            .push(ChangeNotification::new(ChangeType::Modified, payload))
            .await
    }

    /// Start over with a fresh fetch; the graph is replaced wholesale
    ///
    /// Callbacks and subscribers stay registered. On failure no updates are
    /// applied until the next successful reconnect; the last graph stays
    /// readable.
    pub async fn reconnect(&mut self) -> TopologyResult<()> {
        info!("reconnecting");
        if let Some(previous) = self.pipeline.take() {
            previous.shutdown().await;
        }
        self.pipeline = Some(Pipeline::start(&self.source, &self.options, &self.store).await?);
        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Stop watching and release the graph store
    pub async fn disconnect(mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown().await;
        }
        info!("session disconnected");
    }
}
