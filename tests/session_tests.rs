//! Session lifecycle tests
//!
//! Runs `TopologySession` against an in-memory cluster source: snapshot with
//! a degraded kind, live updates, raw backfill, reconnect and disconnect.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kubetopo::error::{TopologyError, TopologyResult};
use kubetopo::graph::RelationKind;
use kubetopo::kube::ClusterSource;
use kubetopo::models::{CollectionSpec, ResourceKind};
use kubetopo::services::{SessionOptions, TopologySession, fetch_snapshot};
use kubetopo::watcher::{
    ChangeNotification, ChangeType, KnownVersions, ResourcePayload, UpdateIngestor,
};
use serde_json::{Value, json};
use tokio::sync::watch;

#[derive(Default)]
struct ClusterState {
    unreachable: bool,
    failing: HashSet<ResourceKind>,
    items: HashMap<ResourceKind, Vec<Value>>,
    /// Objects returned by `get`, keyed by name
    details: HashMap<String, Value>,
    /// Events pushed by the watch of a kind as soon as it starts
    events: HashMap<ResourceKind, Vec<ChangeNotification>>,
    /// Known objects each watch was started with
    watched: HashMap<ResourceKind, KnownVersions>,
    lists: usize,
}

#[derive(Default)]
struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    fn with<F: FnOnce(&mut ClusterState)>(self, f: F) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    fn lists(&self) -> usize {
        self.state.lock().unwrap().lists
    }

    async fn wait_for_watches(&self, count: usize) -> HashMap<ResourceKind, KnownVersions> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let watched = self.state.lock().unwrap().watched.clone();
                if watched.len() >= count {
                    return watched;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("watches started within timeout")
    }
}

#[async_trait]
impl ClusterSource for FakeCluster {
    async fn probe(&self) -> TopologyResult<()> {
        if self.state.lock().unwrap().unreachable {
            return Err(TopologyError::Unreachable("connection refused".into()));
        }
        Ok(())
    }

    async fn list(&self, spec: &CollectionSpec) -> TopologyResult<Vec<Value>> {
        let mut state = self.state.lock().unwrap();
        state.lists += 1;
        if state.failing.contains(&spec.kind) {
            return Err(TopologyError::Fetch {
                kind: spec.kind.to_string(),
                message: "403 Forbidden".into(),
            });
        }
        Ok(state.items.get(&spec.kind).cloned().unwrap_or_default())
    }

    async fn get(&self, spec: &CollectionSpec, _: &str, name: &str) -> TopologyResult<Value> {
        self.state
            .lock()
            .unwrap()
            .details
            .get(name)
            .cloned()
            .ok_or_else(|| TopologyError::Fetch {
                kind: spec.kind.to_string(),
                message: format!("{} not found", name),
            })
    }

    async fn watch(
        &self,
        spec: &CollectionSpec,
        known: KnownVersions,
        updates: UpdateIngestor,
    ) -> TopologyResult<()> {
        let events = {
            let mut state = self.state.lock().unwrap();
            state.watched.insert(spec.kind, known);
            state.events.remove(&spec.kind).unwrap_or_default()
        };
        for event in events {
            updates.push(event).await?;
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn named(uid: &str, ns: &str, name: &str) -> Value {
    json!({ "metadata": { "uid": uid, "name": name, "namespace": ns } })
}

fn pod(uid: &str, name: &str, app: &str) -> Value {
    json!({
        "metadata": { "uid": uid, "name": name, "namespace": "default", "labels": { "app": app } },
        "spec": { "containers": [{ "name": "main" }] },
        "status": { "phase": "Running" }
    })
}

fn options() -> SessionOptions {
    SessionOptions {
        collections: [
            ResourceKind::Pod,
            ResourceKind::Service,
            ResourceKind::Secret,
            ResourceKind::ConfigMap,
            ResourceKind::Node,
        ]
        .iter()
        .filter_map(|k| k.collection())
        .collect(),
        fetch_timeout: Duration::from_secs(5),
        channel_capacity: 16,
    }
}

fn populated_cluster() -> FakeCluster {
    FakeCluster::default().with(|s| {
        s.items.insert(ResourceKind::Pod, vec![pod("p1", "web-1", "web")]);
        s.items.insert(
            ResourceKind::Service,
            vec![json!({
                "metadata": { "uid": "s1", "name": "web", "namespace": "default" },
                "spec": { "selector": { "app": "web" } }
            })],
        );
        s.items.insert(ResourceKind::Secret, vec![named("sec1", "default", "token")]);
        s.items.insert(ResourceKind::ConfigMap, vec![named("c1", "default", "settings")]);
        s.items.insert(
            ResourceKind::Node,
            vec![json!({ "metadata": { "uid": "n1", "name": "worker-1" } })],
        );
    })
}

async fn wait_for_revision(rx: &mut watch::Receiver<u64>, revision: u64) {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|r| *r >= revision))
        .await
        .expect("revision reached within timeout")
        .expect("store alive");
}

#[tokio::test]
async fn test_unreachable_cluster_fails_connect() {
    let source = Arc::new(FakeCluster::default().with(|s| s.unreachable = true));
    let err = TopologySession::connect_with(source.clone(), options())
        .await
        .err()
        .expect("connect should fail");

    assert!(matches!(err, TopologyError::Unreachable(_)));
    assert!(err.to_string().contains("failed to connect"));
    assert_eq!(source.lists(), 0);
}

#[tokio::test]
async fn test_snapshot_with_one_failing_kind() {
    let source = Arc::new(populated_cluster().with(|s| {
        s.failing.insert(ResourceKind::Secret);
    }));
    let (graph, fetched) = fetch_snapshot(source, &options()).await.unwrap();

    assert_eq!(fetched.len(), 5);
    assert_eq!(fetched.iter().filter(|c| c.is_degraded()).count(), 1);
    assert_eq!(graph.resources.len(), 4);
    assert!(graph.get("sec1").is_none());
    assert!(graph.has_link("s1", "p1", RelationKind::Network));
}

#[tokio::test]
async fn test_connect_publishes_snapshot_and_watches() {
    let source = Arc::new(populated_cluster().with(|s| {
        s.failing.insert(ResourceKind::Secret);
    }));
    let session = TopologySession::connect_with(source.clone(), options()).await.unwrap();

    assert!(session.is_live());
    assert_eq!(session.degraded_kinds(), &[ResourceKind::Secret]);
    assert_eq!(session.watch_count(), 5);
    let graph = session.current_graph();
    assert_eq!(graph.revision, 1);
    assert_eq!(graph.resources.len(), 4);

    // Each watch starts from what its collection listed
    let watched = source.wait_for_watches(5).await;
    assert!(watched[&ResourceKind::Pod].contains_key("p1"));
    assert!(watched[&ResourceKind::Node].contains_key("n1"));
    assert!(watched[&ResourceKind::Secret].is_empty());

    session.disconnect().await;
}

#[tokio::test]
async fn test_watch_events_reach_the_graph() {
    let added = ChangeNotification::new(
        ChangeType::Added,
        ResourcePayload::from_object(ResourceKind::Pod, &pod("p2", "web-2", "web")).unwrap(),
    );
    let source = Arc::new(populated_cluster().with(|s| {
        s.events.insert(ResourceKind::Pod, vec![added]);
    }));
    let session = TopologySession::connect_with(source, options()).await.unwrap();
    let mut rx = session.subscribe();

    wait_for_revision(&mut rx, 2).await;
    let graph = session.current_graph();
    assert!(graph.get("p2").is_some());
    assert!(graph.has_link("s1", "p2", RelationKind::Network));

    session.disconnect().await;
}

#[tokio::test]
async fn test_external_ingestor_updates_graph() {
    let session = TopologySession::connect_with(Arc::new(populated_cluster()), options())
        .await
        .unwrap();
    let changes = Arc::new(Mutex::new(Vec::new()));
    {
        let changes = Arc::clone(&changes);
        session.on_graph_changed(move |graph| changes.lock().unwrap().push(graph.revision));
    }
    let mut rx = session.subscribe();
    let ingestor = session.ingestor().expect("live session");

    ingestor
        .push_raw(r#"{"type":"DELETED","resource":{"id":"c1"}}"#)
        .await
        .unwrap();
    ingestor
        .push_raw(r#"{"type":"MODIFIED","resource":{"id":"p1","kind":"Pod","labels":{"app":"other"}}}"#)
        .await
        .unwrap();

    wait_for_revision(&mut rx, 3).await;
    let graph = session.current_graph();
    assert!(graph.get("c1").is_none());
    assert!(!graph.has_link("s1", "p1", RelationKind::Network));
    assert_eq!(*changes.lock().unwrap(), vec![2, 3]);

    session.disconnect().await;
}

#[tokio::test]
async fn test_backfill_raw_fills_partial_resource() {
    let detail = json!({
        "metadata": {
            "uid": "cm9",
            "name": "late",
            "namespace": "default",
            "labels": { "team": "a" }
        },
        "data": { "k": "v" }
    });
    let source = Arc::new(populated_cluster().with(|s| {
        s.details.insert("late".into(), detail.clone());
    }));
    let session = TopologySession::connect_with(source, options()).await.unwrap();
    let mut rx = session.subscribe();
    let ingestor = session.ingestor().unwrap();

    ingestor
        .push_raw(
            r#"{"type":"ADDED","resource":{"id":"cm9","kind":"ConfigMap","name":"late","namespace":"default"}}"#,
        )
        .await
        .unwrap();
    wait_for_revision(&mut rx, 2).await;
    assert!(session.current_graph().get("cm9").unwrap().raw.is_none());

    session.backfill_raw("cm9").await.unwrap();
    wait_for_revision(&mut rx, 3).await;

    let graph = session.current_graph();
    let stored = graph.get("cm9").unwrap();
    assert_eq!(stored.raw.as_ref(), Some(&detail));
    assert_eq!(stored.labels.get("team").map(String::as_str), Some("a"));

    let missing = session.backfill_raw("nope").await;
    assert!(matches!(missing, Err(TopologyError::NotFound(_))));

    session.disconnect().await;
}

#[tokio::test]
async fn test_reconnect_replaces_graph_and_keeps_callbacks() {
    let source = Arc::new(populated_cluster());
    let mut session = TopologySession::connect_with(source.clone(), options())
        .await
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        session.on_graph_changed(move |graph| seen.lock().unwrap().push(graph.resources.len()));
    }

    source.state.lock().unwrap().items.remove(&ResourceKind::ConfigMap);
    session.reconnect().await.unwrap();

    assert!(session.is_live());
    let graph = session.current_graph();
    assert_eq!(graph.revision, 2);
    assert!(graph.get("c1").is_none());
    assert_eq!(graph.resources.len(), 4);
    assert_eq!(*seen.lock().unwrap(), vec![4]);
    assert_eq!(source.lists(), 10);

    session.disconnect().await;
}

#[tokio::test]
async fn test_failed_reconnect_keeps_last_graph() {
    let source = Arc::new(populated_cluster());
    let mut session = TopologySession::connect_with(source.clone(), options())
        .await
        .unwrap();

    source.state.lock().unwrap().unreachable = true;
    let result = session.reconnect().await;

    assert!(matches!(result, Err(TopologyError::Unreachable(_))));
    assert!(!session.is_live());
    assert!(session.ingestor().is_none());
    assert_eq!(session.current_graph().resources.len(), 5);
    assert!(matches!(
        session.backfill_raw("c1").await,
        Err(TopologyError::ChannelClosed)
    ));

    session.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_closes_ingestor() {
    let session = TopologySession::connect_with(Arc::new(populated_cluster()), options())
        .await
        .unwrap();
    let ingestor = session.ingestor().unwrap();
    assert!(!ingestor.is_closed());

    session.disconnect().await;
    assert!(ingestor.is_closed());
    assert!(matches!(
        ingestor
            .push(ChangeNotification::new(
                ChangeType::Deleted,
                ResourcePayload {
                    id: "p1".into(),
                    ..Default::default()
                },
            ))
            .await,
        Err(TopologyError::ChannelClosed)
    ));
}
