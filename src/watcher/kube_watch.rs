//! Watch loop for one collection
//!
//! Follows a collection with `kube::runtime::watcher`, which lists, watches
//! and relists with backoff on its own. Every (re)list is checked against the
//! objects already known: unchanged objects are skipped, new or changed ones
//! become `ADDED`/`MODIFIED` and objects missing from the relist become
//! `DELETED`. The first known set comes from the snapshot, so the initial
//! list does not replay the whole collection.

use std::collections::HashMap;
use std::fmt::Display;

use futures::{Stream, StreamExt};
use kube::api::{Api, DynamicObject};
use kube::runtime::{WatchStreamExt, watcher};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{TopologyError, TopologyResult};
use crate::models::ResourceKind;
use crate::watcher::{ChangeNotification, ChangeType, ResourcePayload, UpdateIngestor};

/// Stop after this many consecutive watcher errors
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Resource version of every known object, keyed by uid
pub type KnownVersions = HashMap<String, String>;

/// Known versions of listed cluster objects; items without a uid are skipped
pub fn known_versions(items: &[Value]) -> KnownVersions {
    items
        .iter()
        .filter_map(|item| {
            let uid = item.pointer("/metadata/uid")?.as_str()?;
            let version = item
                .pointer("/metadata/resourceVersion")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Some((uid.to_string(), version.to_string()))
        })
        .collect()
}

/// Follow `api` until `updates` closes or the watcher keeps failing
pub async fn follow_collection(
    api: Api<DynamicObject>,
    kind: ResourceKind,
    known: KnownVersions,
    updates: UpdateIngestor,
) -> TopologyResult<()> {
    let events = watcher(api, watcher::Config::default()).default_backoff();
    forward_events(events, kind, known, updates).await
}

/// Turn watcher events into notifications and push them in order
///
/// Errors are counted; any event resets the count. Backoff between retries
/// is up to the stream.
pub async fn forward_events<S, E>(
    events: S,
    kind: ResourceKind,
    known: KnownVersions,
    updates: UpdateIngestor,
) -> TopologyResult<()>
where
    S: Stream<Item = Result<watcher::Event<DynamicObject>, E>>,
    E: Display,
{
    let mut events = Box::pin(events);
    let mut mapper = EventMapper::new(kind, known);
    let mut error_count = 0u32;

    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                error_count += 1;
                warn!(kind = %kind, attempt = error_count, error = %e, "watcher error");
                if error_count >= MAX_CONSECUTIVE_ERRORS {
                    return Err(TopologyError::Fetch {
                        kind: kind.to_string(),
                        message: format!("watch stopped after {} consecutive errors: {}", error_count, e),
                    });
                }
                continue;
            }
        };
        error_count = 0;

        for notification in mapper.map(event) {
            if updates.push(notification).await.is_err() {
                debug!(kind = %kind, "update channel closed, watch stopped");
                return Ok(());
            }
        }
    }

    debug!(kind = %kind, "watch stream ended");
    Ok(())
}

/// Maps watcher events to notifications, tracking known objects
#[derive(Debug)]
pub struct EventMapper {
    kind: ResourceKind,
    known: KnownVersions,
    /// Objects seen by the list in progress
    relisted: Option<KnownVersions>,
}

impl EventMapper {
    pub fn new(kind: ResourceKind, known: KnownVersions) -> Self {
        Self {
            kind,
            known,
            relisted: None,
        }
    }

    pub fn map(&mut self, event: watcher::Event<DynamicObject>) -> Vec<ChangeNotification> {
        match event {
            watcher::Event::Init => {
                self.relisted = Some(KnownVersions::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let Some((uid, version)) = identity(&obj) else {
                    return Vec::new();
                };
                let unchanged =
                    !version.is_empty() && self.known.get(&uid).is_some_and(|v| *v == version);
                let change_type = self.change_type_of(&uid);
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(uid, version);
                }
                if unchanged {
                    return Vec::new();
                }
                self.notification(change_type, &obj).into_iter().collect()
            }
            watcher::Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let mut vanished: Vec<String> = self
                    .known
                    .keys()
                    .filter(|uid| !relisted.contains_key(*uid))
                    .cloned()
                    .collect();
                vanished.sort();
                self.known = relisted;
                vanished
                    .into_iter()
                    .map(|uid| {
                        ChangeNotification::new(
                            ChangeType::Deleted,
                            ResourcePayload {
                                id: uid,
                                kind: Some(self.kind.to_string()),
                                ..Default::default()
                            },
                        )
                    })
                    .collect()
            }
            watcher::Event::Apply(obj) => {
                let Some((uid, version)) = identity(&obj) else {
                    return Vec::new();
                };
                let change_type = self.change_type_of(&uid);
                self.known.insert(uid, version);
                self.notification(change_type, &obj).into_iter().collect()
            }
            watcher::Event::Delete(obj) => {
                if let Some((uid, _)) = identity(&obj) {
                    self.known.remove(&uid);
                }
                self.notification(ChangeType::Deleted, &obj)
                    .into_iter()
                    .collect()
            }
        }
    }

    fn change_type_of(&self, uid: &str) -> ChangeType {
        if self.known.contains_key(uid) {
            ChangeType::Modified
        } else {
            ChangeType::Added
        }
    }

    fn notification(&self, change_type: ChangeType, obj: &DynamicObject) -> Option<ChangeNotification> {
        let payload = serde_json::to_value(obj)
            .map_err(|e| TopologyError::Decode(e.to_string()))
            .and_then(|value| ResourcePayload::from_object(self.kind, &value));
        match payload {
            Ok(payload) => Some(ChangeNotification::new(change_type, payload)),
            Err(e) => {
                warn!(kind = %self.kind, error = %e, "skipping undecodable watch event");
                None
            }
        }
    }
}

fn identity(obj: &DynamicObject) -> Option<(String, String)> {
    let uid = obj.metadata.uid.clone().filter(|uid| !uid.is_empty())?;
    let version = obj.metadata.resource_version.clone().unwrap_or_default();
    Some((uid, version))
}
