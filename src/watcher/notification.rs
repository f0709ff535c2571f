//! Change notifications and the ordered update channel
//!
//! Wire shape: `{ "type": "ADDED" | "MODIFIED" | "DELETED", "resource": {..} }`
//! where `resource` follows the camelCase resource layout and every field
//! except `id` may be missing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{TopologyError, TopologyResult};
use crate::graph::model::{extract_created_at, extract_labels, extract_owner_ids};
use crate::models::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeType::Added => "ADDED",
            ChangeType::Modified => "MODIFIED",
            ChangeType::Deleted => "DELETED",
        };
        f.write_str(s)
    }
}

/// Possibly partial resource carried by a notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePayload {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Kept as text: unknown kinds resolve against the stored resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Accepted on the wire but never applied; status is always derived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl ResourcePayload {
    /// Full payload built from a cluster object
    pub fn from_object(kind: ResourceKind, obj: &Value) -> TopologyResult<Self> {
        let meta = obj.get("metadata");
        let text = |key: &str| {
            meta.and_then(|m| m.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let id = text("uid")
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| TopologyError::Decode(format!("{} object without metadata.uid", kind)))?;

        Ok(Self {
            id,
            name: text("name"),
            kind: Some(kind.to_string()),
            namespace: Some(text("namespace").unwrap_or_default()),
            status: None,
            labels: Some(extract_labels(obj)),
            owner_ids: Some(extract_owner_ids(obj)),
            created_at: extract_created_at(obj),
            raw: Some(obj.clone()),
        })
    }

    /// The resource id, falling back to `raw.metadata.uid`
    pub fn resolve_id(&self) -> TopologyResult<String> {
        if !self.id.is_empty() {
            return Ok(self.id.clone());
        }
        self.raw
            .as_ref()
            .and_then(|r| r.pointer("/metadata/uid"))
            .and_then(|v| v.as_str())
            .filter(|uid| !uid.is_empty())
            .map(str::to_string)
            .ok_or_else(|| TopologyError::Decode("resource without id".to_string()))
    }

    /// Tracked kind named by the payload, if any
    pub fn resource_kind(&self) -> Option<ResourceKind> {
        self.kind.as_deref().and_then(ResourceKind::parse_optional)
    }
}

/// One change to apply to the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub resource: ResourcePayload,
}

impl ChangeNotification {
    pub fn new(change_type: ChangeType, resource: ResourcePayload) -> Self {
        Self {
            change_type,
            resource,
        }
    }

    /// Decode a wire message
    pub fn decode(message: &str) -> TopologyResult<Self> {
        serde_json::from_str(message).map_err(|e| TopologyError::Decode(e.to_string()))
    }
}

/// Create the ordered update channel
pub fn update_channel(capacity: usize) -> (UpdateIngestor, UpdateStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UpdateIngestor { tx }, UpdateStream { rx })
}

/// Producer side of the update channel; cheap to clone
#[derive(Debug, Clone)]
pub struct UpdateIngestor {
    tx: mpsc::Sender<ChangeNotification>,
}

impl UpdateIngestor {
    pub async fn push(&self, notification: ChangeNotification) -> TopologyResult<()> {
        self.tx
            .send(notification)
            .await
            .map_err(|_| TopologyError::ChannelClosed)
    }

    /// Decode and push a wire message
    ///
    /// Malformed messages are dropped with a warning and do not close the
    /// channel; only a closed channel is an error.
    pub async fn push_raw(&self, message: &str) -> TopologyResult<()> {
        match ChangeNotification::decode(message) {
            Ok(notification) => self.push(notification).await,
            Err(e) => {
                warn!(error = %e, "dropping malformed notification");
                Ok(())
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the update channel
#[derive(Debug)]
pub struct UpdateStream {
    rx: mpsc::Receiver<ChangeNotification>,
}

impl UpdateStream {
    /// Next notification, `None` once every ingestor is gone or the stream is closed
    pub async fn recv(&mut self) -> Option<ChangeNotification> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChangeNotification> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting notifications; already queued ones can still be drained
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_partial_modified() {
        let n = ChangeNotification::decode(
            r#"{"type":"MODIFIED","resource":{"id":"p1","kind":"Pod","labels":{"app":"x"}}}"#,
        )
        .unwrap();
        assert_eq!(n.change_type, ChangeType::Modified);
        assert_eq!(n.resource.id, "p1");
        assert_eq!(n.resource.resource_kind(), Some(ResourceKind::Pod));
        assert!(n.resource.raw.is_none());
        assert!(n.resource.owner_ids.is_none());
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = ChangeNotification::decode(r#"{"type":"BOOKMARK","resource":{"id":"x"}}"#);
        assert!(matches!(err, Err(TopologyError::Decode(_))));
    }

    #[test]
    fn test_resolve_id_falls_back_to_raw_uid() {
        let payload = ResourcePayload {
            raw: Some(json!({ "metadata": { "uid": "from-raw" } })),
            ..Default::default()
        };
        assert_eq!(payload.resolve_id().unwrap(), "from-raw");
        assert!(ResourcePayload::default().resolve_id().is_err());
    }

    #[test]
    fn test_from_object_fills_everything() {
        let obj = json!({
            "metadata": {
                "uid": "s1", "name": "web", "namespace": "shop",
                "labels": { "app": "web" },
                "ownerReferences": [{ "uid": "o1" }]
            }
        });
        let payload = ResourcePayload::from_object(ResourceKind::Service, &obj).unwrap();
        assert_eq!(payload.kind.as_deref(), Some("Service"));
        assert_eq!(payload.owner_ids, Some(vec!["o1".to_string()]));
        assert_eq!(payload.raw, Some(obj));
    }

    #[tokio::test]
    async fn test_push_raw_drops_malformed() {
        let (ingestor, mut stream) = update_channel(8);
        ingestor.push_raw("{not json").await.unwrap();
        ingestor
            .push_raw(r#"{"type":"DELETED","resource":{"id":"gone"}}"#)
            .await
            .unwrap();
        drop(ingestor);

        let n = stream.recv().await.unwrap();
        assert_eq!(n.change_type, ChangeType::Deleted);
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let (ingestor, mut stream) = update_channel(1);
        stream.close();
        let result = ingestor
            .push(ChangeNotification::new(ChangeType::Deleted, ResourcePayload::default()))
            .await;
        assert!(matches!(result, Err(TopologyError::ChannelClosed)));
    }
}
