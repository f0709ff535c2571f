//! Status label derivation
//!
//! Shared by the snapshot builder and the reconciler. Typed rules come first
//! (node readiness, pod phase, workload replica counts); everything else uses
//! the generic chain: explicit `status.phase`, then a `Ready` condition, then
//! `Active`.

use serde_json::Value;

use crate::models::KindPayload;

pub const ACTIVE: &str = "Active";
pub const READY: &str = "Ready";
pub const NOT_READY: &str = "NotReady";
pub const AVAILABLE: &str = "Available";
pub const PROGRESSING: &str = "Progressing";

/// Derive the display status for a resource
pub fn derive_status(payload: &KindPayload, raw: Option<&Value>) -> String {
    let typed = match payload {
        KindPayload::Node(_) => payload.node_ready().map(ready_label),
        KindPayload::Pod(_) => payload.pod_phase().map(str::to_string),
        KindPayload::Deployment(_) | KindPayload::StatefulSet(_) | KindPayload::DaemonSet(_) => {
            payload.replica_counts().map(|(ready, desired)| {
                if ready == desired {
                    AVAILABLE.to_string()
                } else {
                    PROGRESSING.to_string()
                }
            })
        }
        _ => None,
    };
    typed.unwrap_or_else(|| generic_status(raw))
}

fn ready_label(ready: bool) -> String {
    let label = if ready { READY } else { NOT_READY };
    label.to_string()
}

/// Generic chain over untyped JSON
pub fn generic_status(raw: Option<&Value>) -> String {
    let Some(status) = raw.and_then(|r| r.get("status")) else {
        return ACTIVE.to_string();
    };

    if let Some(phase) = status
        .get("phase")
        .and_then(|p| p.as_str())
        .filter(|p| !p.is_empty())
    {
        return phase.to_string();
    }

    // Look for Ready condition
    let ready = status
        .get("conditions")
        .and_then(|c| c.as_array())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.get("type").and_then(|t| t.as_str()) == Some("Ready"))
        })
        .map(|c| c.get("status").and_then(|s| s.as_str()) == Some("True"));

    match ready {
        Some(ready) => ready_label(ready),
        None => ACTIVE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceKind;
    use serde_json::json;

    fn status_of(kind: ResourceKind, raw: Value) -> String {
        let payload = KindPayload::decode(kind, &raw);
        derive_status(&payload, Some(&raw))
    }

    #[test]
    fn test_generic_prefers_phase() {
        let raw = json!({ "status": { "phase": "Bound", "conditions": [{ "type": "Ready", "status": "False" }] } });
        assert_eq!(status_of(ResourceKind::PersistentVolumeClaim, raw), "Bound");
    }

    #[test]
    fn test_generic_ready_condition() {
        let raw = json!({ "status": { "conditions": [{ "type": "Ready", "status": "True" }] } });
        assert_eq!(status_of(ResourceKind::Generic, raw), READY);
        let raw = json!({ "status": { "conditions": [{ "type": "Ready", "status": "Unknown" }] } });
        assert_eq!(status_of(ResourceKind::Generic, raw), NOT_READY);
    }

    #[test]
    fn test_generic_defaults_to_active() {
        assert_eq!(status_of(ResourceKind::ConfigMap, json!({ "data": {} })), ACTIVE);
        assert_eq!(derive_status(&KindPayload::Generic, None), ACTIVE);
    }

    #[test]
    fn test_node_ready_condition() {
        let raw = json!({
            "metadata": { "name": "n1" },
            "status": { "conditions": [
                { "type": "MemoryPressure", "status": "False" },
                { "type": "Ready", "status": "False" }
            ] }
        });
        assert_eq!(status_of(ResourceKind::Node, raw), NOT_READY);
    }

    #[test]
    fn test_pod_phase() {
        let raw = json!({ "metadata": { "name": "p" }, "spec": { "containers": [] }, "status": { "phase": "Pending" } });
        assert_eq!(status_of(ResourceKind::Pod, raw), "Pending");
    }

    #[test]
    fn test_deployment_availability() {
        let ready = json!({ "metadata": { "name": "d" }, "status": { "replicas": 3, "availableReplicas": 3 } });
        assert_eq!(status_of(ResourceKind::Deployment, ready), AVAILABLE);
        let rolling = json!({ "metadata": { "name": "d" }, "status": { "replicas": 3, "availableReplicas": 1 } });
        assert_eq!(status_of(ResourceKind::Deployment, rolling), PROGRESSING);
    }

    #[test]
    fn test_daemonset_number_ready() {
        let raw = json!({
            "metadata": { "name": "ds" },
            "spec": { "selector": { "matchLabels": { "app": "agent" } }, "template": {} },
            "status": {
                "currentNumberScheduled": 2,
                "desiredNumberScheduled": 2,
                "numberMisscheduled": 0,
                "numberReady": 1
            }
        });
        assert_eq!(status_of(ResourceKind::DaemonSet, raw), PROGRESSING);
    }
}
