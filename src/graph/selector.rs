//! Label selector matching

use std::collections::BTreeMap;

/// A candidate matches when every selector pair is present and equal in its labels
pub fn matches(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}
