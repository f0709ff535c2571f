//! Configuration schema definitions
//!
//! Defines the structure of configuration files using serde for serialization.

use serde::{Deserialize, Serialize};

use crate::models::ResourceKind;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Kubeconfig context to connect to; empty means the current context
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,

    /// Snapshot fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Live update configuration
    #[serde(default)]
    pub updates: UpdatesConfig,

    /// Logger configuration
    #[serde(default)]
    pub logger: LoggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    /// Bound on a single collection listing, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Kinds to fetch and watch; empty means every built-in kind
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<ResourceKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesConfig {
    /// Capacity of the ordered update channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Logger configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggerConfig {
    /// Level filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            kinds: Vec::new(),
        }
    }
}

impl Default for UpdatesConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Context to connect to, if one is configured
    pub fn context(&self) -> Option<&str> {
        (!self.context.is_empty()).then_some(self.context.as_str())
    }

    /// Collections to fetch, in snapshot order
    pub fn collections(&self) -> Vec<&'static crate::models::CollectionSpec> {
        ResourceKind::collections()
            .iter()
            .filter(|spec| self.fetch.kinds.is_empty() || self.fetch.kinds.contains(&spec.kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.updates.channel_capacity, 1024);
        assert_eq!(config.logger.level, "warn");
        assert!(config.context().is_none());
        assert_eq!(config.collections().len(), ResourceKind::collections().len());
    }

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
context: staging
fetch:
  timeoutSecs: 3
  kinds: [Pod, Service]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.context(), Some("staging"));
        assert_eq!(config.fetch.timeout_secs, 3);
        assert_eq!(config.updates.channel_capacity, 1024);
        let kinds: Vec<_> = config.collections().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec![ResourceKind::Pod, ResourceKind::Service]);
    }

    #[test]
    fn test_config_serialization() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("timeoutSecs"));
        assert!(yaml.contains("channelCapacity"));
        assert!(!yaml.contains("context"));
    }
}
