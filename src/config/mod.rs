//! Configuration system for kubetopo
//!
//! Layered YAML configuration: built-in defaults, the root file, a
//! per-context file and environment overrides.

pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{Config, FetchConfig, LoggerConfig, UpdatesConfig};

use anyhow::Context;

use crate::models::ResourceKind;

/// Keys understood by `get_config_value` and `set_config_value`
pub const CONFIG_KEYS: &[&str] = &[
    "context",
    "fetch.timeoutSecs",
    "fetch.kinds",
    "updates.channelCapacity",
    "logger.level",
];

/// Get a configuration value by key (dot notation)
pub fn get_config_value(config: &Config, key: &str) -> anyhow::Result<String> {
    match key {
        "context" => Ok(config.context.clone()),
        "fetch.timeoutSecs" => Ok(config.fetch.timeout_secs.to_string()),
        "fetch.kinds" => Ok(config
            .fetch
            .kinds
            .iter()
            .map(ResourceKind::as_str)
            .collect::<Vec<_>>()
            .join(",")),
        "updates.channelCapacity" => Ok(config.updates.channel_capacity.to_string()),
        "logger.level" => Ok(config.logger.level.clone()),
        _ => Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }
}

/// Set a configuration value by key (dot notation)
pub fn set_config_value(config: &mut Config, key: &str, value: &str) -> anyhow::Result<()> {
    match key {
        "context" => {
            config.context = value.to_string();
        }
        "fetch.timeoutSecs" => {
            config.fetch.timeout_secs = value
                .parse()
                .context("fetch.timeoutSecs must be a number")?;
        }
        "fetch.kinds" => {
            // Comma-separated list; empty means all kinds
            config.fetch.kinds = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    ResourceKind::from_str_case_insensitive(s)
                        .filter(|kind| kind.collection().is_some())
                        .ok_or_else(|| anyhow::anyhow!("Unknown resource kind: {}", s))
                })
                .collect::<anyhow::Result<_>>()?;
        }
        "updates.channelCapacity" => {
            config.updates.channel_capacity = value
                .parse()
                .context("updates.channelCapacity must be a number")?;
        }
        "logger.level" => {
            config.logger.level = value.to_string();
        }
        _ => return Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_key_reads() {
        let config = Config::default();
        for key in CONFIG_KEYS {
            assert!(get_config_value(&config, key).is_ok(), "{}", key);
        }
        assert!(get_config_value(&config, "ui.skin").is_err());
    }

    #[test]
    fn test_set_kinds_accepts_aliases() {
        let mut config = Config::default();
        set_config_value(&mut config, "fetch.kinds", "pods, svc,Deployment").unwrap();
        assert_eq!(
            config.fetch.kinds,
            vec![ResourceKind::Pod, ResourceKind::Service, ResourceKind::Deployment]
        );
        assert_eq!(
            get_config_value(&config, "fetch.kinds").unwrap(),
            "Pod,Service,Deployment"
        );
        assert!(set_config_value(&mut config, "fetch.kinds", "widgets").is_err());
    }

    #[test]
    fn test_set_rejects_bad_numbers() {
        let mut config = Config::default();
        assert!(set_config_value(&mut config, "fetch.timeoutSecs", "soon").is_err());
        set_config_value(&mut config, "updates.channelCapacity", "64").unwrap();
        assert_eq!(config.updates.channel_capacity, 64);
    }
}
