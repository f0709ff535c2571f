//! Configuration loading and merging logic
//!
//! Handles loading configuration from multiple sources and merging them
//! according to precedence rules.

use super::{paths, schema::Config};
use anyhow::{Context, Result};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged
    ///
    /// Precedence order (highest to lowest):
    /// 1. Environment variable overrides
    /// 2. Context-specific config
    /// 3. Root config
    /// 4. Built-in defaults
    ///
    /// `context` selects the context file; when absent the context named by
    /// the root config (or KUBETOPO_CONTEXT) is used.
    pub fn load(context: Option<&str>) -> Result<Config> {
        let mut config = Self::load_defaults();

        let root_path = paths::root_config_path();
        if root_path.exists() {
            config = Self::load_file(&root_path)?;
        }

        let context = context
            .map(str::to_string)
            .or_else(|| std::env::var("KUBETOPO_CONTEXT").ok())
            .or_else(|| config.context().map(str::to_string));
        if let Some(context) = context {
            let context_path = paths::context_config_path(&context);
            if context_path.exists() {
                config = Self::load_file(&context_path)?;
            }
            config.context = context;
        }

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration by loading and checking for errors
    pub fn validate(context: Option<&str>) -> Result<()> {
        Self::load(context).context("Failed to load merged configuration")?;
        Ok(())
    }

    /// Reject values the session cannot run with
    pub fn check(config: &Config) -> Result<()> {
        if config.fetch.timeout_secs == 0 {
            anyhow::bail!("fetch.timeoutSecs must be greater than 0");
        }
        if config.updates.channel_capacity == 0 {
            anyhow::bail!("updates.channelCapacity must be greater than 0");
        }
        tracing_subscriber::EnvFilter::try_new(&config.logger.level)
            .with_context(|| format!("Invalid logger.level '{}'", config.logger.level))?;

        Ok(())
    }

    /// Load default configuration
    pub fn load_defaults() -> Config {
        Config::default()
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: Config) -> Config {
        if let Ok(context) = std::env::var("KUBETOPO_CONTEXT") {
            config.context = context;
        }

        if let Ok(timeout) = std::env::var("KUBETOPO_FETCH_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => config.fetch.timeout_secs = secs,
                Err(_) => tracing::warn!(value = %timeout, "ignoring invalid KUBETOPO_FETCH_TIMEOUT_SECS"),
            }
        }

        if let Ok(level) = std::env::var("KUBETOPO_LOG_LEVEL") {
            config.logger.level = level;
        }

        config
    }

    /// Save configuration to a file
    pub fn save(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;

        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Save root configuration
    pub fn save_root(config: &Config) -> Result<()> {
        Self::save(config, &paths::root_config_path())
    }
}
