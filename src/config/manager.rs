//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{Context, bail};
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration, taking overrides from `lookup` instead of the process environment
    pub fn load_from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(log_level) = lookup("FABRIC_PEEK_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        if let Some(interval) = lookup("FABRIC_PEEK_USAGE_INTERVAL") {
            config.metrics.usage_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid FABRIC_PEEK_USAGE_INTERVAL: {}", interval))?;
        }

        if let Some(namespace) = lookup("FABRIC_PEEK_NAMESPACE") {
            config.metrics.namespace = Some(namespace);
        }

        if let Some(link_metrics) = lookup("FABRIC_PEEK_LINK_METRICS") {
            config.metrics.link_metrics = link_metrics
                .parse::<bool>()
                .with_context(|| format!("Invalid FABRIC_PEEK_LINK_METRICS: {}", link_metrics))?;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        self.validate_metrics_config()
            .with_context(|| "Metrics configuration validation failed")?;

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    fn validate_metrics_config(&self) -> Result<()> {
        let interval = self.metrics.usage_interval;
        if interval < Duration::from_secs(1) {
            bail!("metrics.usage_interval must be at least 1 second");
        }

        if interval > Duration::from_secs(3600) {
            bail!("metrics.usage_interval cannot exceed 1 hour");
        }

        if interval.subsec_nanos() != 0 {
            bail!("metrics.usage_interval must be a whole number of seconds");
        }

        if let Some(namespace) = &self.metrics.namespace {
            let valid = namespace
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
                && namespace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                bail!("metrics.namespace '{}' is not a valid prometheus name", namespace);
            }
        }

        let buckets = &self.metrics.histogram_buckets;
        if buckets.is_empty() {
            bail!("metrics.histogram_buckets must not be empty");
        }

        if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            bail!("metrics.histogram_buckets must be strictly increasing");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("peek.toml");
        std::fs::write(&path, r#"
[logging]
level = "debug"

[metrics]
usage_interval = "5m"
namespace = "router"
link_metrics = false
"#)?;

        let config = ConfigManager::load_from_file(&path)?;
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.with_thread_ids);
        assert_eq!(config.metrics.usage_interval, Duration::from_secs(300));
        assert_eq!(config.metrics.namespace.as_deref(), Some("router"));
        assert!(!config.metrics.link_metrics);
        assert_eq!(config.metrics.histogram_buckets.len(), 8);
        Ok(())
    }

    #[test]
    fn test_missing_file_uses_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = ConfigManager::load_from_file(&temp_dir.path().join("absent.toml"))?;
        assert_eq!(config.metrics.usage_interval, Duration::from_secs(60));
        Ok(())
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.metrics.usage_interval = Duration::from_millis(500);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.metrics.histogram_buckets = vec![10.0, 5.0];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.metrics.namespace = Some("9lives".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_file_reports_path() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "[metrics]\nusage_interval = \"soon\"\n")?;

        let err = ConfigManager::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        let config = ConfigManager::load_from_lookup(env(&[
            ("FABRIC_PEEK_LOG_LEVEL", "warn"),
            ("FABRIC_PEEK_USAGE_INTERVAL", "2m"),
            ("FABRIC_PEEK_NAMESPACE", "router"),
            ("FABRIC_PEEK_LINK_METRICS", "false"),
        ]))?;

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.metrics.usage_interval, Duration::from_secs(120));
        assert_eq!(config.metrics.namespace.as_deref(), Some("router"));
        assert!(!config.metrics.link_metrics);
        Ok(())
    }

    #[test]
    fn test_env_defaults_when_unset() -> Result<()> {
        let config = ConfigManager::load_from_lookup(env(&[]))?;
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.metrics.usage_interval, Duration::from_secs(60));
        assert_eq!(config.metrics.namespace, None);
        assert!(config.metrics.link_metrics);
        Ok(())
    }

    #[test]
    fn test_invalid_env_values_rejected() {
        let err = ConfigManager::load_from_lookup(env(&[("FABRIC_PEEK_LINK_METRICS", "sometimes")]))
            .unwrap_err();
        assert!(err.to_string().contains("FABRIC_PEEK_LINK_METRICS"));

        let err = ConfigManager::load_from_lookup(env(&[("FABRIC_PEEK_USAGE_INTERVAL", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("FABRIC_PEEK_USAGE_INTERVAL"));

        // Parses, but fails validation
        for (key, value) in [
            ("FABRIC_PEEK_USAGE_INTERVAL", "2h"),
            ("FABRIC_PEEK_LOG_LEVEL", "loud"),
            ("FABRIC_PEEK_NAMESPACE", "a-b"),
        ] {
            assert!(ConfigManager::load_from_lookup(env(&[(key, value)])).is_err());
        }
    }

    #[test]
    fn test_load_from_process_env() -> Result<()> {
        // The only test that touches the process environment
        std::env::set_var("FABRIC_PEEK_USAGE_INTERVAL", "5m");
        let loaded = ConfigManager::load_from_env();
        std::env::remove_var("FABRIC_PEEK_USAGE_INTERVAL");

        assert_eq!(loaded?.metrics.usage_interval, Duration::from_secs(300));
        Ok(())
    }
}
