//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid cost SLO: {0}. Must be positive")]
    InvalidCostSlo(f64),

    #[error("Invalid coverage threshold: {0}. Must be in (0, 100]")]
    InvalidCoverage(f64),

    #[error("Invalid similarity threshold: {0}. Must be in (0, 1]")]
    InvalidSimilarity(f64),

    #[error("Invalid monitor tick: {0}. Must be at least 1 second")]
    InvalidMonitorTick(u64),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(f64),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .hivemind/config.yaml (project config)
    /// 3. .hivemind/local.yaml (local overrides, optional)
    /// 4. Environment variables (`HIVEMIND_*` prefix, `__` nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".hivemind/config.yaml"))
            .merge(Yaml::file(".hivemind/local.yaml"))
            .merge(Env::prefixed("HIVEMIND_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.slo.cost_usd <= 0.0 {
            return Err(ConfigError::InvalidCostSlo(config.slo.cost_usd));
        }

        for coverage in [config.slo.coverage_pct, config.workflow.coverage_gate_pct] {
            if coverage <= 0.0 || coverage > 100.0 {
                return Err(ConfigError::InvalidCoverage(coverage));
            }
        }

        for similarity in [
            config.conflict.similarity_threshold,
            config.stack.similarity_threshold,
        ] {
            if similarity <= 0.0 || similarity > 1.0 {
                return Err(ConfigError::InvalidSimilarity(similarity));
            }
        }

        if config.monitor.tick_seconds == 0 {
            return Err(ConfigError::InvalidMonitorTick(config.monitor.tick_seconds));
        }

        if config.gateway.initial_backoff_ms >= config.gateway.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.gateway.initial_backoff_ms,
                config.gateway.max_backoff_ms,
            ));
        }

        if config.gateway.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(
                config.gateway.requests_per_second,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.database.path, ".hivemind/hivemind.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing_and_validation() {
        let yaml = "
slo:
  cost_usd: 3.0
  coverage_pct: 90.0
conflict:
  similarity_threshold: 0.65
logging:
  level: debug
  format: pretty
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert!((config.slo.cost_usd - 3.0).abs() < f64::EPSILON);
        assert!((config.conflict.similarity_threshold - 0.65).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "debug");
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogLevel(_)
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyDatabasePath
        ));
    }

    #[test]
    fn test_validate_bad_coverage() {
        let mut config = Config::default();
        config.slo.coverage_pct = 120.0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidCoverage(_)
        ));
    }

    #[test]
    fn test_validate_bad_similarity() {
        let mut config = Config::default();
        config.stack.similarity_threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidSimilarity(_)
        ));
    }

    #[test]
    fn test_validate_zero_tick() {
        let mut config = Config::default();
        config.monitor.tick_seconds = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMonitorTick(0)
        ));
    }

    #[test]
    fn test_validate_inverted_backoff() {
        let mut config = Config::default();
        config.gateway.initial_backoff_ms = 90_000;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(90_000, 60_000)
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(base_file, "slo:\n  cost_usd: 2.0\nmonitor:\n  tick_seconds: 5").unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "slo:\n  cost_usd: 4.0").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert!((config.slo.cost_usd - 4.0).abs() < f64::EPSILON, "Override should win");
        assert_eq!(config.monitor.tick_seconds, 5, "Base value should persist");
    }
}
