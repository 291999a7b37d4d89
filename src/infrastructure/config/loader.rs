use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::services::change_analyzer::ChangeAnalyzer;
use crate::services::errors::RoutingError;
use crate::services::skill_router::validate_rules;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Invalid {field}: {value}. Must be at least 1")]
    MustBePositive { field: &'static str, value: u64 },

    #[error(
        "Invalid heartbeat timing: heartbeat_grace_ms ({0}) must be less than unhealthy_after_ms ({1})"
    )]
    InvalidHeartbeatTiming(u64, u64),

    #[error("Invalid latency_smoothing: {0}. Must be in (0, 1]")]
    InvalidLatencySmoothing(f64),

    #[error("Invalid {field}: {value}. Must be at most {max}")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("Socket path cannot be empty")]
    EmptySocketPath,

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Longest breaker cool-down or monitoring window accepted (30 days)
pub const MAX_BREAKER_DURATION_MS: u64 = 30 * 24 * 60 * 60 * 1000;

fn at_most(field: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::TooLarge { field, value, max });
    }
    Ok(())
}

fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::MustBePositive { field, value });
    }
    Ok(())
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .vigil/config.yaml (project config)
    /// 3. .vigil/local.yaml (project local overrides, optional)
    /// 4. Environment variables (VIGIL_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".vigil/config.yaml"))
            .merge(Yaml::file(".vigil/local.yaml"))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring `VIGIL_*` overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// `load_from_file` when a path is given, `load` otherwise
    pub fn resolve(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        let transport = &config.transport;
        if transport.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptySocketPath);
        }
        positive("max_parse_failures", u64::from(transport.max_parse_failures))?;
        positive("max_frame_bytes", transport.max_frame_bytes as u64)?;
        positive("outbound_buffer", transport.outbound_buffer as u64)?;

        let registry = &config.registry;
        if registry.heartbeat_grace_ms >= registry.unhealthy_after_ms {
            return Err(ConfigError::InvalidHeartbeatTiming(
                registry.heartbeat_grace_ms,
                registry.unhealthy_after_ms,
            ));
        }
        positive("sweep_interval_ms", registry.sweep_interval_ms)?;
        positive("default_task_timeout_ms", registry.default_task_timeout_ms)?;
        if !(registry.latency_smoothing > 0.0 && registry.latency_smoothing <= 1.0) {
            return Err(ConfigError::InvalidLatencySmoothing(
                registry.latency_smoothing,
            ));
        }

        let breaker = &config.circuit_breaker;
        if breaker.enabled {
            positive("failure_threshold", u64::from(breaker.failure_threshold))?;
            positive("monitoring_period_ms", breaker.monitoring_period_ms)?;
            at_most("timeout_ms", breaker.timeout_ms, MAX_BREAKER_DURATION_MS)?;
            at_most(
                "monitoring_period_ms",
                breaker.monitoring_period_ms,
                MAX_BREAKER_DURATION_MS,
            )?;
        }

        if config.skill_routing.default_agents.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "default agent names cannot be empty".to_string(),
            ));
        }

        // Compiles every path pattern
        ChangeAnalyzer::new(&config.skill_routing)?;
        validate_rules(&config.skill_rules)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.skill_rules.len(), 3);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
logging:
  level: debug
  format: json
registry:
  heartbeat_grace_ms: 5000
  unhealthy_after_ms: 15000
health_validation:
  minimum_healthy_agents: 1
  required_agents: [security]
skill_rules:
  - name: docs-only
    condition: "docs_touched && !api_touched"
    activate: [documentation]
    priority: 3
"#;

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.registry.heartbeat_grace_ms, 5000);
        assert_eq!(config.health_validation.required_agents, vec!["security"]);
        assert_eq!(config.skill_rules.len(), 1);
        assert_eq!(config.skill_rules[0].priority, 3);
        // Untouched sections keep their defaults
        assert_eq!(config.supervisor.split_change_loc, 1000);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_load_from_file_merges_over_defaults() {
        let file = write_yaml(
            r"
circuit_breaker:
  failure_threshold: 2
supervisor:
  fallback_agents: [security]
",
        );

        let config = ConfigLoader::load_from_file(file.path()).unwrap();

        assert_eq!(config.circuit_breaker.failure_threshold, 2);
        assert_eq!(config.supervisor.fallback_agents, vec!["security"]);
        assert_eq!(config.transport.max_parse_failures, 5);
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = ConfigLoader::load_from_file("/nonexistent/vigil.yaml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_bad_rule_condition_rejected_at_load() {
        let file = write_yaml(
            r#"
skill_rules:
  - name: broken
    condition: "lines_changed >>> 3"
    activate: [quality]
"#,
        );

        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_heartbeat_timing() {
        let mut config = Config::default();
        config.registry.heartbeat_grace_ms = 90_000;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidHeartbeatTiming(90_000, 90_000)
        ));
    }

    #[test]
    fn test_validate_latency_smoothing() {
        let mut config = Config::default();
        config.registry.latency_smoothing = 0.0;
        assert!(ConfigLoader::validate(&config).is_err());

        config.registry.latency_smoothing = 1.0;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_zero_outbound_buffer() {
        let mut config = Config::default();
        config.transport.outbound_buffer = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::MustBePositive {
                field: "outbound_buffer",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_bad_pattern() {
        let mut config = Config::default();
        config.skill_routing.security_sensitive_patterns = vec!["(unclosed".to_string()];

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::Routing(RoutingError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_validate_rule_priority_out_of_range() {
        let mut config = Config::default();
        config.skill_rules[0].priority = 11;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::Routing(RoutingError::InvalidRulePriority { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_breaker_durations() {
        let mut config = Config::default();
        config.circuit_breaker.timeout_ms = u64::MAX;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::TooLarge {
                field: "timeout_ms",
                ..
            }
        ));

        let mut config = Config::default();
        config.circuit_breaker.monitoring_period_ms = MAX_BREAKER_DURATION_MS + 1;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::TooLarge {
                field: "monitoring_period_ms",
                ..
            }
        ));

        config.circuit_breaker.monitoring_period_ms = MAX_BREAKER_DURATION_MS;
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_oversized_timeout_rejected_at_load() {
        let file = write_yaml(
            r"
circuit_breaker:
  timeout_ms: 18446744073709551615
",
        );

        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_disabled_breaker_skips_threshold_check() {
        let mut config = Config::default();
        config.circuit_breaker.enabled = false;
        config.circuit_breaker.failure_threshold = 0;

        assert!(ConfigLoader::validate(&config).is_ok());
    }
}
