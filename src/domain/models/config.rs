//! Configuration model.
//!
//! Defaults live here; the loader merges YAML files and `HIVEMIND_*`
//! environment variables on top (see `infrastructure::config`).

use serde::{Deserialize, Serialize};

/// LLM gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Completion model to request
    pub model: String,
    /// Passed through to the gateway: low | medium | high
    pub reasoning_effort: String,
    /// USD per 1000 tokens; drives the cost SLO calculation
    pub rate_per_k_tokens: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            reasoning_effort: "medium".to_string(),
            rate_per_k_tokens: 0.01,
        }
    }
}

/// SLO thresholds enforced at the end of each workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SloConfig {
    /// Hard ceiling on estimated spend (USD)
    pub cost_usd: f64,
    /// p95 end-to-end latency target (seconds); warn-only
    pub latency_seconds: f64,
    /// Reported coverage the SLO gate requires
    pub coverage_pct: f64,
    /// Stack inference confidence floor; warn-only
    pub confidence_min: f64,
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            cost_usd: 5.0,
            latency_seconds: 720.0,
            coverage_pct: 95.0,
            confidence_min: 0.80,
        }
    }
}

/// Workflow-level gates and retry shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Coverage the TestGate step requires (distinct from the SLO gate)
    pub coverage_gate_pct: f64,
    /// Maximum screenshot diff fraction the visual test accepts
    pub visual_diff_max: f64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            coverage_gate_pct: 80.0,
            visual_diff_max: 0.05,
        }
    }
}

/// Background monitor cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub tick_seconds: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { tick_seconds: 10 }
    }
}

/// Conflict-resolution thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Mediate when UI/backend similarity falls below this
    pub similarity_threshold: f64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self { similarity_threshold: 0.70 }
    }
}

/// Stack-inference template acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub similarity_threshold: f64,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self { similarity_threshold: 0.70 }
    }
}

/// Task stall detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub timeout_seconds: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self { timeout_seconds: 1800 }
    }
}

/// File-lock staleness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLockConfig {
    pub ttl_seconds: u64,
}

impl Default for FileLockConfig {
    fn default() -> Self {
        Self { ttl_seconds: 1800 }
    }
}

/// SQLite location and pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".hivemind/hivemind.db".to_string(),
            max_connections: 10,
        }
    }
}

/// HTTP bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8420,
        }
    }
}

/// Logging output shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

/// Gateway retry and rate-limit shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub requests_per_second: f64,
    pub burst_size: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
            requests_per_second: 10.0,
            burst_size: 20,
        }
    }
}

/// Root configuration recognized by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub slo: SloConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default)]
    pub stack: StackConfig,
    #[serde(default)]
    pub task: TaskConfig,
    #[serde(default)]
    pub file_lock: FileLockConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert!((config.slo.cost_usd - 5.0).abs() < f64::EPSILON);
        assert!((config.slo.latency_seconds - 720.0).abs() < f64::EPSILON);
        assert!((config.slo.coverage_pct - 95.0).abs() < f64::EPSILON);
        assert!((config.workflow.coverage_gate_pct - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.monitor.tick_seconds, 10);
        assert!((config.conflict.similarity_threshold - 0.70).abs() < f64::EPSILON);
        assert!((config.stack.similarity_threshold - 0.70).abs() < f64::EPSILON);
        assert_eq!(config.task.timeout_seconds, 1800);
        assert_eq!(config.file_lock.ttl_seconds, 1800);
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let yaml = "
slo:
  cost_usd: 2.5
monitor:
  tick_seconds: 3
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!((config.slo.cost_usd - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.monitor.tick_seconds, 3);
        // Unspecified sections fall back to defaults
        assert_eq!(config.task.timeout_seconds, 1800);
    }
}
