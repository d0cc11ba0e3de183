//! Configuration loading from TOML files
//!
//! The binary picks the file path (`--config`, else `FEEDBACK_CONFIG`, else
//! `config/dev.toml`); a missing or invalid file falls back to defaults.

use crate::services::session::DEFAULT_RETAINED_COMPLETED;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Identifier of the embedding application, stamped on egress records
    #[serde(default = "default_app_id")]
    pub id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { id: default_app_id() }
    }
}

fn default_app_id() -> String {
    "navigation".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON log lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// Write finished flows to the egress file
    #[serde(default = "default_egress_enabled")]
    pub enabled: bool,
    /// File path for feedback egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { enabled: default_egress_enabled(), file: default_egress_file() }
    }
}

fn default_egress_enabled() -> bool {
    true
}

fn default_egress_file() -> String {
    "feedback.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Log a metrics summary when the replay completes
    #[serde(default = "default_log_summary")]
    pub log_summary: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { log_summary: default_log_summary() }
    }
}

fn default_log_summary() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Finished flows kept for repeated-finish detection before eviction
    #[serde(default = "default_retain_completed")]
    pub retain_completed: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { retain_completed: default_retain_completed() }
    }
}

fn default_retain_completed() -> usize {
    DEFAULT_RETAINED_COMPLETED
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    app_id: String,
    log_level: String,
    log_json: bool,
    egress_enabled: bool,
    egress_file: String,
    log_metrics_summary: bool,
    retain_completed_flows: usize,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            log_level: default_log_level(),
            log_json: false,
            egress_enabled: default_egress_enabled(),
            egress_file: default_egress_file(),
            log_metrics_summary: default_log_summary(),
            retain_completed_flows: default_retain_completed(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            app_id: toml_config.app.id,
            log_level: toml_config.logging.level,
            log_json: toml_config.logging.json,
            egress_enabled: toml_config.egress.enabled,
            egress_file: toml_config.egress.file,
            log_metrics_summary: toml_config.metrics.log_summary,
            retain_completed_flows: toml_config.sessions.retain_completed,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                // Logging is not initialised yet; it depends on this config
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn log_json(&self) -> bool {
        self.log_json
    }

    pub fn egress_enabled(&self) -> bool {
        self.egress_enabled
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn log_metrics_summary(&self) -> bool {
        self.log_metrics_summary
    }

    pub fn retain_completed_flows(&self) -> usize {
        self.retain_completed_flows
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
