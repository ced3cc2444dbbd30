//! Configuration loading from TOML files
//!
//! The binary selects the file via `--config <path>`, the `CONFIG_FILE`
//! environment variable, or the default `config/dev.toml` (see `main.rs`).

use crate::domain::types::Geofence;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tuning for a single engine instance
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Scheduler cadence in milliseconds
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Continuous time inside before a Dwell event fires
    #[serde(default = "default_dwell_threshold_ms")]
    pub dwell_threshold_ms: u64,
    /// Passed through to the position source
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,
    /// Maximum retained events in the log (`None` = unbounded)
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: Option<usize>,
}

fn default_check_interval_ms() -> u64 {
    5000
}

fn default_dwell_threshold_ms() -> u64 {
    60_000
}

fn default_high_accuracy() -> bool {
    true
}

fn default_event_log_capacity() -> Option<usize> {
    Some(1000)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            dwell_threshold_ms: default_dwell_threshold_ms(),
            high_accuracy: default_high_accuracy(),
            event_log_capacity: default_event_log_capacity(),
        }
    }
}

impl EngineConfig {
    /// Scheduler interval, never zero
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    pub fn with_check_interval_ms(mut self, ms: u64) -> Self {
        self.check_interval_ms = ms;
        self
    }

    pub fn with_dwell_threshold_ms(mut self, ms: u64) -> Self {
        self.dwell_threshold_ms = ms;
        self
    }

    pub fn with_high_accuracy(mut self, high_accuracy: bool) -> Self {
        self.high_accuracy = high_accuracy;
        self
    }

    pub fn with_event_log_capacity(mut self, capacity: Option<usize>) -> Self {
        self.event_log_capacity = capacity;
        self
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    /// Identifier stamped on egressed events
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "geofence".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReplayConfig {
    /// JSONL track file replayed as the position source
    #[serde(default)]
    pub track_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for event egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "events.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub geofences: Vec<Geofence>,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    engine: EngineConfig,
    geofences: Vec<Geofence>,
    track_file: Option<String>,
    egress_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            engine: EngineConfig::default(),
            geofences: Vec::new(),
            track_file: None,
            egress_file: default_egress_file(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| format!("Failed to parse config file {}", source))?;

        Ok(Self {
            site_id: toml_config.site.id,
            engine: toml_config.engine,
            geofences: toml_config.geofences,
            track_file: toml_config.replay.track_file,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: source.to_string(),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn geofences(&self) -> &[Geofence] {
        &self.geofences
    }

    pub fn track_file(&self) -> Option<&str> {
        self.track_file.as_deref()
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Override the replay track (command line takes precedence over the file)
    pub fn with_track_file(mut self, track_file: Option<String>) -> Self {
        if track_file.is_some() {
            self.track_file = track_file;
        }
        self
    }
}
