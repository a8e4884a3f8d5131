use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::ThreatLevel;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub window: WindowConfig,
    pub aggregation: AggregationConfig,
    pub notifications: NotificationConfig,
    pub health: HealthConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StreamConfig {
    pub url: String,
    /// Liveness token sent on open and on every keepalive tick.
    pub probe: String,
    pub keepalive_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub connect_on_start: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowConfig {
    pub max_transactions: usize,
    pub max_anomalies: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AggregationConfig {
    pub accuracy_baseline: f64,
    pub accuracy_jitter: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub min_threat: ThreatLevel,
    pub cooldown_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    /// Overrides the URL derived from `stream.url`.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub status_interval_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws/stream".into(),
            probe: "ping".into(),
            keepalive_interval_secs: 10,
            reconnect_delay_secs: 3,
            connect_on_start: true,
        }
    }
}

impl StreamConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_transactions: 100,
            max_anomalies: 8,
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            accuracy_baseline: 98.4,
            accuracy_jitter: 0.1,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_threat: ThreatLevel::Critical,
            cooldown_seconds: 30,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            timeout_secs: 5,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 15,
        }
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Config loaded from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }
}
