pub mod aggregate;
pub mod pipeline;
pub mod window;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Threat classification attached by the upstream scorer.
///
/// Ordered by severity so thresholds can be compared directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum ThreatLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::None => "NONE",
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            ThreatLevel::Critical => "🔴",
            ThreatLevel::High => "🟠",
            ThreatLevel::Medium => "🟡",
            ThreatLevel::Low => "🔵",
            ThreatLevel::None => "⚪",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownThreatLevel(pub String);

impl fmt::Display for UnknownThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown threat level `{}`", self.0)
    }
}

impl std::error::Error for UnknownThreatLevel {}

impl FromStr for ThreatLevel {
    type Err = UnknownThreatLevel;

    /// Case-insensitive. The scorer reports benign events as `SAFE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" | "SAFE" => Ok(ThreatLevel::None),
            "LOW" => Ok(ThreatLevel::Low),
            "MEDIUM" => Ok(ThreatLevel::Medium),
            "HIGH" => Ok(ThreatLevel::High),
            "CRITICAL" => Ok(ThreatLevel::Critical),
            _ => Err(UnknownThreatLevel(s.to_string())),
        }
    }
}

impl TryFrom<String> for ThreatLevel {
    type Error = UnknownThreatLevel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Raw scorer inputs forwarded alongside each transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Transactions per unit time.
    pub velocity: f64,
    #[serde(rename = "geoDist")]
    pub geo_dist: f64,
    #[serde(rename = "deviceChange")]
    pub device_change: bool,
    pub unusual_time: bool,
    pub amount_spike: bool,
}

/// A validated transaction event.
///
/// Only produced by the frame codec, so `amount >= 0`, `risk_score` is in
/// `[0, 1]`, and `threat_level` is `None` whenever `is_anomaly` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: f64,
    pub risk_score: f64,
    pub is_anomaly: bool,
    pub threat_level: ThreatLevel,
    /// Event time reported by the producer.
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub device: String,
    pub features: FeatureSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    /// Scorer confidence, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Transaction {
    /// Threat level as seen by aggregation and display.
    pub fn effective_threat(&self) -> ThreatLevel {
        if self.is_anomaly {
            self.threat_level
        } else {
            ThreatLevel::None
        }
    }

    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}
