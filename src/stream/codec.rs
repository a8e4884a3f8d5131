//! Wire frames to and from typed events.
//!
//! Inbound frames are JSON objects with a `type` discriminator. `pong` and
//! `transaction` are understood, anything else is reported as ignored.
//! Validation happens here so nothing downstream sees an out-of-range value.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::core::{FeatureSet, ThreatLevel, Transaction};

/// Epoch values at or above this are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Pong,
    Transaction(Transaction),
    /// Well-formed frame of a kind this client does not handle.
    Ignored(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("transaction frame has no `data` payload")]
    MissingData,
    #[error("invalid transaction payload: {0}")]
    Payload(serde_json::Error),
    #[error("transaction id is empty")]
    EmptyId,
    #[error("amount {0} is negative or not finite")]
    Amount(f64),
    #[error("risk score {0} is outside [0, 1]")]
    RiskScore(f64),
    #[error("feature `{name}` has invalid value {value}")]
    Feature { name: &'static str, value: f64 },
    #[error("unparseable timestamp `{0}`")]
    Timestamp(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Epoch(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    id: String,
    amount: f64,
    risk_score: f64,
    is_anomaly: bool,
    threat_level: ThreatLevel,
    timestamp: WireTimestamp,
    location: String,
    device: String,
    features: FeatureSet,
    #[serde(default)]
    merchant: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Stateless apart from the outbound probe token.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    probe: String,
}

impl FrameCodec {
    pub fn new(probe: impl Into<String>) -> Self {
        Self {
            probe: probe.into(),
        }
    }

    pub fn probe(&self) -> &str {
        &self.probe
    }

    pub fn decode(&self, raw: &str) -> Result<Frame, DecodeError> {
        let value: Value = serde_json::from_str(raw)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?;
        match kind {
            "pong" => Ok(Frame::Pong),
            "transaction" => {
                let data = value.get("data").ok_or(DecodeError::MissingData)?;
                let wire = WireTransaction::deserialize(data).map_err(DecodeError::Payload)?;
                validate(wire).map(Frame::Transaction)
            }
            other => Ok(Frame::Ignored(other.to_string())),
        }
    }

    /// Encode an inbound-shaped frame. Used for fixtures and replay.
    pub fn encode(&self, frame: &Frame) -> String {
        match frame {
            Frame::Pong => json!({ "type": "pong" }).to_string(),
            Frame::Transaction(tx) => json!({ "type": "transaction", "data": tx }).to_string(),
            Frame::Ignored(kind) => json!({ "type": kind }).to_string(),
        }
    }
}

fn validate(wire: WireTransaction) -> Result<Transaction, DecodeError> {
    if wire.id.trim().is_empty() {
        return Err(DecodeError::EmptyId);
    }
    if !wire.amount.is_finite() || wire.amount < 0.0 {
        return Err(DecodeError::Amount(wire.amount));
    }
    if !(0.0..=1.0).contains(&wire.risk_score) {
        return Err(DecodeError::RiskScore(wire.risk_score));
    }
    check_feature("velocity", wire.features.velocity)?;
    check_feature("geoDist", wire.features.geo_dist)?;

    let timestamp = parse_timestamp(&wire.timestamp)?;
    let threat_level = if wire.is_anomaly {
        wire.threat_level
    } else {
        ThreatLevel::None
    };

    Ok(Transaction {
        id: wire.id,
        amount: wire.amount,
        risk_score: wire.risk_score,
        is_anomaly: wire.is_anomaly,
        threat_level,
        timestamp,
        location: wire.location,
        device: wire.device,
        features: wire.features,
        merchant: wire.merchant,
        confidence: wire.confidence.filter(|c| c.is_finite()),
    })
}

fn check_feature(name: &'static str, value: f64) -> Result<(), DecodeError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DecodeError::Feature { name, value })
    }
}

fn parse_timestamp(raw: &WireTimestamp) -> Result<DateTime<Utc>, DecodeError> {
    match raw {
        WireTimestamp::Epoch(n) => {
            if !n.is_finite() || *n < 0.0 {
                return Err(DecodeError::Timestamp(n.to_string()));
            }
            let millis = if *n >= EPOCH_MILLIS_THRESHOLD { *n } else { *n * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64)
                .single()
                .ok_or_else(|| DecodeError::Timestamp(n.to_string()))
        }
        WireTimestamp::Text(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            // Producers without an offset are read as UTC.
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
                .map_err(|_| DecodeError::Timestamp(s.clone()))
        }
    }
}
