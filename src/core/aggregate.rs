use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AggregationConfig;
use crate::core::{ThreatLevel, Transaction};

/// Running summary over every accepted transaction.
///
/// Replaced wholesale on each fold; never mutated in place by readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub total: u64,
    /// Anomaly-flagged transactions.
    pub blocked: u64,
    /// Sum of amounts over anomaly-flagged transactions.
    pub saved: f64,
    /// Cosmetic display figure, resampled on every event. Not a real accuracy.
    pub accuracy: f64,
    pub critical: u64,
}

/// Fold one transaction into a snapshot.
///
/// `accuracy` is supplied by the caller so the fold itself stays
/// deterministic.
pub fn apply(current: &AggregateSnapshot, tx: &Transaction, accuracy: f64) -> AggregateSnapshot {
    let flagged = tx.is_anomaly;
    AggregateSnapshot {
        total: current.total + 1,
        blocked: current.blocked + u64::from(flagged),
        saved: if flagged { current.saved + tx.amount } else { current.saved },
        accuracy,
        critical: current.critical + u64::from(tx.effective_threat() == ThreatLevel::Critical),
    }
}

/// Widest jitter the sampler accepts, in percentage points.
const MAX_ACCURACY_JITTER: f64 = 100.0;

/// Owns the current snapshot and the jitter source for the accuracy figure.
pub struct AggregationEngine {
    snapshot: AggregateSnapshot,
    baseline: f64,
    jitter: f64,
    rng: StdRng,
}

impl AggregationEngine {
    pub fn new(config: &AggregationConfig) -> Self {
        Self {
            snapshot: AggregateSnapshot::default(),
            baseline: config.accuracy_baseline,
            jitter: sanitize_jitter(config.accuracy_jitter),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn snapshot(&self) -> AggregateSnapshot {
        self.snapshot
    }

    pub fn fold(&mut self, tx: &Transaction) -> AggregateSnapshot {
        let accuracy = self.sample_accuracy();
        self.snapshot = apply(&self.snapshot, tx, accuracy);
        self.snapshot
    }

    fn sample_accuracy(&mut self) -> f64 {
        if self.jitter == 0.0 {
            return self.baseline;
        }
        self.baseline + self.rng.gen_range(-self.jitter..=self.jitter)
    }
}

fn sanitize_jitter(jitter: f64) -> f64 {
    if !jitter.is_finite() {
        let fallback = AggregationConfig::default().accuracy_jitter;
        warn!("accuracy_jitter {jitter} is not finite, using {fallback}");
        return fallback;
    }
    let jitter = jitter.abs();
    if jitter > MAX_ACCURACY_JITTER {
        warn!("accuracy_jitter {jitter} clamped to {MAX_ACCURACY_JITTER}");
        return MAX_ACCURACY_JITTER;
    }
    jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures::{anomaly, benign};

    fn engine() -> AggregationEngine {
        AggregationEngine::new(&AggregationConfig::default())
    }

    #[test]
    fn starts_zeroed() {
        let snap = engine().snapshot();
        assert_eq!(snap, AggregateSnapshot::default());
        assert_eq!(snap.total, 0);
        assert_eq!(snap.saved, 0.0);
    }

    #[test]
    fn benign_only_bumps_total() {
        let next = apply(&AggregateSnapshot::default(), &benign("t1", 75.0), 98.4);
        assert_eq!(next.total, 1);
        assert_eq!(next.blocked, 0);
        assert_eq!(next.saved, 0.0);
        assert_eq!(next.critical, 0);
    }

    #[test]
    fn critical_anomaly_counts_everywhere() {
        let next = apply(
            &AggregateSnapshot::default(),
            &anomaly("t1", 500.0, ThreatLevel::Critical),
            98.4,
        );
        assert_eq!(next.total, 1);
        assert_eq!(next.blocked, 1);
        assert_eq!(next.critical, 1);
        assert!((next.saved - 500.0).abs() < 1e-9);
    }

    #[test]
    fn critical_level_on_benign_event_is_ignored() {
        let mut tx = benign("t1", 10.0);
        tx.threat_level = ThreatLevel::Critical;
        let next = apply(&AggregateSnapshot::default(), &tx, 98.4);
        assert_eq!(next.critical, 0);
    }

    #[test]
    fn counters_track_mixed_sequence() {
        let mut engine = engine();
        let mut expected_saved = 0.0;
        let mut expected_blocked = 0;
        for i in 0..60u32 {
            let tx = match i % 5 {
                0 => anomaly(&format!("t{i}"), 2500.5 + f64::from(i), ThreatLevel::Critical),
                1 => anomaly(&format!("t{i}"), 1200.25, ThreatLevel::High),
                _ => benign(&format!("t{i}"), 40.0),
            };
            if tx.is_anomaly {
                expected_saved += tx.amount;
                expected_blocked += 1;
            }
            let before = engine.snapshot();
            let after = engine.fold(&tx);
            assert!(after.total > before.total);
            assert!(after.blocked >= before.blocked);
            assert!(after.saved >= before.saved);
            assert!(after.blocked <= after.total);
            assert!(after.critical <= after.blocked);
        }
        let snap = engine.snapshot();
        assert_eq!(snap.total, 60);
        assert_eq!(snap.blocked, expected_blocked);
        assert_eq!(snap.critical, 12);
        assert!((snap.saved - expected_saved).abs() < 1e-6);
    }

    #[test]
    fn accuracy_stays_within_jitter_of_baseline() {
        let mut engine = engine();
        for i in 0..500 {
            let snap = engine.fold(&benign(&format!("t{i}"), 1.0));
            assert!(
                (snap.accuracy - 98.4).abs() <= 0.1 + 1e-9,
                "accuracy {} out of bounds",
                snap.accuracy
            );
        }
    }

    #[test]
    fn zero_jitter_pins_accuracy() {
        let config = AggregationConfig {
            accuracy_baseline: 97.0,
            accuracy_jitter: 0.0,
        };
        let mut engine = AggregationEngine::new(&config);
        assert_eq!(engine.fold(&benign("t1", 1.0)).accuracy, 97.0);
    }

    #[test]
    fn unusable_jitter_never_panics() {
        for jitter in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e308] {
            let config = AggregationConfig {
                accuracy_baseline: 98.4,
                accuracy_jitter: jitter,
            };
            let mut engine = AggregationEngine::new(&config);
            let snap = engine.fold(&benign("t1", 1.0));
            assert!(snap.accuracy.is_finite(), "jitter {jitter} gave {}", snap.accuracy);
            assert!((snap.accuracy - 98.4).abs() <= MAX_ACCURACY_JITTER + 1e-9);
        }
    }

    #[test]
    fn negative_jitter_uses_its_magnitude() {
        assert_eq!(sanitize_jitter(-0.5), 0.5);
        assert_eq!(sanitize_jitter(f64::NAN), 0.1);
        assert_eq!(sanitize_jitter(1e308), MAX_ACCURACY_JITTER);
    }
}
