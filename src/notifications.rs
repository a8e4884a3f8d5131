use std::time::{Duration, Instant};

use crate::config::NotificationConfig;
use crate::core::{ThreatLevel, Transaction};

/// Desktop notification sender with cooldown to prevent spam.
pub struct Notifier {
    enabled: bool,
    min_threat: ThreatLevel,
    cooldown: Duration,
    last_sent: Option<Instant>,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_threat: config.min_threat,
            cooldown: Duration::from_secs(config.cooldown_seconds),
            last_sent: None,
        }
    }

    /// Try to send a desktop notification for an accepted anomaly.
    /// Returns true if a notification was sent, false if skipped.
    pub fn notify(&mut self, tx: &Transaction) -> bool {
        if !self.should_notify(tx) {
            return false;
        }
        if !self.check_cooldown() {
            return false;
        }

        send_notification(tx);
        true
    }

    fn should_notify(&self, tx: &Transaction) -> bool {
        self.enabled
            && tx.is_anomaly
            && self.min_threat != ThreatLevel::None
            && tx.effective_threat() >= self.min_threat
    }

    /// Check and update cooldown. Returns true if enough time has passed.
    fn check_cooldown(&mut self) -> bool {
        let now = Instant::now();
        if let Some(prev) = self.last_sent {
            if now.duration_since(prev) < self.cooldown {
                return false;
            }
        }
        self.last_sent = Some(now);
        true
    }
}

/// Fire-and-forget: send the actual desktop notification.
fn send_notification(tx: &Transaction) {
    let threat = tx.effective_threat();
    let title = format!("{} TxSentinel: {threat} anomaly", threat.emoji());
    let mut body = format!(
        "${:.2} | risk {:.0}% | {} via {}",
        tx.amount,
        tx.risk_score * 100.0,
        tx.location,
        tx.device
    );
    if let Some(merchant) = &tx.merchant {
        body.push_str(&format!(" @ {merchant}"));
    }
    body.push_str(&format!(" | {}", tx.short_id()));

    // Background thread so the stream is never blocked on the desktop bus
    std::thread::spawn(move || {
        if let Err(e) = notify_rust::Notification::new()
            .summary(&title)
            .body(&body)
            .show()
        {
            tracing::debug!("Desktop notification failed: {e}");
        }
    });
}
