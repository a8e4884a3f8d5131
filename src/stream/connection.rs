//! Connection lifecycle state machine.
//!
//! Pure: `handle` consumes one event and returns the side effects the caller
//! must perform, in order. Timers and the transport itself live with the
//! caller.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::NORMAL_CLOSURE;
use crate::config::StreamConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Reader-facing view of the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub message: String,
    /// Transport epoch; bumped on every new transport.
    pub epoch: u64,
    pub reconnect_pending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    ConnectRequested,
    TransportOpened,
    ProbeAcknowledged,
    KeepaliveTick,
    TransportError(String),
    TransportClosed { code: u16, reason: String },
    DisconnectRequested,
    ReconnectDue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Open { epoch: u64 },
    SendProbe,
    StartKeepalive { epoch: u64, every: Duration },
    StopKeepalive,
    ScheduleReconnect { after: Duration },
    CancelReconnect,
    Close { code: u16, reason: String },
    /// Transport already closed on its own; just drop the handle.
    Release,
}

pub struct ConnectionManager {
    state: ConnectionState,
    /// A transport exists and has not reported closure.
    transport_live: bool,
    keepalive_every: Duration,
    reconnect_after: Duration,
}

impl ConnectionManager {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            state: ConnectionState {
                message: "Not connected".into(),
                ..ConnectionState::default()
            },
            transport_live: false,
            keepalive_every: config.keepalive_interval(),
            reconnect_after: config.reconnect_delay(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    pub fn epoch(&self) -> u64 {
        self.state.epoch
    }

    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Action> {
        match event {
            ConnectionEvent::ConnectRequested => self.on_connect_requested(),
            ConnectionEvent::TransportOpened => self.on_opened(),
            ConnectionEvent::ProbeAcknowledged => {
                if self.state.status == ConnectionStatus::Connected {
                    self.state.message =
                        format!("Live, last pong at {}", Utc::now().format("%H:%M:%S"));
                }
                Vec::new()
            }
            ConnectionEvent::KeepaliveTick => {
                if self.state.status == ConnectionStatus::Connected {
                    vec![Action::SendProbe]
                } else {
                    Vec::new()
                }
            }
            ConnectionEvent::TransportError(reason) => self.on_error(reason),
            ConnectionEvent::TransportClosed { code, reason } => self.on_closed(code, reason),
            ConnectionEvent::DisconnectRequested => self.on_disconnect_requested(),
            ConnectionEvent::ReconnectDue => {
                if !self.state.reconnect_pending {
                    debug!("Reconnect timer fired with nothing pending, ignoring");
                    return Vec::new();
                }
                self.state.reconnect_pending = false;
                info!("Reconnect delay elapsed, reconnecting");
                self.on_connect_requested()
            }
        }
    }

    fn on_connect_requested(&mut self) -> Vec<Action> {
        if self.transport_live {
            debug!(
                status = ?self.state.status,
                epoch = self.state.epoch,
                "Connect requested while a transport is open or opening, ignoring"
            );
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.state.reconnect_pending {
            self.state.reconnect_pending = false;
            actions.push(Action::CancelReconnect);
        }

        self.state.epoch += 1;
        self.state.status = ConnectionStatus::Connecting;
        self.state.message = "Connecting...".into();
        self.transport_live = true;
        info!(epoch = self.state.epoch, "Opening stream transport");
        actions.push(Action::Open {
            epoch: self.state.epoch,
        });
        actions
    }

    fn on_opened(&mut self) -> Vec<Action> {
        if self.state.status != ConnectionStatus::Connecting {
            debug!(status = ?self.state.status, "Transport opened outside CONNECTING, ignoring");
            return Vec::new();
        }
        self.state.status = ConnectionStatus::Connected;
        self.state.message = "Connected to live stream".into();
        info!(epoch = self.state.epoch, "Stream connected");

        let mut actions = vec![
            Action::SendProbe,
            Action::StartKeepalive {
                epoch: self.state.epoch,
                every: self.keepalive_every,
            },
        ];
        if self.state.reconnect_pending {
            self.state.reconnect_pending = false;
            actions.push(Action::CancelReconnect);
        }
        actions
    }

    fn on_error(&mut self, reason: String) -> Vec<Action> {
        match self.state.status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                warn!(epoch = self.state.epoch, "Stream transport error: {reason}");
                self.state.status = ConnectionStatus::Error;
                self.state.message = format!("Connection error: {reason}");
            }
            _ => debug!("Transport error in {:?}: {reason}", self.state.status),
        }
        Vec::new()
    }

    fn on_closed(&mut self, code: u16, reason: String) -> Vec<Action> {
        if !self.transport_live {
            debug!(code, "Close reported for a transport already released");
            return Vec::new();
        }
        self.transport_live = false;
        self.state.status = ConnectionStatus::Disconnected;

        let mut actions = vec![Action::StopKeepalive, Action::Release];
        if code == NORMAL_CLOSURE {
            info!(epoch = self.state.epoch, "Stream closed normally");
            self.state.message = "Disconnected".into();
            return actions;
        }

        warn!(
            epoch = self.state.epoch,
            code,
            reason = %reason,
            "Stream closed unexpectedly, scheduling reconnect"
        );
        self.state.message = format!(
            "Connection lost (code {code}), retrying in {}s",
            self.reconnect_after.as_secs()
        );
        self.state.reconnect_pending = true;
        actions.push(Action::ScheduleReconnect {
            after: self.reconnect_after,
        });
        actions
    }

    fn on_disconnect_requested(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.state.reconnect_pending {
            self.state.reconnect_pending = false;
            actions.push(Action::CancelReconnect);
        }
        actions.push(Action::StopKeepalive);
        if self.transport_live {
            self.transport_live = false;
            actions.push(Action::Close {
                code: NORMAL_CLOSURE,
                reason: "manual disconnect".into(),
            });
        }
        if self.state.status != ConnectionStatus::Disconnected {
            info!(epoch = self.state.epoch, "Stream manually disconnected");
        }
        self.state.status = ConnectionStatus::Disconnected;
        self.state.message = "Manually disconnected".into();
        actions
    }
}
