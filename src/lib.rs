//! Live fraud-signal stream monitor.
//!
//! Connects to an upstream scorer over a WebSocket, decodes transaction
//! events, and keeps bounded recent-history windows plus running aggregates
//! for a display layer to read.

pub mod config;
pub mod core;
pub mod health;
pub mod notifications;
pub mod signals;
pub mod stream;

pub use crate::config::Config;
pub use crate::core::aggregate::AggregateSnapshot;
pub use crate::core::pipeline::{MonitorError, MonitorHandle, StreamView, spawn_monitor};
pub use crate::core::{FeatureSet, ThreatLevel, Transaction};
pub use crate::signals::{FeatureProjector, FeatureVector};
pub use crate::stream::connection::{ConnectionState, ConnectionStatus};
pub use crate::stream::ws::WsConnector;
