pub mod codec;
pub mod connection;
pub mod ws;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::pipeline::Input;

/// Close code for a deliberate, clean shutdown.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close frame carried no status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Transport callbacks, delivered into the monitor inbox.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed { code: u16, reason: String },
}

/// Frames written to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Callback side of one transport epoch.
///
/// Every event is tagged with the epoch it was created for, so events from a
/// transport the monitor has already released are dropped on arrival.
#[derive(Debug, Clone)]
pub struct TransportSink {
    epoch: u64,
    inbox: mpsc::WeakUnboundedSender<Input>,
}

impl TransportSink {
    pub(crate) fn new(epoch: u64, inbox: mpsc::WeakUnboundedSender<Input>) -> Self {
        Self { epoch, inbox }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn frame(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Frame(text.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(TransportEvent::Error(message.into()));
    }

    pub fn closed(&self, code: u16, reason: impl Into<String>) {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        });
    }

    /// Returns false once the monitor has stopped. A sink never keeps the
    /// monitor alive on its own.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let Some(inbox) = self.inbox.upgrade() else {
            return false;
        };
        inbox
            .send(Input::Transport {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// Write side of one live transport.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>, task: Option<JoinHandle<()>>) -> Self {
        Self { outbound, task }
    }

    pub fn send_text(&self, text: &str) -> bool {
        self.outbound.send(Outbound::Text(text.to_string())).is_ok()
    }

    /// Ask the transport to close. The session task is left to flush the
    /// close frame on its own.
    pub fn close(mut self, code: u16, reason: &str) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
        self.task.take();
    }

    /// Drop the transport without a close handshake, aborting the session task.
    pub fn abort(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Opens transports. Implementations spawn their own I/O and report back
/// through the sink; `connect` itself must not block.
pub trait Connector {
    fn connect(&self, url: &str, sink: TransportSink) -> TransportHandle;
}
