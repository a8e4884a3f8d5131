//! The monitor: single consumer of every input that can change state.
//!
//! Commands from handles, transport callbacks, and timer fires all arrive on
//! one unbounded inbox and are processed to completion in arrival order. The
//! monitor is the only writer of the connection state, the windows, and the
//! aggregate; readers get immutable `StreamView` snapshots over a watch
//! channel.
//!
//! Only handles hold strong inbox senders. Sinks and timers hold weak ones,
//! so the monitor tears itself down once the last handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::Transaction;
use crate::core::aggregate::{AggregateSnapshot, AggregationEngine};
use crate::core::window::WindowedEventStore;
use crate::notifications::Notifier;
use crate::signals::{FeatureProjector, FeatureVector};
use crate::stream::codec::{Frame, FrameCodec};
use crate::stream::connection::{
    Action, ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStatus,
};
use crate::stream::{Connector, NORMAL_CLOSURE, TransportEvent, TransportHandle, TransportSink};

/// Everything the monitor reacts to.
#[derive(Debug)]
pub enum Input {
    Connect,
    Disconnect,
    Shutdown,
    Transport { epoch: u64, event: TransportEvent },
    KeepaliveTick { epoch: u64 },
    ReconnectDue { generation: u64 },
}

/// Immutable picture of the monitor after one processed input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamView {
    pub connection: ConnectionState,
    pub summary: AggregateSnapshot,
    /// Oldest first.
    pub transactions: Vec<Arc<Transaction>>,
    /// Most recent first.
    pub anomalies: Vec<Arc<Transaction>>,
    pub frames_received: u64,
    pub decode_failures: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("monitor is not running")]
    Stopped,
}

/// Cheap, cloneable access to a running monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    inbox: mpsc::UnboundedSender<Input>,
    view: watch::Receiver<Arc<StreamView>>,
    projector: Arc<FeatureProjector>,
}

impl MonitorHandle {
    pub fn current_connection_state(&self) -> ConnectionState {
        self.view.borrow().connection.clone()
    }

    pub fn current_snapshot(&self) -> AggregateSnapshot {
        self.view.borrow().summary
    }

    pub fn recent_transactions(&self) -> Vec<Arc<Transaction>> {
        self.view.borrow().transactions.clone()
    }

    pub fn recent_anomalies(&self) -> Vec<Arc<Transaction>> {
        self.view.borrow().anomalies.clone()
    }

    pub fn project_features(&self, tx: &Transaction) -> FeatureVector {
        self.projector.project(&tx.features)
    }

    pub fn view(&self) -> Arc<StreamView> {
        self.view.borrow().clone()
    }

    /// Receiver woken on every published change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StreamView>> {
        self.view.clone()
    }

    pub fn request_connect(&self) -> Result<(), MonitorError> {
        self.send(Input::Connect)
    }

    pub fn request_disconnect(&self) -> Result<(), MonitorError> {
        self.send(Input::Disconnect)
    }

    /// Close the transport, cancel timers, and stop the monitor task.
    pub fn shutdown(&self) -> Result<(), MonitorError> {
        self.send(Input::Shutdown)
    }

    fn send(&self, input: Input) -> Result<(), MonitorError> {
        self.inbox.send(input).map_err(|_| MonitorError::Stopped)
    }
}

/// Spawn the monitor on the current tokio runtime.
pub fn spawn_monitor(
    config: Config,
    connector: Box<dyn Connector + Send + Sync>,
) -> (MonitorHandle, JoinHandle<()>) {
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let monitor = Monitor::new(config, connector, inbox_tx.downgrade());
    let handle = MonitorHandle {
        inbox: inbox_tx,
        view: monitor.view_tx.subscribe(),
        projector: Arc::new(FeatureProjector::new()),
    };
    let task = tokio::spawn(monitor.run(inbox_rx));
    (handle, task)
}

/// Owns the transport handle, timers, windows, and aggregate.
struct Monitor {
    url: String,
    connector: Box<dyn Connector + Send + Sync>,
    connection: ConnectionManager,
    codec: FrameCodec,
    store: WindowedEventStore,
    aggregation: AggregationEngine,
    notifier: Notifier,
    transport: Option<TransportHandle>,
    transport_opened: bool,
    keepalive: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    reconnect_generation: u64,
    inbox: mpsc::WeakUnboundedSender<Input>,
    view_tx: watch::Sender<Arc<StreamView>>,
    frames_received: u64,
    decode_failures: u64,
}

impl Monitor {
    fn new(
        config: Config,
        connector: Box<dyn Connector + Send + Sync>,
        inbox: mpsc::WeakUnboundedSender<Input>,
    ) -> Self {
        let connection = ConnectionManager::new(&config.stream);
        let initial = StreamView {
            connection: connection.state().clone(),
            ..StreamView::default()
        };
        let (view_tx, _) = watch::channel(Arc::new(initial));
        Self {
            url: config.stream.url.clone(),
            connector,
            connection,
            codec: FrameCodec::new(config.stream.probe.clone()),
            store: WindowedEventStore::new(
                config.window.max_transactions,
                config.window.max_anomalies,
            ),
            aggregation: AggregationEngine::new(&config.aggregation),
            notifier: Notifier::new(&config.notifications),
            transport: None,
            transport_opened: false,
            keepalive: None,
            reconnect: None,
            reconnect_generation: 0,
            inbox,
            view_tx,
            frames_received: 0,
            decode_failures: 0,
        }
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Input>) {
        info!(endpoint = %self.url, "Monitor started, waiting for commands...");

        while let Some(input) = inbox.recv().await {
            if matches!(input, Input::Shutdown) {
                break;
            }
            self.process(input);
            self.publish();
        }

        self.teardown();
        self.publish();
        let summary = self.aggregation.snapshot();
        info!(
            "Monitor shutting down after {} transactions ({} blocked, {} decode failures)",
            summary.total, summary.blocked, self.decode_failures
        );
    }

    fn process(&mut self, input: Input) {
        match input {
            Input::Connect => self.drive(ConnectionEvent::ConnectRequested),
            Input::Disconnect => self.drive(ConnectionEvent::DisconnectRequested),
            Input::Shutdown => {}
            Input::Transport { epoch, event } => {
                if epoch != self.connection.epoch() || self.transport.is_none() {
                    debug!(epoch, current = self.connection.epoch(), "Dropping event from released transport");
                    return;
                }
                self.on_transport_event(event);
            }
            Input::KeepaliveTick { epoch } => {
                if epoch == self.connection.epoch() {
                    self.drive(ConnectionEvent::KeepaliveTick);
                }
            }
            Input::ReconnectDue { generation } => {
                if generation != self.reconnect_generation || self.reconnect.is_none() {
                    debug!(generation, "Ignoring cancelled reconnect timer");
                    return;
                }
                self.reconnect = None;
                self.drive(ConnectionEvent::ReconnectDue);
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.transport_opened = true;
                self.drive(ConnectionEvent::TransportOpened)
            }
            TransportEvent::Error(reason) => self.drive(ConnectionEvent::TransportError(reason)),
            TransportEvent::Closed { code, reason } => {
                self.drive(ConnectionEvent::TransportClosed { code, reason })
            }
            TransportEvent::Frame(text) => {
                self.frames_received += 1;
                match self.codec.decode(&text) {
                    Ok(Frame::Pong) => self.drive(ConnectionEvent::ProbeAcknowledged),
                    Ok(Frame::Transaction(tx)) => self.ingest(tx),
                    Ok(Frame::Ignored(kind)) => debug!("Ignoring frame of type `{kind}`"),
                    Err(e) => {
                        self.decode_failures += 1;
                        warn!("Discarding undecodable frame: {e}");
                    }
                }
            }
        }
    }

    fn ingest(&mut self, tx: Transaction) {
        let tx = Arc::new(tx);
        let summary = self.aggregation.fold(&tx);
        self.store.insert(Arc::clone(&tx));

        if tx.is_anomaly {
            warn!(
                "{} Anomaly {}: ${:.2} ({}, risk {:.2})",
                tx.effective_threat().emoji(),
                tx.short_id(),
                tx.amount,
                tx.effective_threat(),
                tx.risk_score
            );
            self.notifier.notify(&tx);
        }

        if summary.total % 100 == 0 {
            info!(
                "Processed {} transactions: {} blocked, ${:.2} saved, {} critical",
                summary.total, summary.blocked, summary.saved, summary.critical
            );
        }
    }

    fn drive(&mut self, event: ConnectionEvent) {
        for action in self.connection.handle(event) {
            self.execute(action);
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::Open { epoch } => {
                let sink = TransportSink::new(epoch, self.inbox.clone());
                self.transport = Some(self.connector.connect(&self.url, sink));
                self.transport_opened = false;
            }
            Action::SendProbe => {
                if let Some(transport) = &self.transport {
                    if !transport.send_text(self.codec.probe()) {
                        debug!("Probe not queued, transport writer gone");
                    }
                }
            }
            Action::StartKeepalive { epoch, every } => {
                self.stop_keepalive();
                self.keepalive = Some(spawn_keepalive(self.inbox.clone(), epoch, every));
            }
            Action::StopKeepalive => self.stop_keepalive(),
            Action::ScheduleReconnect { after } => {
                self.cancel_reconnect();
                self.reconnect_generation += 1;
                info!("Reconnecting in {}s", after.as_secs());
                self.reconnect = Some(spawn_reconnect(
                    self.inbox.clone(),
                    self.reconnect_generation,
                    after,
                ));
            }
            Action::CancelReconnect => self.cancel_reconnect(),
            Action::Close { code, reason } => self.close_transport(code, &reason),
            Action::Release => {
                self.transport = None;
                self.transport_opened = false;
            }
        }
    }

    /// A transport that never opened has nothing to hand shake with, so its
    /// session is aborted rather than left dialing in the background.
    fn close_transport(&mut self, code: u16, reason: &str) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        if std::mem::take(&mut self.transport_opened) {
            transport.close(code, reason);
        } else {
            debug!("Aborting transport that never opened");
            transport.abort();
        }
    }

    fn stop_keepalive(&mut self) {
        if let Some(task) = self.keepalive.take() {
            task.abort();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect.take() {
            task.abort();
        }
    }

    fn teardown(&mut self) {
        if self.connection.status() != ConnectionStatus::Disconnected || self.transport.is_some() {
            self.drive(ConnectionEvent::DisconnectRequested);
        }
        self.stop_keepalive();
        self.cancel_reconnect();
        self.close_transport(NORMAL_CLOSURE, "shutdown");
    }

    fn publish(&self) {
        let windows = self.store.snapshot();
        let view = StreamView {
            connection: self.connection.state().clone(),
            summary: self.aggregation.snapshot(),
            transactions: windows.transactions,
            anomalies: windows.anomalies,
            frames_received: self.frames_received,
            decode_failures: self.decode_failures,
        };
        self.view_tx.send_if_modified(|current| {
            if **current == view {
                false
            } else {
                *current = Arc::new(view);
                true
            }
        });
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop_keepalive();
        self.cancel_reconnect();
    }
}

fn spawn_keepalive(
    inbox: mpsc::WeakUnboundedSender<Input>,
    epoch: u64,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            ticker.tick().await;
            let Some(inbox) = inbox.upgrade() else {
                return;
            };
            if inbox.send(Input::KeepaliveTick { epoch }).is_err() {
                return;
            }
        }
    })
}

fn spawn_reconnect(
    inbox: mpsc::WeakUnboundedSender<Input>,
    generation: u64,
    after: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if let Some(inbox) = inbox.upgrade() {
            let _ = inbox.send(Input::ReconnectDue { generation });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::core::ThreatLevel;
    use crate::core::fixtures::{anomaly, benign};
    use crate::stream::{ABNORMAL_CLOSURE, Outbound};
    use std::sync::Mutex;
    use tokio::time::timeout;

    const SCENARIO: &str = r#"{"type":"transaction","data":{"id":"t1","amount":500,"risk_score":0.92,"is_anomaly":true,"threat_level":"CRITICAL","timestamp":"2024-01-01T00:00:00Z","location":"Lagos","device":"mobile","features":{"velocity":4.2,"geoDist":1200,"deviceChange":true,"unusual_time":true,"amount_spike":true}}}"#;

    struct Session {
        sink: TransportSink,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        /// Shared with the session task; drops back to one when it is aborted.
        alive: Arc<()>,
    }

    /// Records every transport the monitor opens; tests drive the sinks.
    #[derive(Clone, Default)]
    struct FakeConnector {
        sessions: Arc<Mutex<Vec<Session>>>,
    }

    impl Connector for FakeConnector {
        fn connect(&self, _url: &str, sink: TransportSink) -> TransportHandle {
            let (tx, rx) = mpsc::unbounded_channel();
            let alive = Arc::new(());
            let held = Arc::clone(&alive);
            let task = tokio::spawn(async move {
                let _held = held;
                std::future::pending::<()>().await;
            });
            self.sessions.lock().unwrap().push(Session {
                sink,
                outbound: rx,
                alive,
            });
            TransportHandle::new(tx, Some(task))
        }
    }

    impl FakeConnector {
        fn count(&self) -> usize {
            self.sessions.lock().unwrap().len()
        }

        fn sink(&self, index: usize) -> TransportSink {
            self.sessions.lock().unwrap()[index].sink.clone()
        }

        fn session_running(&self, index: usize) -> bool {
            Arc::strong_count(&self.sessions.lock().unwrap()[index].alive) > 1
        }

        fn drain_outbound(&self, index: usize) -> Vec<Outbound> {
            let mut sessions = self.sessions.lock().unwrap();
            let mut out = Vec::new();
            while let Ok(msg) = sessions[index].outbound.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn test_config() -> Config {
        Config {
            notifications: NotificationConfig {
                enabled: false,
                ..NotificationConfig::default()
            },
            ..Config::default()
        }
    }

    fn start() -> (MonitorHandle, FakeConnector, JoinHandle<()>) {
        let connector = FakeConnector::default();
        let (handle, task) = spawn_monitor(test_config(), Box::new(connector.clone()));
        (handle, connector, task)
    }

    async fn settle<F>(handle: &MonitorHandle, pred: F) -> Arc<StreamView>
    where
        F: FnMut(&StreamView) -> bool,
    {
        settle_within(handle, Duration::from_secs(1), pred).await
    }

    async fn settle_within<F>(handle: &MonitorHandle, limit: Duration, mut pred: F) -> Arc<StreamView>
    where
        F: FnMut(&StreamView) -> bool,
    {
        let mut rx = handle.subscribe();
        let view = timeout(limit, rx.wait_for(|v| pred(v.as_ref())))
            .await
            .expect("view did not settle")
            .expect("monitor stopped");
        Arc::clone(&view)
    }

    fn frame(tx: &Transaction) -> String {
        FrameCodec::new("ping").encode(&Frame::Transaction(tx.clone()))
    }

    async fn connect(handle: &MonitorHandle, connector: &FakeConnector) -> TransportSink {
        let before = connector.count();
        handle.request_connect().unwrap();
        settle(handle, |v| v.connection.status == ConnectionStatus::Connecting).await;
        let sink = connector.sink(before);
        sink.opened();
        settle(handle, |v| v.connection.status == ConnectionStatus::Connected).await;
        sink
    }

    #[tokio::test(start_paused = true)]
    async fn scenario_critical_anomaly() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;

        sink.frame(SCENARIO);
        let view = settle(&handle, |v| v.summary.total == 1).await;

        assert_eq!(view.summary.blocked, 1);
        assert_eq!(view.summary.critical, 1);
        assert!((view.summary.saved - 500.0).abs() < 1e-9);
        assert!((view.summary.accuracy - 98.4).abs() <= 0.1 + 1e-9);

        let anomalies = handle.recent_anomalies();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].id, "t1");

        let vector = handle.project_features(&anomalies[0]);
        assert!((vector.get("Velocity").unwrap() - 42.0).abs() < 1e-9);
        assert_eq!(vector.get("Geo Risk"), Some(24.0));
        assert_eq!(vector.get("Device"), Some(85.0));
        assert_eq!(vector.get("Time"), Some(90.0));
        assert_eq!(vector.get("Amount"), Some(95.0));
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_probe_on_open_then_keepalive() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;
        assert_eq!(connector.drain_outbound(0), vec![Outbound::Text("ping".into())]);

        tokio::time::sleep(Duration::from_secs(11)).await;
        // round-trip through the inbox so the tick has been handled
        sink.frame(frame(&benign("sync", 1.0)));
        settle(&handle, |v| v.summary.total == 1).await;
        assert_eq!(connector.drain_outbound(0), vec![Outbound::Text("ping".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn pong_updates_status_message_only() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;
        sink.frame(r#"{"type":"pong"}"#);
        let view = settle(&handle, |v| v.connection.message.starts_with("Live")).await;
        assert_eq!(view.connection.status, ConnectionStatus::Connected);
        assert_eq!(view.summary.total, 0);
        assert!(view.transactions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_between_valid_ones_is_isolated() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;
        let state_before = handle.current_connection_state();

        sink.frame(frame(&benign("t1", 10.0)));
        sink.frame(r#"{"type":"transaction","data":{"id":"bad","amount":-4}}"#);
        sink.frame(frame(&benign("t2", 12.0)));
        let view = settle(&handle, |v| v.frames_received == 3).await;

        assert_eq!(view.summary.total, 2);
        assert_eq!(view.decode_failures, 1);
        assert_eq!(view.connection, state_before);
        assert_eq!(connector.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_frame_type_is_ignored() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;
        sink.frame(r#"{"type":"stats","data":{"tps":4}}"#);
        sink.frame(frame(&benign("t1", 10.0)));
        let view = settle(&handle, |v| v.summary.total == 1).await;
        assert_eq!(view.decode_failures, 0);
        assert_eq!(view.frames_received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_connect_keeps_one_transport() {
        let (handle, connector, _task) = start();
        handle.request_connect().unwrap();
        handle.request_connect().unwrap();
        settle(&handle, |v| v.connection.status == ConnectionStatus::Connecting).await;
        let sink = connector.sink(0);
        sink.opened();
        handle.request_connect().unwrap();
        sink.frame(frame(&benign("t1", 1.0)));
        let view = settle(&handle, |v| v.summary.total == 1).await;

        assert_eq!(connector.count(), 1);
        assert_eq!(view.connection.epoch, 1);
        assert_eq!(view.connection.status, ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_disconnect_does_not_reconnect() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;
        connector.drain_outbound(0);

        handle.request_disconnect().unwrap();
        let view = settle(&handle, |v| v.connection.status == ConnectionStatus::Disconnected).await;
        assert!(!view.connection.reconnect_pending);
        assert_eq!(view.connection.message, "Manually disconnected");
        assert_eq!(
            connector.drain_outbound(0),
            vec![Outbound::Close {
                code: NORMAL_CLOSURE,
                reason: "manual disconnect".into()
            }]
        );

        // a late close from the old transport is ignored
        sink.closed(ABNORMAL_CLOSURE, "late");
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(connector.count(), 1);
        let state = handle.current_connection_state();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert!(!state.reconnect_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn abnormal_close_reconnects_once_and_keeps_aggregates() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;
        sink.frame(frame(&anomaly("a1", 2000.0, ThreatLevel::High)));
        settle(&handle, |v| v.summary.total == 1).await;

        sink.error("connection reset");
        settle(&handle, |v| v.connection.status == ConnectionStatus::Error).await;
        sink.closed(ABNORMAL_CLOSURE, "reset");
        let view = settle(&handle, |v| v.connection.reconnect_pending).await;
        assert_eq!(view.connection.status, ConnectionStatus::Disconnected);
        assert_eq!(connector.count(), 1);

        let view = settle_within(&handle, Duration::from_secs(5), |v| {
            v.connection.status == ConnectionStatus::Connecting
        })
        .await;
        assert_eq!(connector.count(), 2);
        assert_eq!(view.connection.epoch, 2);
        assert!(!view.connection.reconnect_pending);
        assert_eq!(view.summary.total, 1);
        assert_eq!(view.summary.blocked, 1);
        assert_eq!(view.anomalies.len(), 1);

        // events from the first transport no longer count
        sink.frame(frame(&benign("stale", 1.0)));
        let second = connector.sink(1);
        second.opened();
        second.frame(frame(&benign("fresh", 1.0)));
        let view = settle(&handle, |v| v.summary.total == 2).await;
        assert_eq!(view.transactions.last().unwrap().id, "fresh");
        assert!(view.transactions.iter().all(|t| t.id != "stale"));
    }

    #[tokio::test(start_paused = true)]
    async fn normal_close_from_server_does_not_reconnect() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;
        sink.closed(NORMAL_CLOSURE, "bye");
        let view = settle(&handle, |v| v.connection.status == ConnectionStatus::Disconnected).await;
        assert!(!view.connection.reconnect_pending);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn windows_are_bounded() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;
        for i in 0..120 {
            sink.frame(frame(&benign(&format!("b{i}"), 5.0)));
        }
        for i in 0..10 {
            sink.frame(frame(&anomaly(&format!("a{i}"), 3000.0, ThreatLevel::Medium)));
        }
        let view = settle(&handle, |v| v.summary.total == 130).await;

        assert_eq!(handle.recent_transactions().len(), 100);
        assert_eq!(view.transactions.first().unwrap().id, "b30");
        assert_eq!(view.transactions.last().unwrap().id, "a9");
        let anomaly_ids: Vec<&str> = view.anomalies.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(anomaly_ids, vec!["a9", "a8", "a7", "a6", "a5", "a4", "a3", "a2"]);
        assert_eq!(view.summary.blocked, 10);
        assert!((view.summary.saved - 30_000.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_transport_and_stops_task() {
        let (handle, connector, task) = start();
        connect(&handle, &connector).await;
        connector.drain_outbound(0);

        handle.shutdown().unwrap();
        timeout(Duration::from_secs(1), task)
            .await
            .expect("monitor did not stop")
            .unwrap();

        assert_eq!(
            connector.drain_outbound(0),
            vec![Outbound::Close {
                code: NORMAL_CLOSURE,
                reason: "manual disconnect".into()
            }]
        );
        assert_eq!(handle.request_connect(), Err(MonitorError::Stopped));
        assert_eq!(handle.current_connection_state().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_stops_as_soon_as_disconnected() {
        let (handle, connector, _task) = start();
        connect(&handle, &connector).await;
        connector.drain_outbound(0);

        handle.request_disconnect().unwrap();
        settle(&handle, |v| v.connection.status == ConnectionStatus::Disconnected).await;
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(
            connector.drain_outbound(0),
            vec![Outbound::Close {
                code: NORMAL_CLOSURE,
                reason: "manual disconnect".into()
            }]
        );
        assert_eq!(connector.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_waits_the_full_delay() {
        let (handle, connector, _task) = start();
        let sink = connect(&handle, &connector).await;
        sink.closed(ABNORMAL_CLOSURE, "reset");
        settle(&handle, |v| v.connection.reconnect_pending).await;

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(connector.count(), 1);
        assert!(handle.current_connection_state().reconnect_pending);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let view = settle(&handle, |v| v.connection.status == ConnectionStatus::Connecting).await;
        assert_eq!(connector.count(), 2);
        assert_eq!(view.connection.epoch, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_tears_the_monitor_down() {
        let (handle, connector, task) = start();
        connect(&handle, &connector).await;
        connector.drain_outbound(0);

        drop(handle);
        timeout(Duration::from_secs(1), task)
            .await
            .expect("monitor kept running without handles")
            .unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(
            connector.drain_outbound(0),
            vec![Outbound::Close {
                code: NORMAL_CLOSURE,
                reason: "manual disconnect".into()
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_while_connecting_aborts_the_session() {
        let (handle, connector, _task) = start();
        handle.request_connect().unwrap();
        settle(&handle, |v| v.connection.status == ConnectionStatus::Connecting).await;
        assert!(connector.session_running(0));

        handle.request_disconnect().unwrap();
        settle(&handle, |v| v.connection.status == ConnectionStatus::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!connector.session_running(0));
        assert!(connector.drain_outbound(0).is_empty());

        connect(&handle, &connector).await;
        assert_eq!(connector.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_after_open_lets_the_session_flush_its_close() {
        let (handle, connector, _task) = start();
        connect(&handle, &connector).await;

        handle.request_disconnect().unwrap();
        settle(&handle, |v| v.connection.status == ConnectionStatus::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(connector.session_running(0));
    }
}
