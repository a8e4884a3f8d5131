use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use super::{
    ABNORMAL_CLOSURE, Connector, NO_STATUS_RECEIVED, Outbound, TransportEvent, TransportHandle,
    TransportSink,
};

/// WebSocket transport. One spawned task per epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str, sink: TransportSink) -> TransportHandle {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(url.to_string(), sink, out_rx));
        TransportHandle::new(out_tx, Some(task))
    }
}

/// Drive one connection until either side closes.
///
/// Every exit path reports exactly one `closed` to the sink, except a close
/// requested by the monitor, which has already released this epoch.
async fn run_session(url: String, sink: TransportSink, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    let epoch = sink.epoch();
    let (ws, _response) = match connect_async(url.as_str()).await {
        Ok(pair) => pair,
        Err(e) => {
            sink.error(format!("connect to {url} failed: {e}"));
            sink.closed(ABNORMAL_CLOSURE, "connect failed");
            return;
        }
    };
    info!(epoch, endpoint = %url, "WebSocket open");
    sink.opened();

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        sink.error(format!("send failed: {e}"));
                        sink.closed(ABNORMAL_CLOSURE, "send failed");
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!(epoch, "Close frame not delivered: {e}");
                    }
                    return;
                }
                None => {
                    let _ = write.close().await;
                    return;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if !sink.emit(TransportEvent::Frame(text)) {
                        info!(epoch, "Monitor gone, stopping WebSocket session");
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => sink.frame(text),
                    Err(_) => warn!(epoch, "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    sink.closed(code, reason);
                    return;
                }
                // control frames are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.error(e.to_string());
                    sink.closed(ABNORMAL_CLOSURE, "read failed");
                    return;
                }
                None => {
                    sink.closed(ABNORMAL_CLOSURE, "stream ended");
                    return;
                }
            },
        }
    }
}
