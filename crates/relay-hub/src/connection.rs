use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsFrame, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use relay_core::config::MAX_PAYLOAD_BYTES;

use crate::hub::HubHandle;
use crate::message::{ConnectionId, Message};

/// Flush window after the hub drops a connection: the write pump gets this
/// long to drain its queue and send the close frame before the transport is
/// forced shut.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Upgrade entry point: accept the handshake, register the connection with
/// the hub, and run its pumps until disconnect.
///
/// `flag` is the opaque routing key resolved by the caller from the request
/// (`None` or empty means the connection joins no group). When a flag is
/// present it is echoed as the selected subprotocol so browser clients that
/// offered it via `Sec-WebSocket-Protocol` accept the handshake. `send_cap`
/// bounds the outbound queue; overflow disconnects the client.
pub fn serve_ws(
    ws: WebSocketUpgrade,
    flag: Option<String>,
    hub: HubHandle,
    send_cap: usize,
) -> Response {
    let flag = flag.unwrap_or_default();
    let ws = if flag.is_empty() {
        ws
    } else {
        ws.protocols([flag.clone()])
    };
    ws.on_upgrade(move |socket| run_session(socket, flag, hub, send_cap))
}

/// Per-connection session: owns the socket for its whole lifetime.
///
/// The write pump runs in its own task; the read pump runs inside the
/// select. The session ends on whichever fires first: the reader stopping
/// (peer close or transport error), the write pump stopping (write error),
/// or the hub dropping the connection's registry entry (backpressure kick
/// or shutdown), observed through the kick signal. Leaving the select drops
/// the read half immediately, so a dropped client cannot keep feeding
/// payloads into the hub, and once the writer is done (or aborted) both
/// socket halves are gone and the transport is closed for real.
async fn run_session(socket: WebSocket, flag: String, hub: HubHandle, send_cap: usize) {
    let id = ConnectionId::new();
    info!(conn_id = %id, flag = %flag, "connection opened");

    let (socket_tx, socket_rx) = socket.split();
    let (tx, rx) = mpsc::channel::<Arc<Message>>(send_cap);
    let (kick_tx, mut kick_rx) = watch::channel(false);
    hub.register(id, flag, tx, kick_tx).await;

    let writer = SocketWriter { id, socket_tx, rx };
    let mut write_pump = tokio::spawn(writer.run());

    let reader = SocketReader {
        id,
        socket_rx,
        hub: hub.clone(),
    };

    tokio::select! {
        _ = reader.run() => {
            // peer closed or the transport failed
            hub.unregister(id).await;
            drain_write_pump(id, &mut write_pump).await;
        }
        _ = &mut write_pump => {
            // write error; the reader is dropped with the select
            hub.unregister(id).await;
        }
        _ = kick_rx.changed() => {
            // the hub dropped this connection: kicked as unresponsive, or
            // shutdown. The queue is already closed, so the writer drains
            // and exits on its own unless it is wedged mid-write.
            drain_write_pump(id, &mut write_pump).await;
            hub.unregister(id).await;
        }
    }

    info!(conn_id = %id, "connection closed");
}

/// Give the write pump one [`DRAIN_GRACE`] to flush and send its close
/// frame, then abort it. Either way its socket half is released and the
/// transport closes.
async fn drain_write_pump(id: ConnectionId, write_pump: &mut JoinHandle<()>) {
    if tokio::time::timeout(DRAIN_GRACE, &mut *write_pump)
        .await
        .is_err()
    {
        warn!(conn_id = %id, "write pump wedged, forcing the transport shut");
        write_pump.abort();
    }
}

/// Drains the outbound queue onto the wire, one message at a time, in
/// submission order.
struct SocketWriter {
    id: ConnectionId,
    socket_tx: SplitSink<WebSocket, WsFrame>,
    rx: mpsc::Receiver<Arc<Message>>,
}

impl SocketWriter {
    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            let frame = match serde_json::to_string(msg.as_ref()) {
                Ok(json) => WsFrame::Text(json.into()),
                Err(e) => {
                    warn!(conn_id = %self.id, error = %e, "dropping unencodable message");
                    continue;
                }
            };
            if let Err(e) = self.socket_tx.send(frame).await {
                debug!(conn_id = %self.id, error = %e, "write failed");
                return;
            }
        }
        // queue closed: the hub shut down or kicked this connection.
        // Complete the close handshake so a well-behaved peer disconnects.
        let _ = self.socket_tx.send(WsFrame::Close(None)).await;
    }
}

/// Reads frames off the wire and forwards payloads to the hub's handler.
/// Never writes to the socket; all writes go through the write pump.
struct SocketReader {
    id: ConnectionId,
    socket_rx: SplitStream<WebSocket>,
    hub: HubHandle,
}

impl SocketReader {
    async fn run(mut self) {
        loop {
            match self.socket_rx.next().await {
                Some(Ok(frame)) => {
                    if self.read_frame(frame).await.is_break() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    debug!(conn_id = %self.id, error = %e, "read failed");
                    break;
                }
                None => break,
            }
        }
    }

    async fn read_frame(&mut self, frame: WsFrame) -> ControlFlow<(), ()> {
        match frame {
            WsFrame::Text(text) => self.forward(text.as_bytes().to_vec()).await,
            WsFrame::Binary(bytes) => self.forward(bytes.to_vec()).await,
            WsFrame::Close(close) => {
                if let Some(cf) = close {
                    debug!(conn_id = %self.id, code = %cf.code, reason = %cf.reason, "peer closed");
                } else {
                    debug!(conn_id = %self.id, "peer closed");
                }
                ControlFlow::Break(())
            }
            // axum answers pings itself
            WsFrame::Ping(_) | WsFrame::Pong(_) => ControlFlow::Continue(()),
        }
    }

    async fn forward(&self, payload: Vec<u8>) -> ControlFlow<(), ()> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            warn!(conn_id = %self.id, size = payload.len(), "payload too large");
            return ControlFlow::Break(());
        }
        self.hub.inbound(payload).await;
        ControlFlow::Continue(())
    }
}
