//! One WebSocket connection: the outbound writer task, the inbound reader
//! loop and the [`Transport`] the session talks through.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use relay_core::ids::ConnectionId;
use relay_runtime::{Transport, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::server::AppState;

/// Close reasons reported to the session when the socket ends on its own.
pub const CONNECTION_CLOSED: &str = "connection_closed";
pub const TRANSPORT_ERROR: &str = "transport_error";
pub const SERVER_SHUTDOWN: &str = "server_shutdown";

/// WebSocket close reasons are capped at 123 bytes.
const MAX_CLOSE_REASON: usize = 123;

/// Outbound half of a connection, handed to the session.
pub struct WsTransport {
    frames: mpsc::Sender<String>,
    close: Mutex<Option<oneshot::Sender<String>>>,
}

/// Receiving ends drained by the writer task.
pub struct WriterInbox {
    frames: mpsc::Receiver<String>,
    close: oneshot::Receiver<String>,
}

impl WsTransport {
    pub fn channel(max_send_queue: usize) -> (Arc<Self>, WriterInbox) {
        let (frames_tx, frames_rx) = mpsc::channel(max_send_queue.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let transport = Arc::new(Self {
            frames: frames_tx,
            close: Mutex::new(Some(close_tx)),
        });
        let inbox = WriterInbox {
            frames: frames_rx,
            close: close_rx,
        };
        (transport, inbox)
    }

    pub fn is_closed(&self) -> bool {
        self.close.lock().is_none() || self.frames.is_closed()
    }
}

impl Transport for WsTransport {
    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.close.lock().is_none() {
            return Err(TransportError::Closed);
        }
        self.frames.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(msg) => {
                tracing::warn!(msg_len = msg.len(), "send queue full, dropping frame");
                TransportError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn close(&self, reason: &str) {
        if let Some(tx) = self.close.lock().take() {
            let _ = tx.send(reason.to_owned());
        }
    }
}

fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_owned();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_owned()
}

/// Forward queued frames to the socket and ping every `ping_every`.
///
/// Ends when the transport is closed (after flushing anything already
/// queued and sending a close frame) or when the socket rejects a write.
/// Returns the close reason if the session asked for the close.
pub async fn run_writer<S>(mut sink: S, mut inbox: WriterInbox, ping_every: Duration) -> Option<String>
where
    S: Sink<WsMessage> + Unpin,
{
    let mut ping = tokio::time::interval(ping_every);
    ping.tick().await;

    loop {
        tokio::select! {
            biased;
            reason = &mut inbox.close => {
                let Ok(reason) = reason else { return None };
                while let Ok(text) = inbox.frames.try_recv() {
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        return Some(reason);
                    }
                }
                let frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: truncate_reason(&reason).into(),
                };
                let _ = sink.send(WsMessage::Close(Some(frame))).await;
                return Some(reason);
            }
            frame = inbox.frames.recv() => match frame {
                Some(text) => {
                    if sink.send(WsMessage::Text(text.into())).await.is_err() {
                        return None;
                    }
                }
                None => return None,
            },
            _ = ping.tick() => {
                if sink.send(WsMessage::Ping(Vec::<u8>::new().into())).await.is_err() {
                    return None;
                }
                tracing::trace!("sent ping");
            }
        }
    }
}

/// What a connection is bound to, for bookkeeping and health.
#[derive(Clone, Debug)]
pub struct ConnectionInfo {
    pub workflow: String,
    pub connected_at: DateTime<Utc>,
}

/// Open connections, whether or not their session is still running.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionInfo>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ConnectionId, workflow: &str) {
        self.connections.insert(
            id,
            ConnectionInfo {
                workflow: workflow.to_owned(),
                connected_at: Utc::now(),
            },
        );
    }

    pub fn unregister(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        self.connections.remove(id).map(|(_, info)| info)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }
}

/// Drive one upgraded socket bound to `workflow` until either side ends it.
pub(crate) async fn handle_ws_connection(socket: WebSocket, workflow: String, state: AppState) {
    let conn_id = ConnectionId::new();
    let (sink, mut stream) = socket.split();
    let (transport, inbox) = WsTransport::channel(state.config.max_send_queue);
    let mut writer = tokio::spawn(run_writer(sink, inbox, state.config.ping_interval()));

    state.connections.register(conn_id.clone(), &workflow);
    tracing::info!(client_id = %conn_id, workflow = %workflow, "client connected");

    let mut writer_done = false;
    let reason = match state.runtime.on_connection_open(conn_id.clone(), &workflow, transport) {
        Ok(session_id) => {
            tracing::debug!(client_id = %conn_id, %session_id, "session bound");
            let ended = read_frames(&state, &conn_id, &mut stream, &mut writer).await;
            writer_done = ended.writer_done;
            ended.reason
        }
        Err(e) => {
            tracing::info!(client_id = %conn_id, workflow = %workflow, error = %e, "connection refused");
            e.to_string()
        }
    };

    let connected_secs = state
        .connections
        .unregister(&conn_id)
        .map(|info| (Utc::now() - info.connected_at).num_seconds());
    let timeout = state.config.shutdown_timeout();
    if let Some(dispatcher) = state.runtime.on_connection_closed(&conn_id, &reason) {
        if tokio::time::timeout(timeout, dispatcher).await.is_err() {
            tracing::warn!(client_id = %conn_id, ?timeout, "dispatch loop still running after close");
        }
    }
    if !writer_done && tokio::time::timeout(timeout, &mut writer).await.is_err() {
        writer.abort();
    }
    tracing::info!(
        client_id = %conn_id,
        reason = %reason,
        connected_secs,
        "client disconnected"
    );
}

struct ReadEnded {
    reason: String,
    writer_done: bool,
}

async fn read_frames<R>(
    state: &AppState,
    conn_id: &ConnectionId,
    stream: &mut R,
    writer: &mut JoinHandle<Option<String>>,
) -> ReadEnded
where
    R: Stream<Item = Result<WsMessage, axum::Error>> + Unpin,
{
    let shutdown = state.shutdown.token();
    let ended = |reason: &str| ReadEnded {
        reason: reason.to_owned(),
        writer_done: false,
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return ended(SERVER_SHUTDOWN),
            closed = &mut *writer => {
                let reason = closed.ok().flatten().unwrap_or_else(|| CONNECTION_CLOSED.to_owned());
                return ReadEnded { reason, writer_done: true };
            }
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => state.runtime.on_message(conn_id, text.as_str()),
                Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => state.runtime.on_message(conn_id, text),
                    Err(_) => tracing::debug!(client_id = %conn_id, len = bytes.len(), "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => return ended(CONNECTION_CLOSED),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(client_id = %conn_id, error = %e, "socket read failed");
                    return ended(TRANSPORT_ERROR);
                }
            }
        }
    }
}
