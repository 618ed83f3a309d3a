//! Socket pump shared by every endpoint.
//!
//! Each upgraded socket is split in two. The write half is owned by a
//! spawned task that drains the connection's outbound queue; the read half
//! stays with the endpoint handler, which pulls frames through
//! [`SocketPump::next`] until the client goes away or the server shuts down.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::metrics::WS_CONNECTIONS_TOTAL;
use crate::websocket::connection::{ChannelKind, ClientConnection};

/// How long a closing socket gets to flush queued messages.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// One inbound data frame.
#[derive(Debug)]
pub enum Inbound {
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
}

/// Counts a connection as open for as long as it lives.
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        let _ = counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Read half of an upgraded socket plus its writer task.
pub struct SocketPump {
    /// Sending side handed to the call coordinator.
    pub conn: Arc<ClientConnection>,
    reader: SplitStream<WebSocket>,
    writer: JoinHandle<()>,
    shutdown: CancellationToken,
    _guard: ConnectionGuard,
}

impl SocketPump {
    /// Split `socket` and start its writer task.
    pub fn start(
        socket: WebSocket,
        kind: ChannelKind,
        outbound_buffer: usize,
        shutdown: CancellationToken,
        connections: &Arc<AtomicUsize>,
    ) -> Self {
        let (sink, reader) = socket.split();
        let (tx, rx) = mpsc::channel(outbound_buffer.max(1));
        let conn = Arc::new(ClientConnection::new(kind, tx));
        let writer = tokio::spawn(write_loop(sink, rx, conn.clone()));

        metrics::counter!(WS_CONNECTIONS_TOTAL, "channel" => kind.as_str()).increment(1);
        debug!(conn_id = %conn.id, channel = kind.as_str(), "socket opened");

        Self {
            conn,
            reader,
            writer,
            shutdown,
            _guard: ConnectionGuard::new(connections),
        }
    }

    /// Next data frame, or `None` once the client closed, the socket
    /// errored, or the server is shutting down. Control frames are skipped.
    pub async fn next(&mut self) -> Option<Inbound> {
        loop {
            let msg = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return None,
                msg = self.reader.next() => msg,
            };
            match msg {
                Some(Ok(Message::Text(text))) => return Some(Inbound::Text(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => return Some(Inbound::Binary(data)),
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    debug!(conn_id = %self.conn.id, error = %e, "socket read failed");
                    return None;
                }
            }
        }
    }

    /// Mark the connection closed and give the writer a moment to flush.
    pub async fn finish(self) {
        self.conn.close();
        let aborter = self.writer.abort_handle();
        if tokio::time::timeout(FLUSH_TIMEOUT, self.writer).await.is_err() {
            aborter.abort();
        }
        debug!(
            conn_id = %self.conn.id,
            channel = self.conn.kind.as_str(),
            dropped = self.conn.drop_count(),
            "socket closed"
        );
    }
}

/// Drain the outbound queue into the socket. Anything queued before the
/// connection was closed is still written, then a close frame follows.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<String>>,
    conn: Arc<ClientConnection>,
) {
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(text) => {
                    if sink.send(Message::Text(text.as_str().into())).await.is_err() {
                        trace!(conn_id = %conn.id, "write failed, stopping writer");
                        return;
                    }
                }
                None => break,
            },
            () = conn.closed() => break,
        }
    }
    while let Ok(text) = rx.try_recv() {
        if sink.send(Message::Text(text.as_str().into())).await.is_err() {
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}
