//! Duplex channel handle shared by every component that talks to a client.
//!
//! A [`ClientConnection`] is the sending side of one WebSocket. Outbound text
//! is pushed onto a bounded queue drained by the socket's writer task; a
//! full or closed queue drops the message and counts the drop. Nothing in
//! the call-coordination core ever awaits a client, so a slow browser can
//! only lose its own messages.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use triage_core::{ConnectionId, OutboundEvent, Role};

use crate::metrics::RELAY_DROPS_TOTAL;

/// Which endpoint a connection arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    /// `/ws/signal` with the given role.
    Signal(Role),
    /// `/ws/audio`.
    Media,
    /// `/ws/vitals`.
    Vitals,
    /// `/ws/dashboard`.
    Dashboard,
}

impl ChannelKind {
    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signal(Role::Caller) => "signal:caller",
            Self::Signal(Role::Dispatcher) => "signal:dispatcher",
            Self::Media => "media",
            Self::Vitals => "vitals",
            Self::Dashboard => "dashboard",
        }
    }
}

/// Sending half of one connected client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Endpoint this client connected to.
    pub kind: ChannelKind,
    tx: mpsc::Sender<Arc<String>>,
    closing: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection feeding `tx`.
    pub fn new(kind: ChannelKind, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: ConnectionId::generate(),
            kind,
            tx,
            closing: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue raw text for the client.
    ///
    /// Returns `false` if the connection is closed or its queue is full.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.closing.is_cancelled() {
            return false;
        }
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(RELAY_DROPS_TOTAL).increment(1);
            false
        }
    }

    /// Queue raw text, copying it.
    pub fn send_text(&self, text: &str) -> bool {
        self.send(Arc::new(text.to_owned()))
    }

    /// Serialize `value` as JSON and queue it.
    pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to serialize outbound message");
                false
            }
        }
    }

    /// Queue an outbound event.
    pub fn send_event(&self, event: &OutboundEvent) -> bool {
        self.send_json(event)
    }

    /// Whether messages can still be delivered.
    pub fn is_open(&self) -> bool {
        !self.closing.is_cancelled() && !self.tx.is_closed()
    }

    /// Mark the connection closed. The writer task sends a close frame and
    /// exits; later sends are refused. Idempotent.
    pub fn close(&self) {
        self.closing.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        self.closing.cancelled().await;
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Test helper: a connection whose outbound queue is readable directly.
#[cfg(test)]
pub(crate) fn test_connection(
    kind: ChannelKind,
) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
    let (tx, rx) = mpsc::channel(32);
    (Arc::new(ClientConnection::new(kind, tx)), rx)
}

/// Test helper: drain everything queued so far, parsed as JSON.
#[cfg(test)]
pub(crate) fn drain_json(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(serde_json::from_str(&msg).unwrap());
    }
    out
}
