//! Fan-out to every connected dispatcher dashboard.
//!
//! Used only for `incoming_call` announcements. Once a dashboard claims a
//! call, per-call traffic goes through the session's bound channel instead.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};
use triage_core::{ConnectionId, OutboundEvent};

use super::connection::ClientConnection;

/// Currently connected dashboards.
#[derive(Default)]
pub struct DispatcherSet {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl DispatcherSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dashboard.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Remove a dashboard by connection id.
    pub fn remove(&self, connection_id: &ConnectionId) {
        let _ = self.connections.write().remove(connection_id);
    }

    /// Number of connected dashboards.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no dashboard is connected.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Send `event` to every open dashboard and prune the closed ones.
    ///
    /// Returns the number of dashboards that accepted the message.
    pub fn broadcast(&self, event: &OutboundEvent) -> usize {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to serialize event");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let conns = self.connections.read();
            for conn in conns.values() {
                if !conn.is_open() {
                    closed.push(conn.id.clone());
                } else if conn.send(json.clone()) {
                    delivered += 1;
                } else {
                    warn!(conn_id = %conn.id, "failed to send event to dashboard");
                }
            }
        }
        if !closed.is_empty() {
            let mut conns = self.connections.write();
            for id in &closed {
                let _ = conns.remove(id);
            }
        }
        debug!(
            event_type = event.event_type(),
            delivered,
            pruned = closed.len(),
            "broadcast to dashboards"
        );
        delivered
    }
}
