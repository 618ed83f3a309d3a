//! Endpoint handlers.
//!
//! | Route | Keyed by | Inbound |
//! |-------|----------|---------|
//! | `/ws/signal` | `call_id`, `role` | control messages and opaque negotiation payloads |
//! | `/ws/audio` | `call_id` | binary audio chunks, `{"type":"frame"}` text frames |
//! | `/ws/vitals` | `call_id` | JSON vitals readings |
//! | `/ws/dashboard` | none | `dispatcher_joined`, `call_ended`, negotiation replies |
//!
//! A keyed route without a `call_id` closes the socket straight away.
//! Frames that fail to parse are logged and skipped; the socket stays open.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use triage_core::{CallId, Role, VitalsReading, parse_frame};

use crate::calls::MediaItem;
use crate::calls::relay::log_call_error;
use crate::server::AppState;
use crate::websocket::connection::ChannelKind;
use crate::websocket::handler::Inbound;

/// Query parameters accepted by the keyed routes.
#[derive(Debug, Default, Deserialize)]
pub struct CallParams {
    /// Call the socket belongs to.
    pub call_id: Option<String>,
    /// `caller` (default) or `dispatcher`; `/ws/signal` only.
    pub role: Option<String>,
}

impl CallParams {
    fn call_id(&self) -> Option<CallId> {
        self.call_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(CallId::from)
    }
}

async fn reject(mut socket: WebSocket, route: &'static str) {
    warn!(route, "missing or invalid query parameters, closing socket");
    let _ = socket.send(Message::Close(None)).await;
}

/// GET /ws/signal
pub async fn signal_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<CallParams>,
    State(state): State<AppState>,
) -> Response {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| signal_socket(socket, params, state))
}

#[instrument(name = "signal", skip_all, fields(call_id = ?params.call_id, role = ?params.role))]
async fn signal_socket(socket: WebSocket, params: CallParams, state: AppState) {
    let (Some(call_id), Some(role)) = (params.call_id(), Role::from_query(params.role.as_deref()))
    else {
        return reject(socket, "/ws/signal").await;
    };
    let mut pump = state.open_socket(socket, ChannelKind::Signal(role));
    debug!("signaling channel open");

    while let Some(frame) = pump.next().await {
        let Inbound::Text(raw) = frame else {
            continue;
        };
        if let Err(e) = state.coordinator.on_signal(&call_id, role, &pump.conn, &raw).await {
            log_call_error(&e);
        }
    }

    state.coordinator.on_signal_closed(&call_id, role, &pump.conn).await;
    pump.finish().await;
}

/// GET /ws/audio
pub async fn media_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<CallParams>,
    State(state): State<AppState>,
) -> Response {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| media_socket(socket, params, state))
}

#[instrument(name = "media", skip_all, fields(call_id = ?params.call_id))]
async fn media_socket(socket: WebSocket, params: CallParams, state: AppState) {
    let Some(call_id) = params.call_id() else {
        return reject(socket, "/ws/audio").await;
    };
    let shutdown = state.shutdown.token();
    let mut pump = state.open_socket(socket, ChannelKind::Media);

    while let Some(frame) = pump.next().await {
        let item = match frame {
            Inbound::Binary(data) => MediaItem::Audio(data),
            Inbound::Text(raw) => match parse_frame(&raw) {
                Some(data) => MediaItem::Frame(data),
                None => continue,
            },
        };
        // Blocks while the call's queue is full.
        let result = tokio::select! {
            result = state.coordinator.ingest(&call_id, item) => result,
            () = shutdown.cancelled() => break,
        };
        if let Err(e) = result {
            log_call_error(&e);
        }
    }

    pump.finish().await;
}

/// GET /ws/vitals
pub async fn vitals_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<CallParams>,
    State(state): State<AppState>,
) -> Response {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| vitals_socket(socket, params, state))
}

#[instrument(name = "vitals", skip_all, fields(call_id = ?params.call_id))]
async fn vitals_socket(socket: WebSocket, params: CallParams, state: AppState) {
    let Some(call_id) = params.call_id() else {
        return reject(socket, "/ws/vitals").await;
    };
    let mut pump = state.open_socket(socket, ChannelKind::Vitals);

    while let Some(frame) = pump.next().await {
        let Inbound::Text(raw) = frame else {
            continue;
        };
        match VitalsReading::parse(&raw) {
            Ok(reading) => {
                let delivery = state.coordinator.on_vitals(&call_id, reading);
                debug!(?delivery, "vitals handled");
            }
            Err(e) => log_call_error(&e),
        }
    }

    pump.finish().await;
}

/// GET /ws/dashboard
pub async fn dashboard_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| dashboard_socket(socket, state))
}

#[instrument(name = "dashboard", skip_all)]
async fn dashboard_socket(socket: WebSocket, state: AppState) {
    let mut pump = state.open_socket(socket, ChannelKind::Dashboard);
    state.coordinator.dispatchers().add(pump.conn.clone());

    while let Some(frame) = pump.next().await {
        let Inbound::Text(raw) = frame else {
            continue;
        };
        if let Err(e) = state.coordinator.on_dashboard(&pump.conn, &raw).await {
            log_call_error(&e);
        }
    }

    state.coordinator.on_dashboard_closed(&pump.conn);
    pump.finish().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_call_id_is_missing() {
        let params = CallParams {
            call_id: Some(String::new()),
            role: None,
        };
        assert!(params.call_id().is_none());
        assert!(CallParams::default().call_id().is_none());
    }

    #[test]
    fn call_id_taken_verbatim() {
        let params = CallParams {
            call_id: Some("call-42".into()),
            role: Some("dispatcher".into()),
        };
        assert_eq!(params.call_id().unwrap().as_str(), "call-42");
    }
}
