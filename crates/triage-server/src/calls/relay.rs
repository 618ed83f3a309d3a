//! Signaling relay and dashboard message routing.
//!
//! Negotiation payloads (SDP offers and answers, ICE candidates) are never
//! interpreted: the raw frame text is forwarded to the counterpart of the
//! sender. A missing session or counterpart drops the frame; the WebRTC
//! layer on either end renegotiates.

use std::sync::Arc;

use tracing::{debug, warn};
use triage_core::{CallError, CallId, DashboardMessage, ErrorSeverity, Role, SignalMessage};

use crate::calls::coordinator::CallCoordinator;
use crate::websocket::connection::ClientConnection;

/// Reason tag for an explicit hang-up.
pub const REASON_ENDED: &str = "ended";

/// Log a handler error at the level its severity calls for.
pub(crate) fn log_call_error(err: &CallError) {
    match err.severity() {
        ErrorSeverity::Expected => {
            debug!(category = %err.category(), error = %err, "message dropped");
        }
        ErrorSeverity::Warning => {
            warn!(category = %err.category(), error = %err, "message rejected");
        }
    }
}

impl CallCoordinator {
    /// Handle one text frame from a `/ws/signal` channel.
    pub async fn on_signal(
        &self,
        call_id: &CallId,
        role: Role,
        conn: &Arc<ClientConnection>,
        raw: &str,
    ) -> Result<(), CallError> {
        match SignalMessage::parse(raw)? {
            SignalMessage::CallInitiated { location } => {
                if role != Role::Caller {
                    return Err(CallError::Protocol(
                        "call_initiated from a dispatcher channel".into(),
                    ));
                }
                self.initiate(call_id.clone(), conn, location)
            }
            SignalMessage::CallEnded => {
                let _ = self.end_call(call_id, REASON_ENDED).await;
                Ok(())
            }
            SignalMessage::Relay(raw) => self.relay(call_id, role, raw),
        }
    }

    /// Handle one text frame from `/ws/dashboard`.
    pub async fn on_dashboard(
        &self,
        conn: &Arc<ClientConnection>,
        raw: &str,
    ) -> Result<(), CallError> {
        match DashboardMessage::parse(raw)? {
            DashboardMessage::DispatcherJoined { call_id } => self.join(&call_id, conn),
            DashboardMessage::CallEnded { call_id } => {
                let _ = self.end_call(&call_id, REASON_ENDED).await;
                Ok(())
            }
            DashboardMessage::Relay { call_id, raw } => self.relay(&call_id, Role::Dispatcher, raw),
        }
    }

    /// Forward `raw` from the `from` side of a call to the other side.
    pub fn relay(&self, call_id: &CallId, from: Role, raw: String) -> Result<(), CallError> {
        let session = self
            .registry
            .get(call_id)
            .ok_or_else(|| CallError::routing(call_id.clone(), "no such call"))?;
        let target = match from {
            Role::Caller => session
                .dispatcher()
                .ok_or_else(|| CallError::routing(call_id.clone(), "no dispatcher bound"))?,
            Role::Dispatcher => session.caller.clone(),
        };
        if !target.is_open() || !target.send(Arc::new(raw)) {
            return Err(CallError::routing(call_id.clone(), "counterpart closed"));
        }
        debug!(call_id = %call_id, from = from.as_str(), "signaling relayed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::coordinator::tests::coordinator;
    use crate::websocket::connection::{ChannelKind, test_connection};
    use assert_matches::assert_matches;
    use triage_core::Location;

    const OFFER: &str = r#"{"type":"offer","sdp":"v=0\r\no=- 1 2 IN IP4 0.0.0.0"}"#;

    #[tokio::test]
    async fn caller_offer_reaches_bound_dashboard_verbatim() {
        let (coord, _) = coordinator();
        let (caller, _crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        coord
            .on_signal(&id, Role::Caller, &caller, r#"{"type":"call_initiated","location":{"lat":1,"lng":2}}"#)
            .await
            .unwrap();
        let (dash, mut drx) = test_connection(ChannelKind::Dashboard);
        coord.join(&id, &dash).unwrap();
        let _ = drx.try_recv();

        coord.on_signal(&id, Role::Caller, &caller, OFFER).await.unwrap();
        assert_eq!(&*drx.try_recv().unwrap(), OFFER);
    }

    #[tokio::test]
    async fn dashboard_answer_reaches_caller_in_order() {
        let (coord, _) = coordinator();
        let (caller, mut crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();
        let (dash, _drx) = test_connection(ChannelKind::Dashboard);

        let answer = r#"{"type":"answer","call_id":"X","sdp":"a"}"#;
        let ice = r#"{"type":"ice_candidate","call_id":"X","candidate":"c"}"#;
        coord.on_dashboard(&dash, answer).await.unwrap();
        coord.on_dashboard(&dash, ice).await.unwrap();
        assert_eq!(&*crx.try_recv().unwrap(), answer);
        assert_eq!(&*crx.try_recv().unwrap(), ice);
    }

    #[tokio::test]
    async fn dispatcher_signal_channel_reaches_caller() {
        let (coord, _) = coordinator();
        let (caller, mut crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();
        let (disp, _r) = test_connection(ChannelKind::Signal(Role::Dispatcher));
        coord.on_signal(&id, Role::Dispatcher, &disp, OFFER).await.unwrap();
        assert_eq!(&*crx.try_recv().unwrap(), OFFER);
    }

    #[tokio::test]
    async fn missing_counterpart_is_dropped() {
        let (coord, _) = coordinator();
        let (caller, _crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        assert_matches!(
            coord.on_signal(&id, Role::Caller, &caller, OFFER).await,
            Err(CallError::RoutingMiss { detail: "no such call", .. })
        );
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();
        assert_matches!(
            coord.on_signal(&id, Role::Caller, &caller, OFFER).await,
            Err(CallError::RoutingMiss { detail: "no dispatcher bound", .. })
        );
    }

    #[tokio::test]
    async fn closed_counterpart_is_dropped() {
        let (coord, _) = coordinator();
        let (caller, crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();
        drop(crx);
        assert_matches!(
            coord.relay(&id, Role::Dispatcher, OFFER.into()),
            Err(CallError::RoutingMiss { detail: "counterpart closed", .. })
        );
    }

    #[tokio::test]
    async fn malformed_frames_are_protocol_errors() {
        let (coord, _) = coordinator();
        let (caller, _crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let (dash, _drx) = test_connection(ChannelKind::Dashboard);
        let id = CallId::from("X");
        assert_matches!(
            coord.on_signal(&id, Role::Caller, &caller, "not json").await,
            Err(CallError::Protocol(_))
        );
        assert_matches!(
            coord.on_dashboard(&dash, r#"{"type":"dispatcher_joined"}"#).await,
            Err(CallError::Protocol(_))
        );
    }

    #[tokio::test]
    async fn dispatcher_cannot_initiate() {
        let (coord, _) = coordinator();
        let (disp, _r) = test_connection(ChannelKind::Signal(Role::Dispatcher));
        let id = CallId::from("X");
        assert_matches!(
            coord
                .on_signal(&id, Role::Dispatcher, &disp, r#"{"type":"call_initiated"}"#)
                .await,
            Err(CallError::Protocol(_))
        );
        assert!(coord.registry().is_empty());
    }

    #[test]
    fn logging_helper_accepts_all_severities() {
        log_call_error(&CallError::Cancelled);
        log_call_error(&CallError::Protocol("x".into()));
    }
}
