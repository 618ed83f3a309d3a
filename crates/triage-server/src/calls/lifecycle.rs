//! Call teardown.
//!
//! Ending a call runs in a fixed order:
//!
//! 1. remove it from the registry, so late messages see no such call, and
//!    remember the id so late vitals for it are discarded
//! 2. mark the session ended, taking its dashboard and pipeline handle
//! 3. queue the end-of-stream marker and cancel the pipeline, then wait
//!    for it up to the cleanup timeout
//! 4. discard the media queue, releasing any blocked producer
//! 5. send `call_ended` to the dashboard and the caller, if open
//!
//! Only the first end of a call does any of this.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, instrument};
use triage_core::{CallId, OutboundEvent, Role};

use crate::calls::coordinator::CallCoordinator;
use crate::metrics::{CALLS_ACTIVE, CALLS_ENDED_TOTAL};
use crate::websocket::connection::ClientConnection;

/// Reason tag when the caller's signaling channel closes.
pub const REASON_CALLER_DISCONNECTED: &str = "caller_disconnected";
/// Reason tag when the server shuts down.
pub const REASON_SERVER_SHUTDOWN: &str = "server_shutdown";

impl CallCoordinator {
    /// End a call. Returns `false` if it was not live.
    #[instrument(skip(self, call_id), fields(call_id = %call_id))]
    pub async fn end_call(&self, call_id: &CallId, reason: &str) -> bool {
        let Some(session) = self.registry.remove(call_id) else {
            debug!("end requested for unknown call");
            return false;
        };
        self.pending_vitals.mark_ended(call_id);
        let Some(teardown) = session.end() else {
            return false;
        };
        info!(previous = %teardown.previous, "cleaning up call");

        if let Some(triage) = teardown.triage {
            let _ = session.media.signal_end();
            let _ = triage.stop(self.config.cleanup_timeout).await;
        }
        session.media.discard();

        let event = OutboundEvent::CallEnded {
            call_id: call_id.clone(),
            reason: reason.to_owned(),
        };
        if let Some(dashboard) = teardown.dispatcher.filter(|d| d.is_open()) {
            let _ = dashboard.send_event(&event);
        }
        if session.caller.is_open() {
            let _ = session.caller.send_event(&event);
        }

        metrics::counter!(CALLS_ENDED_TOTAL, "reason" => reason.to_owned()).increment(1);
        metrics::gauge!(CALLS_ACTIVE).decrement(1.0);
        true
    }

    /// A `/ws/signal` channel closed. If it was the caller channel of a
    /// live call, the call ends.
    pub async fn on_signal_closed(&self, call_id: &CallId, role: Role, conn: &Arc<ClientConnection>) {
        if role != Role::Caller {
            return;
        }
        let owns_call = self
            .registry
            .get(call_id)
            .is_some_and(|session| session.caller.id == conn.id);
        if owns_call {
            let _ = self.end_call(call_id, REASON_CALLER_DISCONNECTED).await;
        }
    }

    /// A dashboard channel closed.
    pub fn on_dashboard_closed(&self, conn: &Arc<ClientConnection>) {
        self.dispatchers.remove(&conn.id);
    }

    /// End every live call.
    pub async fn shutdown(&self) {
        let ids = self.registry.ids();
        if ids.is_empty() {
            return;
        }
        info!(calls = ids.len(), "ending all calls");
        let _ = join_all(
            ids.iter()
                .map(|id| self.end_call(id, REASON_SERVER_SHUTDOWN)),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::coordinator::tests::coordinator;
    use crate::calls::media::MediaItem;
    use crate::calls::session::CallState;
    use crate::config::CoordinatorConfig;
    use crate::pipeline::{ReportSink, StopReason, TriageStrategy};
    use crate::websocket::connection::{ChannelKind, drain_json, test_connection};
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use triage_core::Location;

    #[tokio::test]
    async fn end_notifies_both_once_and_is_idempotent() {
        let (coord, _) = coordinator();
        let (caller, mut crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();
        let (dash, mut drx) = test_connection(ChannelKind::Dashboard);
        coord.join(&id, &dash).unwrap();
        let _ = drain_json(&mut crx);

        let session = coord.registry().get("X").unwrap();
        assert!(coord.end_call(&id, "ended").await);
        assert!(!coord.end_call(&id, "ended").await);

        let expected = json!({"type": "call_ended", "call_id": "X", "reason": "ended"});
        assert_eq!(drain_json(&mut drx), vec![expected.clone()]);
        assert_eq!(drain_json(&mut crx), vec![expected]);
        assert!(coord.registry().get("X").is_none());
        assert_eq!(session.state(), CallState::Ended);
        assert!(session.media.is_closed());
    }

    #[tokio::test]
    async fn abandoned_call_notifies_caller_only() {
        let (coord, _) = coordinator();
        let (caller, mut crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();
        assert!(coord.end_call(&id, "ended").await);
        assert_eq!(drain_json(&mut crx).len(), 1);
    }

    #[tokio::test]
    async fn caller_close_ends_call_other_channels_do_not() {
        let (coord, _) = coordinator();
        let (caller, _crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let (imposter, _irx) = test_connection(ChannelKind::Signal(Role::Caller));
        let (disp, _drx) = test_connection(ChannelKind::Signal(Role::Dispatcher));
        let id = CallId::from("X");
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();

        coord.on_signal_closed(&id, Role::Dispatcher, &disp).await;
        coord.on_signal_closed(&id, Role::Caller, &imposter).await;
        assert!(coord.registry().contains("X"));

        coord.on_signal_closed(&id, Role::Caller, &caller).await;
        assert!(!coord.registry().contains("X"));
    }

    #[tokio::test]
    async fn blocked_producer_released_on_end() {
        let (coord, _) = coordinator();
        let coord = Arc::new(coord);
        let (caller, _crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();
        for _ in 0..4 {
            coord.ingest(&id, MediaItem::Audio(Bytes::from_static(b"a"))).await.unwrap();
        }
        let producer = {
            let coord = coord.clone();
            let id = id.clone();
            tokio::spawn(async move { coord.ingest(&id, MediaItem::Audio(Bytes::from_static(b"a"))).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert!(coord.end_call(&id, "ended").await);
        assert!(producer.await.unwrap().is_err());
    }

    struct Wedged;

    #[async_trait]
    impl TriageStrategy for Wedged {
        fn name(&self) -> &'static str {
            "wedged"
        }

        async fn run(
            &self,
            _call_id: CallId,
            _rx: mpsc::Receiver<MediaItem>,
            _sink: ReportSink,
            _cancel: CancellationToken,
        ) -> StopReason {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wedged_pipeline_does_not_block_notifications() {
        let config = CoordinatorConfig {
            media_queue_capacity: 4,
            cleanup_timeout: Duration::from_secs(5),
        };
        let coord = CallCoordinator::new(config, Arc::new(Wedged));
        let (caller, mut crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();
        let (dash, mut drx) = test_connection(ChannelKind::Dashboard);
        coord.join(&id, &dash).unwrap();
        let _ = drain_json(&mut crx);

        let started = tokio::time::Instant::now();
        assert!(coord.end_call(&id, "ended").await);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(drain_json(&mut drx).len(), 1);
        assert_eq!(drain_json(&mut crx).len(), 1);
    }

    #[tokio::test]
    async fn shutdown_ends_everything() {
        let (coord, _) = coordinator();
        let mut receivers = Vec::new();
        for name in ["A", "B", "C"] {
            let (caller, rx) = test_connection(ChannelKind::Signal(Role::Caller));
            coord.initiate(CallId::from(name), &caller, Location::default()).unwrap();
            receivers.push(rx);
        }
        coord.shutdown().await;
        assert!(coord.registry().is_empty());
        for mut rx in receivers {
            let msgs = drain_json(&mut rx);
            assert_eq!(msgs.len(), 1);
            assert_eq!(msgs[0]["reason"], "server_shutdown");
        }
    }

    #[tokio::test]
    async fn dashboard_close_leaves_call_running() {
        let (coord, _) = coordinator();
        let (dash, _drx) = test_connection(ChannelKind::Dashboard);
        coord.dispatchers().add(dash.clone());
        let (caller, _crx) = test_connection(ChannelKind::Signal(Role::Caller));
        let id = CallId::from("X");
        coord.initiate(id.clone(), &caller, Location::default()).unwrap();
        coord.join(&id, &dash).unwrap();

        coord.on_dashboard_closed(&dash);
        assert!(coord.dispatchers().is_empty());
        assert!(coord.registry().contains("X"));
    }
}
