//! Entry point for everything that happens to a call.
//!
//! The transport hands every parsed inbound message to a
//! [`CallCoordinator`] method. The coordinator owns the registry, the
//! dashboard set, the pre-registration vitals buffer, and the pipeline
//! strategy; it never awaits a client, only the media queue (backpressure)
//! and pipeline shutdown (bounded).
//!
//! Handlers are split by concern:
//!
//! - this file: initiation, dispatcher join, media ingestion
//! - [`relay`](super::relay): signaling and dashboard message routing
//! - [`vitals`](super::vitals): vitals forwarding and buffering
//! - [`lifecycle`](super::lifecycle): cleanup and shutdown

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use triage_core::{CallError, CallId, Location, OutboundEvent};

use crate::calls::media::MediaItem;
use crate::calls::registry::CallRegistry;
use crate::calls::session::JoinOutcome;
use crate::calls::vitals::PendingVitals;
use crate::config::CoordinatorConfig;
use crate::metrics::{CALLS_ACTIVE, CALLS_STARTED_TOTAL, MEDIA_ITEMS_TOTAL};
use crate::pipeline::{ReportSink, TriageHandle, TriageStrategy};
use crate::websocket::connection::ClientConnection;
use crate::websocket::dispatchers::DispatcherSet;

/// Coordinates call sessions across all channels.
pub struct CallCoordinator {
    pub(crate) registry: Arc<CallRegistry>,
    pub(crate) dispatchers: Arc<DispatcherSet>,
    pub(crate) pending_vitals: PendingVitals,
    strategy: Arc<dyn TriageStrategy>,
    pub(crate) config: CoordinatorConfig,
}

impl CallCoordinator {
    /// Build a coordinator whose calls run `strategy`.
    pub fn new(config: CoordinatorConfig, strategy: Arc<dyn TriageStrategy>) -> Self {
        Self {
            registry: Arc::new(CallRegistry::new(config.media_queue_capacity)),
            dispatchers: Arc::new(DispatcherSet::new()),
            pending_vitals: PendingVitals::default(),
            strategy,
            config,
        }
    }

    /// Live calls.
    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }

    /// Connected dashboards.
    pub fn dispatchers(&self) -> &Arc<DispatcherSet> {
        &self.dispatchers
    }

    /// Name of the configured pipeline strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Handle `call_initiated` from a caller channel.
    ///
    /// A duplicate id returns [`CallError::DuplicateSession`] for the
    /// transport to log; the sender is not told and the existing call is
    /// untouched.
    #[instrument(skip_all, fields(call_id = %call_id))]
    pub fn initiate(
        &self,
        call_id: CallId,
        caller: &Arc<ClientConnection>,
        location: Location,
    ) -> Result<(), CallError> {
        let session = self.registry.create(call_id.clone(), caller.clone(), location)?;
        if let Some(reading) = self.pending_vitals.take(&call_id) {
            info!("replaying vitals buffered before registration");
            session.seed_vitals(reading);
        }

        metrics::counter!(CALLS_STARTED_TOTAL).increment(1);
        metrics::gauge!(CALLS_ACTIVE).increment(1.0);
        info!(lat = location.lat, lng = location.lng, "call initiated");

        let dashboards = self.dispatchers.broadcast(&OutboundEvent::IncomingCall {
            call_id,
            location,
        });
        debug!(dashboards, "incoming call announced");
        Ok(())
    }

    /// Handle `dispatcher_joined` from a dashboard.
    ///
    /// The first dashboard to join binds to the call and starts its
    /// pipeline. The same dashboard joining again only gets the cached
    /// vitals replayed; any other dashboard is ignored.
    #[instrument(skip_all, fields(call_id = %call_id, conn_id = %dashboard.id))]
    pub fn join(&self, call_id: &CallId, dashboard: &Arc<ClientConnection>) -> Result<(), CallError> {
        let session = self
            .registry
            .get(call_id)
            .ok_or_else(|| CallError::routing(call_id.clone(), "no such call"))?;

        let outcome = session.join(dashboard, |rx| {
            let sink = ReportSink::new(call_id.clone(), self.registry.clone());
            TriageHandle::spawn(self.strategy.clone(), call_id.clone(), rx, sink)
        });

        match outcome {
            JoinOutcome::Joined { vitals } => {
                info!(strategy = self.strategy.name(), "dispatcher joined");
                if let Some(reading) = vitals {
                    let _ = dashboard.send_event(&OutboundEvent::Vitals {
                        call_id: call_id.clone(),
                        reading,
                    });
                }
                if session.caller.is_open() {
                    let _ = session.caller.send_event(&OutboundEvent::DispatcherReady {
                        call_id: call_id.clone(),
                    });
                }
                Ok(())
            }
            JoinOutcome::AlreadyBound {
                same_channel: true,
                vitals,
            } => {
                debug!("dispatcher re-joined, replaying vitals");
                if let Some(reading) = vitals {
                    let _ = dashboard.send_event(&OutboundEvent::Vitals {
                        call_id: call_id.clone(),
                        reading,
                    });
                }
                Ok(())
            }
            JoinOutcome::AlreadyBound {
                same_channel: false,
                ..
            } => {
                warn!("call already answered by another dashboard, ignoring join");
                Ok(())
            }
            JoinOutcome::Ended => Err(CallError::routing(call_id.clone(), "call ended")),
        }
    }

    /// Queue one media item for a call's pipeline.
    ///
    /// Waits while the call's queue is full. Items for unknown or ended
    /// calls are dropped.
    pub async fn ingest(&self, call_id: &CallId, item: MediaItem) -> Result<(), CallError> {
        let session = self
            .registry
            .get(call_id)
            .ok_or_else(|| CallError::routing(call_id.clone(), "no such call"))?;
        let kind = item.kind();
        session
            .media
            .push(item)
            .await
            .map_err(|_| CallError::routing(call_id.clone(), "media queue closed"))?;
        metrics::counter!(MEDIA_ITEMS_TOTAL, "kind" => kind).increment(1);
        Ok(())
    }
}

impl std::fmt::Debug for CallCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCoordinator")
            .field("calls", &self.registry.len())
            .field("dashboards", &self.dispatchers.len())
            .field("strategy", &self.strategy.name())
            .finish_non_exhaustive()
    }
}
