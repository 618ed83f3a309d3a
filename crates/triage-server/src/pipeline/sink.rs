//! Publishing side of a pipeline task.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};
use triage_core::{CallId, OutboundEvent, TriageReport};
use triage_llm::InferenceError;

use crate::calls::registry::CallRegistry;
use crate::metrics::{TRIAGE_FAILURES_TOTAL, TRIAGE_ROUNDS_TOTAL};

/// Delivers a call's reports to whichever dashboard is bound to it.
///
/// The sink holds the registry rather than a channel: the dashboard is
/// looked up again on every publish, so a report produced after the call
/// ended or after the dashboard went away is simply dropped.
#[derive(Clone)]
pub struct ReportSink {
    call_id: CallId,
    registry: Arc<CallRegistry>,
}

impl ReportSink {
    /// Sink for `call_id`.
    pub fn new(call_id: CallId, registry: Arc<CallRegistry>) -> Self {
        Self { call_id, registry }
    }

    /// The call this sink publishes for.
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Publish a parsed report as `triage_update`.
    pub fn publish_report(&self, report: Value) -> bool {
        metrics::counter!(TRIAGE_ROUNDS_TOTAL).increment(1);
        self.publish(&OutboundEvent::TriageUpdate {
            call_id: self.call_id.clone(),
            report,
        })
    }

    /// Publish the degraded placeholder for a failed round.
    pub fn publish_degraded(&self, err: &InferenceError) -> bool {
        let class = err.class_name();
        error!(call_id = %self.call_id, error_class = class, error = %err, "triage round failed");
        metrics::counter!(TRIAGE_FAILURES_TOTAL, "class" => class).increment(1);
        self.publish(&OutboundEvent::TriageUpdate {
            call_id: self.call_id.clone(),
            report: TriageReport::degraded(class).to_value(),
        })
    }

    /// Publish an out-of-band critical flag.
    pub fn publish_critical(&self, reason: String, severity: u8) -> bool {
        self.publish(&OutboundEvent::CriticalFlag {
            call_id: self.call_id.clone(),
            reason,
            severity,
        })
    }

    fn publish(&self, event: &OutboundEvent) -> bool {
        let dashboard = self
            .registry
            .get(&self.call_id)
            .and_then(|session| session.dispatcher());
        match dashboard {
            Some(conn) if conn.is_open() => conn.send_event(event),
            _ => {
                debug!(call_id = %self.call_id, event = event.event_type(), "no dashboard bound, dropping");
                false
            }
        }
    }
}

impl std::fmt::Debug for ReportSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportSink")
            .field("call_id", &self.call_id)
            .finish_non_exhaustive()
    }
}
