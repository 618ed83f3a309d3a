//! Vitals relay and the pre-registration buffer.
//!
//! The telemetry source may start sending before the caller's
//! `call_initiated` lands. The most recent such reading is held per call id
//! and seeded into the session when it is created, so a dashboard that
//! joins later still sees it.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};
use triage_core::{CallId, OutboundEvent, VitalsReading};

use crate::calls::coordinator::CallCoordinator;

/// Upper bound on call ids with a buffered reading.
const MAX_PENDING_CALLS: usize = 256;
/// Upper bound on remembered ended call ids.
const MAX_ENDED_CALLS: usize = 1024;

/// Buffered readings plus the ids of calls that already ended.
///
/// Both sides are bounded and evict oldest-first, so a telemetry source that
/// keeps streaming after hang-up never crowds out calls that have not
/// started yet.
#[derive(Debug, Default)]
pub(crate) struct PendingState {
    readings: HashMap<CallId, VitalsReading>,
    order: VecDeque<CallId>,
    ended: HashSet<CallId>,
    ended_order: VecDeque<CallId>,
}

impl PendingState {
    pub(crate) fn has_ended(&self, call_id: &str) -> bool {
        self.ended.contains(call_id)
    }

    /// Hold `reading` for `call_id`, evicting the oldest buffered call when
    /// full. Returns the evicted id.
    pub(crate) fn buffer(&mut self, call_id: &CallId, reading: VitalsReading) -> Option<CallId> {
        if let Some(slot) = self.readings.get_mut(call_id.as_str()) {
            *slot = reading;
            return None;
        }
        let evicted = if self.readings.len() >= MAX_PENDING_CALLS {
            self.order.pop_front().inspect(|oldest| {
                let _ = self.readings.remove(oldest.as_str());
            })
        } else {
            None
        };
        let _ = self.readings.insert(call_id.clone(), reading);
        self.order.push_back(call_id.clone());
        evicted
    }

    fn remove(&mut self, call_id: &str) -> Option<VitalsReading> {
        let reading = self.readings.remove(call_id)?;
        self.order.retain(|id| id.as_str() != call_id);
        Some(reading)
    }

    fn mark_ended(&mut self, call_id: &CallId) {
        let _ = self.remove(call_id.as_str());
        if !self.ended.insert(call_id.clone()) {
            return;
        }
        self.ended_order.push_back(call_id.clone());
        let overflow = self.ended_order.len().saturating_sub(MAX_ENDED_CALLS);
        for oldest in self.ended_order.drain(..overflow) {
            let _ = self.ended.remove(oldest.as_str());
        }
    }

    fn forget_ended(&mut self, call_id: &str) {
        if self.ended.remove(call_id) {
            self.ended_order.retain(|id| id.as_str() != call_id);
        }
    }
}

/// Readings for calls that do not exist yet, one per call id.
#[derive(Debug, Default)]
pub struct PendingVitals {
    state: Mutex<PendingState>,
}

impl PendingVitals {
    pub(crate) fn lock(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock()
    }

    /// Remove and return the buffered reading for `call_id`.
    ///
    /// Called when the call is created, so an id reused after an earlier
    /// call ended accepts readings again.
    pub fn take(&self, call_id: &str) -> Option<VitalsReading> {
        let mut state = self.state.lock();
        state.forget_ended(call_id);
        state.remove(call_id)
    }

    /// Record that `call_id` ended. Its buffered reading is dropped and
    /// later readings for it are discarded.
    pub fn mark_ended(&self, call_id: &CallId) {
        self.state.lock().mark_ended(call_id);
    }

    /// Number of call ids with a buffered reading.
    pub fn len(&self) -> usize {
        self.state.lock().readings.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.state.lock().readings.is_empty()
    }
}

/// What happened to a vitals reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VitalsDelivery {
    /// Cached on the session and sent to its dashboard.
    Forwarded,
    /// Cached on the session; no dashboard is bound yet.
    Cached,
    /// The call does not exist yet; held for replay.
    Buffered,
    /// The call already ended; the reading is discarded.
    Discarded,
}

impl CallCoordinator {
    /// Handle one reading from `/ws/vitals`.
    pub fn on_vitals(&self, call_id: &CallId, reading: VitalsReading) -> VitalsDelivery {
        // The registry check and the buffer insert happen under the buffer
        // lock; `initiate` drains the buffer after creating the session, so
        // a reading racing a creation is never lost.
        let session = {
            let mut pending = self.pending_vitals.lock();
            match self.registry.get(call_id) {
                Some(session) => session,
                None if pending.has_ended(call_id) => {
                    debug!(call_id = %call_id, "vitals for ended call, discarding");
                    return VitalsDelivery::Discarded;
                }
                None => {
                    info!(call_id = %call_id, "vitals arrived before call registered, buffering");
                    if let Some(evicted) = pending.buffer(call_id, reading) {
                        debug!(call_id = %evicted, "vitals buffer full, evicted oldest reading");
                    }
                    return VitalsDelivery::Buffered;
                }
            }
        };

        debug!(
            call_id = %call_id,
            hr = ?reading.get("hr"),
            breathing = ?reading.get("breathing"),
            "vitals received"
        );
        match session.record_vitals(reading.clone()) {
            Some(dashboard) if dashboard.is_open() => {
                let _ = dashboard.send_event(&OutboundEvent::Vitals {
                    call_id: call_id.clone(),
                    reading,
                });
                VitalsDelivery::Forwarded
            }
            _ => VitalsDelivery::Cached,
        }
    }
}
