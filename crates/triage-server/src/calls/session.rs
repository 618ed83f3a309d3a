//! One emergency call and its state machine.
//!
//! ```text
//! Initiated ──dispatcher_joined──▶ DispatcherJoined ──call_ended──▶ Ended
//!     └────────────────────call_ended / caller gone──────────────────▲
//! ```
//!
//! The caller channel, location, and start time are fixed at creation. The
//! mutable fields live behind one lock so that binding a dispatcher and
//! starting the pipeline task happen together, exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use triage_core::{CallId, Location, VitalsReading};

use crate::calls::media::{MediaItem, MediaQueue};
use crate::pipeline::TriageHandle;
use crate::websocket::connection::ClientConnection;

/// Lifecycle state of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallState {
    /// Waiting for a dispatcher.
    Initiated,
    /// A dispatcher answered; the pipeline is running.
    DispatcherJoined,
    /// Terminal.
    Ended,
}

impl CallState {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::DispatcherJoined => "dispatcher_joined",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a `dispatcher_joined` against a session.
#[derive(Debug)]
pub enum JoinOutcome {
    /// This dashboard is now bound and the pipeline was started.
    Joined {
        /// Cached reading to replay to the new dashboard.
        vitals: Option<VitalsReading>,
    },
    /// A dashboard was already bound; nothing changed.
    AlreadyBound {
        /// Whether the bound dashboard is the one asking again.
        same_channel: bool,
        /// Cached reading, for a replay to the bound dashboard.
        vitals: Option<VitalsReading>,
    },
    /// The call ended in the meantime.
    Ended,
}

/// What the lifecycle controller must release when a call ends.
#[derive(Debug)]
pub struct Teardown {
    /// State the call was in before it ended.
    pub previous: CallState,
    /// Bound dashboard, if any.
    pub dispatcher: Option<Arc<ClientConnection>>,
    /// Running pipeline task, if any.
    pub triage: Option<TriageHandle>,
}

#[derive(Debug)]
struct SessionInner {
    state: CallState,
    dispatcher: Option<Arc<ClientConnection>>,
    triage: Option<TriageHandle>,
    last_vitals: Option<VitalsReading>,
}

/// Full state of one active call.
pub struct CallSession {
    /// Caller-chosen identifier.
    pub id: CallId,
    /// Caller's signaling channel.
    pub caller: Arc<ClientConnection>,
    /// Where the caller is.
    pub location: Location,
    /// When the call was initiated.
    pub started_at: DateTime<Utc>,
    /// Media waiting for the pipeline.
    pub media: MediaQueue,
    inner: Mutex<SessionInner>,
}

impl CallSession {
    /// A fresh session in [`CallState::Initiated`].
    pub fn new(
        id: CallId,
        caller: Arc<ClientConnection>,
        location: Location,
        queue_capacity: usize,
    ) -> Self {
        Self {
            id,
            caller,
            location,
            started_at: Utc::now(),
            media: MediaQueue::new(queue_capacity),
            inner: Mutex::new(SessionInner {
                state: CallState::Initiated,
                dispatcher: None,
                triage: None,
                last_vitals: None,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> CallState {
        self.inner.lock().state
    }

    /// Bound dashboard, if any.
    pub fn dispatcher(&self) -> Option<Arc<ClientConnection>> {
        self.inner.lock().dispatcher.clone()
    }

    /// Whether a pipeline task was started for this call.
    pub fn has_triage(&self) -> bool {
        self.inner.lock().triage.is_some()
    }

    /// Most recent vitals reading.
    pub fn last_vitals(&self) -> Option<VitalsReading> {
        self.inner.lock().last_vitals.clone()
    }

    /// Bind `dispatcher` if none is bound yet, and start the pipeline with
    /// `start`. The first caller wins; later calls change nothing.
    pub fn join<F>(&self, dispatcher: &Arc<ClientConnection>, start: F) -> JoinOutcome
    where
        F: FnOnce(mpsc::Receiver<MediaItem>) -> TriageHandle,
    {
        self.bind(dispatcher, Some(start))
    }

    /// Bind a dashboard without starting a pipeline.
    #[cfg(test)]
    pub(crate) fn bind_dispatcher(&self, dispatcher: &Arc<ClientConnection>) -> JoinOutcome {
        self.bind::<fn(mpsc::Receiver<MediaItem>) -> TriageHandle>(dispatcher, None)
    }

    fn bind<F>(&self, dispatcher: &Arc<ClientConnection>, start: Option<F>) -> JoinOutcome
    where
        F: FnOnce(mpsc::Receiver<MediaItem>) -> TriageHandle,
    {
        let mut inner = self.inner.lock();
        match inner.state {
            CallState::Ended => return JoinOutcome::Ended,
            CallState::DispatcherJoined => {
                let same_channel = inner
                    .dispatcher
                    .as_ref()
                    .is_some_and(|bound| bound.id == dispatcher.id);
                return JoinOutcome::AlreadyBound {
                    same_channel,
                    vitals: inner.last_vitals.clone(),
                };
            }
            CallState::Initiated => {}
        }

        inner.dispatcher = Some(dispatcher.clone());
        inner.state = CallState::DispatcherJoined;
        if let (Some(start), Some(rx)) = (start, self.media.take_receiver()) {
            inner.triage = Some(start(rx));
        }
        JoinOutcome::Joined {
            vitals: inner.last_vitals.clone(),
        }
    }

    /// Cache a reading and return the dashboard to forward it to.
    pub fn record_vitals(&self, reading: VitalsReading) -> Option<Arc<ClientConnection>> {
        let mut inner = self.inner.lock();
        if inner.state == CallState::Ended {
            return None;
        }
        inner.last_vitals = Some(reading);
        inner.dispatcher.clone()
    }

    /// Seed the cache with a reading that arrived before the call existed.
    /// A reading recorded since then takes precedence.
    pub fn seed_vitals(&self, reading: VitalsReading) {
        let mut inner = self.inner.lock();
        if inner.last_vitals.is_none() {
            inner.last_vitals = Some(reading);
        }
    }

    /// Move to [`CallState::Ended`] and hand back what must be released.
    ///
    /// Returns `None` if the call had already ended.
    pub fn end(&self) -> Option<Teardown> {
        let mut inner = self.inner.lock();
        if inner.state == CallState::Ended {
            return None;
        }
        let previous = inner.state;
        inner.state = CallState::Ended;
        Some(Teardown {
            previous,
            dispatcher: inner.dispatcher.clone(),
            triage: inner.triage.take(),
        })
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("started_at", &self.started_at)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
