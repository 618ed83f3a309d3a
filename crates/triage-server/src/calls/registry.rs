//! Live calls keyed by call identifier.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;
use triage_core::{CallError, CallId, Location};

use crate::calls::session::CallSession;
use crate::websocket::connection::ClientConnection;

/// Single source of truth for which calls exist.
///
/// A call is present exactly while it has not ended. Lookups hand out
/// `Arc`s; holders must look the call up again after any await point
/// instead of assuming it still exists.
pub struct CallRegistry {
    calls: Mutex<HashMap<CallId, Arc<CallSession>>>,
    queue_capacity: usize,
}

impl CallRegistry {
    /// Empty registry whose sessions get media queues of `queue_capacity`.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Register a new call.
    ///
    /// The existence check and the insert happen under one lock, so of two
    /// concurrent creates for the same id exactly one succeeds. The existing
    /// session is never touched by a rejected create.
    pub fn create(
        &self,
        id: CallId,
        caller: Arc<ClientConnection>,
        location: Location,
    ) -> Result<Arc<CallSession>, CallError> {
        let mut calls = self.calls.lock();
        match calls.entry(id) {
            Entry::Occupied(entry) => Err(CallError::DuplicateSession(entry.key().clone())),
            Entry::Vacant(entry) => {
                let session = Arc::new(CallSession::new(
                    entry.key().clone(),
                    caller,
                    location,
                    self.queue_capacity,
                ));
                let _ = entry.insert(session.clone());
                Ok(session)
            }
        }
    }

    /// Look up a live call.
    pub fn get(&self, id: &str) -> Option<Arc<CallSession>> {
        self.calls.lock().get(id).cloned()
    }

    /// Remove a call, returning it if it was present.
    pub fn remove(&self, id: &str) -> Option<Arc<CallSession>> {
        self.calls.lock().remove(id)
    }

    /// Whether a call is live.
    pub fn contains(&self, id: &str) -> bool {
        self.calls.lock().contains_key(id)
    }

    /// Number of live calls.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Whether no call is live.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Snapshot of live call ids.
    pub fn ids(&self) -> Vec<CallId> {
        self.calls.lock().keys().cloned().collect()
    }
}

impl std::fmt::Debug for CallRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRegistry")
            .field("calls", &self.len())
            .finish()
    }
}
