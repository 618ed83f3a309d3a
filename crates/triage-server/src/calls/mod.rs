//! Call sessions and everything that routes through them.
//!
//! - [`registry`]: live calls keyed by id
//! - [`session`]: one call's state machine
//! - [`media`]: the per-call bounded media queue
//! - [`coordinator`]: the entry point every channel handler calls into
//! - [`relay`], [`vitals`], [`lifecycle`]: the coordinator's handlers by concern

pub mod coordinator;
pub mod lifecycle;
pub mod media;
pub mod registry;
pub mod relay;
pub mod session;
pub mod vitals;

pub use coordinator::CallCoordinator;
pub use media::{MediaItem, MediaQueue, QueueClosed};
pub use registry::CallRegistry;
pub use session::{CallSession, CallState, JoinOutcome, Teardown};
pub use vitals::VitalsDelivery;
