//! # triage-core
//!
//! Shared vocabulary for the emergency-call triage server.
//!
//! - **IDs**: [`CallId`] and [`ConnectionId`] newtypes
//! - **Messages**: inbound signaling, dashboard, media, and vitals frames;
//!   the outbound [`OutboundEvent`] enum
//! - **Reports**: JSON extraction from model output and the degraded placeholder
//! - **Errors**: [`CallError`] taxonomy
//! - **Logging**: `tracing` subscriber initialisation
//!
//! ## Crate Position
//!
//! Depends on nothing internal. Every other workspace crate depends on it.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod report;

pub use errors::{CallError, ErrorCategory, ErrorSeverity};
pub use ids::{CallId, ConnectionId};
pub use messages::{
    DashboardMessage, Location, OutboundEvent, Role, SignalMessage, VitalsReading, parse_frame,
};
pub use report::{TriageReport, extract_json_object, situation_summary};
