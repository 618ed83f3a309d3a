//! # triage-server
//!
//! Call coordination core and its axum `WebSocket` transport.
//!
//! - **Calls**: registry, per-call state machine, signaling relay, media
//!   queue, vitals relay, and teardown, all behind [`CallCoordinator`]
//! - **Pipeline**: the per-call triage task and its two strategies,
//!   [`WindowedStrategy`] and [`StreamingStrategy`]
//! - **Transport**: four `WebSocket` endpoints, `/health`, `/metrics`, and
//!   static assets, served by [`TriageServer`]
//! - Graceful shutdown via `CancellationToken`
//!
//! ## Crate Position
//!
//! Depends on `triage-core`, `triage-settings`, and `triage-llm`.
//! Depended on by `triage-agent`.

#![deny(unsafe_code)]

pub mod calls;
pub mod config;
pub mod health;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use calls::CallCoordinator;
pub use config::{CoordinatorConfig, ServerConfig};
pub use pipeline::{StreamingStrategy, TriageStrategy, WindowedStrategy};
pub use server::TriageServer;
pub use shutdown::ShutdownCoordinator;
