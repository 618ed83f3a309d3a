//! # triage-llm
//!
//! The boundary to the triage inference collaborator.
//!
//! - [`InferenceProvider`] / [`LiveProvider`]: backend traits
//! - [`gemini`]: Google Gemini implementations of both
//! - [`wav`]: wraps raw PCM windows in a WAV container
//! - [`prompt`]: system instructions and per-round prompts
//!
//! ## Crate Position
//!
//! Depends on nothing internal. `triage-server` drives these traits;
//! `triage-agent` picks the concrete providers.

#![deny(unsafe_code)]

pub mod error;
pub mod gemini;
pub mod prompt;
pub mod provider;
pub mod wav;

pub use error::{InferenceError, InferenceResult};
pub use provider::{
    InferenceProvider, LiveEvent, LiveEventStream, LiveProvider, LiveSender, LiveSession,
    TriageRequest,
};
pub use wav::{PcmFormat, pcm_to_wav};
