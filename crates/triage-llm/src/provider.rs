//! # Provider Traits
//!
//! Two shapes of inference backend:
//!
//! - [`InferenceProvider`]: one request in, one text response out. Used by the
//!   windowed pipeline.
//! - [`LiveProvider`]: opens a [`LiveSession`], a duplex channel that accepts
//!   streamed media and yields [`LiveEvent`]s. Used by the streaming pipeline.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::InferenceResult;

/// One self-contained triage request.
#[derive(Clone, Debug, Default)]
pub struct TriageRequest {
    /// Audio wrapped in a WAV container.
    pub audio_wav: Vec<u8>,
    /// Decoded JPEG camera frame, if one accompanies the audio.
    pub image_jpeg: Option<Vec<u8>>,
    /// User prompt text.
    pub prompt: String,
}

/// One-shot inference backend.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Submit one request and return the raw text response. The response is
    /// expected, but not guaranteed, to contain one JSON triage object.
    async fn analyze(&self, request: TriageRequest) -> InferenceResult<String>;
}

/// Something a duplex session reports.
#[derive(Clone, Debug, PartialEq)]
pub enum LiveEvent {
    /// A fragment of model text.
    Text(String),
    /// The model flagged a critical situation out of band.
    Critical {
        /// Model-supplied reason.
        reason: String,
        /// Model-supplied severity, clamped to 1..=5.
        severity: u8,
    },
    /// The model finished a turn; buffered text is complete.
    TurnComplete,
}

/// Boxed stream of session events. Ends when the session closes.
pub type LiveEventStream = Pin<Box<dyn Stream<Item = InferenceResult<LiveEvent>> + Send>>;

/// Sending half of a duplex session.
#[async_trait]
pub trait LiveSender: Send + Sync {
    /// Stream a raw PCM chunk.
    async fn send_audio(&self, pcm: &[u8]) -> InferenceResult<()>;

    /// Stream a JPEG frame (base64 text as received from the caller).
    async fn send_image(&self, jpeg_b64: &str) -> InferenceResult<()>;

    /// Close the session. Idempotent.
    async fn close(&self);
}

/// An open duplex session, split so sending and receiving can proceed
/// concurrently.
pub struct LiveSession {
    /// Media input.
    pub sender: Box<dyn LiveSender>,
    /// Model output.
    pub events: LiveEventStream,
}

/// Duplex inference backend.
#[async_trait]
pub trait LiveProvider: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Open a new session.
    async fn connect(&self) -> InferenceResult<LiveSession>;
}
