//! Google Gemini providers.
//!
//! - [`GeminiClient`]: `generateContent` over HTTPS for windowed triage
//! - [`GeminiLiveClient`]: `BidiGenerateContent` over WebSocket for streaming triage

mod client;
mod live;
pub mod types;

pub use client::GeminiClient;
pub use live::GeminiLiveClient;

/// Connection settings shared by both Gemini clients.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// API key.
    pub api_key: String,
    /// Model for one-shot requests.
    pub model: String,
    /// Model for live sessions.
    pub live_model: String,
    /// REST base URL (no trailing path).
    pub base_url: String,
    /// Live WebSocket URL.
    pub live_url: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            live_model: "gemini-2.0-flash-live-001".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            live_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            temperature: 0.1,
        }
    }
}
