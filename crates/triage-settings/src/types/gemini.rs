//! Inference provider settings.

use serde::{Deserialize, Serialize};

/// Gemini API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiSettings {
    /// Model used for one-shot `generateContent` requests.
    pub model: String,
    /// Model used for duplex Live sessions.
    pub live_model: String,
    /// REST base URL.
    pub base_url: String,
    /// Live (BidiGenerateContent) WebSocket URL.
    pub live_url: String,
    /// API key. Prefer the `GEMINI_API_KEY` environment variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            live_model: "gemini-2.0-flash-live-001".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            live_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string(),
            api_key: None,
            temperature: 0.1,
        }
    }
}
