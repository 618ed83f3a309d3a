//! Gemini `generateContent` client for windowed triage.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, error, info, instrument};

use crate::error::{InferenceError, InferenceResult};
use crate::gemini::GeminiConfig;
use crate::gemini::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use crate::prompt::TRIAGE_SYSTEM_PROMPT;
use crate::provider::{InferenceProvider, TriageRequest};

/// One-shot Gemini triage provider.
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client with its own HTTP connection pool.
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create a client sharing an existing HTTP connection pool.
    #[must_use]
    pub fn with_client(config: GeminiConfig, client: reqwest::Client) -> Self {
        info!(model = %config.model, "Gemini client initialized");
        Self { config, client }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            self.config.api_key
        )
    }

    fn build_body(&self, request: &TriageRequest) -> GenerateContentRequest {
        let mut parts = Vec::with_capacity(3);
        parts.push(Part::inline("audio/wav", STANDARD.encode(&request.audio_wav)));
        if let Some(image) = &request.image_jpeg {
            parts.push(Part::inline("image/jpeg", STANDARD.encode(image)));
        }
        parts.push(Part::text(&request.prompt));

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: Content::text(TRIAGE_SYSTEM_PROMPT),
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
            },
        }
    }
}

#[async_trait]
impl InferenceProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip_all, fields(model = %self.config.model, audio_bytes = request.audio_wav.len()))]
    async fn analyze(&self, request: TriageRequest) -> InferenceResult<String> {
        let body = self.build_body(&request);

        let response = self.client.post(self.url()).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = parse_api_error(&body_text, status.as_u16());
            let retryable = status.as_u16() == 429 || status.is_server_error();
            error!(status = status.as_u16(), retryable, "Gemini API error");
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message,
                retryable,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = parsed.text();
        if text.trim().is_empty() {
            let reason = parsed
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(InferenceError::MalformedOutput(format!(
                "empty response ({reason})"
            )));
        }
        debug!(chars = text.len(), "Gemini response received");
        Ok(text)
    }
}

/// Extract the error message from a Gemini error body.
fn parse_api_error(body: &str, status: u16) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| format!("HTTP {status}: {body}"))
}
