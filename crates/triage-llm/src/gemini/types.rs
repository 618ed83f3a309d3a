//! Gemini wire types (subset used for triage).

use serde::{Deserialize, Serialize};

/// A `generateContent` request body.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation turns; triage sends exactly one user turn.
    pub contents: Vec<Content>,
    /// System instruction.
    pub system_instruction: Content,
    /// Sampling parameters.
    pub generation_config: GenerationConfig,
}

/// A role-tagged list of parts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Content {
    /// `user` or `model`; omitted for system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Parts in order.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// A role-less content holding one text part.
    pub fn text(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }
}

/// One part of a content.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Text part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Inline binary part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    /// A text part.
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    /// An inline binary part; `data` is base64.
    pub fn inline(mime_type: &str, data: String) -> Self {
        Self {
            text: None,
            inline_data: Some(Blob {
                mime_type: mime_type.to_string(),
                data,
            }),
        }
    }
}

/// Base64 payload with its MIME type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// MIME type, e.g. `audio/wav`.
    pub mime_type: String,
    /// Base64 data.
    pub data: String,
}

/// Sampling parameters.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
}

/// A `generateContent` response body.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidate completions; triage reads the first.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default()
    }
}

/// One candidate completion.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Generated content; absent when the candidate was blocked.
    #[serde(default)]
    pub content: Option<Content>,
    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}
