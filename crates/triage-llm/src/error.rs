//! Inference error type.

/// Result alias for inference operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Errors raised by an inference provider.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Whether the same request could succeed later.
        retryable: bool,
    },

    /// The request did not finish within its deadline.
    #[error("inference timed out after {secs}s")]
    Timeout {
        /// Deadline that elapsed.
        secs: u64,
    },

    /// The provider answered but the answer held no usable report.
    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    /// A duplex session could not be opened or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// Audio could not be packaged for the provider.
    #[error("audio encoding error: {0}")]
    Encoding(String),

    /// Request was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl InferenceError {
    /// Short error class shown to dispatchers in degraded reports.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Http(_) => "HttpError",
            Self::Json(_) => "JsonError",
            Self::Api { .. } => "ApiError",
            Self::Timeout { .. } => "Timeout",
            Self::MalformedOutput(_) => "MalformedOutput",
            Self::Connection(_) => "ConnectionError",
            Self::Encoding(_) => "EncodingError",
            Self::Cancelled => "Cancelled",
            Self::Other(_) => "Error",
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { retryable, .. } => *retryable,
            Self::Timeout { .. } | Self::Connection(_) => true,
            Self::Json(_)
            | Self::MalformedOutput(_)
            | Self::Encoding(_)
            | Self::Cancelled
            | Self::Other(_) => false,
        }
    }
}
