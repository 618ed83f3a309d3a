//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A settings value was rejected by validation.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
