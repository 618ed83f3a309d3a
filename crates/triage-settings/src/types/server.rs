//! Listener and logging settings.

use serde::{Deserialize, Serialize};

/// HTTP/WebSocket listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Largest accepted WebSocket message in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth. Sends beyond it are dropped.
    pub outbound_buffer: usize,
    /// Directory of dashboard/caller web assets served at `/` and `/static`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_message_size: 16 * 1024 * 1024,
            outbound_buffer: 256,
            static_dir: None,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
