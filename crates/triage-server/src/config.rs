//! Server and coordinator configuration.

use std::path::PathBuf;
use std::time::Duration;

use triage_settings::TriageSettings;

/// Transport settings for the HTTP/WebSocket listener.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub outbound_buffer: usize,
    /// Directory served at `/` and `/static`, if any.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 16 * 1024 * 1024, // 16 MB
            outbound_buffer: 256,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Take the `server` section of loaded settings.
    pub fn from_settings(settings: &TriageSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_message_size: server.max_message_size,
            outbound_buffer: server.outbound_buffer,
            static_dir: server.static_dir.as_ref().map(PathBuf::from),
        }
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Call-coordination settings.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Media queue capacity per call.
    pub media_queue_capacity: usize,
    /// Upper bound on waiting for a pipeline task during cleanup.
    pub cleanup_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            media_queue_capacity: 500,
            cleanup_timeout: Duration::from_secs(5),
        }
    }
}

impl CoordinatorConfig {
    /// Take the `triage` section of loaded settings.
    pub fn from_settings(settings: &TriageSettings) -> Self {
        Self {
            media_queue_capacity: settings.triage.media_queue_capacity,
            cleanup_timeout: settings.triage.cleanup_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_binds_loopback_ephemeral() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
        assert!(cfg.static_dir.is_none());
    }

    #[test]
    fn server_from_settings() {
        let mut settings = TriageSettings::default();
        settings.server.port = 9000;
        settings.server.static_dir = Some("./static".into());
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9000");
        assert_eq!(cfg.static_dir, Some(PathBuf::from("./static")));
    }

    #[test]
    fn coordinator_from_settings() {
        let mut settings = TriageSettings::default();
        settings.triage.cleanup_timeout_secs = 2;
        settings.triage.media_queue_capacity = 64;
        let cfg = CoordinatorConfig::from_settings(&settings);
        assert_eq!(cfg.media_queue_capacity, 64);
        assert_eq!(cfg.cleanup_timeout, Duration::from_secs(2));
    }
}
