//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may name only the fields it changes.

mod gemini;
mod server;
mod triage;

pub use gemini::*;
pub use server::*;
pub use triage::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "triage": { "strategy": "streaming" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriageSettings {
    /// HTTP/WebSocket listener.
    pub server: ServerSettings,
    /// Pipeline behavior and call-lifecycle bounds.
    pub triage: PipelineSettings,
    /// Raw PCM format of the caller's audio stream.
    pub audio: AudioSettings,
    /// Inference provider.
    pub gemini: GeminiSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl TriageSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        fn require(ok: bool, msg: &str) -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(SettingsError::InvalidValue(msg.to_string()))
            }
        }

        require(self.server.port != 0, "server.port must be 1-65535")?;
        require(self.server.outbound_buffer > 0, "server.outboundBuffer must be > 0")?;
        require(self.server.max_message_size > 0, "server.maxMessageSize must be > 0")?;
        require(self.triage.window_secs > 0, "triage.windowSecs must be > 0")?;
        require(
            self.triage.media_queue_capacity > 0,
            "triage.mediaQueueCapacity must be > 0",
        )?;
        require(
            self.triage.inference_timeout_secs > 0,
            "triage.inferenceTimeoutSecs must be > 0",
        )?;
        require(
            self.triage.cleanup_timeout_secs > 0,
            "triage.cleanupTimeoutSecs must be > 0",
        )?;
        require(self.audio.sample_rate > 0, "audio.sampleRate must be > 0")?;
        require(self.audio.channels > 0, "audio.channels must be > 0")?;
        require(
            matches!(self.audio.bits_per_sample, 8 | 16 | 24 | 32),
            "audio.bitsPerSample must be 8, 16, 24, or 32",
        )?;
        require(
            (0.0..=2.0).contains(&self.gemini.temperature),
            "gemini.temperature must be within 0.0-2.0",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = TriageSettings::default();
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.max_message_size, 16 * 1024 * 1024);
        assert_eq!(s.triage.strategy, Strategy::Windowed);
        assert_eq!(s.triage.window_secs, 10);
        assert_eq!(s.triage.media_queue_capacity, 500);
        assert_eq!(s.audio.sample_rate, 16_000);
        assert_eq!(s.audio.channels, 1);
        assert_eq!(s.audio.bits_per_sample, 16);
        assert_eq!(s.gemini.model, "gemini-2.5-flash");
        assert!((s.gemini.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(s.logging.level, "info");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(TriageSettings::default()).unwrap();
        assert_eq!(json["triage"]["mediaQueueCapacity"], 500);
        assert_eq!(json["audio"]["bitsPerSample"], 16);
        assert!(json["gemini"].get("apiKey").is_none());
    }

    #[test]
    fn validate_rejects_zero_window() {
        let mut s = TriageSettings::default();
        s.triage.window_secs = 0;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(m)) if m.contains("windowSecs"));
    }

    #[test]
    fn validate_rejects_zero_queue_and_port() {
        let mut s = TriageSettings::default();
        s.triage.media_queue_capacity = 0;
        assert!(s.validate().is_err());

        let mut s = TriageSettings::default();
        s.server.port = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_odd_bit_depth() {
        let mut s = TriageSettings::default();
        s.audio.bits_per_sample = 12;
        assert!(s.validate().is_err());
    }
}
