//! Pipeline and audio format settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a call's media is turned into triage reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Accumulate a time window of media, then issue one request.
    #[default]
    Windowed,
    /// Hold one duplex inference session open for the whole call.
    Streaming,
}

impl Strategy {
    /// Parse a strategy name (`windowed` or `streaming`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "windowed" => Some(Self::Windowed),
            "streaming" => Some(Self::Streaming),
            _ => None,
        }
    }
}

/// Pipeline behavior and call-lifecycle bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Which strategy new calls use.
    pub strategy: Strategy,
    /// Windowed strategy: seconds of media per inference round.
    pub window_secs: u64,
    /// Bounded media queue depth per call.
    pub media_queue_capacity: usize,
    /// Per-request inference deadline.
    pub inference_timeout_secs: u64,
    /// How long cleanup waits for a pipeline task to stop.
    pub cleanup_timeout_secs: u64,
    /// Streaming strategy: characters of unparseable model text kept before the buffer is dropped.
    pub stream_buffer_limit: usize,
    /// Streaming strategy: delay before reopening a failed session.
    pub reconnect_delay_ms: u64,
}

impl PipelineSettings {
    /// Window length as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Inference deadline as a [`Duration`].
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    /// Cleanup wait bound as a [`Duration`].
    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.cleanup_timeout_secs)
    }

    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Windowed,
            window_secs: 10,
            media_queue_capacity: 500,
            inference_timeout_secs: 30,
            cleanup_timeout_secs: 5,
            stream_buffer_limit: 2000,
            reconnect_delay_ms: 2000,
        }
    }
}

/// Raw PCM format of incoming audio chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    /// Samples per second.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Bits per sample (little-endian signed).
    pub bits_per_sample: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parse() {
        assert_eq!(Strategy::parse("windowed"), Some(Strategy::Windowed));
        assert_eq!(Strategy::parse("Streaming"), Some(Strategy::Streaming));
        assert_eq!(Strategy::parse("batch"), None);
    }

    #[test]
    fn strategy_serde() {
        let s: Strategy = serde_json::from_str("\"streaming\"").unwrap();
        assert_eq!(s, Strategy::Streaming);
        assert_eq!(serde_json::to_string(&Strategy::Windowed).unwrap(), "\"windowed\"");
    }

    #[test]
    fn durations() {
        let p = PipelineSettings::default();
        assert_eq!(p.window(), Duration::from_secs(10));
        assert_eq!(p.cleanup_timeout(), Duration::from_secs(5));
        assert_eq!(p.reconnect_delay(), Duration::from_secs(2));
    }
}
