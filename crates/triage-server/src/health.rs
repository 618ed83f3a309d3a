//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections across all channels.
    pub connections: usize,
    /// Calls currently live.
    pub active_calls: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, calls: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        active_calls: calls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, 0);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, 0, 0);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), 4, 1);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 4);
        assert_eq!(parsed["active_calls"], 1);
        assert!(parsed["uptime_secs"].is_number());
    }
}
