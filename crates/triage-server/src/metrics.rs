//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Calls currently live (gauge).
pub const CALLS_ACTIVE: &str = "calls_active";
/// Calls initiated total (counter).
pub const CALLS_STARTED_TOTAL: &str = "calls_started_total";
/// Calls ended total (counter, labels: reason).
pub const CALLS_ENDED_TOTAL: &str = "calls_ended_total";
/// Triage reports published total (counter).
pub const TRIAGE_ROUNDS_TOTAL: &str = "triage_rounds_total";
/// Failed triage rounds total (counter, labels: class).
pub const TRIAGE_FAILURES_TOTAL: &str = "triage_failures_total";
/// Outbound messages dropped on full or closed channels (counter).
pub const RELAY_DROPS_TOTAL: &str = "relay_drops_total";
/// Media items queued total (counter, labels: kind).
pub const MEDIA_ITEMS_TOTAL: &str = "media_items_total";
/// WebSocket connections opened total (counter, labels: channel).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_prometheus_safe() {
        for name in [
            CALLS_ACTIVE,
            CALLS_STARTED_TOTAL,
            CALLS_ENDED_TOTAL,
            TRIAGE_ROUNDS_TOTAL,
            TRIAGE_FAILURES_TOTAL,
            RELAY_DROPS_TOTAL,
            MEDIA_ITEMS_TOTAL,
            WS_CONNECTIONS_TOTAL,
        ] {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
        }
    }

    #[test]
    fn render_local_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(CALLS_STARTED_TOTAL).increment(2);
        });
        let text = render(&handle);
        assert!(text.contains("calls_started_total 2"));
    }
}
