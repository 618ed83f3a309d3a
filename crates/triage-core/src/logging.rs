//! `tracing` subscriber setup.
//!
//! Call context (call ID, connection ID, role) travels on spans opened by the
//! transport handlers, so every event logged inside a handler carries it.

use tracing_subscriber::EnvFilter;

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global subscriber with compact, human-readable stderr output.
///
/// `RUST_LOG` overrides `level` when set. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails only if a global default is already installed
    let _ = subscriber.try_init();
}

/// Initialize the global subscriber with one JSON object per line on stderr.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_env_filter(filter(level))
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_subscriber("warn");
        init_subscriber("debug");
        init_json_subscriber("info");
    }
}
