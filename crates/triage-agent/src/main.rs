//! # triage-agent
//!
//! Triage server binary: loads settings, builds the inference provider for
//! the configured strategy, and serves until Ctrl-C.
//!
//! `triage-agent sim-caller` instead places one simulated call against a
//! running server.

#![deny(unsafe_code)]

mod sim_caller;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use triage_core::logging::{init_json_subscriber, init_subscriber};
use triage_llm::PcmFormat;
use triage_llm::gemini::{GeminiClient, GeminiConfig, GeminiLiveClient};
use triage_server::metrics::install_recorder;
use triage_server::{
    CallCoordinator, CoordinatorConfig, ServerConfig, StreamingStrategy, TriageServer,
    TriageStrategy, WindowedStrategy,
};
use triage_settings::{GeminiSettings, Strategy, TriageSettings, load_settings};

use crate::sim_caller::SimCallerArgs;

/// Emergency-call triage server.
#[derive(Parser, Debug)]
#[command(name = "triage-agent", about = "Emergency-call triage server")]
struct Cli {
    /// Settings file (defaults to `~/.triage/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Pipeline strategy: `windowed` or `streaming`.
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<Strategy>,

    /// Log level filter (`RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Directory of dashboard assets served at `/`.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Place one simulated call against a running server.
    SimCaller(SimCallerArgs),
}

fn parse_strategy(value: &str) -> Result<Strategy, String> {
    Strategy::parse(value).ok_or_else(|| format!("unknown strategy '{value}'"))
}

impl Cli {
    /// Command-line flags override every other settings layer.
    fn apply(&self, settings: &mut TriageSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(strategy) = self.strategy {
            settings.triage.strategy = strategy;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(dir) = &self.static_dir {
            settings.server.static_dir = Some(dir.to_string_lossy().into_owned());
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn gemini_config(settings: &GeminiSettings) -> Result<GeminiConfig> {
    let Some(api_key) = settings.api_key.clone().filter(|k| !k.is_empty()) else {
        bail!("no Gemini API key: set GEMINI_API_KEY or gemini.apiKey in settings");
    };
    Ok(GeminiConfig {
        api_key,
        model: settings.model.clone(),
        live_model: settings.live_model.clone(),
        base_url: settings.base_url.clone(),
        live_url: settings.live_url.clone(),
        temperature: settings.temperature,
    })
}

/// Build the pipeline strategy new calls will run.
fn build_strategy(settings: &TriageSettings) -> Result<Arc<dyn TriageStrategy>> {
    let gemini = gemini_config(&settings.gemini)?;
    let triage = &settings.triage;
    let strategy: Arc<dyn TriageStrategy> = match triage.strategy {
        Strategy::Windowed => {
            let format = PcmFormat {
                sample_rate: settings.audio.sample_rate,
                channels: settings.audio.channels,
                bits_per_sample: settings.audio.bits_per_sample,
            };
            Arc::new(WindowedStrategy::new(
                Arc::new(GeminiClient::new(gemini)),
                triage.window(),
                triage.inference_timeout(),
                format,
            ))
        }
        Strategy::Streaming => Arc::new(StreamingStrategy::new(
            Arc::new(GeminiLiveClient::new(gemini, settings.audio.sample_rate)),
            triage.stream_buffer_limit,
            triage.reconnect_delay(),
        )),
    };
    Ok(strategy)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::SimCaller(args)) = &cli.command {
        let level = cli.log_level.as_deref().unwrap_or("info");
        if cli.json_logs {
            init_json_subscriber(level);
        } else {
            init_subscriber(level);
        }
        return sim_caller::run(args).await;
    }

    let mut settings = load_settings(cli.config.as_deref()).context("Failed to load settings")?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    if settings.logging.json {
        init_json_subscriber(&settings.logging.level);
    } else {
        init_subscriber(&settings.logging.level);
    }

    let strategy = build_strategy(&settings)?;
    let coordinator = Arc::new(CallCoordinator::new(
        CoordinatorConfig::from_settings(&settings),
        strategy,
    ));
    let mut server = TriageServer::new(ServerConfig::from_settings(&settings), coordinator);
    match install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!(
        strategy = server.coordinator().strategy_name(),
        "triage agent listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(server.coordinator(), vec![handle], None)
        .await;
    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_key() -> TriageSettings {
        let mut settings = TriageSettings::default();
        settings.gemini.api_key = Some("test-key".into());
        settings
    }

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["triage-agent"]);
        let mut settings = TriageSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, TriageSettings::default().server.port);
        assert_eq!(settings.triage.strategy, Strategy::Windowed);
        assert!(!settings.logging.json);
    }

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from([
            "triage-agent",
            "--host",
            "127.0.0.1",
            "--port",
            "9100",
            "--strategy",
            "streaming",
            "--log-level",
            "debug",
            "--static-dir",
            "/srv/dashboard",
            "--json-logs",
        ]);
        let mut settings = TriageSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.triage.strategy, Strategy::Streaming);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.server.static_dir.as_deref(), Some("/srv/dashboard"));
        assert!(settings.logging.json);
    }

    #[test]
    fn cli_rejects_unknown_strategy() {
        assert!(Cli::try_parse_from(["triage-agent", "--strategy", "psychic"]).is_err());
    }

    #[test]
    fn cli_parses_sim_caller() {
        let cli = Cli::parse_from([
            "triage-agent",
            "sim-caller",
            "--url",
            "ws://10.0.0.2:9000",
            "--lat",
            "-33.5",
            "--lng",
            "151.25",
            "--duration-secs",
            "5",
        ]);
        let Some(Command::SimCaller(args)) = cli.command else {
            panic!("expected sim-caller");
        };
        assert_eq!(args.url, "ws://10.0.0.2:9000");
        assert!((args.lat + 33.5).abs() < f64::EPSILON);
        assert!((args.lng - 151.25).abs() < f64::EPSILON);
        assert_eq!(args.duration_secs, 5);
        assert_eq!(args.call_id, None);
    }

    #[test]
    fn sim_caller_defaults() {
        let cli = Cli::parse_from(["triage-agent", "sim-caller"]);
        let Some(Command::SimCaller(args)) = cli.command else {
            panic!("expected sim-caller");
        };
        assert_eq!(args.url, "ws://127.0.0.1:8080");
        assert_eq!(args.duration_secs, 30);
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["triage-agent", "--config", "/tmp/settings.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/settings.json")));
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = build_strategy(&TriageSettings::default()).err().unwrap();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let mut settings = TriageSettings::default();
        settings.gemini.api_key = Some(String::new());
        assert!(build_strategy(&settings).is_err());
    }

    #[test]
    fn builds_configured_strategy() {
        let mut settings = settings_with_key();
        assert_eq!(build_strategy(&settings).unwrap().name(), "windowed");
        settings.triage.strategy = Strategy::Streaming;
        assert_eq!(build_strategy(&settings).unwrap().name(), "streaming");
    }

    #[test]
    fn gemini_config_copies_settings() {
        let mut settings = settings_with_key();
        settings.gemini.model = "gemini-test".into();
        let config = gemini_config(&settings.gemini).unwrap();
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.model, "gemini-test");
    }

    #[test]
    fn settings_file_feeds_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"triage": {"strategy": "streaming"}, "gemini": {"apiKey": "file-key"}}"#,
        )
        .unwrap();
        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(build_strategy(&settings).unwrap().name(), "streaming");
    }
}
