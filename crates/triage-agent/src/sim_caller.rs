//! Simulated caller for demos and smoke tests.
//!
//! Opens the caller's signaling channel, announces a call at a fixed
//! location, prints whatever the server sends back, and hangs up after a
//! fixed duration.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use uuid::Uuid;

/// Options for the `sim-caller` subcommand.
#[derive(Args, Debug, Clone)]
pub struct SimCallerArgs {
    /// Server base URL (`ws://`, `wss://`, `http://` or `https://`).
    #[arg(long, default_value = "ws://127.0.0.1:8080")]
    pub url: String,

    /// Call id to use (a fresh UUID when omitted).
    #[arg(long)]
    pub call_id: Option<String>,

    /// Caller latitude.
    #[arg(long, default_value_t = 35.9132, allow_hyphen_values = true)]
    pub lat: f64,

    /// Caller longitude.
    #[arg(long, default_value_t = -79.0558, allow_hyphen_values = true)]
    pub lng: f64,

    /// Seconds to stay on the line before sending `call_ended`.
    #[arg(long, default_value_t = 30)]
    pub duration_secs: u64,
}

/// `/ws/signal` endpoint for `call_id` as the caller.
pub fn signal_url(base: &str, call_id: &str) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid server url '{base}'"))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => bail!("unsupported url scheme '{other}'"),
    };
    if url.set_scheme(scheme).is_err() {
        bail!("cannot use scheme '{scheme}' for '{base}'");
    }
    url.set_path("/ws/signal");
    let _ = url
        .query_pairs_mut()
        .clear()
        .append_pair("call_id", call_id)
        .append_pair("role", "caller");
    Ok(url)
}

fn call_initiated(call_id: &str, lat: f64, lng: f64) -> Value {
    json!({
        "type": "call_initiated",
        "call_id": call_id,
        "location": {"lat": lat, "lng": lng},
    })
}

/// Place one call and hang up after `duration_secs`.
///
/// Returns early, without sending `call_ended`, if the server closes the
/// channel first.
pub async fn run(args: &SimCallerArgs) -> Result<()> {
    let call_id = args
        .call_id
        .clone()
        .unwrap_or_else(|| Uuid::now_v7().to_string());
    let url = signal_url(&args.url, &call_id)?;
    info!(%url, %call_id, lat = args.lat, lng = args.lng, "connecting simulated caller");

    let (ws, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    let (mut sink, mut stream) = ws.split();

    sink.send(Message::text(
        call_initiated(&call_id, args.lat, args.lng).to_string(),
    ))
    .await
    .context("failed to send call_initiated")?;
    info!(duration_secs = args.duration_secs, "call_initiated sent");

    let listen = async {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    let kind = serde_json::from_str::<Value>(text.as_str())
                        .ok()
                        .and_then(|v| v.get("type").and_then(Value::as_str).map(str::to_owned));
                    info!(
                        kind = kind.as_deref().unwrap_or("unknown"),
                        body = text.as_str(),
                        "message received"
                    );
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "signaling channel failed");
                    break;
                }
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(args.duration_secs), listen)
        .await
        .is_ok()
    {
        info!("server closed the call");
        return Ok(());
    }

    sink.send(Message::text(
        json!({"type": "call_ended", "call_id": call_id}).to_string(),
    ))
    .await
    .context("failed to send call_ended")?;
    let _ = sink.close().await;
    info!("call_ended sent");
    Ok(())
}
