//! Gemini Live client for streaming triage.
//!
//! Protocol outline (`BidiGenerateContent` over WebSocket, JSON frames):
//! 1. client sends `setup` (model, system instruction, `flag_critical` tool)
//! 2. server answers `setupComplete`
//! 3. client streams `realtimeInput.mediaChunks` (PCM audio, JPEG frames)
//! 4. server streams `serverContent` text and `toolCall` function calls;
//!    every function call is acknowledged with a `toolResponse`

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, warn};

use crate::error::{InferenceError, InferenceResult};
use crate::gemini::GeminiConfig;
use crate::prompt::{FLAG_CRITICAL_FN, LIVE_SYSTEM_PROMPT};
use crate::provider::{LiveEvent, LiveEventStream, LiveProvider, LiveSender, LiveSession};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn connection(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Connection(e.to_string())
}

/// Duplex Gemini provider.
pub struct GeminiLiveClient {
    config: GeminiConfig,
    sample_rate: u32,
}

impl GeminiLiveClient {
    /// Create a client. `sample_rate` describes the PCM the caller streams.
    #[must_use]
    pub fn new(config: GeminiConfig, sample_rate: u32) -> Self {
        info!(model = %config.live_model, "Gemini Live client initialized");
        Self {
            config,
            sample_rate,
        }
    }

    /// Endpoint with the API key appended as a percent-encoded query pair.
    fn url(&self) -> InferenceResult<String> {
        let mut url = reqwest::Url::parse(&self.config.live_url).map_err(connection)?;
        let _ = url.query_pairs_mut().append_pair("key", &self.config.api_key);
        Ok(url.into())
    }

    fn setup_message(&self) -> Value {
        json!({
            "setup": {
                "model": format!("models/{}", self.config.live_model),
                "generationConfig": {
                    "responseModalities": ["TEXT"],
                    "temperature": self.config.temperature,
                },
                "systemInstruction": {"parts": [{"text": LIVE_SYSTEM_PROMPT}]},
                "tools": [{
                    "functionDeclarations": [{
                        "name": FLAG_CRITICAL_FN,
                        "description": "Alert the dispatcher immediately about a life-threatening situation.",
                        "parameters": {
                            "type": "OBJECT",
                            "properties": {
                                "reason": {"type": "STRING", "description": "Short description of the danger."},
                                "severity": {"type": "INTEGER", "description": "Severity 1-5."}
                            },
                            "required": ["reason", "severity"]
                        }
                    }]
                }]
            }
        })
    }
}

#[async_trait]
impl LiveProvider for GeminiLiveClient {
    fn name(&self) -> &str {
        "gemini-live"
    }

    #[instrument(skip_all, fields(model = %self.config.live_model))]
    async fn connect(&self) -> InferenceResult<LiveSession> {
        let (ws, _) = connect_async(self.url()?).await.map_err(connection)?;
        let (mut sink, mut stream) = ws.split();

        sink.send(Message::text(self.setup_message().to_string()))
            .await
            .map_err(connection)?;

        loop {
            match stream.next().await {
                Some(Ok(frame)) => {
                    if let Some(value) = frame_json(&frame) {
                        if value.get("setupComplete").is_some() {
                            break;
                        }
                    } else if matches!(frame, Message::Close(_)) {
                        return Err(connection("closed during setup"));
                    }
                }
                Some(Err(e)) => return Err(connection(e)),
                None => return Err(connection("closed during setup")),
            }
        }
        debug!("live session established");

        let (tx, rx) = mpsc::channel::<Message>(64);
        let _writer = tokio::spawn(writer_loop(sink, rx));

        Ok(LiveSession {
            sender: Box::new(GeminiLiveSender {
                tx: tx.clone(),
                audio_mime: format!("audio/pcm;rate={}", self.sample_rate),
            }),
            events: event_stream(stream, tx),
        })
    }
}

async fn writer_loop(mut sink: SplitSink<WsStream, Message>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sink.send(msg).await {
            debug!(error = %e, "live writer stopped");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

fn event_stream(mut stream: SplitStream<WsStream>, replies: mpsc::Sender<Message>) -> LiveEventStream {
    Box::pin(async_stream::stream! {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    yield Err(connection(e));
                    break;
                }
            };
            if matches!(frame, Message::Close(_)) {
                break;
            }
            let Some(value) = frame_json(&frame) else { continue };
            let decoded = decode_server_message(&value);
            for reply in decoded.replies {
                let _ = replies.send(Message::text(reply.to_string())).await;
            }
            for event in decoded.events {
                yield Ok(event);
            }
        }
    })
}

/// Parse a text or binary frame as JSON. Control frames and garbage yield `None`.
fn frame_json(frame: &Message) -> Option<Value> {
    let parsed = match frame {
        Message::Text(text) => serde_json::from_str(text),
        Message::Binary(bytes) => serde_json::from_slice(bytes),
        _ => return None,
    };
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "unparseable live frame");
            None
        }
    }
}

/// Events and acknowledgements decoded from one server message.
#[derive(Debug, Default, PartialEq)]
struct Decoded {
    events: Vec<LiveEvent>,
    replies: Vec<Value>,
}

fn decode_server_message(value: &Value) -> Decoded {
    let mut decoded = Decoded::default();

    if let Some(content) = value.get("serverContent") {
        if let Some(parts) = content.pointer("/modelTurn/parts").and_then(Value::as_array) {
            for text in parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)) {
                decoded.events.push(LiveEvent::Text(text.to_string()));
            }
        }
        if content.get("turnComplete").and_then(Value::as_bool) == Some(true) {
            decoded.events.push(LiveEvent::TurnComplete);
        }
    }

    if let Some(calls) = value.pointer("/toolCall/functionCalls").and_then(Value::as_array) {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            if name == FLAG_CRITICAL_FN {
                let args = call.get("args").cloned().unwrap_or(Value::Null);
                let reason = args
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("critical situation")
                    .to_string();
                let severity = args
                    .get("severity")
                    .and_then(Value::as_u64)
                    .map_or(5, |s| u8::try_from(s.clamp(1, 5)).unwrap_or(5));
                decoded.events.push(LiveEvent::Critical { reason, severity });
            } else {
                warn!(function = name, "unknown live function call");
            }
            responses.push(json!({
                "id": call.get("id").cloned().unwrap_or(Value::Null),
                "name": name,
                "response": {"result": "ok"}
            }));
        }
        decoded
            .replies
            .push(json!({"toolResponse": {"functionResponses": responses}}));
    }

    decoded
}

struct GeminiLiveSender {
    tx: mpsc::Sender<Message>,
    audio_mime: String,
}

impl GeminiLiveSender {
    async fn send_chunk(&self, mime_type: &str, data: String) -> InferenceResult<()> {
        let msg = json!({
            "realtimeInput": {"mediaChunks": [{"mimeType": mime_type, "data": data}]}
        });
        self.tx
            .send(Message::text(msg.to_string()))
            .await
            .map_err(|_| connection("live session closed"))
    }
}

#[async_trait]
impl LiveSender for GeminiLiveSender {
    async fn send_audio(&self, pcm: &[u8]) -> InferenceResult<()> {
        self.send_chunk(&self.audio_mime, STANDARD.encode(pcm)).await
    }

    async fn send_image(&self, jpeg_b64: &str) -> InferenceResult<()> {
        self.send_chunk("image/jpeg", jpeg_b64.to_string()).await
    }

    async fn close(&self) {
        let _ = self.tx.try_send(Message::Close(None));
    }
}
