//! Wire messages exchanged with callers, dashboards, and telemetry sources.
//!
//! Inbound text frames are classified rather than fully typed: control
//! messages (`call_initiated`, `call_ended`, `dispatcher_joined`) are parsed,
//! while every other signaling payload (SDP offers/answers, ICE candidates)
//! is kept as the raw text so it can be relayed byte-for-byte.
//!
//! Outbound events are a single serde-tagged enum; the `type` field is the
//! discriminator the browser clients switch on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CallError;
use crate::ids::CallId;

/// Which side of a call a signaling channel speaks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person placing the emergency call.
    Caller,
    /// The dispatcher answering it.
    Dispatcher,
}

impl Role {
    /// Parse the `role` query parameter. A missing role means `caller`.
    pub fn from_query(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("caller") => Some(Self::Caller),
            Some("dispatcher") => Some(Self::Dispatcher),
            Some(_) => None,
        }
    }

    /// Stable lowercase name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Dispatcher => "dispatcher",
        }
    }
}

/// Caller position reported at initiation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
}

impl Location {
    /// Build a location from a latitude/longitude pair.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// A classified text frame from a `/ws/signal` channel.
#[derive(Clone, Debug, PartialEq)]
pub enum SignalMessage {
    /// The caller announces a new call.
    CallInitiated {
        /// Where the caller is.
        location: Location,
    },
    /// Either party hangs up.
    CallEnded,
    /// Opaque negotiation payload, forwarded verbatim to the counterpart.
    Relay(String),
}

impl SignalMessage {
    /// Classify a raw text frame.
    ///
    /// Fails with [`CallError::Protocol`] when the frame is not a JSON object,
    /// has no string `type`, or carries a malformed `location`.
    pub fn parse(raw: &str) -> Result<Self, CallError> {
        let value = parse_object(raw)?;
        match message_type(&value)? {
            "call_initiated" => {
                let location = match value.get("location") {
                    None | Some(Value::Null) => Location::default(),
                    Some(loc) => serde_json::from_value(loc.clone()).map_err(|e| {
                        CallError::Protocol(format!("invalid location: {e}"))
                    })?,
                };
                Ok(Self::CallInitiated { location })
            }
            "call_ended" => Ok(Self::CallEnded),
            _ => Ok(Self::Relay(raw.to_owned())),
        }
    }
}

/// A classified text frame from a `/ws/dashboard` channel.
#[derive(Clone, Debug, PartialEq)]
pub enum DashboardMessage {
    /// The dispatcher answers a call.
    DispatcherJoined {
        /// Call being answered.
        call_id: CallId,
    },
    /// The dispatcher ends a call.
    CallEnded {
        /// Call being ended.
        call_id: CallId,
    },
    /// Negotiation payload for the caller of `call_id`, forwarded verbatim.
    Relay {
        /// Call whose caller receives the payload.
        call_id: CallId,
        /// Raw frame text.
        raw: String,
    },
}

impl DashboardMessage {
    /// Classify a raw dashboard text frame. Every dashboard message must name
    /// the call it refers to.
    pub fn parse(raw: &str) -> Result<Self, CallError> {
        let value = parse_object(raw)?;
        let kind = message_type(&value)?;
        let call_id = value
            .get("call_id")
            .and_then(Value::as_str)
            .map(CallId::from)
            .ok_or_else(|| CallError::Protocol("missing call_id".into()))?;
        Ok(match kind {
            "dispatcher_joined" => Self::DispatcherJoined { call_id },
            "call_ended" => Self::CallEnded { call_id },
            _ => Self::Relay {
                call_id,
                raw: raw.to_owned(),
            },
        })
    }
}

/// A text frame on the media ingestion channel.
#[derive(Clone, Debug, Deserialize)]
struct FrameEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: Option<String>,
}

/// Extract the base64 image from a `{"type":"frame","data":...}` text frame.
///
/// Returns `None` for anything else; the media channel ignores such frames.
pub fn parse_frame(raw: &str) -> Option<String> {
    let envelope: FrameEnvelope = serde_json::from_str(raw).ok()?;
    if envelope.kind == "frame" {
        envelope.data
    } else {
        None
    }
}

/// One vitals reading as sent by the telemetry source.
///
/// The reading is opaque apart from the reserved `type` and `call_id` keys,
/// which are stripped so the outbound annotation cannot be overridden.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VitalsReading(Map<String, Value>);

impl VitalsReading {
    /// Parse a vitals text frame. The payload must be a JSON object.
    pub fn parse(raw: &str) -> Result<Self, CallError> {
        Ok(Self::from_map(parse_object(raw)?))
    }

    /// Wrap an already-parsed JSON object.
    pub fn from_map(mut fields: Map<String, Value>) -> Self {
        let _ = fields.remove("type");
        let _ = fields.remove("call_id");
        Self(fields)
    }

    /// Look up one field of the reading.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrow the reading's fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, CallError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CallError::Protocol("expected a JSON object".into())),
        Err(e) => Err(CallError::Protocol(format!("invalid JSON: {e}"))),
    }
}

fn message_type(value: &Map<String, Value>) -> Result<&str, CallError> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CallError::Protocol("missing message type".into()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Events the server pushes to dashboards and callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A new call is waiting to be answered (dashboard fan-out).
    IncomingCall {
        /// The waiting call.
        call_id: CallId,
        /// Where the caller is.
        location: Location,
    },
    /// A dispatcher answered (sent to the caller).
    DispatcherReady {
        /// The answered call.
        call_id: CallId,
    },
    /// A parsed triage report (dashboard).
    TriageUpdate {
        /// Call the report describes.
        call_id: CallId,
        /// Report object as produced by the inference collaborator.
        report: Value,
    },
    /// Out-of-band critical signal from a streaming inference session.
    CriticalFlag {
        /// Call that triggered the flag.
        call_id: CallId,
        /// Short reason given by the model.
        reason: String,
        /// Severity on the report's 1..=5 scale.
        severity: u8,
    },
    /// A vitals reading, annotated with the call it belongs to.
    Vitals {
        /// Call the reading belongs to.
        call_id: CallId,
        /// Original reading fields.
        #[serde(flatten)]
        reading: VitalsReading,
    },
    /// The call is over (both parties).
    CallEnded {
        /// The ended call.
        call_id: CallId,
        /// Why it ended.
        reason: String,
    },
}

impl OutboundEvent {
    /// Wire discriminator of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IncomingCall { .. } => "incoming_call",
            Self::DispatcherReady { .. } => "dispatcher_ready",
            Self::TriageUpdate { .. } => "triage_update",
            Self::CriticalFlag { .. } => "critical_flag",
            Self::Vitals { .. } => "vitals",
            Self::CallEnded { .. } => "call_ended",
        }
    }
}
