//! Triage report helpers.
//!
//! Reports are opaque JSON objects produced by the inference collaborator.
//! The pipeline only needs two things from them: pulling the object out of a
//! free-text model response, and reading `situation_summary` to feed the
//! next round. [`TriageReport`] exists for the one report the server writes
//! itself, the degraded placeholder.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller's emotional state as assessed by the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalState {
    /// Composed and coherent.
    Calm,
    /// Upset but communicating.
    Distressed,
    /// Unable to communicate coherently.
    Panicked,
    /// Not responding.
    Unresponsive,
    /// No assessment available.
    Unknown,
}

/// Responder type the model recommends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// EMS.
    Medical,
    /// Law enforcement.
    Police,
    /// Fire service.
    Fire,
    /// No recommendation.
    Unknown,
}

/// The triage report schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriageReport {
    /// One-paragraph description of what is happening.
    pub situation_summary: String,
    /// Salient words or phrases heard on the call.
    pub detected_keywords: Vec<String>,
    /// Caller's emotional state.
    pub caller_emotional_state: EmotionalState,
    /// Recommended responder.
    pub recommended_response_type: ResponseType,
    /// 1 (low) to 5 (critical); 0 marks a placeholder.
    pub severity: u8,
    /// Whether the caller appears able to talk.
    pub can_speak: bool,
}

impl TriageReport {
    /// Placeholder published when a round fails, so the dashboard never
    /// stalls waiting for a report. `error_class` is a short failure name.
    #[must_use]
    pub fn degraded(error_class: &str) -> Self {
        Self {
            situation_summary: format!("AI analysis error, retrying... ({error_class})"),
            detected_keywords: Vec::new(),
            caller_emotional_state: EmotionalState::Unknown,
            recommended_response_type: ResponseType::Unknown,
            severity: 0,
            can_speak: true,
        }
    }

    /// Convert to the opaque JSON form used on the wire.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Extract the JSON object spanning the first `{` and the last `}` of `text`.
///
/// Models often wrap their answer in prose or code fences; this strips that.
/// Returns `None` when there is no brace pair or the span is not a valid
/// JSON object.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Read `situation_summary` from a parsed report.
#[must_use]
pub fn situation_summary(report: &Value) -> Option<&str> {
    report.get("situation_summary").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn extracts_object_from_fenced_response() {
        let text = "Here you go:\n```json\n{\"situation_summary\":\"fall\",\"severity\":3}\n```";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["severity"], 3);
        assert_eq!(situation_summary(&value), Some("fall"));
    }

    #[test]
    fn nested_objects_survive() {
        let text = r#"{"a":{"b":1},"c":[{"d":2}]} trailing"#;
        assert_eq!(
            extract_json_object(text).unwrap(),
            json!({"a": {"b": 1}, "c": [{"d": 2}]})
        );
    }

    #[test]
    fn no_braces_or_reversed_braces() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("} then {").is_none());
        assert!(extract_json_object("{ not json }").is_none());
    }

    #[test]
    fn degraded_report_shape() {
        let value = TriageReport::degraded("Timeout").to_value();
        assert_eq!(
            value,
            json!({
                "situation_summary": "AI analysis error, retrying... (Timeout)",
                "detected_keywords": [],
                "caller_emotional_state": "unknown",
                "recommended_response_type": "unknown",
                "severity": 0,
                "can_speak": true
            })
        );
    }

    #[test]
    fn summary_missing_or_non_string() {
        assert_eq!(situation_summary(&json!({})), None);
        assert_eq!(situation_summary(&json!({"situation_summary": 4})), None);
    }

    #[test]
    fn full_report_deserializes() {
        let report: TriageReport = serde_json::from_value(json!({
            "situation_summary": "Caller reports chest pain",
            "detected_keywords": ["chest", "pain"],
            "caller_emotional_state": "distressed",
            "recommended_response_type": "medical",
            "severity": 4,
            "can_speak": true
        }))
        .unwrap();
        assert_eq!(report.caller_emotional_state, EmotionalState::Distressed);
        assert_eq!(report.recommended_response_type, ResponseType::Medical);
    }

    proptest! {
        #[test]
        fn extraction_never_panics(s in ".*") {
            let _ = extract_json_object(&s);
        }

        #[test]
        fn wrapped_object_is_recovered(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}", n in 0u8..=5) {
            let text = format!("{prefix}{{\"severity\":{n}}}{suffix}");
            let value = extract_json_object(&text).unwrap();
            prop_assert_eq!(value["severity"].as_u64(), Some(u64::from(n)));
        }
    }
}
