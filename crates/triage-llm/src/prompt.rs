//! Prompt text for triage inference.

/// System instruction for one-shot triage requests.
pub const TRIAGE_SYSTEM_PROMPT: &str = r#"You are an AI emergency triage assistant analyzing a 911 call audio clip.
Output ONLY a JSON object with no preamble, no markdown, and no extra text:
{
  "situation_summary": "one sentence description",
  "detected_keywords": ["list", "of", "keywords"],
  "caller_emotional_state": "calm|distressed|panicked|unresponsive",
  "recommended_response_type": "medical|police|fire|unknown",
  "severity": 1,
  "can_speak": true
}
Severity: 1=minor, 2=moderate, 3=urgent, 4=serious, 5=life-threatening.
Keep output under 100 tokens. Speed over verbosity."#;

/// System instruction for duplex sessions. The model listens continuously,
/// emits an updated report after each utterance, and calls `flag_critical`
/// the moment it hears a life-threatening situation.
pub const LIVE_SYSTEM_PROMPT: &str = r#"You are an AI emergency triage assistant listening live to a 911 call.
After each caller utterance, output ONLY an updated JSON object with no preamble, no markdown, and no extra text:
{
  "situation_summary": "one sentence description",
  "detected_keywords": ["list", "of", "keywords"],
  "caller_emotional_state": "calm|distressed|panicked|unresponsive",
  "recommended_response_type": "medical|police|fire|unknown",
  "severity": 1,
  "can_speak": true
}
Severity: 1=minor, 2=moderate, 3=urgent, 4=serious, 5=life-threatening.
If you hear a life-threatening situation (not breathing, unconscious, weapon, fire spreading), call flag_critical immediately before writing the report."#;

/// Name of the function a duplex session calls to raise a critical flag.
pub const FLAG_CRITICAL_FN: &str = "flag_critical";

/// Build the user prompt for one windowed round.
///
/// `round` is 1-based. A previous summary, when present, is carried as
/// context so consecutive rounds refine one assessment.
pub fn window_prompt(previous_summary: Option<&str>, round: u32, frame_attached: bool) -> String {
    let mut prompt = match previous_summary.filter(|s| !s.is_empty()) {
        Some(summary) => format!(
            "Previous analysis: {summary}\n\nNew audio segment (update #{round}). \
             Update your triage based on this new audio. Output triage JSON."
        ),
        None => "Analyze this 911 call audio clip and output triage JSON.".to_string(),
    };
    if frame_attached {
        prompt.push_str(" A camera frame from the caller is also attached.");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_round_prompt() {
        assert_eq!(
            window_prompt(None, 1, false),
            "Analyze this 911 call audio clip and output triage JSON."
        );
    }

    #[test]
    fn empty_summary_counts_as_none() {
        assert_eq!(window_prompt(Some(""), 2, false), window_prompt(None, 2, false));
    }

    #[test]
    fn follow_up_prompt_carries_summary_and_round() {
        let p = window_prompt(Some("Caller reports a fall"), 3, true);
        assert!(p.starts_with("Previous analysis: Caller reports a fall\n\n"));
        assert!(p.contains("update #3"));
        assert!(p.ends_with("A camera frame from the caller is also attached."));
    }
}
