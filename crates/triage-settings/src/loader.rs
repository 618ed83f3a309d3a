//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TriageSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{Strategy, TriageSettings};

/// Resolve the default settings file.
///
/// `$TRIAGE_HOME/settings.json` when `TRIAGE_HOME` is set, otherwise
/// `~/.triage/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(home) = std::env::var_os("TRIAGE_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join("settings.json");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".triage").join("settings.json")
}

/// Load settings from `path` (or [`settings_path`]) with env var overrides.
pub fn load_settings(path: Option<&Path>) -> Result<TriageSettings> {
    match path {
        Some(p) => load_settings_from_path(p),
        None => load_settings_from_path(&settings_path()),
    }
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TriageSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<TriageSettings> {
    let defaults = serde_json::to_value(TriageSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(settings: &mut TriageSettings) {
    apply_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` to read variables.
///
/// Invalid values are ignored with a warning, leaving the file/default value.
pub fn apply_overrides_with(settings: &mut TriageSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    if let Some(v) = env.string("TRIAGE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("TRIAGE_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("TRIAGE_STRATEGY", Strategy::parse) {
        settings.triage.strategy = v;
    }
    if let Some(v) = env.parsed("TRIAGE_WINDOW_SECS", |s| parse_u64_range(s, 1, 3600)) {
        settings.triage.window_secs = v;
    }
    if let Some(v) = env.string("TRIAGE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("TRIAGE_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
    if let Some(v) = env.string("GEMINI_API_KEY") {
        settings.gemini.api_key = Some(v);
    }
    if let Some(v) = env.string("GEMINI_MODEL") {
        settings.gemini.model = v;
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = self.string(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> TriageSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut settings = TriageSettings::default();
        apply_overrides_with(&mut settings, |name| vars.get(name).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"triage": {"windowSecs": 10, "strategy": "windowed"}});
        let source = serde_json::json!({"triage": {"windowSecs": 5}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["triage"]["windowSecs"], 5);
        assert_eq!(merged["triage"]["strategy"], "windowed");
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_and_primitive_replace() {
        let target = serde_json::json!({"items": [1, 2, 3], "a": {"nested": true}});
        let source = serde_json::json!({"items": [4], "a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
        assert_eq!(merged["a"], 42);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let settings = read_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.triage.strategy, Strategy::Windowed);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9000}, "triage": {"strategy": "streaming", "windowSecs": 4}}"#,
        )
        .unwrap();

        let settings = read_file_layer(&path).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.triage.strategy, Strategy::Streaming);
        assert_eq!(settings.triage.window_secs, 4);
        assert_eq!(settings.triage.media_queue_capacity, 500);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(read_file_layer(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn invalid_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"triage": {"mediaQueueCapacity": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let s = overrides(&[
            ("TRIAGE_HOST", "127.0.0.1"),
            ("TRIAGE_PORT", "9443"),
            ("TRIAGE_STRATEGY", "streaming"),
            ("TRIAGE_WINDOW_SECS", "3"),
            ("TRIAGE_LOG_LEVEL", "debug"),
            ("TRIAGE_LOG_JSON", "yes"),
            ("GEMINI_API_KEY", "k-123"),
            ("GEMINI_MODEL", "gemini-x"),
        ]);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 9443);
        assert_eq!(s.triage.strategy, Strategy::Streaming);
        assert_eq!(s.triage.window_secs, 3);
        assert_eq!(s.logging.level, "debug");
        assert!(s.logging.json);
        assert_eq!(s.gemini.api_key.as_deref(), Some("k-123"));
        assert_eq!(s.gemini.model, "gemini-x");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let s = overrides(&[
            ("TRIAGE_PORT", "0"),
            ("TRIAGE_STRATEGY", "batch"),
            ("TRIAGE_WINDOW_SECS", "soon"),
            ("GEMINI_API_KEY", ""),
        ]);
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.triage.strategy, Strategy::Windowed);
        assert_eq!(s.triage.window_secs, 10);
        assert!(s.gemini.api_key.is_none());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_helpers() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("0", 1, 10), None);
    }
}
