//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FanhubSettings::default()`]
//! 2. If `~/.fanhub/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `FANHUB_*` environment variable overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::FanhubSettings;

/// Resolve the path to the settings file (`~/.fanhub/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".fanhub").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FanhubSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a value that fails
/// [`FanhubSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<FanhubSettings> {
    let defaults = serde_json::to_value(FanhubSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: FanhubSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored, leaving the file/default value.
pub fn apply_env_overrides(settings: &mut FanhubSettings) {
    if let Some(v) = read_env_string("FANHUB_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("FANHUB_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("FANHUB_API_KEY") {
        settings.server.api_key = v;
    }
    if let Some(v) = read_env_usize("FANHUB_MAX_CONNECTIONS", 0, 1_000_000) {
        settings.server.max_connections = v;
    }

    if let Some(v) = read_env_u64("FANHUB_WRITE_TIMEOUT_MS", 1, 600_000) {
        settings.hub.write_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("FANHUB_INTAKE_CAPACITY", 0, 10_000_000) {
        settings.hub.intake_capacity = intake_capacity_from(v);
    }
    if let Some(v) = read_env_enum("FANHUB_OVERFLOW_POLICY") {
        settings.hub.overflow_policy = v;
    }

    if let Some(v) = read_env_bool("FANHUB_HEARTBEAT_ENABLED") {
        settings.heartbeat.enabled = v;
    }
    if let Some(v) = read_env_u64("FANHUB_HEARTBEAT_INTERVAL_MS", 1, 3_600_000) {
        settings.heartbeat.interval_ms = v;
    }

    if let Some(v) = read_env_enum("FANHUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_enum("FANHUB_LOG_FORMAT") {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Map an intake capacity override to the setting value (`0` = unbounded).
pub fn intake_capacity_from(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

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

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as one of the serde-named variants of `T`.
pub fn parse_enum<T: DeserializeOwned>(val: &str) -> Option<T> {
    serde_json::from_value(Value::String(val.to_string())).ok()
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn read_env_enum<T: DeserializeOwned>(name: &str) -> Option<T> {
    let val = read_env_string(name)?;
    let result = parse_enum(&val.to_lowercase()).or_else(|| parse_enum(&val));
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "unrecognized env var value, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use crate::types::{LogFormat, LogLevel, OverflowPolicy};

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "server": {"port": 8080, "host": "localhost"}
        });
        let source = serde_json::json!({
            "server": {"port": 9090}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_new_keys_added() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/fanhub/settings.json");
        let settings = load_settings_from_path(path).unwrap();
        let defaults = FanhubSettings::default();
        assert_eq!(settings.hub.write_timeout_ms, defaults.hub.write_timeout_ms);
        assert_eq!(settings.heartbeat.payload, defaults.heartbeat.payload);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"hub": {"intakeCapacity": 64, "overflowPolicy": "dropOldest"}, "heartbeat": {"intervalMs": 250}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.hub.intake_capacity, Some(64));
        assert_eq!(settings.hub.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(settings.heartbeat.interval_ms, 250);
        assert_eq!(settings.hub.write_timeout_ms, 5000);
        assert_eq!(settings.heartbeat.payload, "Hello clients");
    }

    #[test]
    fn load_logging_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"logging": {"level": "debug", "format": "json"}}"#).unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_invalid_value_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"hub": {"writeTimeoutMs": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(
            result.unwrap_err(),
            SettingsError::InvalidValue(_)
        ));
    }

    #[test]
    fn load_wrong_type_returns_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "eighty"}}"#).unwrap();

        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    // ── pure parsers ────────────────────────────────────────────────

    #[test]
    fn intake_capacity_zero_means_unbounded() {
        assert_eq!(intake_capacity_from(0), None);
        assert_eq!(intake_capacity_from(128), Some(128));
    }

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE", "On"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "FALSE", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_u16_allows_ephemeral_port() {
        assert_eq!(parse_u16_range("0", 0, 65535), Some(0));
        assert_eq!(parse_u16_range("8080", 0, 65535), Some(8080));
        assert_eq!(parse_u16_range("99999", 0, 65535), None);
        assert_eq!(parse_u16_range("http", 0, 65535), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("5000", 1, 600_000), Some(5000));
        assert_eq!(parse_u64_range("0", 1, 600_000), None);
        assert_eq!(parse_u64_range("700000", 1, 600_000), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("50", 0, 10_000), Some(50));
        assert_eq!(parse_usize_range("20000", 0, 10_000), None);
    }

    #[test]
    fn parse_enum_variants() {
        assert_eq!(
            parse_enum::<OverflowPolicy>("dropNewest"),
            Some(OverflowPolicy::DropNewest)
        );
        assert_eq!(parse_enum::<LogLevel>("warn"), Some(LogLevel::Warn));
        assert_eq!(parse_enum::<LogFormat>("json"), Some(LogFormat::Json));
        assert_eq!(parse_enum::<LogFormat>("yaml"), None);
    }
}
