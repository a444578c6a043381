//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `PARLEY_*` environment variable overrides
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{LogLevel, ParleySettings};

/// Env var naming an explicit settings file.
pub const CONFIG_ENV: &str = "PARLEY_CONFIG";

/// Resolve the settings file path: `$PARLEY_CONFIG`, else `~/.parley/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string(CONFIG_ENV) {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ParleySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid value is an
/// error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<ParleySettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

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

/// Reject settings the server cannot run with.
pub fn validate(settings: &ParleySettings) -> Result<()> {
    if settings.chat.history_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "chat.historyCapacity must be at least 1".into(),
        ));
    }
    if settings.server.send_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.sendQueueCapacity must be at least 1".into(),
        ));
    }
    if settings.server.max_connections == 0 {
        return Err(SettingsError::InvalidValue(
            "server.maxConnections must be at least 1".into(),
        ));
    }
    if settings.server.heartbeat_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatIntervalSecs must be at least 1".into(),
        ));
    }
    if settings.server.heartbeat_timeout_secs < settings.server.heartbeat_interval_secs {
        return Err(SettingsError::InvalidValue(format!(
            "server.heartbeatTimeoutSecs ({}) must not be shorter than heartbeatIntervalSecs ({})",
            settings.server.heartbeat_timeout_secs, settings.server.heartbeat_interval_secs
        )));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut ParleySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides(settings: &mut ParleySettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("PARLEY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env
        .u16("PARLEY_PORT", 0, 65535)
        .or_else(|| env.u16("PORT", 0, 65535))
    {
        settings.server.port = v;
    }
    if let Some(v) = env.string("PARLEY_ALLOWED_ORIGINS") {
        let origins = parse_list(&v);
        if origins.is_empty() {
            warn!(key = "PARLEY_ALLOWED_ORIGINS", value = %v, "empty origin list, ignoring");
        } else {
            settings.server.allowed_origins = origins;
        }
    }
    if let Some(v) = env.usize("PARLEY_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }

    // ── Chat ────────────────────────────────────────────────────────
    if let Some(v) = env.usize("PARLEY_HISTORY_CAPACITY", 1, 1_000_000) {
        settings.chat.history_capacity = v;
    }
    if let Some(v) = env.usize("PARLEY_MAX_TEXT_LENGTH", 1, 1_000_000) {
        settings.chat.max_text_length = v;
    }
    if let Some(v) = env.usize("PARLEY_MAX_USERNAME_LENGTH", 1, 1_024) {
        settings.chat.max_username_length = v;
    }

    // ── Logging / metrics ───────────────────────────────────────────
    if let Some(v) = env.string("PARLEY_LOG_LEVEL") {
        match LogLevel::parse(&v) {
            Some(level) => settings.logging.level = level,
            None => warn!(key = "PARLEY_LOG_LEVEL", value = %v, "invalid log level, ignoring"),
        }
    }
    if let Some(v) = env.bool("PARLEY_LOG_JSON") {
        settings.logging.json = v;
    }
    if let Some(v) = env.string("PARLEY_METRICS_ADDR") {
        settings.metrics.listen_addr = Some(v);
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

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

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, trimming entries and dropping empties.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ── Variable readers (thin wrappers) ────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::ANY_ORIGIN;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 4000, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"allowedOrigins": ["*"]});
        let source = serde_json::json!({"allowedOrigins": ["https://a", "https://b"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["allowedOrigins"], serde_json::json!(["https://a", "https://b"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let merged = deep_merge(target, serde_json::json!({"a": 42}));
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, ParleySettings::default());
    }

    #[test]
    fn load_empty_json_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(load_file_layer(&path).unwrap(), ParleySettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 8088, "allowedOrigins": ["https://chat.example"]},
                "chat": {"historyCapacity": 50},
                "logging": {"level": "debug"}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.server.port, 8088);
        assert_eq!(settings.server.allowed_origins, ["https://chat.example"]);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.chat.history_capacity, 50);
        assert_eq!(settings.chat.max_text_length, 2_000);
        assert_eq!(settings.logging.level, LogLevel::Debug);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_file_layer(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn load_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": "high"}}"#).unwrap();
        assert!(load_file_layer(&path).is_err());
    }

    // ── validate ────────────────────────────────────────────────────

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&ParleySettings::default()).is_ok());
    }

    #[test]
    fn zero_history_capacity_is_rejected() {
        let mut settings = ParleySettings::default();
        settings.chat.history_capacity = 0;
        let err = validate(&settings).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue(_)));
        assert!(err.to_string().contains("historyCapacity"));
    }

    #[test]
    fn zero_history_capacity_in_file_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"chat": {"historyCapacity": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::InvalidValue(_)
        ));
    }

    #[test]
    fn heartbeat_timeout_shorter_than_interval_is_rejected() {
        let mut settings = ParleySettings::default();
        settings.server.heartbeat_interval_secs = 60;
        settings.server.heartbeat_timeout_secs = 10;
        assert!(validate(&settings).is_err());
    }

    // ── apply_overrides ─────────────────────────────────────────────

    #[test]
    fn overrides_apply_to_every_section() {
        let mut settings = ParleySettings::default();
        apply_overrides(
            &mut settings,
            vars(&[
                ("PARLEY_HOST", "127.0.0.1"),
                ("PARLEY_PORT", "5000"),
                ("PARLEY_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
                ("PARLEY_MAX_CONNECTIONS", "10"),
                ("PARLEY_HISTORY_CAPACITY", "20"),
                ("PARLEY_MAX_TEXT_LENGTH", "300"),
                ("PARLEY_MAX_USERNAME_LENGTH", "16"),
                ("PARLEY_LOG_LEVEL", "warn"),
                ("PARLEY_LOG_JSON", "yes"),
                ("PARLEY_METRICS_ADDR", "127.0.0.1:9100"),
            ]),
        );
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 5000);
        assert_eq!(
            settings.server.allowed_origins,
            ["https://a.example", "https://b.example"]
        );
        assert_eq!(settings.server.max_connections, 10);
        assert_eq!(settings.chat.history_capacity, 20);
        assert_eq!(settings.chat.max_text_length, 300);
        assert_eq!(settings.chat.max_username_length, 16);
        assert_eq!(settings.logging.level, LogLevel::Warn);
        assert!(settings.logging.json);
        assert_eq!(settings.metrics.listen_addr.as_deref(), Some("127.0.0.1:9100"));
    }

    #[test]
    fn plain_port_is_a_fallback() {
        let mut settings = ParleySettings::default();
        apply_overrides(&mut settings, vars(&[("PORT", "8123")]));
        assert_eq!(settings.server.port, 8123);

        let mut settings = ParleySettings::default();
        apply_overrides(
            &mut settings,
            vars(&[("PORT", "8123"), ("PARLEY_PORT", "9000")]),
        );
        assert_eq!(settings.server.port, 9000);
    }

    #[test]
    fn invalid_values_are_ignored() {
        let mut settings = ParleySettings::default();
        apply_overrides(
            &mut settings,
            vars(&[
                ("PARLEY_PORT", "99999"),
                ("PARLEY_HISTORY_CAPACITY", "0"),
                ("PARLEY_LOG_LEVEL", "shouty"),
                ("PARLEY_LOG_JSON", "maybe"),
                ("PARLEY_ALLOWED_ORIGINS", " , "),
            ]),
        );
        assert_eq!(settings, ParleySettings::default());
        assert_eq!(settings.server.allowed_origins, [ANY_ORIGIN]);
    }

    #[test]
    fn no_vars_changes_nothing() {
        let mut settings = ParleySettings::default();
        apply_overrides(&mut settings, |_| None);
        assert_eq!(settings, ParleySettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("4000", 1, 65535), Some(4000));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u16_range("port", 1, 65535), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("200", 1, 1000), Some(200));
        assert_eq!(parse_usize_range("0", 1, 1000), None);
    }

    #[test]
    fn parse_list_trims_and_drops_empties() {
        assert_eq!(parse_list("a, b,,c "), ["a", "b", "c"]);
        assert!(parse_list(" , ").is_empty());
    }
}
