//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SpinfeedSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `SPINFEED_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{AuthMode, FeedMode, SpinfeedSettings};

/// Resolve the settings file path: `$SPINFEED_SETTINGS` or `settings.json`
/// in the working directory.
pub fn settings_path() -> PathBuf {
    std::env::var("SPINFEED_SETTINGS")
        .map_or_else(|_| PathBuf::from("settings.json"), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SpinfeedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SpinfeedSettings> {
    let defaults = serde_json::to_value(SpinfeedSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SpinfeedSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
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
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are logged and ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut SpinfeedSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_u16("SPINFEED_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_string("SPINFEED_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u64("SPINFEED_HEARTBEAT_INTERVAL_MS", 1_000, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_u64("SPINFEED_HEARTBEAT_TIMEOUT_FACTOR", 1, 10) {
        settings.server.heartbeat_timeout_factor = u32::try_from(v).unwrap_or(2);
    }
    if let Some(v) = read_env_usize("SPINFEED_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SPINFEED_AUTH_MODE") {
        match parse_auth_mode(&v) {
            Some(mode) => settings.auth.mode = mode,
            None => tracing::warn!(value = %v, "invalid SPINFEED_AUTH_MODE, ignoring"),
        }
    }
    if let Some(v) = read_env_string("SPINFEED_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = read_env_u64("SPINFEED_RESOLVE_TIMEOUT_MS", 100, 60_000) {
        settings.auth.resolve_timeout_ms = v;
    }

    // ── Ingest ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("SPINFEED_INGEST_MODE") {
        match parse_feed_mode(&v) {
            Some(mode) => settings.ingest.mode = mode,
            None => tracing::warn!(value = %v, "invalid SPINFEED_INGEST_MODE, ignoring"),
        }
    }
    if let Some(v) = read_env_u64("SPINFEED_POLL_INTERVAL_MS", 50, 600_000) {
        settings.ingest.poll_interval_ms = v;
    }
    if let Some(v) = read_env_u64("SPINFEED_BATCH_LIMIT", 1, 65_536) {
        settings.ingest.batch_limit = u32::try_from(v).unwrap_or(256);
    }
    if let Some(v) = read_env_u64("SPINFEED_RETRY_DELAY_MS", 100, 600_000) {
        settings.ingest.retry_delay_ms = v;
    }

    // ── Seal / store ────────────────────────────────────────────────
    if let Some(v) = read_env_bool("SPINFEED_SEAL_ENABLED") {
        settings.seal.enabled = v;
    }
    if let Some(v) = read_env_string("SPINFEED_SEAL_KEY_PATH") {
        settings.seal.key_path = v;
    }
    if let Some(v) = read_env_string("SPINFEED_DB_PATH") {
        settings.store.db_path = v;
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

/// Parse an admission mode name.
pub fn parse_auth_mode(val: &str) -> Option<AuthMode> {
    match val.to_lowercase().as_str() {
        "strict" => Some(AuthMode::Strict),
        "degraded" => Some(AuthMode::Degraded),
        _ => None,
    }
}

/// Parse a feed mode name.
pub fn parse_feed_mode(val: &str) -> Option<FeedMode> {
    match val.to_lowercase().as_str() {
        "poll" => Some(FeedMode::Poll),
        "notified" => Some(FeedMode::Notified),
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

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": 10});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 10);
        assert_eq!(merged["b"], 2);
    }

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
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
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
        let path = Path::new("/nonexistent/settings.json");
        let settings = load_settings_from_path(path).unwrap();
        let defaults = SpinfeedSettings::default();
        assert_eq!(settings.version, defaults.version);
        assert_eq!(settings.server.port, defaults.server.port);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "ingest": {"batchLimit": 64}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.ingest.batch_limit, 64);
        assert_eq!(settings.server.heartbeat_interval_ms, 25_000);
        assert_eq!(settings.ingest.poll_interval_ms, 1_000);
    }

    #[test]
    fn load_tier_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"tiers": {"version": 3, "basic": {"max_visible_channels": 4, "history_depth": 20, "live_access": true}}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.tiers.version, 3);
        assert_eq!(settings.tiers.basic.max_visible_channels, Some(4));
        assert_eq!(settings.tiers.pro.max_visible_channels, Some(5));
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "No"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_auth_mode_names() {
        assert_eq!(parse_auth_mode("strict"), Some(AuthMode::Strict));
        assert_eq!(parse_auth_mode("DEGRADED"), Some(AuthMode::Degraded));
        assert_eq!(parse_auth_mode("open"), None);
    }

    #[test]
    fn parse_feed_mode_names() {
        assert_eq!(parse_feed_mode("poll"), Some(FeedMode::Poll));
        assert_eq!(parse_feed_mode("Notified"), Some(FeedMode::Notified));
        assert_eq!(parse_feed_mode("push"), None);
    }

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("not_a_number", 1, 65535), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("30000", 1000, 600_000), Some(30_000));
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_u64_range("700000", 1000, 600_000), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("50", 1, 10_000), Some(50));
        assert_eq!(parse_usize_range("0", 1, 10_000), None);
    }
}
