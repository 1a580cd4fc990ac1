//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CourierSettings::default()`]
//! 2. If a settings file was given and exists, deep-merge its values over defaults
//! 3. Apply `COURIER_*` environment variable overrides (highest priority)
//! 4. Validate the result

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::CourierSettings;

/// Load settings, optionally merging a JSON file over the defaults.
///
/// A path that does not exist yields defaults. A file with invalid JSON is
/// an error.
pub fn load_settings(path: Option<&Path>) -> Result<CourierSettings> {
    let defaults = serde_json::to_value(CourierSettings::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut settings: CourierSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
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

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut CourierSettings) {
    apply_env_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are logged and ignored, falling back to file/default.
pub fn apply_env_overrides_with<F>(settings: &mut CourierSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };
    let server = &mut settings.server;

    if let Some(v) = env.string("COURIER_HOST") {
        server.host = v;
    }
    if let Some(v) = env.parsed("COURIER_PORT", |s| parse_range::<u16>(s, 0, u16::MAX)) {
        server.port = v;
    }
    if let Some(v) = env.parsed("COURIER_MAX_CONNECTIONS", |s| parse_range(s, 1, 1_000_000)) {
        server.max_connections = v;
    }
    if let Some(v) = env.parsed("COURIER_SEND_QUEUE_CAPACITY", |s| parse_range(s, 1, 1_000_000)) {
        server.send_queue_capacity = v;
    }
    if let Some(v) = env.parsed("COURIER_HEARTBEAT_INTERVAL_SECS", |s| parse_range(s, 1, 3_600)) {
        server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.parsed("COURIER_HEARTBEAT_TIMEOUT_SECS", |s| parse_range(s, 1, 86_400)) {
        server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.parsed("COURIER_MAX_MESSAGE_SIZE", |s| parse_range(s, 1, 64 * 1024 * 1024)) {
        server.max_message_size = v;
    }

    let logging = &mut settings.logging;
    if let Some(v) = env.string("COURIER_LOG_LEVEL") {
        logging.level = v;
    }
    if let Some(v) = env.parsed("COURIER_LOG_JSON", parse_bool) {
        logging.json = v;
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

/// Parse a string as a number within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
