//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If a settings file is given, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use relay_runtime::RuntimeConfig;
use relay_telemetry::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Level;

use crate::config::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

const RESPONSE_TIMEOUT_SECS: (u64, u64) = (1, 3600);

/// Log output settings as they appear in the settings file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
    /// Per-module level overrides, e.g. `{"relay_runtime": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Json,
            modules: BTreeMap::new(),
        }
    }
}

impl LoggingSettings {
    pub fn to_telemetry_config(&self) -> Result<TelemetryConfig> {
        let log_level = parse_level(&self.level)?;
        let module_levels = self
            .modules
            .iter()
            .map(|(module, level)| Ok((module.clone(), parse_level(level)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(TelemetryConfig {
            log_level,
            module_levels,
            format: self.format,
        })
    }
}

fn parse_level(s: &str) -> Result<Level> {
    Level::from_str(s).map_err(|_| SettingsError::InvalidValue(format!("log level `{s}`")))
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load from an optional file, then apply process environment overrides.
    ///
    /// A missing path yields defaults. A path that does not exist or holds
    /// invalid JSON is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Deep-merge the file's values over the defaults. No env overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let defaults = serde_json::to_value(Self::default())?;
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        let settings: Self = serde_json::from_value(deep_merge(defaults, user))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Range checks shared with the env overrides.
    pub fn validate(&self) -> Result<()> {
        let (min, max) = RESPONSE_TIMEOUT_SECS;
        let secs = self.runtime.response_timeout_secs;
        if !(min..=max).contains(&secs) {
            return Err(SettingsError::InvalidValue(format!(
                "runtime.response_timeout_secs {secs} not in {min}..={max}"
            )));
        }
        Ok(())
    }

    /// Apply overrides read through `lookup`. Invalid values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for key in ["PORT", "RELAY_PORT"] {
            if let Some(raw) = read(key) {
                match parse_u16_range(&raw, 1, 65535) {
                    Some(port) => self.server.port = port,
                    None => ignore(key, &raw),
                }
            }
        }
        if let Some(host) = read("RELAY_HOST") {
            self.server.host = host;
        }
        if let Some(raw) = read("RELAY_RESPONSE_TIMEOUT_SECS") {
            let (min, max) = RESPONSE_TIMEOUT_SECS;
            match parse_u64_range(&raw, min, max) {
                Some(secs) => self.runtime.response_timeout_secs = secs,
                None => ignore("RELAY_RESPONSE_TIMEOUT_SECS", &raw),
            }
        }
        if let Some(raw) = read("RELAY_LOG_FORMAT") {
            match raw.parse::<LogFormat>() {
                Ok(format) => self.logging.format = format,
                Err(_) => ignore("RELAY_LOG_FORMAT", &raw),
            }
        }
    }
}

fn ignore(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env override, ignoring");
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key. Arrays and primitives from `source` replace the
/// target. Nulls in `source` leave the target untouched.
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
                target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn deep_merge_overrides_nested_keys_only() {
        let merged = deep_merge(
            json!({"server": {"port": 8080, "host": "0.0.0.0"}, "runtime": {"response_timeout_secs": 10}}),
            json!({"server": {"port": 9000}}),
        );
        assert_eq!(merged["server"]["port"], 9000);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
        assert_eq!(merged["runtime"]["response_timeout_secs"], 10);
    }

    #[test]
    fn deep_merge_skips_nulls_and_replaces_arrays() {
        let merged = deep_merge(json!({"a": 1, "b": [1, 2]}), json!({"a": null, "b": [3]}));
        assert_eq!(merged, json!({"a": 1, "b": [3]}));
    }

    #[test]
    fn load_without_file_gives_defaults() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(env(&[]));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server": {{"port": 9100}}, "runtime": {{"response_timeout_secs": 4}}, "logging": {{"format": "pretty"}}}}"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.max_send_queue, 256);
        assert_eq!(settings.runtime.response_timeout_secs, 4);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn invalid_json_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            Settings::from_file(file.path()),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn out_of_range_timeout_in_file_is_rejected() {
        for secs in [0, 3601] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(file, r#"{{"runtime": {{"response_timeout_secs": {secs}}}}}"#).unwrap();
            assert!(matches!(
                Settings::from_file(file.path()),
                Err(SettingsError::InvalidValue(_))
            ));
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"runtime": {{"response_timeout_secs": 3600}}}}"#).unwrap();
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.runtime.response_timeout_secs, 3600);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Settings::from_file(&dir.path().join("absent.json")),
            Err(SettingsError::Io(_))
        ));
    }

    #[test]
    fn env_overrides_win() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(env(&[
            ("PORT", "7000"),
            ("RELAY_HOST", "127.0.0.1"),
            ("RELAY_RESPONSE_TIMEOUT_SECS", "20"),
            ("RELAY_LOG_FORMAT", "pretty"),
        ]));
        assert_eq!(settings.server.bind_addr(), "127.0.0.1:7000");
        assert_eq!(settings.runtime.response_timeout_secs, 20);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn relay_port_beats_port() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(env(&[("PORT", "7000"), ("RELAY_PORT", "7001")]));
        assert_eq!(settings.server.port, 7001);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(env(&[
            ("PORT", "0"),
            ("RELAY_PORT", "not-a-port"),
            ("RELAY_RESPONSE_TIMEOUT_SECS", "-1"),
            ("RELAY_LOG_FORMAT", "xml"),
            ("RELAY_HOST", "  "),
        ]));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn logging_settings_build_telemetry_config() {
        let logging = LoggingSettings {
            level: "warn".into(),
            format: LogFormat::Pretty,
            modules: BTreeMap::from([("relay_runtime".to_string(), "debug".to_string())]),
        };
        let config = logging.to_telemetry_config().unwrap();
        assert_eq!(config.filter_directive(), "warn,relay_runtime=debug");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let logging = LoggingSettings {
            level: "loud".into(),
            ..Default::default()
        };
        assert!(matches!(
            logging.to_telemetry_config(),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn range_parsers() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range(" 10 ", 1, 3600), Some(10));
        assert_eq!(parse_u64_range("3601", 1, 3600), None);
    }
}
