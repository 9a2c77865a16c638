//! Layered settings: built-in defaults, then an optional file, then
//! `STREAMPULSE_*` environment variables.
//!
//! ```toml
//! source_url = "http://localhost:8000/events"
//! log_level = "debug"
//! interval = "1s"
//! latency_target_ms = 80.0
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::duration::{parse_duration, DurationError};
use crate::health::Thresholds;

/// Prefix of environment variables that override settings.
pub const ENV_PREFIX: &str = "STREAMPULSE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the watcher connects to.
    pub source_url: String,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
    /// Snapshots kept by the watcher.
    pub history_size: usize,
    /// Anomaly events kept by the watcher.
    pub anomaly_log_size: usize,
    /// Emission interval, e.g. "2s".
    pub interval: String,
    pub throughput_target: f64,
    pub latency_target_ms: f64,
    pub error_rate_warning: f64,
    pub error_rate_critical: f64,
    pub anomaly_probability: f64,
    /// NDJSON listener address for `serve`.
    pub tcp_bind: String,
    /// HTTP listener address for `serve`; empty disables it.
    pub http_bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_url: "tcp://127.0.0.1:8001".to_string(),
            log_level: "info".to_string(),
            history_size: 100,
            anomaly_log_size: 20,
            interval: "2s".to_string(),
            throughput_target: 5000.0,
            latency_target_ms: Thresholds::LATENCY_TARGET_MS,
            error_rate_warning: 1.0,
            error_rate_critical: 5.0,
            anomaly_probability: 0.1,
            tcp_bind: "127.0.0.1:8001".to_string(),
            http_bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Settings {
    /// Load settings, reading `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn interval(&self) -> Result<Duration, DurationError> {
        parse_duration(&self.interval)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            error_rate_warning: self.error_rate_warning,
            error_rate_critical: self.error_rate_critical,
            throughput_target: self.throughput_target,
            ..Thresholds::for_latency_target(self.latency_target_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    #[test]
    fn defaults_without_file() {
        let settings = Settings::load_with_env(None, no_env()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.interval().unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "source_url = \"http://localhost:8000/events\"").unwrap();
        writeln!(file, "history_size = 50").unwrap();
        writeln!(file, "interval = \"500ms\"").unwrap();

        let settings = Settings::load_with_env(Some(file.path()), no_env()).unwrap();
        assert_eq!(settings.source_url, "http://localhost:8000/events");
        assert_eq!(settings.history_size, 50);
        assert_eq!(settings.interval().unwrap(), Duration::from_millis(500));
        assert_eq!(settings.anomaly_log_size, 20);
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "log_level = \"warn\"").unwrap();

        let env = Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::from([
            ("STREAMPULSE_LOG_LEVEL".to_string(), "debug".to_string()),
            ("STREAMPULSE_THROUGHPUT_TARGET".to_string(), "4000".to_string()),
        ])));

        let settings = Settings::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.throughput_target, 4000.0);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Settings::load_with_env(Some(&path), no_env()).is_err());
    }

    #[test]
    fn thresholds_follow_settings() {
        let settings = Settings {
            latency_target_ms: 80.0,
            error_rate_critical: 3.0,
            ..Settings::default()
        };
        let thresholds = settings.thresholds();
        assert_eq!(thresholds.latency_warning_ms, 80.0);
        assert_eq!(thresholds.latency_critical_ms, 160.0);
        assert_eq!(thresholds.error_rate_critical, 3.0);
    }
}
