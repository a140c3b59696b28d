//! Configuration record consumed by the core (spec.md §6.5), loaded from an
//! optional TOML file layered under environment variables, following the
//! figment-based pattern used elsewhere in this codebase.
//!
//! Environment variables are prefixed `XDF_RECORDER_`, e.g.
//! `XDF_RECORDER_PORT=9000`.

use crate::error::RecorderError;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

/// All options are optional; defaults match spec.md §6.5 exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub buffer_seconds: f64,
    pub max_samples_per_pull: usize,
    pub pull_timeout_s: f64,
    pub clock_sync_interval_s: f64,
    pub discovery_timeout_s: f64,
    pub stop_timeout_s: f64,
    pub bind_address: String,
    pub port: u16,
    pub enable_remote_control: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            buffer_seconds: 360.0,
            max_samples_per_pull: 500,
            pull_timeout_s: 0.2,
            clock_sync_interval_s: 5.0,
            discovery_timeout_s: 2.0,
            stop_timeout_s: 5.0,
            bind_address: "127.0.0.1".to_string(),
            port: 22345,
            enable_remote_control: true,
        }
    }
}

impl Settings {
    /// Load defaults, merged with `path` (if it exists) and
    /// `XDF_RECORDER_`-prefixed environment variables, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, RecorderError> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }
        figment = figment.merge(Env::prefixed("XDF_RECORDER_"));
        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Sanity-check values that would otherwise fail confusingly much later
    /// (a bad bind address inside `TcpListener::bind`, a zero timeout that
    /// spins the acquisition loop).
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.port == 0 {
            return Err(RecorderError::Configuration("port must be non-zero".into()));
        }
        self.bind_address.parse::<IpAddr>().map_err(|e| {
            RecorderError::Configuration(format!("invalid bind_address {:?}: {e}", self.bind_address))
        })?;
        for (name, value) in [
            ("buffer_seconds", self.buffer_seconds),
            ("pull_timeout_s", self.pull_timeout_s),
            ("clock_sync_interval_s", self.clock_sync_interval_s),
            ("discovery_timeout_s", self.discovery_timeout_s),
            ("stop_timeout_s", self.stop_timeout_s),
        ] {
            if !(value > 0.0) {
                return Err(RecorderError::Configuration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.max_samples_per_pull == 0 {
            return Err(RecorderError::Configuration(
                "max_samples_per_pull must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let settings = Settings::default();
        assert_eq!(settings.port, 22345);
        assert_eq!(settings.bind_address, "127.0.0.1");
        assert!(settings.enable_remote_control);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_zero_port() {
        let settings = Settings {
            port: 0,
            ..Settings::default()
        };
        let err = settings.validate().unwrap_err();
        assert_eq!(err.kind(), "Configuration");
    }

    #[test]
    fn rejects_unparseable_bind_address() {
        let settings = Settings {
            bind_address: "not-an-ip".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let settings = Settings {
            pull_timeout_s: 0.0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let settings = Settings::load(None).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_merges_toml_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 9000\nbind_address = \"0.0.0.0\"\n").expect("write");
        let settings = Settings::load(Some(&path)).expect("load");
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.bind_address, "0.0.0.0");
        assert_eq!(settings.buffer_seconds, 360.0);
    }
}
