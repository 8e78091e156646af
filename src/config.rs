//! Server configuration types and loading

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::scheduler::data_logger::capacity_for;

/// Sensor/actuator backend attached to each session's loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoBackend {
    #[default]
    Random,
    Plant,
}

/// Listener and control-loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,

    pub port: u16,

    /// Initial loop period in milliseconds
    pub period_ms: f64,

    /// Echo every n-th tick to the console (0 disables)
    pub echo_divisor: u32,

    /// Seconds of history kept by the data logger
    pub log_duration_secs: f64,

    pub io: IoBackend,

    /// Directory receiving a CSV export of the log when a session finishes
    pub export_dir: Option<PathBuf>,

    /// Raise the timer thread to maximum priority (best effort)
    pub realtime_priority: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9999,
            period_ms: 10.0,
            echo_divisor: 0,
            log_duration_secs: 60.0,
            io: IoBackend::Random,
            export_dir: None,
            realtime_priority: true,
        }
    }
}

impl Config {
    /// Load from `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given, using defaults");
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content)?;
        info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Fail fast on values the loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.period_ms > 0.0 && self.period_ms.is_finite()) {
            return Err(ConfigError::NonPositivePeriod(self.period_ms / 1000.0));
        }
        if !(self.log_duration_secs > 0.0 && self.log_duration_secs.is_finite()) {
            return Err(ConfigError::InvalidLogDuration(self.log_duration_secs));
        }
        capacity_for(self.log_duration_secs, self.period())?;
        Ok(())
    }

    /// Loop period in seconds.
    pub fn period(&self) -> f64 {
        self.period_ms / 1000.0
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.address(), "localhost:9999");
        assert_eq!(config.period(), 0.01);
        assert_eq!(config.io, IoBackend::Random);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let yaml = r#"
port: 7000
io: plant
period_ms: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.io, IoBackend::Plant);
        assert_eq!(config.period_ms, 5.0);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.log_duration_secs, 60.0);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "echo_divisor: 10\nrealtime_priority: false").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.echo_divisor, 10);
        assert!(!config.realtime_priority);
    }

    #[test]
    fn load_missing_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/rts.yml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = Config { period_ms: 0.0, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::NonPositivePeriod(_))));
        let config = Config { log_duration_secs: -1.0, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLogDuration(_))));
        let config = Config { period_ms: 0.01, log_duration_secs: 3600.0, ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::LogTooLarge { .. })));
    }
}
