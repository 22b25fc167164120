//! Configuration schema definitions.
//!
//! Every section is `#[serde(default)]`, so a config file only needs the
//! keys it wants to change.

use super::error::{ConfigError, ConfigResult};
use crate::negotiation::{DEFAULT_CANDIDATES, DEFAULT_MIN_VALID_READINGS, DEFAULT_PROBE_WINDOW};
use crate::port::SerialConfig;
use crate::reading::MAX_LINE_LENGTH;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Port selection and scale commands
    pub serial: SerialPortConfig,
    /// Line-settings auto-detection
    pub probe: ProbeConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the reader cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.probe.probe_window_ms == 0 {
            return Err(ConfigError::validation(
                "probe.probe_window_ms",
                "must be greater than zero",
            ));
        }
        if self.probe.min_valid_readings == 0 {
            return Err(ConfigError::validation(
                "probe.min_valid_readings",
                "must be at least 1",
            ));
        }
        if self.probe.max_line_length == 0 {
            return Err(ConfigError::validation(
                "probe.max_line_length",
                "must be greater than zero",
            ));
        }
        if self.probe.candidates.is_empty() {
            return Err(ConfigError::validation(
                "probe.candidates",
                "at least one candidate configuration is required",
            ));
        }
        if let Some(bad) = self.probe.candidates.iter().find(|c| c.baud_rate == 0) {
            return Err(ConfigError::validation(
                "probe.candidates",
                format!("baud rate must be non-zero ({})", bad),
            ));
        }
        if matches!(self.serial.preferred, Some(c) if c.baud_rate == 0) {
            return Err(ConfigError::validation(
                "serial.preferred",
                "baud rate must be non-zero",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::validation("logging.level", "must not be empty"));
        }
        Ok(())
    }
}

/// `[serial]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialPortConfig {
    /// Port to open; the user is prompted when unset
    pub port: Option<String>,
    /// Sent by `request_weight()`; empty disables polling
    pub request_command: String,
    /// Sent by `tare()`; empty disables taring
    pub tare_command: String,
    /// Configuration tried before the candidate list
    pub preferred: Option<SerialConfig>,
}

impl Default for SerialPortConfig {
    fn default() -> Self {
        Self {
            port: None,
            request_command: "P\r\n".to_string(),
            tare_command: "T\r\n".to_string(),
            preferred: None,
        }
    }
}

/// `[probe]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub probe_window_ms: u64,
    pub min_valid_readings: usize,
    pub max_line_length: usize,
    pub candidates: Vec<SerialConfig>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            probe_window_ms: DEFAULT_PROBE_WINDOW.as_millis() as u64,
            min_valid_readings: DEFAULT_MIN_VALID_READINGS,
            max_line_length: MAX_LINE_LENGTH,
            candidates: DEFAULT_CANDIDATES.to_vec(),
        }
    }
}

impl ProbeConfig {
    pub fn probe_window(&self) -> Duration {
        Duration::from_millis(self.probe_window_ms)
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` wins when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored
    #[default]
    Pretty,
    Compact,
    /// One JSON object per event
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{DataBits, Parity};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.port, None);
        assert_eq!(config.serial.request_command, "P\r\n");
        assert_eq!(config.probe.probe_window(), Duration::from_millis(2500));
        assert_eq!(config.probe.candidates.len(), DEFAULT_CANDIDATES.len());
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[probe]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [serial]
            port = "/dev/ttyUSB0"

            [probe]
            probe_window_ms = 1000

            [[probe.candidates]]
            baud_rate = 4800
            data_bits = "seven"
            parity = "even"
            stop_bits = "one"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.probe.probe_window_ms, 1000);
        assert_eq!(config.probe.candidates.len(), 1);
        assert_eq!(config.probe.candidates[0].baud_rate, 4800);
        assert_eq!(config.probe.candidates[0].data_bits, DataBits::Seven);
        assert_eq!(config.probe.candidates[0].parity, Parity::Even);
        // Untouched sections keep defaults
        assert_eq!(config.serial.tare_command, "T\r\n");
        assert_eq!(config.probe.min_valid_readings, 2);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.probe.probe_window_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("probe.probe_window_ms"));
    }

    #[test]
    fn test_validate_rejects_empty_candidates() {
        let mut config = Config::default();
        config.probe.candidates.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_baud() {
        let mut config = Config::default();
        config.probe.candidates.push(SerialConfig::eight_n_one(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!(" compact ".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("fancy".parse::<LogFormat>().is_err());
    }
}
