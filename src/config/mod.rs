//! Configuration module for the scale reader.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! 1. `SCALE_READER_CONFIG` environment variable (explicit path)
//! 2. `./scale-reader.toml` (current directory)
//! 3. `scale-reader.toml` in the platform config directory
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! - `SCALE_READER_SERIAL_PORT=COM3`
//! - `SCALE_READER_PROBE_WINDOW_MS=1500`
//! - `SCALE_READER_PROBE_MIN_VALID_READINGS=3`
//! - `SCALE_READER_LOG_LEVEL=debug`
//! - `SCALE_READER_LOG_FORMAT=json`
//!
//! # Example
//!
//! ```rust,no_run
//! use weighbridge_scale::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! println!("Probe window: {:?}", loader.config().probe.probe_window());
//! # Ok::<(), weighbridge_scale::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, ProbeConfig, SerialPortConfig};
