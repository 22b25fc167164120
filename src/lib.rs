//! Weighbridge Scale Reader Library
//!
//! Reads weight lines from a truck scale's serial indicator, detects the
//! line settings automatically and exposes the live weight to the rest of
//! an application.
//!
//! # Modules
//!
//! - `port`: Transport abstraction (real serial port and scripted mock)
//! - `reading`: Line framing, weight-line grammars and validation
//! - `negotiation`: Candidate line settings and the configuration prober
//! - `pipeline`: Cancellable read task feeding the session
//! - `session`: Observable connection and weight state
//! - `service`: `ScaleReader`, the public entry point
//! - `config`: TOML configuration with environment overrides
//! - `error`: Scale-level error taxonomy
//!
//! # Example
//!
//! ```rust
//! use weighbridge_scale::{MockTransport, ScaleReader, SerialConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = MockTransport::new("MOCK0").with_lines(
//!     SerialConfig::eight_n_one(9600),
//!     &["ST,GS,+0012340kg", "ST,GS,+0012340kg"],
//! );
//! let mut reader = ScaleReader::with_defaults(transport);
//! # let _ = &mut reader;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod negotiation;
pub mod pipeline;
pub mod port;
pub mod reading;
pub mod service;
pub mod session;

// Re-export commonly used types for convenience
pub use error::{ScaleError, ScaleResult};
pub use negotiation::{ConfigProber, ProbeSettings, DEFAULT_CANDIDATES};
pub use port::{
    DataBits, MockChunk, MockTransport, Parity, PortError, PortHandle, ScaleTransport,
    SerialConfig, StopBits,
};
pub use reading::{decode_line, DecodeRejection, LineFramer, Reading, WeightUnit};
pub use service::{ReaderSettings, ScaleReader};
pub use session::{ConnectionStatus, SessionState, SharedSession};

#[cfg(feature = "async-serial")]
pub use port::{PortSelection, SerialPortTransport};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
