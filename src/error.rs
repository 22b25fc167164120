//! Scale-level error taxonomy.
//!
//! Only a few of these ever reach a caller: `UserCancelled`,
//! `ProbeExhausted` and selection-time `Port` errors come back from
//! `connect()`. The rest are logged where they happen.

use crate::port::{PortError, SerialConfig};
use thiserror::Error;

/// A specialized `Result` type for scale operations.
pub type ScaleResult<T> = Result<T, ScaleError>;

#[derive(Debug, Error)]
pub enum ScaleError {
    /// The user declined to pick a port. Informational, not a device fault.
    #[error("No serial port selected")]
    UserCancelled,

    /// One candidate configuration could not be applied.
    #[error("Could not open port with {config}: {source}")]
    OpenFailed {
        config: SerialConfig,
        #[source]
        source: PortError,
    },

    /// Every candidate configuration stayed silent or produced garbage.
    #[error(
        "No matching serial configuration found after trying {tried} candidate(s). \
         Check the scale's baud rate, parity and data bits."
    )]
    ProbeExhausted { tried: usize },

    /// The transport failed mid-read (framing, parity, break, unplugged).
    #[error("Serial stream fault: {0}")]
    StreamFault(#[source] PortError),

    /// A poll or tare command could not be written.
    #[error("Write to scale failed: {0}")]
    WriteFailed(#[source] PortError),

    /// Port selection failed for a reason other than a cancel.
    #[error("Port error: {0}")]
    Port(#[source] PortError),
}

impl From<PortError> for ScaleError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Cancelled => Self::UserCancelled,
            other => Self::Port(other),
        }
    }
}

impl ScaleError {
    /// Whether the failure came from the user rather than the scale.
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::UserCancelled)
    }
}
