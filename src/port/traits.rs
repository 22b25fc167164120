//! Core traits for the scale transport.
//!
//! Defines the `ScaleTransport` trait that allows both real serial ports
//! and scripted mock implementations to feed the reading pipeline.

use super::error::PortError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Electrical parameters for one serial line configuration.
///
/// Values are immutable once selected for a session; the prober tries a
/// prioritized list of them until one produces plausible weight lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (7 or 8).
    pub data_bits: DataBits,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Parity checking mode.
    pub parity: Parity,
}

impl SerialConfig {
    /// 8 data bits, no parity, 1 stop bit.
    pub const fn eight_n_one(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }

    /// 7 data bits, even parity, 1 stop bit.
    pub const fn seven_e_one(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: DataBits::Seven,
            stop_bits: StopBits::One,
            parity: Parity::Even,
        }
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::eight_n_one(9600)
    }
}

/// Renders the conventional short form, e.g. `9600 8N1` or `2400 7E1`.
impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = match self.data_bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        write!(f, "{} {}{}{}", self.baud_rate, data, parity, stop)
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// A physical port chosen through the host's selection step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortHandle {
    /// System path or name of the port (e.g. `/dev/ttyUSB0`, `COM3`).
    pub name: String,
}

impl PortHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Lazy sequence of received byte chunks.
///
/// Runs until the port is closed or faults. Dropping the stream cancels any
/// pending read.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, PortError>>;

/// Duplex byte transport the scale reader is driven by.
///
/// The reader never talks to hardware directly; everything goes through
/// this trait so the prober and decoder can run against [`MockTransport`]
/// in tests.
///
/// [`MockTransport`]: super::mock::MockTransport
#[async_trait]
pub trait ScaleTransport: Send + fmt::Debug {
    /// Ask the host for a physical port.
    ///
    /// Returns `PortError::Cancelled` when the user declines to pick one.
    async fn request_connection(&mut self) -> Result<PortHandle, PortError>;

    /// Open `handle` with the given line parameters.
    async fn open(&mut self, handle: &PortHandle, config: &SerialConfig) -> Result<(), PortError>;

    /// Take the receive stream of the currently open port.
    ///
    /// Can be taken once per successful `open`.
    fn read_stream(&mut self) -> Result<ByteStream, PortError>;

    /// Close the port. Safe to call when nothing is open.
    async fn close(&mut self);

    /// Write bytes to the open port.
    ///
    /// Returns the number of bytes actually written.
    async fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;
}
