//! Async serial transport using tokio-serial.
//!
//! Implements `ScaleTransport` over a real serial device. Port selection is
//! either a fixed name or an interactive prompt listing the ports the system
//! reports.
//!
//! Note: This module is gated behind the `async-serial` feature flag.

use super::error::PortError;
use super::traits::{ByteStream, DataBits, Parity, PortHandle, ScaleTransport, SerialConfig, StopBits};
use async_trait::async_trait;
use futures::StreamExt;
use std::io::{BufRead, Write};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_serial::SerialStream;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

/// Chunk size requested from the device per read.
const READ_CHUNK_SIZE: usize = 256;

/// How the transport picks a physical port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelection {
    /// Always use this port.
    Named(String),
    /// List available ports on stderr and ask on stdin.
    Prompt,
}

/// Native async serial transport.
pub struct SerialPortTransport {
    selection: PortSelection,
    /// Name of the open port, if any.
    port_name: Option<String>,
    reader: Option<ReadHalf<SerialStream>>,
    writer: Option<WriteHalf<SerialStream>>,
}

impl SerialPortTransport {
    pub fn new(selection: PortSelection) -> Self {
        Self {
            selection,
            port_name: None,
            reader: None,
            writer: None,
        }
    }

    /// Transport bound to a fixed port name.
    pub fn named(port_name: impl Into<String>) -> Self {
        Self::new(PortSelection::Named(port_name.into()))
    }

    /// Name of the currently open port.
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }
}

#[async_trait]
impl ScaleTransport for SerialPortTransport {
    async fn request_connection(&mut self) -> Result<PortHandle, PortError> {
        match &self.selection {
            PortSelection::Named(name) => Ok(PortHandle::new(name.clone())),
            PortSelection::Prompt => {
                let ports = serialport::available_ports()?;
                let names: Vec<String> = ports.into_iter().map(|p| p.port_name).collect();
                if names.is_empty() {
                    return Err(PortError::not_found("no serial ports available"));
                }
                tokio::task::spawn_blocking(move || prompt_for_port(&names))
                    .await
                    .map_err(|e| PortError::Io(std::io::Error::other(e)))?
            }
        }
    }

    async fn open(&mut self, handle: &PortHandle, config: &SerialConfig) -> Result<(), PortError> {
        if self.reader.is_some() || self.writer.is_some() {
            return Err(PortError::AlreadyOpen);
        }

        let builder = tokio_serial::new(&handle.name, config.baud_rate)
            .data_bits(convert_data_bits(config.data_bits))
            .parity(convert_parity(config.parity))
            .stop_bits(convert_stop_bits(config.stop_bits))
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(100));

        let stream = SerialStream::open(&builder).map_err(|e| match e.kind {
            tokio_serial::ErrorKind::NoDevice => PortError::not_found(handle.name.clone()),
            tokio_serial::ErrorKind::InvalidInput => PortError::config(e.to_string()),
            _ => PortError::Io(std::io::Error::other(e.to_string())),
        })?;

        debug!("Opened {} with {}", handle.name, config);
        let (reader, writer) = tokio::io::split(stream);
        self.reader = Some(reader);
        self.writer = Some(writer);
        self.port_name = Some(handle.name.clone());
        Ok(())
    }

    fn read_stream(&mut self) -> Result<ByteStream, PortError> {
        if self.writer.is_none() {
            return Err(PortError::NotOpen);
        }
        let reader = self
            .reader
            .take()
            .ok_or_else(|| PortError::config("read stream already taken"))?;

        Ok(ReaderStream::with_capacity(reader, READ_CHUNK_SIZE)
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(PortError::Io))
            .boxed())
    }

    async fn close(&mut self) {
        // The device closes once both halves are dropped; the read half
        // normally left with the stream handed to the pump.
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        if let Some(name) = self.port_name.take() {
            debug!("Closed {}", name);
        }
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let writer = self.writer.as_mut().ok_or(PortError::NotOpen)?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(data.len())
    }
}

impl std::fmt::Debug for SerialPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortTransport")
            .field("selection", &self.selection)
            .field("port_name", &self.port_name)
            .finish()
    }
}

/// Blocking stdin prompt. Empty input or EOF counts as a cancel.
fn prompt_for_port(names: &[String]) -> Result<PortHandle, PortError> {
    let mut stderr = std::io::stderr();
    writeln!(stderr, "Available serial ports:")?;
    for (i, name) in names.iter().enumerate() {
        writeln!(stderr, "  [{}] {}", i + 1, name)?;
    }
    write!(stderr, "Select port (number or name, empty to cancel): ")?;
    stderr.flush()?;

    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    let choice = line.trim();
    if read == 0 || choice.is_empty() {
        return Err(PortError::Cancelled);
    }

    let selected = resolve_choice(choice, names)?;
    info!("Selected serial port {}", selected);
    Ok(PortHandle::new(selected))
}

fn resolve_choice(choice: &str, names: &[String]) -> Result<String, PortError> {
    if let Ok(index) = choice.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| names.get(i))
            .cloned()
            .ok_or_else(|| PortError::not_found(choice));
    }
    names
        .iter()
        .find(|n| n.as_str() == choice)
        .cloned()
        .ok_or_else(|| PortError::not_found(choice))
}

// Helper conversion functions for tokio-serial types

fn convert_data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn convert_parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    }
}

fn convert_stop_bits(stop_bits: StopBits) -> tokio_serial::StopBits {
    match stop_bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}
