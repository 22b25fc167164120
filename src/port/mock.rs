//! Mock transport implementation for testing.
//!
//! Provides a `MockTransport` that simulates a scale on a serial link without
//! requiring actual hardware. Each `SerialConfig` gets its own scripted chunk
//! sequence, so a test can make the scale "speak" only under the right line
//! parameters.

use super::error::PortError;
use super::traits::{ByteStream, PortHandle, ScaleTransport, SerialConfig};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// One scripted event on the receive stream.
#[derive(Debug, Clone)]
pub enum MockChunk {
    /// Bytes delivered as a single chunk.
    Data(Vec<u8>),
    /// A transport error (framing/parity/break) raised mid-read.
    Fault(String),
    /// Silence on the line for this long before the next event.
    Delay(Duration),
    /// The stream ends, as when the device disappears.
    End,
}

/// Inner state of the mock transport, protected by a mutex for interior mutability.
#[derive(Debug, Default)]
struct MockTransportState {
    /// Port returned from `request_connection`; `None` simulates a user cancel.
    selection: Option<PortHandle>,
    /// Receive scripts keyed by line configuration.
    scripts: HashMap<SerialConfig, Vec<MockChunk>>,
    /// Configurations whose `open` fails.
    failing_opens: Vec<SerialConfig>,
    /// Currently applied configuration, if open.
    open_config: Option<SerialConfig>,
    /// Whether the stream for the current open was handed out.
    stream_taken: bool,
    /// Every configuration `open` was called with, in order.
    open_log: Vec<SerialConfig>,
    /// Number of `close` calls.
    close_count: usize,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    /// Whether writes should fail.
    fail_writes: bool,
}

/// Scripted scale transport.
///
/// Clones share state, so a test can keep one handle for inspection while the
/// reader owns the other.
///
/// # Example
/// ```
/// use weighbridge_scale::port::{MockTransport, SerialConfig};
///
/// let transport = MockTransport::new("MOCK0")
///     .with_lines(SerialConfig::eight_n_one(9600), &["ST,GS,+0000230kg"]);
/// assert!(transport.open_log().is_empty());
/// ```
#[derive(Clone)]
pub struct MockTransport {
    /// The port name/identifier.
    name: String,
    /// The internal state, wrapped in Arc<Mutex<>> for interior mutability.
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    /// Create a mock transport whose selection step yields `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            state: Arc::new(Mutex::new(MockTransportState {
                selection: Some(PortHandle::new(name.clone())),
                ..Default::default()
            })),
            name,
        }
    }

    /// Make `request_connection` behave as if the user dismissed the picker.
    pub fn with_user_cancel(self) -> Self {
        self.state.lock().selection = None;
        self
    }

    /// Script raw chunks for `config`, delivered in order after `open`.
    pub fn with_chunks(self, config: SerialConfig, chunks: &[&[u8]]) -> Self {
        {
            let mut state = self.state.lock();
            let script = state.scripts.entry(config).or_default();
            script.extend(chunks.iter().map(|c| MockChunk::Data(c.to_vec())));
        }
        self
    }

    /// Script newline-terminated lines for `config`, one chunk per line.
    pub fn with_lines(self, config: SerialConfig, lines: &[&str]) -> Self {
        {
            let mut state = self.state.lock();
            let script = state.scripts.entry(config).or_default();
            script.extend(
                lines
                    .iter()
                    .map(|l| MockChunk::Data(format!("{l}\r\n").into_bytes())),
            );
        }
        self
    }

    /// Append an arbitrary scripted event for `config`.
    pub fn with_event(self, config: SerialConfig, event: MockChunk) -> Self {
        self.state
            .lock()
            .scripts
            .entry(config)
            .or_default()
            .push(event);
        self
    }

    /// Make `open` fail for `config`.
    pub fn with_failing_open(self, config: SerialConfig) -> Self {
        self.state.lock().failing_opens.push(config);
        self
    }

    /// Set whether writes should fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Configurations `open` was called with, in call order.
    pub fn open_log(&self) -> Vec<SerialConfig> {
        self.state.lock().open_log.clone()
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    /// Configuration the port is currently open with.
    pub fn open_config(&self) -> Option<SerialConfig> {
        self.state.lock().open_config
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open_config.is_some()
    }
}

#[async_trait]
impl ScaleTransport for MockTransport {
    async fn request_connection(&mut self) -> Result<PortHandle, PortError> {
        self.state.lock().selection.clone().ok_or(PortError::Cancelled)
    }

    async fn open(&mut self, handle: &PortHandle, config: &SerialConfig) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.open_log.push(*config);

        if handle.name != self.name {
            return Err(PortError::not_found(handle.name.clone()));
        }
        if state.open_config.is_some() {
            return Err(PortError::AlreadyOpen);
        }
        if state.failing_opens.contains(config) {
            return Err(PortError::config(format!("device rejected {config}")));
        }

        state.open_config = Some(*config);
        state.stream_taken = false;
        Ok(())
    }

    fn read_stream(&mut self) -> Result<ByteStream, PortError> {
        let mut state = self.state.lock();
        let config = state.open_config.ok_or(PortError::NotOpen)?;
        if state.stream_taken {
            return Err(PortError::config("read stream already taken"));
        }
        state.stream_taken = true;

        let script = state.scripts.get(&config).cloned().unwrap_or_default();
        let ends = script.iter().any(|c| matches!(c, MockChunk::End));

        let events: Vec<MockChunk> = script
            .into_iter()
            .take_while(|c| !matches!(c, MockChunk::End))
            .collect();

        let scripted = stream::iter(events).filter_map(|chunk| async move {
            match chunk {
                MockChunk::Data(bytes) => Some(Ok(bytes)),
                MockChunk::Fault(msg) => Some(Err(PortError::Io(std::io::Error::other(msg)))),
                MockChunk::Delay(pause) => {
                    tokio::time::sleep(pause).await;
                    None
                }
                MockChunk::End => None,
            }
        });
        if ends {
            Ok(scripted.boxed())
        } else {
            // A live port keeps the read pending until it is closed.
            Ok(scripted.chain(stream::pending()).boxed())
        }
    }

    async fn close(&mut self) {
        let mut state = self.state.lock();
        state.close_count += 1;
        state.open_config = None;
        state.stream_taken = false;
    }

    async fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();
        if state.open_config.is_none() {
            return Err(PortError::NotOpen);
        }
        if state.fail_writes {
            return Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write rejected",
            )));
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .field("open_config", &self.open_config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SerialConfig {
        SerialConfig::eight_n_one(9600)
    }

    #[tokio::test]
    async fn test_request_connection_returns_name() {
        let mut port = MockTransport::new("MOCK0");
        let handle = port.request_connection().await.unwrap();
        assert_eq!(handle.name, "MOCK0");
    }

    #[tokio::test]
    async fn test_user_cancel() {
        let mut port = MockTransport::new("MOCK0").with_user_cancel();
        let result = port.request_connection().await;
        assert!(matches!(result, Err(PortError::Cancelled)));
    }

    #[tokio::test]
    async fn test_scripted_stream_for_matching_config() {
        let mut port = MockTransport::new("MOCK0").with_chunks(cfg(), &[b"ST", b"+1\n"]);
        port.open(&PortHandle::new("MOCK0"), &cfg()).await.unwrap();

        let mut stream = port.read_stream().unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), b"ST");
        assert_eq!(stream.next().await.unwrap().unwrap(), b"+1\n");
    }

    #[tokio::test]
    async fn test_stream_taken_once() {
        let mut port = MockTransport::new("MOCK0");
        port.open(&PortHandle::new("MOCK0"), &cfg()).await.unwrap();
        assert!(port.read_stream().is_ok());
        assert!(port.read_stream().is_err());
    }

    #[tokio::test]
    async fn test_failing_open() {
        let mut port = MockTransport::new("MOCK0").with_failing_open(cfg());
        let result = port.open(&PortHandle::new("MOCK0"), &cfg()).await;
        assert!(matches!(result, Err(PortError::Config(_))));
        assert!(!port.is_open());
        assert_eq!(port.open_log(), vec![cfg()]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut port = MockTransport::new("MOCK0");
        port.close().await;
        port.close().await;
        assert_eq!(port.close_count(), 2);
        assert!(!port.is_open());
    }

    #[tokio::test]
    async fn test_end_terminates_stream() {
        let mut port = MockTransport::new("MOCK0")
            .with_chunks(cfg(), &[b"x"])
            .with_event(cfg(), MockChunk::End);
        port.open(&PortHandle::new("MOCK0"), &cfg()).await.unwrap();

        let items: Vec<_> = port.read_stream().unwrap().collect().await;
        assert_eq!(items.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_holds_back_next_event() {
        let mut port = MockTransport::new("MOCK0")
            .with_event(cfg(), MockChunk::Delay(Duration::from_secs(5)))
            .with_event(cfg(), MockChunk::Fault("framing error".into()));
        port.open(&PortHandle::new("MOCK0"), &cfg()).await.unwrap();

        let started = tokio::time::Instant::now();
        let item = port.read_stream().unwrap().next().await.unwrap();
        assert!(item.is_err());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_write_logging_and_failure() {
        let mut port = MockTransport::new("MOCK0");
        assert!(matches!(
            port.write_bytes(b"P\r\n").await,
            Err(PortError::NotOpen)
        ));

        port.open(&PortHandle::new("MOCK0"), &cfg()).await.unwrap();
        port.write_bytes(b"P\r\n").await.unwrap();
        assert_eq!(port.get_write_log(), vec![b"P\r\n".to_vec()]);

        port.set_fail_writes(true);
        assert!(port.write_bytes(b"T\r\n").await.is_err());
        assert_eq!(port.get_write_log().len(), 1);
    }
}
