//! Service layer for the scale reader.
//!
//! `ScaleReader` is the public surface over one transport: it owns the
//! connection lifecycle, the running read pump and the shared session
//! state. Callers that only need to watch the weight take a
//! [`SharedSession`] via [`ScaleReader::monitor`].
//!
//! # Architecture
//!
//! ```text
//! connect() ─> request_connection ─> ConfigProber ─┐
//!                                                 │ ReadPump (task)
//! transport bytes ─> LineFramer ─> decode_line ───┴─> SharedSession ─> subscribers
//! ```

use crate::config::Config;
use crate::error::{ScaleError, ScaleResult};
use crate::negotiation::{with_preferred, ConfigProber, ProbeSettings, ProbeSuccess};
use crate::pipeline::ReadPump;
use crate::port::{PortError, PortHandle, ScaleTransport, SerialConfig};
use crate::reading::Reading;
use crate::session::{ConnectionStatus, SessionState, SharedSession};
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// Command that asks many indicators to print the current weight.
pub const DEFAULT_REQUEST_COMMAND: &[u8] = b"P\r\n";

/// Command that zeroes the scale on indicators supporting it.
pub const DEFAULT_TARE_COMMAND: &[u8] = b"T\r\n";

/// Everything the reader needs besides the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderSettings {
    pub probe: ProbeSettings,
    pub request_command: Vec<u8>,
    pub tare_command: Vec<u8>,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            probe: ProbeSettings::default(),
            request_command: DEFAULT_REQUEST_COMMAND.to_vec(),
            tare_command: DEFAULT_TARE_COMMAND.to_vec(),
        }
    }
}

impl From<&Config> for ReaderSettings {
    fn from(config: &Config) -> Self {
        let candidates = match config.serial.preferred {
            Some(preferred) => with_preferred(preferred, &config.probe.candidates),
            None => config.probe.candidates.clone(),
        };
        Self {
            probe: ProbeSettings {
                candidates,
                probe_window: Duration::from_millis(config.probe.probe_window_ms),
                min_valid_readings: config.probe.min_valid_readings,
                max_line_length: config.probe.max_line_length,
            },
            request_command: config.serial.request_command.clone().into_bytes(),
            tare_command: config.serial.tare_command.clone().into_bytes(),
        }
    }
}

/// Reads a weighbridge scale through an injected transport.
///
/// Methods that change the connection take `&mut self`, so only one connect
/// attempt can be in flight at a time. Dropping the reader cancels its read
/// task; call [`ScaleReader::disconnect`] to also close the port.
#[derive(Debug)]
pub struct ScaleReader<T: ScaleTransport> {
    transport: T,
    prober: ConfigProber,
    settings: ReaderSettings,
    session: SharedSession,
    pump: Option<ReadPump>,
}

impl<T: ScaleTransport> ScaleReader<T> {
    pub fn new(transport: T, settings: ReaderSettings) -> Self {
        Self {
            transport,
            prober: ConfigProber::new(settings.probe.clone()),
            settings,
            session: SharedSession::new(),
            pump: None,
        }
    }

    /// Reader with default probe settings and commands.
    pub fn with_defaults(transport: T) -> Self {
        Self::new(transport, ReaderSettings::default())
    }

    /// Select a port, probe it and start reading.
    ///
    /// A previous connection (or attempt) is torn down first. Returns the
    /// configuration the scale answered on.
    ///
    /// # Errors
    ///
    /// - `ScaleError::UserCancelled` if no port was selected
    /// - `ScaleError::ProbeExhausted` if no candidate produced readings
    /// - `ScaleError::StreamFault` if the winning stream failed during handover
    /// - `ScaleError::Port` if port selection failed otherwise
    pub async fn connect(&mut self) -> ScaleResult<SerialConfig> {
        if self.pump.is_some() || self.session.connection_status() != ConnectionStatus::Disconnected
        {
            debug!("connect() while active; tearing down previous connection");
            self.disconnect().await;
        }

        self.session.begin_connect();

        let handle = match self.transport.request_connection().await {
            Ok(handle) => handle,
            Err(e) => {
                let err = ScaleError::from(e);
                if err.is_user_cancelled() {
                    info!("Port selection cancelled");
                } else {
                    warn!("Port selection failed: {}", err);
                }
                self.session.reset(Some(err.to_string()));
                return Err(err);
            }
        };

        match self
            .prober
            .probe(&mut self.transport, &handle, &self.session)
            .await
        {
            Ok(success) => self.adopt(&handle, success).await,
            Err(err) => {
                self.session.reset(Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Take over the winning candidate's pump and go `Connected`.
    ///
    /// A fault that landed after the detection window closed but before this
    /// point fails the connect instead of leaving a dead link `Connected`.
    async fn adopt(
        &mut self,
        handle: &PortHandle,
        success: ProbeSuccess,
    ) -> ScaleResult<SerialConfig> {
        let ProbeSuccess { config, pump } = success;
        if let Err(message) = self.session.mark_connected(config, pump.fault_record()) {
            warn!(
                "Scale on {} dropped out while connecting: {}",
                handle.name, message
            );
            pump.stop().await;
            self.transport.close().await;
            self.session.reset(Some(message.clone()));
            return Err(ScaleError::StreamFault(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                message,
            ))));
        }

        self.pump = Some(pump);
        info!("Connected to scale on {} ({})", handle.name, config);
        Ok(config)
    }

    /// Stop reading, close the port and clear the session.
    ///
    /// Safe to call at any time, including repeatedly or before `connect`.
    pub async fn disconnect(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop().await;
        }
        self.transport.close().await;
        self.session.reset(None);
        debug!("Scale reader disconnected");
    }

    /// Best-effort write of the configured poll command.
    ///
    /// Returns whether the command reached the transport. Nothing is sent
    /// unless the reader is `Connected`; write failures are logged and
    /// otherwise ignored since many scales stream unprompted.
    pub async fn request_weight(&mut self) -> bool {
        let command = self.settings.request_command.clone();
        self.send_command("request weight", &command).await
    }

    /// Best-effort write of the configured tare command.
    pub async fn tare(&mut self) -> bool {
        let command = self.settings.tare_command.clone();
        self.send_command("tare", &command).await
    }

    async fn send_command(&mut self, what: &str, command: &[u8]) -> bool {
        if command.is_empty() {
            debug!("No {} command configured", what);
            return false;
        }
        if self.session.connection_status() != ConnectionStatus::Connected {
            debug!("Not connected; {} command not sent", what);
            return false;
        }
        match self.transport.write_bytes(command).await {
            Ok(n) => {
                debug!("Sent {} command ({} bytes)", what, n);
                true
            }
            Err(e) => {
                warn!("{}", ScaleError::WriteFailed(e));
                false
            }
        }
    }

    /// Weight to record for a weighing: the last reading, only if stable.
    pub fn stable_weight(&self) -> Option<f64> {
        self.session.stable_weight()
    }

    /// Live stream of accepted readings.
    pub fn subscribe(&self) -> BroadcastStream<Reading> {
        self.session.subscribe()
    }

    /// Cloneable read-only view for other tasks.
    pub fn monitor(&self) -> SharedSession {
        self.session.clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.snapshot()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.session.connection_status()
    }

    pub fn current_weight(&self) -> Option<f64> {
        self.session.current_weight()
    }

    pub fn is_stable(&self) -> bool {
        self.session.is_stable()
    }

    pub fn last_error(&self) -> Option<String> {
        self.session.last_error()
    }

    pub fn active_config(&self) -> Option<SerialConfig> {
        self.session.active_config()
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockChunk, MockTransport};

    fn fast_settings() -> ReaderSettings {
        ReaderSettings {
            probe: ProbeSettings::default()
                .with_candidates(vec![
                    SerialConfig::eight_n_one(9600),
                    SerialConfig::seven_e_one(9600),
                ])
                .with_probe_window(Duration::from_millis(100)),
            ..ReaderSettings::default()
        }
    }

    #[test]
    fn test_default_commands() {
        let settings = ReaderSettings::default();
        assert_eq!(settings.request_command, b"P\r\n");
        assert_eq!(settings.tare_command, b"T\r\n");
    }

    #[test]
    fn test_settings_from_config_prefers_configured() {
        let mut config = Config::default();
        config.serial.preferred = Some(SerialConfig::eight_n_one(2400));
        config.probe.probe_window_ms = 1000;

        let settings = ReaderSettings::from(&config);
        assert_eq!(settings.probe.candidates[0], SerialConfig::eight_n_one(2400));
        assert_eq!(settings.probe.probe_window, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_disconnect() {
        let transport = MockTransport::new("MOCK0").with_lines(
            SerialConfig::eight_n_one(9600),
            &["ST,GS,+0000100kg", "ST,GS,+0000101kg"],
        );
        let mut reader = ScaleReader::new(transport.clone(), fast_settings());

        let config = reader.connect().await.unwrap();
        assert_eq!(config, SerialConfig::eight_n_one(9600));
        assert_eq!(reader.connection_status(), ConnectionStatus::Connected);
        assert_eq!(reader.stable_weight(), Some(101.0));
        assert!(transport.is_open());

        reader.disconnect().await;
        assert_eq!(reader.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(reader.current_weight(), None);
        assert!(!transport.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_command_is_not_sent() {
        let transport = MockTransport::new("MOCK0");
        let mut settings = fast_settings();
        settings.tare_command.clear();
        let mut reader = ScaleReader::new(transport.clone(), settings);

        assert!(!reader.tare().await);
        assert!(transport.get_write_log().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_before_handover_fails_connect() {
        let config = SerialConfig::eight_n_one(9600);
        let transport = MockTransport::new("MOCK0")
            .with_lines(config, &["ST,GS,+0000100kg", "ST,GS,+0000101kg"])
            .with_event(config, MockChunk::Delay(Duration::from_secs(1)))
            .with_event(config, MockChunk::Fault("framing error".into()));
        let mut reader = ScaleReader::new(transport.clone(), fast_settings());
        let handle = PortHandle::new("MOCK0");

        reader.session.begin_connect();
        let success = reader
            .prober
            .probe(&mut reader.transport, &handle, &reader.session)
            .await
            .unwrap();
        assert!(!success.pump.has_faulted());

        // The stream dies after the window check, while still `Connecting`.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(success.pump.has_faulted());
        assert_eq!(reader.connection_status(), ConnectionStatus::Connecting);

        let err = reader.adopt(&handle, success).await.unwrap_err();

        assert!(matches!(err, ScaleError::StreamFault(_)));
        assert_eq!(reader.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(reader.active_config(), None);
        assert!(reader.last_error().unwrap().contains("framing error"));
        assert!(reader.pump.is_none());
        assert!(!transport.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_need_a_connection() {
        let transport = MockTransport::new("MOCK0");
        let mut reader = ScaleReader::new(transport.clone(), fast_settings());

        assert!(!reader.request_weight().await);
        assert!(!reader.tare().await);
        assert!(transport.get_write_log().is_empty());
    }
}
