//! Configuration prober.
//!
//! The `ConfigProber` walks the candidate list in priority order, opening
//! the port with each configuration and letting a read pump run for one
//! probe window. The first candidate that yields enough decodable weight
//! lines wins and keeps its pump running.

use super::candidates::DEFAULT_CANDIDATES;
use crate::error::ScaleError;
use crate::pipeline::ReadPump;
use crate::port::{PortHandle, ScaleTransport, SerialConfig};
use crate::reading::{LineFramer, MAX_LINE_LENGTH};
use crate::session::SharedSession;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default time each candidate gets to produce readings.
pub const DEFAULT_PROBE_WINDOW: Duration = Duration::from_millis(2500);

/// Default number of readings that confirm a candidate.
pub const DEFAULT_MIN_VALID_READINGS: usize = 2;

/// Tunables for one probe run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSettings {
    /// Configurations to try, highest priority first.
    pub candidates: Vec<SerialConfig>,
    pub probe_window: Duration,
    pub min_valid_readings: usize,
    /// Bound for the line framer's unterminated buffer.
    pub max_line_length: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES.to_vec(),
            probe_window: DEFAULT_PROBE_WINDOW,
            min_valid_readings: DEFAULT_MIN_VALID_READINGS,
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

impl ProbeSettings {
    pub fn with_candidates(mut self, candidates: Vec<SerialConfig>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_probe_window(mut self, window: Duration) -> Self {
        self.probe_window = window;
        self
    }

    pub fn with_min_valid_readings(mut self, count: usize) -> Self {
        self.min_valid_readings = count;
        self
    }

    /// Upper bound on how long a full probe can take.
    pub fn worst_case_latency(&self) -> Duration {
        self.probe_window * self.candidates.len() as u32
    }
}

/// A candidate that passed, with its pump still running.
#[derive(Debug)]
pub struct ProbeSuccess {
    pub config: SerialConfig,
    pub pump: ReadPump,
}

/// Finds the line configuration a scale is talking with.
#[derive(Debug, Clone, Default)]
pub struct ConfigProber {
    settings: ProbeSettings,
}

impl ConfigProber {
    pub fn new(settings: ProbeSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Try every candidate on `handle` until one produces valid readings.
    ///
    /// Readings decoded during a probe window reach `session` immediately.
    /// On success the port stays open with the winning configuration. On
    /// exhaustion the port is closed and `ScaleError::ProbeExhausted` is
    /// returned; individual open failures and quiet candidates are only logged.
    pub async fn probe<T: ScaleTransport>(
        &self,
        transport: &mut T,
        handle: &PortHandle,
        session: &SharedSession,
    ) -> Result<ProbeSuccess, ScaleError> {
        info!(
            "Probing {} with {} candidate configuration(s)",
            handle.name,
            self.settings.candidates.len()
        );

        for candidate in &self.settings.candidates {
            transport.close().await;

            if let Err(e) = transport.open(handle, candidate).await {
                let err = ScaleError::OpenFailed {
                    config: *candidate,
                    source: e,
                };
                debug!("{}", err);
                continue;
            }

            let stream = match transport.read_stream() {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("No read stream for {}: {}", candidate, e);
                    continue;
                }
            };

            let pump = ReadPump::spawn(
                stream,
                LineFramer::new(self.settings.max_line_length),
                session.clone(),
            );
            tokio::time::sleep(self.settings.probe_window).await;

            let valid = pump.valid_readings();
            if valid >= self.settings.min_valid_readings && !pump.has_faulted() {
                info!(
                    "Scale on {} answers with {} ({} valid readings)",
                    handle.name, candidate, valid
                );
                return Ok(ProbeSuccess {
                    config: *candidate,
                    pump,
                });
            }

            debug!(
                "Candidate {} rejected: {} valid reading(s), faulted: {}",
                candidate,
                valid,
                pump.has_faulted()
            );
            pump.stop().await;
            transport.close().await;
        }

        transport.close().await;
        let tried = self.settings.candidates.len();
        warn!("No candidate configuration worked on {}", handle.name);
        Err(ScaleError::ProbeExhausted { tried })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ProbeSettings::default();
        assert_eq!(settings.probe_window, Duration::from_millis(2500));
        assert_eq!(settings.min_valid_readings, 2);
        assert_eq!(settings.max_line_length, 500);
        assert_eq!(settings.candidates, DEFAULT_CANDIDATES.to_vec());
    }

    #[test]
    fn test_worst_case_latency() {
        let settings = ProbeSettings::default()
            .with_candidates(vec![SerialConfig::default(); 3])
            .with_probe_window(Duration::from_secs(2));
        assert_eq!(settings.worst_case_latency(), Duration::from_secs(6));
    }

    #[test]
    fn test_builder() {
        let settings = ProbeSettings::default().with_min_valid_readings(5);
        let prober = ConfigProber::new(settings.clone());
        assert_eq!(prober.settings(), &settings);
    }
}
