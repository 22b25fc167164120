//! Shared test utilities for the scale reader integration tests.
//!
//! - Scripted mock transports that only "speak" under one configuration
//! - Reader settings with short probe windows for paused-clock tests

#![allow(dead_code)]

use std::time::Duration;
use weighbridge_scale::negotiation::ProbeSettings;
use weighbridge_scale::{MockTransport, ReaderSettings, ScaleReader, SerialConfig};

pub const MOCK_PORT: &str = "MOCK0";

/// Probe window used throughout the tests (virtual time).
pub const TEST_PROBE_WINDOW: Duration = Duration::from_millis(200);

/// The first two default candidates, in probe order.
pub fn first_candidate() -> SerialConfig {
    SerialConfig::eight_n_one(9600)
}

pub fn second_candidate() -> SerialConfig {
    SerialConfig::seven_e_one(9600)
}

/// Reader settings over `candidates` with a short probe window.
pub fn fast_settings(candidates: Vec<SerialConfig>) -> ReaderSettings {
    ReaderSettings {
        probe: ProbeSettings::default()
            .with_candidates(candidates)
            .with_probe_window(TEST_PROBE_WINDOW),
        ..ReaderSettings::default()
    }
}

/// `ST,GS,<weight>kg` lines, one per weight.
pub fn stable_lines(weights: &[i64]) -> Vec<String> {
    weights
        .iter()
        .map(|w| format!("ST,GS,{:+08}kg", w))
        .collect()
}

/// Mock transport that produces `lines` only under `config`.
pub fn scale_speaking(config: SerialConfig, lines: &[String]) -> MockTransport {
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    MockTransport::new(MOCK_PORT).with_lines(config, &lines)
}

/// Reader over a clone of `transport`, so the test keeps an inspection handle.
pub fn reader_for(
    transport: &MockTransport,
    candidates: Vec<SerialConfig>,
) -> ScaleReader<MockTransport> {
    ScaleReader::new(transport.clone(), fast_settings(candidates))
}
