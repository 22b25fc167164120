//! Serial parameter auto-detection.
//!
//! Scales rarely announce their line settings, so the reader brute-forces a
//! short prioritized list of configurations and keeps the first one whose
//! output decodes as weight lines.

pub mod candidates;
pub mod prober;

// Re-export main types
pub use candidates::{with_preferred, DEFAULT_CANDIDATES};
pub use prober::{
    ConfigProber, ProbeSettings, ProbeSuccess, DEFAULT_MIN_VALID_READINGS, DEFAULT_PROBE_WINDOW,
};
