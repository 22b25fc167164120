//! Candidate line configurations for weighbridge indicators.
//!
//! Ordered by how often they turn up on site, so the common case connects
//! after a single probe window.

use crate::port::SerialConfig;

/// Default probe order.
pub const DEFAULT_CANDIDATES: &[SerialConfig] = &[
    SerialConfig::eight_n_one(9600),  // Most indicators ship like this
    SerialConfig::seven_e_one(9600),  // Older ASCII-continuous heads
    SerialConfig::eight_n_one(2400),  // Legacy weighbridge defaults
    SerialConfig::seven_e_one(2400),
    SerialConfig::eight_n_one(4800),
    SerialConfig::seven_e_one(4800),
    SerialConfig::eight_n_one(1200),  // Very old remote displays
    SerialConfig::eight_n_one(19200), // Newer digital load-cell boxes
];

/// Candidate list with `preferred` moved to the front.
///
/// Useful when the last session's configuration is known: it is tried
/// first and not repeated later.
pub fn with_preferred(preferred: SerialConfig, candidates: &[SerialConfig]) -> Vec<SerialConfig> {
    let mut ordered = Vec::with_capacity(candidates.len() + 1);
    ordered.push(preferred);
    ordered.extend(candidates.iter().copied().filter(|c| *c != preferred));
    ordered
}
