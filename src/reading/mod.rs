//! Weight readings and the text pipeline that produces them.
//!
//! Bytes from the transport are framed into lines by [`LineFramer`], then
//! [`decode_line`] runs each line through the ordered grammar table in
//! [`grammar`] to produce a [`Reading`].

pub mod decoder;
pub mod framer;
pub mod grammar;

pub use decoder::{clean_line, decode_line, DecodeRejection};
pub use framer::{LineFramer, MAX_LINE_LENGTH};
pub use grammar::{Grammar, GRAMMARS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest weight accepted from the scale, in kilograms.
pub const MIN_WEIGHT_KG: f64 = 0.0;

/// Highest weight accepted from the scale, in kilograms.
pub const MAX_WEIGHT_KG: f64 = 60_000.0;

/// Unit a reading is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Kg,
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kg => write!(f, "kg"),
        }
    }
}

/// A single accepted weight reading from the scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub weight_kg: f64,
    pub stable: bool,
    pub unit: WeightUnit,
    pub captured_at: DateTime<Utc>,
    /// Cleaned line the reading was decoded from.
    pub raw: String,
}

impl Reading {
    pub fn new(weight_kg: f64, stable: bool, raw: impl Into<String>) -> Self {
        Self {
            weight_kg,
            stable,
            unit: WeightUnit::Kg,
            captured_at: Utc::now(),
            raw: raw.into(),
        }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.weight_kg,
            self.unit,
            if self.stable { "stable" } else { "unstable" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_serializes_unit_as_kg() {
        let reading = Reading::new(230.0, true, "ST,GS,+0000230kg");
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["unit"], "kg");
        assert_eq!(json["weight_kg"], 230.0);
        assert_eq!(json["stable"], true);
    }

    #[test]
    fn test_reading_display() {
        assert_eq!(Reading::new(90.0, false, "x").to_string(), "90 kg unstable");
    }
}
