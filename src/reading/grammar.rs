//! Wire grammars emitted by supported scale indicators.
//!
//! The table order is the match priority: looser grammars sit after the
//! stricter ones they could otherwise shadow.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::num::ParseIntError;

/// One line format the decoder understands.
#[derive(Debug)]
pub struct Grammar {
    /// Short identifier used in logs.
    pub name: &'static str,
    /// Anchored, case-insensitive pattern. Group 1 is the stability tag, the
    /// last group the signed integer weight.
    pattern: Regex,
    /// Tags (upper case) that mark a stable reading.
    stable_tags: &'static [&'static str],
    /// The integer field is divided by this to get kilograms.
    divisor: f64,
}

/// Raw fields captured by a grammar, before range validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrammarMatch {
    pub grammar: &'static str,
    pub stable: bool,
    pub weight_kg: f64,
}

impl Grammar {
    fn new(
        name: &'static str,
        pattern: &str,
        stable_tags: &'static [&'static str],
        divisor: f64,
    ) -> Self {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .unwrap_or_else(|e| panic!("grammar '{name}' has an invalid pattern: {e}"));
        Self {
            name,
            pattern,
            stable_tags,
            divisor,
        }
    }

    /// Match a cleaned line.
    ///
    /// Returns `None` when the pattern does not match. A match whose weight
    /// field does not fit an `i64` yields `Some(Err(_))`.
    pub fn captures(&self, line: &str) -> Option<Result<GrammarMatch, ParseIntError>> {
        let caps = self.pattern.captures(line)?;
        let tag = caps.get(1)?.as_str().to_ascii_uppercase();
        let digits = caps.get(caps.len() - 1)?.as_str();

        let stable = self.stable_tags.contains(&tag.as_str());
        Some(
            digits
                .parse::<i64>()
                .map(|raw| GrammarMatch {
                    grammar: self.name,
                    stable,
                    weight_kg: raw as f64 / self.divisor,
                }),
        )
    }
}

/// Grammars in priority order.
pub static GRAMMARS: Lazy<Vec<Grammar>> = Lazy::new(|| {
    vec![
        // ST,GS,+0000230kg -> 230 kg
        Grammar::new(
            "comma_triple",
            r"^(ST|US),(GS|US),([+-]?\d+)kg$",
            &["ST"],
            1.0,
        ),
        // SGS+0000900 -> 90.0 kg (one implied decimal)
        Grammar::new("tagged_run", r"^(US|S)GS([+-]?\d{7})$", &["S"], 10.0),
        // ST+0000070 -> 7.0 kg (one implied decimal)
        Grammar::new("bare_tag", r"^(ST|US)([+-]?\d+)$", &["ST"], 10.0),
    ]
});

/// Run `line` through the table; the first grammar that matches decides.
pub fn match_line(line: &str) -> Option<Result<GrammarMatch, ParseIntError>> {
    GRAMMARS.iter().find_map(|g| g.captures(line))
}
