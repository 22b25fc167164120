//! Turns one framed line into a [`Reading`] or a rejection.

use super::grammar::match_line;
use super::{Reading, MAX_WEIGHT_KG, MIN_WEIGHT_KG};
use thiserror::Error;

/// Why a line produced no reading.
///
/// Rejections are routine on a noisy link; they are logged, never surfaced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeRejection {
    #[error("line too short after cleaning: {0:?}")]
    TooShort(String),

    #[error("no grammar matched {0:?}")]
    NoGrammarMatched(String),

    #[error("weight field of {0:?} is not a number")]
    InvalidNumber(String),

    #[error("weight {weight_kg} kg out of range in {line:?}")]
    OutOfRange { line: String, weight_kg: f64 },
}

/// Strip everything but ASCII letters, digits, `+ - . ,` and spaces, then trim.
///
/// Control characters (including tabs and CR) and any non-ASCII byte
/// garbage disappear here.
pub fn clean_line(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | ',' | ' '))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Decode one framed line.
///
/// The cleaned line is matched against the grammar table in priority order;
/// the first match must then fall within `0..=60000` kg.
pub fn decode_line(raw: &str) -> Result<Reading, DecodeRejection> {
    let line = clean_line(raw);
    if line.chars().count() < 2 {
        return Err(DecodeRejection::TooShort(line));
    }

    let matched = match match_line(&line) {
        None => return Err(DecodeRejection::NoGrammarMatched(line)),
        Some(Err(_)) => return Err(DecodeRejection::InvalidNumber(line)),
        Some(Ok(m)) => m,
    };

    if !(MIN_WEIGHT_KG..=MAX_WEIGHT_KG).contains(&matched.weight_kg) {
        return Err(DecodeRejection::OutOfRange {
            line,
            weight_kg: matched.weight_kg,
        });
    }

    Ok(Reading::new(matched.weight_kg, matched.stable, line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_line_strips_garbage() {
        assert_eq!(clean_line("\u{2}ST,GS,+0000230kg\r"), "ST,GS,+0000230kg");
        assert_eq!(clean_line("\u{fffd}\u{fffd}SGS+0000900"), "SGS+0000900");
        assert_eq!(clean_line("  ST#+00*70 \t"), "ST+0070");
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            decode_line("\u{1}S\u{3}"),
            Err(DecodeRejection::TooShort("S".to_string()))
        );
    }

    #[test]
    fn test_decodes_after_cleaning() {
        let reading = decode_line("\u{2}ST,GS,+0000230kg\u{3}").unwrap();
        assert_eq!(reading.weight_kg, 230.0);
        assert!(reading.stable);
        assert_eq!(reading.raw, "ST,GS,+0000230kg");
    }

    #[test]
    fn test_negative_rejected_not_clamped() {
        match decode_line("US-0000070") {
            Err(DecodeRejection::OutOfRange { weight_kg, .. }) => assert_eq!(weight_kg, -7.0),
            other => panic!("expected OutOfRange, got {:?}", other),
        }
    }

    #[test]
    fn test_range_bounds_inclusive() {
        assert_eq!(decode_line("ST,GS,+0kg").unwrap().weight_kg, 0.0);
        assert_eq!(decode_line("ST,GS,+60000kg").unwrap().weight_kg, 60000.0);
        assert!(decode_line("ST,GS,+60001kg").is_err());
    }

    #[test]
    fn test_no_grammar() {
        assert!(matches!(
            decode_line("garbage line"),
            Err(DecodeRejection::NoGrammarMatched(_))
        ));
    }
}
