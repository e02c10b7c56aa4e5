//! Weight value parsing and unit conversion.
//!
//! Matched weight strings arrive in whatever shape the drawing used:
//! thousands separators, digit groups split by spaces, kg or ton units.
//! Everything converts to a canonical value in pounds.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pounds per kilogram.
pub const KG_TO_LB: f64 = 2.204_622_621_85;
/// Pounds per metric ton (1000 kg).
pub const METRIC_TON_TO_LB: f64 = 1000.0 * KG_TO_LB;
/// Pounds per short (US) ton.
pub const SHORT_TON_TO_LB: f64 = 2000.0;

/// Default plausibility range for unit-less weights, in pounds.
///
/// A rebar sheet total below a pound or above a hundred tons is more likely a
/// mismatched number than a weight.
pub const DEFAULT_PLAUSIBLE_LB: RangeInclusive<f64> = 1.0..=200_000.0;

// ============================================================================
// Units
// ============================================================================

/// Weight unit recognized by the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Pounds,
    Kilograms,
    MetricTons,
    ShortTons,
}

impl Unit {
    /// Parse a captured unit token. Returns `None` for unrecognized tokens.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().trim_end_matches('.').to_lowercase();
        match token.as_str() {
            "lb" | "lbs" | "pound" | "pounds" => Some(Unit::Pounds),
            "kg" | "kgs" | "kilogram" | "kilograms" => Some(Unit::Kilograms),
            "tonne" | "tonnes" | "metric ton" | "metric tons" | "mt" => Some(Unit::MetricTons),
            "ton" | "tons" => Some(Unit::ShortTons),
            _ => None,
        }
    }

    /// Conversion factor from this unit to pounds.
    pub fn to_lb_factor(self) -> f64 {
        match self {
            Unit::Pounds => 1.0,
            Unit::Kilograms => KG_TO_LB,
            Unit::MetricTons => METRIC_TON_TO_LB,
            Unit::ShortTons => SHORT_TON_TO_LB,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a weight candidate was disqualified.
///
/// Neither condition is fatal: the owning candidate is dropped from selection
/// and the run continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum UnitError {
    /// The captured value did not survive numeric parsing.
    #[error("malformed numeric value: {0:?}")]
    MalformedValue(String),

    /// No unit was captured and the magnitude is implausible for pounds.
    #[error("weight {0} has no unit and falls outside the plausible range")]
    UnresolvedUnit(f64),
}

// ============================================================================
// Normalization
// ============================================================================

/// Convert a matched value/unit pair into canonical pounds.
///
/// Comma is treated as a thousands separator and period as the decimal point
/// (the drawing convention); digit groups split by spaces are rejoined. A
/// missing unit is assumed to mean pounds only when the parsed magnitude lies
/// inside `plausible_lb`, otherwise the candidate is disqualified with
/// [`UnitError::UnresolvedUnit`].
pub fn normalize_weight(
    raw_value: &str,
    raw_unit: Option<&str>,
    plausible_lb: &RangeInclusive<f64>,
) -> Result<(f64, Unit), UnitError> {
    let value = parse_number(raw_value)?;

    let unit = match raw_unit.and_then(Unit::parse) {
        Some(unit) => unit,
        None => {
            if plausible_lb.contains(&value) {
                Unit::Pounds
            } else {
                return Err(UnitError::UnresolvedUnit(value));
            }
        }
    };

    Ok((value * unit.to_lb_factor(), unit))
}

/// Parse a numeric string with thousands separators and space-split groups.
pub fn parse_number(raw: &str) -> Result<f64, UnitError> {
    let stripped: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    if stripped.is_empty() {
        return Err(UnitError::MalformedValue(raw.to_string()));
    }

    stripped
        .parse::<f64>()
        .map_err(|_| UnitError::MalformedValue(raw.to_string()))
}

/// Relative agreement check used for cross-rank and cross-record comparison.
///
/// Two weights agree when their difference is within `tolerance` (a fraction,
/// e.g. 0.01 for 1%) of the larger magnitude.
pub fn weights_agree(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return true;
    }
    (a - b).abs() <= tolerance * scale
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_separators() {
        assert_eq!(parse_number("1,234.56").unwrap(), 1234.56);
        assert_eq!(parse_number("1 234").unwrap(), 1234.0);
        assert_eq!(parse_number("500").unwrap(), 500.0);
    }

    #[test]
    fn test_parse_number_malformed() {
        assert!(matches!(parse_number("ABC"), Err(UnitError::MalformedValue(_))));
        assert!(matches!(parse_number(""), Err(UnitError::MalformedValue(_))));
        assert!(matches!(parse_number("12.3.4"), Err(UnitError::MalformedValue(_))));
    }

    #[test]
    fn test_unit_parse() {
        assert_eq!(Unit::parse("LB"), Some(Unit::Pounds));
        assert_eq!(Unit::parse("lbs"), Some(Unit::Pounds));
        assert_eq!(Unit::parse("Kg"), Some(Unit::Kilograms));
        assert_eq!(Unit::parse("tonnes"), Some(Unit::MetricTons));
        assert_eq!(Unit::parse("TONS"), Some(Unit::ShortTons));
        assert_eq!(Unit::parse("furlongs"), None);
    }

    #[test]
    fn test_kg_converts_to_pounds() {
        let (lb, unit) = normalize_weight("50", Some("kg"), &DEFAULT_PLAUSIBLE_LB).unwrap();
        assert_eq!(unit, Unit::Kilograms);
        assert!((lb - 110.23).abs() < 0.01);
    }

    #[test]
    fn test_ton_conversions() {
        let (lb, _) = normalize_weight("2", Some("tons"), &DEFAULT_PLAUSIBLE_LB).unwrap();
        assert_eq!(lb, 4000.0);

        let (lb, _) = normalize_weight("1", Some("tonne"), &DEFAULT_PLAUSIBLE_LB).unwrap();
        assert!((lb - 2204.62).abs() < 0.01);
    }

    #[test]
    fn test_missing_unit_plausible_defaults_to_pounds() {
        let (lb, unit) = normalize_weight("1,500", None, &DEFAULT_PLAUSIBLE_LB).unwrap();
        assert_eq!(unit, Unit::Pounds);
        assert_eq!(lb, 1500.0);
    }

    #[test]
    fn test_missing_unit_implausible_is_unresolved() {
        let err = normalize_weight("9000000", None, &DEFAULT_PLAUSIBLE_LB).unwrap_err();
        assert!(matches!(err, UnitError::UnresolvedUnit(v) if v == 9_000_000.0));
    }

    #[test]
    fn test_kg_lb_round_trip_agreement() {
        // The same physical weight written in either unit lands on the same
        // canonical pounds value.
        let (from_kg, _) = normalize_weight("100", Some("kg"), &DEFAULT_PLAUSIBLE_LB).unwrap();
        let (from_lb, _) =
            normalize_weight("220.462262185", Some("lb"), &DEFAULT_PLAUSIBLE_LB).unwrap();
        assert!(weights_agree(from_kg, from_lb, 1e-9));
    }

    #[test]
    fn test_weights_agree_tolerance() {
        assert!(weights_agree(1000.0, 1000.0, 0.01));
        assert!(weights_agree(1000.0, 1009.0, 0.01));
        assert!(!weights_agree(1000.0, 1200.0, 0.01));
        assert!(weights_agree(0.0, 0.0, 0.01));
    }
}
