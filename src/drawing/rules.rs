//! Ranked pattern cascade for identifier and weight extraction.
//!
//! Rules are data, not control flow: every rule in the table runs against the
//! normalized text and every match becomes a [`Candidate`]. Nothing
//! short-circuits; the record builder later prefers the lowest rank, and
//! disagreement between ranks surfaces as low confidence instead of being
//! resolved silently. Rank 0 is the most specific rule of a kind.

use std::ops::RangeInclusive;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::drawing::units::{self, Unit, UnitError};

/// Numeric value with optional thousands groups ("500", "1,234.5", "1 234").
const NUM: &str = r"\d+(?:[ ,]\d{3})*(?:\.\d+)?";

/// Unit tokens the weight rules recognize. Longer alternatives first.
const UNIT: &str = r"metric\s+tons?|tonnes?|tons?|pounds?|lbs?|kilograms?|kgs?|MT\b";

// ============================================================================
// Candidates
// ============================================================================

/// What a rule extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateKind {
    Identifier,
    Weight,
}

/// A single pattern match, with provenance for audit and review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: CandidateKind,
    /// Full matched substring.
    pub matched: String,
    /// Captured value: identifier code (uppercased) or raw numeric string.
    pub value: String,
    /// Surrounding text, ±N chars around the match.
    pub context: String,
    /// Rank of the rule that produced this match; lower = more specific.
    pub rank: usize,
    /// Whether the rule matches near a labeled anchor ("DWG", "TOTAL WEIGHT").
    pub anchored: bool,
    /// Page the match came from; 0 for filename-derived candidates.
    pub page: usize,
    /// Captured unit token, weight candidates only.
    pub raw_unit: Option<String>,
    /// Canonical weight in pounds, filled by qualification.
    pub weight_lb: Option<f64>,
    /// Recognized unit, filled by qualification.
    pub unit: Option<Unit>,
    /// Weight match with no identifiable unit; usable only with a penalty.
    pub unit_ambiguous: bool,
    /// Set when numeric parsing or unit resolution failed.
    pub disqualified: Option<UnitError>,
}

impl Candidate {
    /// Whether this candidate may participate in active-value selection.
    pub fn is_qualified(&self) -> bool {
        self.disqualified.is_none()
    }

    /// Run the unit/value normalizer over a weight candidate.
    ///
    /// Fills `weight_lb` and `unit`, or records the disqualification. A parse
    /// failure never propagates; the candidate just drops out of selection.
    pub fn qualify(&mut self, plausible_lb: &RangeInclusive<f64>) {
        if self.kind != CandidateKind::Weight {
            return;
        }

        match units::normalize_weight(&self.value, self.raw_unit.as_deref(), plausible_lb) {
            Ok((lb, unit)) => {
                self.weight_lb = Some(lb);
                self.unit = Some(unit);
            }
            Err(err) => {
                tracing::debug!("weight candidate disqualified: {} ({:?})", err, self.matched);
                self.disqualified = Some(err);
            }
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// One entry of the cascade: a compiled pattern plus its priority metadata.
pub struct Rule {
    pub rank: usize,
    pub kind: CandidateKind,
    pub anchored: bool,
    pattern: Regex,
}

impl Rule {
    fn new(rank: usize, kind: CandidateKind, anchored: bool, pattern: &str) -> Self {
        Self {
            rank,
            kind,
            anchored,
            pattern: Regex::new(pattern).expect("invalid built-in rule pattern"),
        }
    }
}

/// The ordered rule table plus the context window size.
pub struct RuleSet {
    rules: Vec<Rule>,
    context_window: usize,
}

impl RuleSet {
    /// Build the default cascade with the given context window (chars kept on
    /// each side of a match for review display).
    pub fn new(context_window: usize) -> Self {
        Self {
            rules: default_rules(),
            context_window,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(60)
    }

    /// Number of rules in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule over one page of normalized text.
    ///
    /// All matches of all rules are collected, ordered by rule rank per kind.
    /// An empty result is valid output and means "no extractable data here".
    pub fn match_page(&self, text: &str, page: usize) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        for rule in &self.rules {
            for caps in rule.pattern.captures_iter(text) {
                let whole = caps.get(0).expect("capture group 0 always present");
                let value = match caps.name("value") {
                    Some(v) => v.as_str(),
                    None => continue,
                };

                let value = match rule.kind {
                    CandidateKind::Identifier => value.to_uppercase(),
                    CandidateKind::Weight => value.to_string(),
                };

                candidates.push(Candidate {
                    kind: rule.kind,
                    matched: whole.as_str().to_string(),
                    value,
                    context: context_window(text, whole.start(), whole.end(), self.context_window),
                    rank: rule.rank,
                    anchored: rule.anchored,
                    page,
                    raw_unit: caps.name("unit").map(|u| u.as_str().to_string()),
                    weight_lb: None,
                    unit: None,
                    unit_ambiguous: rule.kind == CandidateKind::Weight
                        && caps.name("unit").is_none(),
                    disqualified: None,
                });
            }
        }

        candidates
    }
}

/// The built-in cascade.
///
/// Identifier ranks follow drawing/sheet-number conventions; ranks 4-5 come
/// from the filename conventions rebar submittals use. Weight ranks 0-3 sit
/// on labeled anchors, rank 4 is a bare number-with-unit fallback.
fn default_rules() -> Vec<Rule> {
    use CandidateKind::{Identifier, Weight};

    let num_unit = |anchor: &str| format!(r"(?i){anchor}\s*[:=]?\s*(?P<value>{NUM})\s*(?P<unit>{UNIT})?");

    vec![
        // Identifier cascade
        Rule::new(
            0,
            Identifier,
            true,
            r"(?i)DRAWING\s*NO\.?\s*[:=]?\s*(?P<value>[A-Z0-9][A-Z0-9-]{2,})",
        ),
        Rule::new(
            1,
            Identifier,
            true,
            r"(?i)\bDWG\.?\s*NO\.?\s*[:=]?\s*(?P<value>[A-Z0-9][A-Z0-9-]{2,})",
        ),
        Rule::new(2, Identifier, true, r"(?i)\b(?P<value>DWG-[A-Z0-9][A-Z0-9-]*)\b"),
        Rule::new(
            3,
            Identifier,
            true,
            r"(?i)SHEET\s*(?:NO\.?)?\s*[:=]?\s*(?P<value>[A-Z0-9][A-Z0-9-]{2,})",
        ),
        Rule::new(4, Identifier, false, r"(?i)\b(?:FN-)?(?P<value>DR-S-\d{4})\b"),
        Rule::new(5, Identifier, false, r"-(?P<value>\d{4})(?:[_.]|\b)"),
        // Weight cascade
        Rule::new(0, Weight, true, &num_unit(r"TOTAL\s+WEIGHT")),
        Rule::new(1, Weight, true, &num_unit(r"\b(?:GROSS\s+)?WT\.?")),
        Rule::new(2, Weight, true, &num_unit(r"ALL\s+BARS\s+IN\s+THIS\s+SHEET\s+TOTAL")),
        Rule::new(3, Weight, true, &num_unit(r"\bTOTAL")),
        Rule::new(
            4,
            Weight,
            false,
            &format!(r"(?i)\b(?P<value>{NUM})\s*(?P<unit>{UNIT})"),
        ),
    ]
}

// ============================================================================
// Revision extraction
// ============================================================================

/// Extract a revision token ("C02", "REV: B") from page text.
pub fn extract_revision(text: &str) -> Option<String> {
    let patterns = [
        r"(?i)REV(?:ISION)?\s*[.:]\s*(?P<value>[A-Z0-9]+)",
        r"\b(?P<value>C\d{2})\b",
    ];

    for pattern in patterns {
        let re = Regex::new(pattern).expect("invalid revision pattern");
        if let Some(caps) = re.captures(text) {
            if let Some(value) = caps.name("value") {
                return Some(value.as_str().to_uppercase());
            }
        }
    }

    None
}

// ============================================================================
// Helpers
// ============================================================================

/// Slice ±`n` chars around a byte range, respecting char boundaries.
fn context_window(text: &str, start: usize, end: usize, n: usize) -> String {
    let mut lo = start;
    let mut taken = 0;
    while lo > 0 && taken < n {
        lo -= 1;
        while lo > 0 && !text.is_char_boundary(lo) {
            lo -= 1;
        }
        taken += 1;
    }

    let mut hi = end;
    let mut taken = 0;
    while hi < text.len() && taken < n {
        hi += 1;
        while hi < text.len() && !text.is_char_boundary(hi) {
            hi += 1;
        }
        taken += 1;
    }

    text[lo..hi].to_string()
}

// ============================================================================
// Tests
// ============================================================================
