//! Record building: one [`DrawingRecord`] per source file.
//!
//! The builder owns the selection policy. The matcher hands over every
//! candidate it found; here the lowest-rank qualified match of each kind
//! becomes the active value, everything else is retained as an alternate, and
//! cross-rank disagreement is surfaced as conflicting confidence rather than
//! resolved silently.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::drawing::rules::{Candidate, CandidateKind};
use crate::drawing::units::{self, DEFAULT_PLAUSIBLE_LB};

// ============================================================================
// Configuration
// ============================================================================

/// Tie-break policy for candidates sharing rank and anchor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TieBreak {
    /// Keep the candidate encountered first (default).
    FirstEncountered,
    /// Keep the candidate encountered last.
    LastEncountered,
}

/// Extraction knobs.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Chars of surrounding text kept on each side of a match.
    pub context_window: usize,
    /// Relative tolerance for cross-rank weight agreement (0.01 = 1%).
    pub weight_tolerance: f64,
    /// Plausible pounds range assumed when a weight has no unit.
    pub plausible_lb: RangeInclusive<f64>,
    /// Same-rank, same-anchor tie-break.
    pub tie_break: TieBreak,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            context_window: 60,
            weight_tolerance: 0.01,
            plausible_lb: DEFAULT_PLAUSIBLE_LB,
            tie_break: TieBreak::FirstEncountered,
        }
    }
}

// ============================================================================
// Record types
// ============================================================================

/// Qualitative strength of a record's active values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Confidence {
    High,
    Medium,
    Low,
    /// Rules of different ranks disagreed beyond tolerance.
    Conflicting,
}

impl Confidence {
    /// Severity order for combining field confidences; higher = worse.
    fn severity(self) -> u8 {
        match self {
            Confidence::High => 0,
            Confidence::Medium => 1,
            Confidence::Low => 2,
            Confidence::Conflicting => 3,
        }
    }

    /// The worse of two confidences.
    pub fn worse(self, other: Self) -> Self {
        if self.severity() >= other.severity() {
            self
        } else {
            other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
            Confidence::Conflicting => "conflicting",
        }
    }
}

/// Export status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Ok,
    /// At least one field produced no valid candidate.
    ExtractionFailed,
    /// A duplicate of the canonical record; excluded from the final sheet.
    Superseded,
    /// Member of a duplicate group awaiting adjudication.
    Pending,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Ok => "ok",
            RecordStatus::ExtractionFailed => "extraction-failed",
            RecordStatus::Superseded => "superseded",
            RecordStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(RecordStatus::Ok),
            "extraction-failed" => Some(RecordStatus::ExtractionFailed),
            "superseded" => Some(RecordStatus::Superseded),
            "pending" => Some(RecordStatus::Pending),
            _ => None,
        }
    }
}

/// Weight found on one page, in canonical pounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageWeight {
    pub page: usize,
    pub weight_lb: f64,
}

/// The unit of output: everything extracted from one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawingRecord {
    pub source_file: String,
    /// Drawing identifier; empty when extraction failed for this field.
    pub identifier: String,
    pub revision: String,
    pub title: String,
    /// Canonical weight in pounds; `None` when extraction failed.
    pub weight_lb: Option<f64>,
    /// Per-page breakdown of the total, for audit and adjudication display.
    pub page_weights: Vec<PageWeight>,
    pub confidence: Confidence,
    pub identifier_failed: bool,
    pub weight_failed: bool,
    pub status: RecordStatus,
    /// Every candidate that did not become an active value.
    pub alternates: Vec<Candidate>,
}

// ============================================================================
// Builder
// ============================================================================

/// Build the record for one source file from its qualified candidates.
///
/// Selection policy:
/// - identifier: lowest rank wins; same-rank ties prefer an anchored match,
///   then fall to the configured [`TieBreak`]
/// - weight: per page, lowest-rank qualified non-unit-ambiguous match wins,
///   falling back to a unit-ambiguous one (capped at low confidence); the
///   file weight is the sum over pages
/// - cross-rank disagreement beyond tolerance downgrades confidence to
///   conflicting but the lowest-rank value stays active, never averaged
///
/// A file with zero valid candidates of a kind still yields a record; the
/// field is marked extraction-failed and the record is never dropped.
pub fn build_record(
    source_file: &str,
    title: String,
    revision: String,
    mut candidates: Vec<Candidate>,
    config: &ExtractConfig,
) -> DrawingRecord {
    for candidate in &mut candidates {
        candidate.qualify(&config.plausible_lb);
    }

    let (identifier, identifier_conf, identifier_index) = select_identifier(&candidates, config);
    let weight = select_weight(&candidates, config);

    let identifier_failed = identifier.is_empty();
    let weight_failed = weight.total.is_none();

    // Confidence describes the active values; a failed field is already
    // flagged and does not dilute the other field's confidence.
    let mut confidence = match (identifier_failed, weight_failed) {
        (false, false) => identifier_conf.worse(weight.confidence),
        (true, false) => weight.confidence,
        (false, true) => identifier_conf,
        (true, true) => Confidence::Low,
    };
    if weight.conflicting {
        confidence = Confidence::Conflicting;
    }

    let status = if identifier_failed || weight_failed {
        RecordStatus::ExtractionFailed
    } else {
        RecordStatus::Ok
    };

    let active: Vec<usize> = identifier_index
        .into_iter()
        .chain(weight.winner_indexes)
        .collect();
    let alternates = candidates
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !active.contains(i))
        .map(|(_, c)| c)
        .collect();

    DrawingRecord {
        source_file: source_file.to_string(),
        identifier,
        revision,
        title,
        weight_lb: weight.total,
        page_weights: weight.pages,
        confidence,
        identifier_failed,
        weight_failed,
        status,
        alternates,
    }
}

/// Pick the active identifier. Returns (value, confidence, winning index).
fn select_identifier(
    candidates: &[Candidate],
    config: &ExtractConfig,
) -> (String, Confidence, Option<usize>) {
    let mut winner: Option<(usize, &Candidate)> = None;

    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.kind != CandidateKind::Identifier || !candidate.is_qualified() {
            continue;
        }

        winner = Some(match winner {
            None => (i, candidate),
            Some((best_i, best)) => {
                if beats(candidate, best, config.tie_break) {
                    (i, candidate)
                } else {
                    (best_i, best)
                }
            }
        });
    }

    match winner {
        Some((i, c)) => (
            c.value.clone(),
            base_confidence(CandidateKind::Identifier, c.rank),
            Some(i),
        ),
        None => (String::new(), Confidence::Low, None),
    }
}

/// Whether `a` beats the current best under the selection policy.
fn beats(a: &Candidate, best: &Candidate, tie_break: TieBreak) -> bool {
    if a.rank != best.rank {
        return a.rank < best.rank;
    }
    if a.anchored != best.anchored {
        return a.anchored;
    }
    // Same rank, same anchor status: candidates arrive in encounter order.
    tie_break == TieBreak::LastEncountered
}

struct WeightSelection {
    total: Option<f64>,
    pages: Vec<PageWeight>,
    confidence: Confidence,
    conflicting: bool,
    winner_indexes: Vec<usize>,
}

/// Pick the active weight per page and sum across pages.
fn select_weight(candidates: &[Candidate], config: &ExtractConfig) -> WeightSelection {
    let mut pages: Vec<usize> = candidates
        .iter()
        .filter(|c| c.kind == CandidateKind::Weight)
        .map(|c| c.page)
        .collect();
    pages.sort_unstable();
    pages.dedup();

    let mut selection = WeightSelection {
        total: None,
        pages: Vec::new(),
        confidence: Confidence::Low,
        conflicting: false,
        winner_indexes: Vec::new(),
    };
    let mut worst_page_conf: Option<Confidence> = None;

    for page in pages {
        let on_page: Vec<(usize, &Candidate)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.kind == CandidateKind::Weight && c.page == page && c.is_qualified()
            })
            .collect();

        // Prefer unit-bearing candidates; fall back to a unit-ambiguous one
        // with confidence capped at low.
        let winner = pick_weight(&on_page, false, config)
            .or_else(|| pick_weight(&on_page, true, config));

        let Some((winner_i, winner)) = winner else {
            continue;
        };
        // Qualified weight candidates always carry a converted value
        let Some(value) = winner.weight_lb else {
            continue;
        };

        let mut page_conf = base_confidence(CandidateKind::Weight, winner.rank);
        if winner.unit_ambiguous {
            page_conf = page_conf.worse(Confidence::Low);
        }

        // Cross-validation: does the best match at the next rank agree?
        if let Some(other) = on_page
            .iter()
            .filter(|(_, c)| c.rank > winner.rank && !c.unit_ambiguous)
            .min_by_key(|(_, c)| c.rank)
            .and_then(|(_, c)| c.weight_lb)
        {
            if !units::weights_agree(value, other, config.weight_tolerance) {
                selection.conflicting = true;
            }
        }

        selection.pages.push(PageWeight {
            page,
            weight_lb: value,
        });
        selection.total = Some(selection.total.unwrap_or(0.0) + value);
        selection.winner_indexes.push(winner_i);
        worst_page_conf = Some(match worst_page_conf {
            Some(conf) => conf.worse(page_conf),
            None => page_conf,
        });
    }

    if let Some(conf) = worst_page_conf {
        selection.confidence = conf;
    }
    selection
}

fn pick_weight<'a>(
    on_page: &[(usize, &'a Candidate)],
    allow_ambiguous: bool,
    config: &ExtractConfig,
) -> Option<(usize, &'a Candidate)> {
    let mut winner: Option<(usize, &Candidate)> = None;

    for &(i, candidate) in on_page {
        if candidate.unit_ambiguous != allow_ambiguous {
            continue;
        }
        winner = Some(match winner {
            None => (i, candidate),
            Some((best_i, best)) => {
                if beats(candidate, best, config.tie_break) {
                    (i, candidate)
                } else {
                    (best_i, best)
                }
            }
        });
    }

    winner
}

/// Confidence implied by the winning rule rank alone.
fn base_confidence(kind: CandidateKind, rank: usize) -> Confidence {
    match kind {
        CandidateKind::Identifier => match rank {
            0 | 1 => Confidence::High,
            2 | 3 => Confidence::Medium,
            _ => Confidence::Low,
        },
        CandidateKind::Weight => match rank {
            0..=2 => Confidence::High,
            3 => Confidence::Medium,
            _ => Confidence::Low,
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::rules::RuleSet;

    fn extract(text: &str, config: &ExtractConfig) -> DrawingRecord {
        let rules = RuleSet::new(config.context_window);
        let candidates = rules.match_page(text, 1);
        build_record("test.pdf", String::new(), String::new(), candidates, config)
    }

    #[test]
    fn test_higher_rank_wins_other_retained() {
        // Two weight anchors with different units: rank 0 becomes active, the
        // kg match survives as an alternate.
        let config = ExtractConfig::default();
        let record = extract("TOTAL WEIGHT 500 LB\nGROSS WT 230 KG", &config);

        assert_eq!(record.weight_lb, Some(500.0));
        assert!(record
            .alternates
            .iter()
            .any(|c| c.raw_unit.as_deref() == Some("KG") && c.weight_lb.is_some()));
        // 230 kg is ~507 lb, more than 1% from 500: surfaced, not averaged.
        assert_eq!(record.confidence, Confidence::Conflicting);
    }

    #[test]
    fn test_agreeing_ranks_keep_high_confidence() {
        let config = ExtractConfig::default();
        let record = extract("TOTAL WEIGHT 500 LB\nWT: 500 LB", &config);
        assert_eq!(record.weight_lb, Some(500.0));
        assert_eq!(record.confidence, Confidence::High);
    }

    #[test]
    fn test_missing_identifier_still_emitted() {
        let config = ExtractConfig::default();
        let record = extract("TOTAL WEIGHT 500 LB", &config);

        assert!(record.identifier.is_empty());
        assert!(record.identifier_failed);
        assert!(!record.weight_failed);
        assert_eq!(record.status, RecordStatus::ExtractionFailed);
    }

    #[test]
    fn test_nothing_extracted_still_emitted() {
        let config = ExtractConfig::default();
        let record = extract("lorem ipsum", &config);

        assert!(record.identifier_failed);
        assert!(record.weight_failed);
        assert_eq!(record.weight_lb, None);
        assert_eq!(record.status, RecordStatus::ExtractionFailed);
    }

    #[test]
    fn test_ambiguous_weight_used_with_penalty() {
        let config = ExtractConfig::default();
        let record = extract("All Bars in this sheet Total 1234.5", &config);

        assert_eq!(record.weight_lb, Some(1234.5));
        assert_eq!(record.confidence, Confidence::Low);
        assert!(!record.weight_failed);
    }

    #[test]
    fn test_page_weights_sum() {
        let config = ExtractConfig::default();
        let rules = RuleSet::new(config.context_window);

        let mut candidates = rules.match_page("TOTAL WEIGHT 100 LB", 1);
        candidates.extend(rules.match_page("TOTAL WEIGHT 250 LB", 2));
        let record =
            build_record("multi.pdf", String::new(), String::new(), candidates, &config);

        assert_eq!(record.weight_lb, Some(350.0));
        assert_eq!(
            record.page_weights,
            vec![
                PageWeight { page: 1, weight_lb: 100.0 },
                PageWeight { page: 2, weight_lb: 250.0 },
            ]
        );
    }

    #[test]
    fn test_anchored_beats_positional_at_same_rank() {
        let config = ExtractConfig::default();
        let anchored = Candidate {
            kind: CandidateKind::Identifier,
            matched: "DWG-1001".into(),
            value: "DWG-1001".into(),
            context: String::new(),
            rank: 2,
            anchored: true,
            page: 1,
            raw_unit: None,
            weight_lb: None,
            unit: None,
            unit_ambiguous: false,
            disqualified: None,
        };
        let positional = Candidate {
            anchored: false,
            value: "DWG-9999".into(),
            ..anchored.clone()
        };

        let record = build_record(
            "t.pdf",
            String::new(),
            String::new(),
            vec![positional, anchored],
            &config,
        );
        assert_eq!(record.identifier, "DWG-1001");
    }

    #[test]
    fn test_tie_break_policy_is_configurable() {
        let base = Candidate {
            kind: CandidateKind::Identifier,
            matched: "A".into(),
            value: "A-100".into(),
            context: String::new(),
            rank: 2,
            anchored: true,
            page: 1,
            raw_unit: None,
            weight_lb: None,
            unit: None,
            unit_ambiguous: false,
            disqualified: None,
        };
        let second = Candidate {
            value: "B-200".into(),
            ..base.clone()
        };

        let first_policy = ExtractConfig::default();
        let record = build_record(
            "t.pdf",
            String::new(),
            String::new(),
            vec![base.clone(), second.clone()],
            &first_policy,
        );
        assert_eq!(record.identifier, "A-100");

        let last_policy = ExtractConfig {
            tie_break: TieBreak::LastEncountered,
            ..ExtractConfig::default()
        };
        let record = build_record(
            "t.pdf",
            String::new(),
            String::new(),
            vec![base, second],
            &last_policy,
        );
        assert_eq!(record.identifier, "B-200");
    }

    #[test]
    fn test_confidence_worse_ordering() {
        assert_eq!(Confidence::High.worse(Confidence::Low), Confidence::Low);
        assert_eq!(
            Confidence::Conflicting.worse(Confidence::High),
            Confidence::Conflicting
        );
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            RecordStatus::Ok,
            RecordStatus::ExtractionFailed,
            RecordStatus::Superseded,
            RecordStatus::Pending,
        ] {
            assert_eq!(RecordStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RecordStatus::parse("bogus"), None);
    }
}
