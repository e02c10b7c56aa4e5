//! Duplicate detection and resolution.
//!
//! Records sharing a drawing identifier form a group. Groups whose weights
//! agree within tolerance resolve themselves; the rest are handed out as
//! pending groups for a human (or policy) to adjudicate. Resolution is
//! recomputed from scratch on every call, so applying the same adjudication
//! twice cannot change the outcome.

use serde::{Deserialize, Serialize};

use crate::drawing::record::{DrawingRecord, RecordStatus};
use crate::drawing::units;

// ============================================================================
// Types
// ============================================================================

/// Resolution knobs.
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Relative tolerance for weights within a group to count as agreeing.
    pub weight_tolerance: f64,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            weight_tolerance: 0.01,
        }
    }
}

/// Lifecycle of a duplicate group.
///
/// `Unresolved -> {AutoResolved | Pending} -> Resolved`; only `Pending`
/// requires external input, and transitions happen only inside this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    Unresolved,
    AutoResolved,
    Pending,
    Resolved,
}

/// A set of records sharing an identifier, as a view over record indexes.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub identifier: String,
    /// Indexes into the record slice, in encounter order.
    pub members: Vec<usize>,
    pub status: GroupStatus,
}

/// A group awaiting adjudication, shaped for external display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingGroup {
    pub identifier: String,
    pub candidate_records: Vec<DrawingRecord>,
}

/// External input resolving one pending group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjudication {
    pub identifier: String,
    pub choice: AdjudicationChoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdjudicationChoice {
    /// This source file's record is canonical; siblings are superseded.
    ChosenSource(String),
    /// Override the group weight; the first member carries it.
    CorrectedWeight(f64),
}

// ============================================================================
// Resolver
// ============================================================================

/// Group records by identifier and resolve every group.
///
/// Mutates member statuses in place (`Ok`/`ExtractionFailed` for canonical
/// records, `Superseded` for the rest, `Pending` for unadjudicated
/// conflicts) and returns the groups still needing external input.
///
/// Records with an empty identifier are never grouped; each stands alone as
/// unresolved-but-not-duplicate and keeps its extraction status.
pub fn group_and_resolve(
    records: &mut [DrawingRecord],
    adjudications: &[Adjudication],
    config: &ResolveConfig,
) -> Vec<PendingGroup> {
    resolve_groups(records, adjudications, config)
        .into_iter()
        .filter(|g| g.status == GroupStatus::Pending)
        .map(|g| PendingGroup {
            identifier: g.identifier,
            candidate_records: g.members.iter().map(|&i| records[i].clone()).collect(),
        })
        .collect()
}

/// Full resolution pass returning every duplicate group with its final
/// status. [`group_and_resolve`] is the pending-only view over this.
pub fn resolve_groups(
    records: &mut [DrawingRecord],
    adjudications: &[Adjudication],
    config: &ResolveConfig,
) -> Vec<DuplicateGroup> {
    // Statuses are derived state; recompute from extraction results so the
    // whole pass is idempotent.
    for record in records.iter_mut() {
        record.status = if record.identifier_failed || record.weight_failed {
            RecordStatus::ExtractionFailed
        } else {
            RecordStatus::Ok
        };
    }

    let mut groups = group_records(records);

    for group in groups.iter_mut() {
        if group.members.len() < 2 {
            continue;
        }

        let adjudication = adjudications
            .iter()
            .find(|a| a.identifier == group.identifier);

        if let Some(adjudication) = adjudication {
            if apply_adjudication(records, group, adjudication) {
                group.status = GroupStatus::Resolved;
                continue;
            }
            // Stale choice (named source gone from the group, e.g. its
            // identifier changed on re-scan): the decision no longer
            // applies, so the group falls back to pending for a new one.
        } else if weights_consistent(records, &group.members, config.weight_tolerance) {
            // Any member would do since they agree; keep the first and mark
            // the rest superseded for audit.
            supersede_all_but(records, &group.members, group.members[0]);
            group.status = GroupStatus::AutoResolved;
            continue;
        }

        for &i in &group.members {
            records[i].status = RecordStatus::Pending;
        }
        group.status = GroupStatus::Pending;
    }

    groups
}

/// Group record indexes by non-empty identifier, in first-seen order.
pub fn group_records(records: &[DrawingRecord]) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();

    for (i, record) in records.iter().enumerate() {
        if record.identifier.is_empty() {
            continue;
        }

        match groups.iter_mut().find(|g| g.identifier == record.identifier) {
            Some(group) => group.members.push(i),
            None => groups.push(DuplicateGroup {
                identifier: record.identifier.clone(),
                members: vec![i],
                status: GroupStatus::Unresolved,
            }),
        }
    }

    groups
}

/// Whether a group's weights agree within tolerance.
///
/// All members must carry a weight and agree pairwise, or none may carry one
/// (nothing to conflict on). A mix of weighted and weightless members is a
/// conflict: silently preferring the weighted record would hide an
/// extraction failure from review.
fn weights_consistent(records: &[DrawingRecord], members: &[usize], tolerance: f64) -> bool {
    let mut values = Vec::with_capacity(members.len());
    let mut missing = 0;

    for &i in members {
        match records[i].weight_lb {
            Some(w) => values.push(w),
            None => missing += 1,
        }
    }

    if values.is_empty() {
        return true;
    }
    if missing > 0 {
        return false;
    }

    let first = values[0];
    values
        .iter()
        .all(|&w| units::weights_agree(first, w, tolerance))
}

/// Apply one decision to a group. Returns false when the decision cannot be
/// applied (its chosen source is not a member); the caller then keeps the
/// group pending rather than guessing.
fn apply_adjudication(
    records: &mut [DrawingRecord],
    group: &DuplicateGroup,
    adjudication: &Adjudication,
) -> bool {
    match &adjudication.choice {
        AdjudicationChoice::ChosenSource(source) => {
            let chosen = group
                .members
                .iter()
                .copied()
                .find(|&i| records[i].source_file == *source);

            match chosen {
                Some(i) => {
                    supersede_all_but(records, &group.members, i);
                    true
                }
                None => {
                    tracing::warn!(
                        "adjudication for {} names unknown source {:?}",
                        adjudication.identifier,
                        source
                    );
                    false
                }
            }
        }
        AdjudicationChoice::CorrectedWeight(weight_lb) => {
            let canonical = group.members[0];
            records[canonical].weight_lb = Some(*weight_lb);
            records[canonical].weight_failed = false;
            supersede_all_but(records, &group.members, canonical);
            true
        }
    }
}

fn supersede_all_but(records: &mut [DrawingRecord], members: &[usize], canonical: usize) {
    for &i in members {
        if i == canonical {
            records[i].status = if records[i].identifier_failed || records[i].weight_failed {
                RecordStatus::ExtractionFailed
            } else {
                RecordStatus::Ok
            };
        } else {
            records[i].status = RecordStatus::Superseded;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::record::Confidence;

    fn record(source: &str, identifier: &str, weight_lb: Option<f64>) -> DrawingRecord {
        DrawingRecord {
            source_file: source.to_string(),
            identifier: identifier.to_string(),
            revision: String::new(),
            title: String::new(),
            weight_lb,
            page_weights: vec![],
            confidence: Confidence::High,
            identifier_failed: identifier.is_empty(),
            weight_failed: weight_lb.is_none(),
            status: RecordStatus::Ok,
            alternates: vec![],
        }
    }

    #[test]
    fn test_agreeing_duplicates_auto_resolve() {
        // 1000 LB vs 1000.0 LB: same canonical value, one canonical record.
        let mut records = vec![
            record("a.pdf", "DWG-1001", Some(1000.0)),
            record("b.pdf", "DWG-1001", Some(1000.0)),
        ];

        let pending = group_and_resolve(&mut records, &[], &ResolveConfig::default());

        assert!(pending.is_empty());
        assert_eq!(records[0].status, RecordStatus::Ok);
        assert_eq!(records[1].status, RecordStatus::Superseded);
    }

    #[test]
    fn test_conflicting_duplicates_go_pending() {
        let mut records = vec![
            record("a.pdf", "DWG-1002", Some(1000.0)),
            record("b.pdf", "DWG-1002", Some(1200.0)),
        ];

        let pending = group_and_resolve(&mut records, &[], &ResolveConfig::default());

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].identifier, "DWG-1002");
        assert_eq!(pending[0].candidate_records.len(), 2);
        assert_eq!(records[0].status, RecordStatus::Pending);
        assert_eq!(records[1].status, RecordStatus::Pending);
    }

    #[test]
    fn test_adjudication_resolves_and_is_idempotent() {
        let mut records = vec![
            record("a.pdf", "DWG-1002", Some(1000.0)),
            record("b.pdf", "DWG-1002", Some(1200.0)),
        ];
        let choice = vec![Adjudication {
            identifier: "DWG-1002".to_string(),
            choice: AdjudicationChoice::ChosenSource("b.pdf".to_string()),
        }];

        let pending = group_and_resolve(&mut records, &choice, &ResolveConfig::default());
        assert!(pending.is_empty());
        assert_eq!(records[0].status, RecordStatus::Superseded);
        assert_eq!(records[1].status, RecordStatus::Ok);

        // Re-supplying the identical choice leaves the state unchanged.
        let snapshot: Vec<RecordStatus> = records.iter().map(|r| r.status).collect();
        let pending = group_and_resolve(&mut records, &choice, &ResolveConfig::default());
        assert!(pending.is_empty());
        let after: Vec<RecordStatus> = records.iter().map(|r| r.status).collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn test_stale_chosen_source_keeps_group_pending() {
        // The stored choice names a file that left the group (re-scan changed
        // its identifier): the group must come back as pending, not vanish.
        let mut records = vec![
            record("a.pdf", "DWG-1002", Some(1000.0)),
            record("b.pdf", "DWG-1002", Some(1200.0)),
        ];
        let stale = vec![Adjudication {
            identifier: "DWG-1002".to_string(),
            choice: AdjudicationChoice::ChosenSource("gone.pdf".to_string()),
        }];

        let pending = group_and_resolve(&mut records, &stale, &ResolveConfig::default());

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].identifier, "DWG-1002");
        assert_eq!(records[0].status, RecordStatus::Pending);
        assert_eq!(records[1].status, RecordStatus::Pending);

        // A fresh decision naming a present member resolves it.
        let fresh = vec![Adjudication {
            identifier: "DWG-1002".to_string(),
            choice: AdjudicationChoice::ChosenSource("a.pdf".to_string()),
        }];
        let pending = group_and_resolve(&mut records, &fresh, &ResolveConfig::default());
        assert!(pending.is_empty());
        assert_eq!(records[0].status, RecordStatus::Ok);
        assert_eq!(records[1].status, RecordStatus::Superseded);
    }

    #[test]
    fn test_resolve_groups_reports_statuses() {
        let mut records = vec![
            record("a1.pdf", "DWG-2001", Some(500.0)),
            record("a2.pdf", "DWG-2001", Some(500.0)),
            record("b1.pdf", "DWG-2002", Some(500.0)),
            record("b2.pdf", "DWG-2002", Some(900.0)),
            record("c1.pdf", "DWG-2003", Some(500.0)),
            record("c2.pdf", "DWG-2003", Some(900.0)),
            record("d.pdf", "DWG-2004", Some(100.0)),
        ];
        let decisions = vec![Adjudication {
            identifier: "DWG-2003".to_string(),
            choice: AdjudicationChoice::ChosenSource("c2.pdf".to_string()),
        }];

        let groups = resolve_groups(&mut records, &decisions, &ResolveConfig::default());

        let status_of = |id: &str| {
            groups
                .iter()
                .find(|g| g.identifier == id)
                .map(|g| g.status)
                .unwrap()
        };
        assert_eq!(status_of("DWG-2001"), GroupStatus::AutoResolved);
        assert_eq!(status_of("DWG-2002"), GroupStatus::Pending);
        assert_eq!(status_of("DWG-2003"), GroupStatus::Resolved);
        assert_eq!(status_of("DWG-2004"), GroupStatus::Unresolved);
    }

    #[test]
    fn test_corrected_weight_adjudication() {
        let mut records = vec![
            record("a.pdf", "DWG-1003", Some(900.0)),
            record("b.pdf", "DWG-1003", Some(1100.0)),
        ];
        let choice = vec![Adjudication {
            identifier: "DWG-1003".to_string(),
            choice: AdjudicationChoice::CorrectedWeight(1000.0),
        }];

        let pending = group_and_resolve(&mut records, &choice, &ResolveConfig::default());
        assert!(pending.is_empty());
        assert_eq!(records[0].weight_lb, Some(1000.0));
        assert_eq!(records[0].status, RecordStatus::Ok);
        assert_eq!(records[1].status, RecordStatus::Superseded);
    }

    #[test]
    fn test_empty_identifiers_never_grouped() {
        let mut records = vec![
            record("a.pdf", "", Some(100.0)),
            record("b.pdf", "", Some(200.0)),
        ];

        let pending = group_and_resolve(&mut records, &[], &ResolveConfig::default());

        assert!(pending.is_empty());
        assert_eq!(records[0].status, RecordStatus::ExtractionFailed);
        assert_eq!(records[1].status, RecordStatus::ExtractionFailed);
    }

    #[test]
    fn test_mixed_missing_weight_goes_pending() {
        let mut records = vec![
            record("a.pdf", "DWG-1004", Some(500.0)),
            record("b.pdf", "DWG-1004", None),
        ];

        let pending = group_and_resolve(&mut records, &[], &ResolveConfig::default());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_all_weightless_duplicates_auto_resolve() {
        let mut records = vec![
            record("a.pdf", "DWG-1005", None),
            record("b.pdf", "DWG-1005", None),
        ];

        let pending = group_and_resolve(&mut records, &[], &ResolveConfig::default());
        assert!(pending.is_empty());
        assert_eq!(records[0].status, RecordStatus::ExtractionFailed);
        assert_eq!(records[1].status, RecordStatus::Superseded);
    }

    #[test]
    fn test_singleton_group_untouched() {
        let mut records = vec![record("a.pdf", "DWG-1006", Some(100.0))];
        let pending = group_and_resolve(&mut records, &[], &ResolveConfig::default());
        assert!(pending.is_empty());
        assert_eq!(records[0].status, RecordStatus::Ok);
    }
}
