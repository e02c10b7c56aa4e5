//! Drawing identification from PDF file names.
//!
//! Rebar submittal file names carry the drawing number and title in fairly
//! rigid conventions ("1055-ACE-xx-FN-DR-S-2000_BBS_Construction_C02.pdf").
//! The number found here feeds the identifier cascade as a low-rank,
//! unanchored candidate; page-text anchors still outrank it.

use regex::Regex;

use crate::drawing::rules::{Candidate, CandidateKind};

/// Identifier cascade rank assigned to filename-derived numbers.
pub const FILENAME_RANK: usize = 4;

/// Drawing number and cleaned title pulled from a file name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilenameInfo {
    pub number: Option<String>,
    pub title: String,
}

/// Extract drawing number and title from a file stem (no directory, no
/// extension). Returns a default (no number, empty-ish title) when nothing
/// matches; file naming is advisory, never required.
pub fn identify(stem: &str) -> FilenameInfo {
    let number_patterns = [
        r"FN-DR-S-(?P<value>\d{4})",
        r"DR-S-(?P<value>\d{4})",
        r"-(?P<value>\d{4})(?:_|$)",
        r"(?P<value>\d{4})(?:_|$)",
    ];

    let mut number = None;
    for pattern in number_patterns {
        let re = Regex::new(pattern).expect("invalid filename pattern");
        if let Some(caps) = re.captures(stem) {
            number = caps.name("value").map(|m| m.as_str().to_string());
            break;
        }
    }

    FilenameInfo {
        number,
        title: clean_title(stem),
    }
}

/// Turn a filename-derived number into an identifier candidate.
pub fn to_candidate(info: &FilenameInfo, stem: &str) -> Option<Candidate> {
    let number = info.number.as_ref()?;

    Some(Candidate {
        kind: CandidateKind::Identifier,
        matched: number.clone(),
        value: number.to_uppercase(),
        context: format!("filename: {stem}"),
        rank: FILENAME_RANK,
        anchored: false,
        page: 0,
        raw_unit: None,
        weight_lb: None,
        unit: None,
        unit_ambiguous: false,
        disqualified: None,
    })
}

/// Strip number, revision and project-prefix tokens, leaving the human title.
fn clean_title(stem: &str) -> String {
    // Revision tokens strip first; the number patterns below would otherwise
    // eat the underscore in "-4020_C03" and leave the revision behind.
    let strip_patterns = [
        // Revision tokens
        r"_BBS_Construction_C\d{2}(?:_|$)",
        r"_Construction_C\d{2}(?:_|$)",
        r"_C\d{2}(?:_|$)",
        // Project prefixes
        r"^\d{3,4}-ACE-[A-Z]{2}-\d{2}-[A-Z]{2}-S-",
        r"^\d{3,4}-ACE-[A-Z]{2}-FN-DR-S-",
        // Drawing number tokens
        r"FN-DR-S-\d{4}",
        r"DR-S-\d{4}",
        r"-\d{4}(?:_|$)",
        // Leftover prefixes
        r"^BBS_",
        r"^_+",
    ];

    let mut title = stem.to_string();
    for pattern in strip_patterns {
        let re = Regex::new(pattern).expect("invalid title pattern");
        title = re.replace_all(&title, "").into_owned();
    }

    title.replace('_', " ").trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================
