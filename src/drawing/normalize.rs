//! Text normalization for decoded PDF pages.
//!
//! PDF text extraction leaves ligatures, odd space characters and numbers
//! broken across lines. Everything here runs before pattern matching so the
//! rule table only ever sees cleaned text. The whole pass is pure and
//! idempotent: `normalize(normalize(x)) == normalize(x)`.

use regex::Regex;

/// Normalize raw page text for pattern matching.
///
/// - maps ligatures, smart quotes and Unicode minus/dash variants to ASCII
/// - collapses horizontal whitespace runs (incl. NBSP) to single spaces
/// - collapses blank-line runs to a single `\n`, keeping line boundaries
/// - drops control characters other than `\n`
/// - rejoins decimal numbers split around the point ("1234 . 56" -> "1234.56")
///
/// Unrecognized characters pass through unchanged; there is no failure mode.
pub fn normalize(raw: &str) -> String {
    let mapped = map_chars(raw);
    let collapsed = collapse_whitespace(&mapped);
    rejoin_decimals(&collapsed)
}

/// Character-level substitutions for common PDF encoding damage.
fn map_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            // Ligatures
            '\u{fb00}' => out.push_str("ff"),
            '\u{fb01}' => out.push_str("fi"),
            '\u{fb02}' => out.push_str("fl"),
            '\u{fb03}' => out.push_str("ffi"),
            '\u{fb04}' => out.push_str("ffl"),

            // Smart quotes
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201c}' | '\u{201d}' => out.push('"'),

            // Minus sign, hyphens and dashes that break numeric matches
            '\u{2212}' | '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}' => out.push('-'),

            // Space variants
            '\u{00a0}' | '\u{2007}' | '\u{202f}' | '\u{2009}' | '\u{200a}' | '\u{3000}' => {
                out.push(' ')
            }

            // Control characters: keep newlines, treat CR/FF as newline, drop the rest
            '\n' => out.push('\n'),
            '\r' | '\u{0c}' => out.push('\n'),
            c if c.is_control() => {}

            c => out.push(c),
        }
    }

    out
}

/// Collapse whitespace runs while preserving line structure.
fn collapse_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    for line in text.split('\n') {
        let cleaned = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !cleaned.is_empty() {
            lines.push(cleaned);
        }
    }

    lines.join("\n")
}

/// Rejoin decimal values the extractor broke across whitespace or lines.
///
/// Drawing sheets render totals like "Total\n1234\n.56"; after line collapse
/// that is "1234\n.56". Fusing digit-point-digit sequences makes the rule
/// table's value patterns see "1234.56".
fn rejoin_decimals(text: &str) -> String {
    // Safe to compile per call; pages are normalized once each.
    let split_point = Regex::new(r"(\d)\s*\.\s*(\d)").expect("invalid decimal-repair pattern");
    split_point.replace_all(text, "$1.$2").into_owned()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_space_runs() {
        assert_eq!(normalize("TOTAL   WEIGHT\t= 500\u{00a0}LB"), "TOTAL WEIGHT = 500 LB");
    }

    #[test]
    fn test_keeps_line_boundaries() {
        let out = normalize("Total\n\n\n1200 KG\n");
        assert_eq!(out, "Total\n1200 KG");
    }

    #[test]
    fn test_maps_ligatures_and_dashes() {
        assert_eq!(normalize("speci\u{fb01}ed \u{2212}5"), "specified -5");
        assert_eq!(normalize("DWG\u{2013}1001"), "DWG-1001");
    }

    #[test]
    fn test_rejoins_split_decimals() {
        assert_eq!(normalize("Total 1234 . 56"), "Total 1234.56");
        assert_eq!(normalize("Total\n1234\n.56"), "Total\n1234.56");
        assert_eq!(normalize("Total\n1234.\n56"), "Total\n1234.56");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "TOTAL   WEIGHT = 500 LB",
            "Total\n1234\n.56\nStatus C (Resubmit)",
            "speci\u{fb01}ed \u{2212}5 \u{201c}quoted\u{201d}",
            "",
            "   \n \t \n",
            "plain text with no damage",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_drops_control_chars() {
        assert_eq!(normalize("A\u{0}B\u{7}C"), "ABC");
        assert_eq!(normalize("page one\u{0c}page two"), "page one\npage two");
    }
}
