//! PDF text extraction.
//!
//! Decoding is delegated to the pdf-extract crate; this module only turns
//! its output into per-page text. Scanned (image-only) PDFs come back empty
//! and are reported as such, never as an error.

use anyhow::{Context, Result};

/// Extract text from in-memory PDF bytes, split per page.
///
/// The caller already holds the file bytes (it hashed them), so decoding
/// never re-reads the file. Returns (page number, text) tuples; page numbers
/// start at 1. An empty single page means the PDF carried no extractable
/// text.
pub fn extract_text_from_pdf(bytes: &[u8]) -> Result<Vec<(usize, String)>> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .context("Failed to extract text from PDF")?;

    if text.trim().is_empty() {
        return Ok(vec![(1, String::new())]);
    }

    let pages = split_pdf_pages(&text);

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .collect())
}

/// Split extracted PDF text into pages.
fn split_pdf_pages(text: &str) -> Vec<String> {
    // Form feed (\x0c) is the usual page separator
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    // Some PDFs render separator lines instead, e.g. "--- Page 2 ---"
    let page_pattern = regex::Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
        .expect("Invalid regex");

    if page_pattern.is_match(text) {
        let pages: Vec<String> = page_pattern
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    // No separator found - treat the whole text as one page
    vec![text.to_string()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "TOTAL WEIGHT 100 LB\x0cTOTAL WEIGHT 200 LB\x0cnotes";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "TOTAL WEIGHT 100 LB");
        assert_eq!(pages[1], "TOTAL WEIGHT 200 LB");
    }

    #[test]
    fn test_split_pdf_pages_with_separator_lines() {
        let text = "first sheet\n--- Page 2 ---\nsecond sheet";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let text = "Just one sheet of bar schedules";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 1);
    }
}
