//! Raw page production.
//!
//! Wraps the blocking PDF decoder for use from the async pipeline and
//! attaches source/page provenance to each chunk of decoded text. The pages
//! produced here are consumed once by the normalizer and discarded.

pub mod pdf;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// One page of decoded text, with provenance.
#[derive(Debug, Clone)]
pub struct RawPage {
    /// Source PDF path.
    pub source: PathBuf,
    /// 1-based page number.
    pub page: usize,
    /// Raw decoded text, unnormalized.
    pub text: String,
}

/// Decode already-read PDF bytes into raw pages.
///
/// PDF extraction is CPU-bound, so the decoder runs on the blocking pool.
/// Takes the bytes rather than the path so a file is read exactly once per
/// scan (the pipeline hashes the same bytes).
pub async fn decode_pdf(path: &Path, bytes: Vec<u8>) -> Result<Vec<RawPage>> {
    let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&bytes))
        .await
        .context("PDF extraction task failed")?
        .with_context(|| format!("Failed to decode PDF: {:?}", path))?;

    if pages.iter().all(|(_, text)| text.trim().is_empty()) {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    Ok(pages
        .into_iter()
        .map(|(page, text)| RawPage {
            source: path.to_path_buf(),
            page,
            text,
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decode_pdf_takes_bytes() {
        // Decoding works off the bytes the caller already read; the path is
        // provenance only, and junk bytes fail without touching the disk.
        let result = decode_pdf(Path::new("junk.pdf"), b"not a pdf".to_vec()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_page_carries_provenance() {
        let page = RawPage {
            source: PathBuf::from("a.pdf"),
            page: 3,
            text: "TOTAL 100 LB".to_string(),
        };
        assert_eq!(page.page, 3);
        assert_eq!(page.source, PathBuf::from("a.pdf"));
    }
}
