//! PDF collection.
//!
//! Walks an input directory and gathers the PDF files to scan. Respects
//! .gitignore patterns and skips oversized files; everything else about a
//! file is judged later by the extraction pipeline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

// ============================================================================
// Collected File
// ============================================================================

/// A PDF file queued for scanning.
#[derive(Debug, Clone)]
pub struct CollectedPdf {
    /// Absolute path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
}

impl CollectedPdf {
    /// Build from a path; returns `None` for non-PDF paths.
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            return Ok(None);
        }

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            size: metadata.len(),
        }))
    }

    /// File stem used for filename-based identification.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

/// Summary of a collection pass.
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    pub fn from_files(files: &[CollectedPdf]) -> Self {
        Self {
            total_files: files.len(),
            total_size: files.iter().map(|f| f.size).sum(),
        }
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Collector settings.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Respect .gitignore patterns.
    pub respect_gitignore: bool,
    /// Include hidden files.
    pub include_hidden: bool,
    /// Maximum file size in bytes; 0 disables the limit.
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 100 * 1024 * 1024, // 100MB; drawing sets run large
        }
    }
}

/// PDF collector.
pub struct PdfCollector {
    config: CollectorConfig,
}

impl PdfCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// Collect every PDF under a directory, recursively.
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedPdf>> {
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !abs_path.exists() {
            anyhow::bail!("Directory not found: {:?}", abs_path);
        }

        if !abs_path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", abs_path);
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(&abs_path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedPdf::from_path(entry.path().to_path_buf()) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {} // not a PDF
                Err(e) => {
                    tracing::warn!("Failed to collect file: {}", e);
                }
            }
        }

        // Deterministic processing and grouping order
        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!("Collected {} PDFs from {:?}", files.len(), abs_path);
        Ok(files)
    }

    fn should_include(&self, file: &CollectedPdf) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
