//! Scan orchestration.
//!
//! Drives a full scan: collect PDFs, decode and extract them concurrently,
//! persist the records, then run duplicate resolution over everything the
//! store now holds. Extraction itself is pure; this module owns all IO and
//! concurrency.

use std::path::Path;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};

use crate::collector::{CollectedPdf, CollectionStats, CollectorConfig, PdfCollector};
use crate::drawing::{
    extract_record, group_and_resolve, DrawingRecord, ExtractConfig, PendingGroup, ResolveConfig,
    RuleSet, RunStore,
};
use crate::extractor::decode_pdf;

// ============================================================================
// Configuration
// ============================================================================

/// Full scan settings.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Number of PDFs decoded concurrently.
    pub jobs: usize,
    /// Re-extract files whose content hash is unchanged.
    pub force: bool,
    pub collector: CollectorConfig,
    pub extract: ExtractConfig,
    pub resolve: ResolveConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            force: false,
            collector: CollectorConfig::default(),
            extract: ExtractConfig::default(),
            resolve: ResolveConfig::default(),
        }
    }
}

// ============================================================================
// Scan Outcome
// ============================================================================

/// Result of one scan pass.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Every record in the store after resolution, superseded ones included.
    pub records: Vec<DrawingRecord>,
    /// Duplicate groups that need adjudication.
    pub pending: Vec<PendingGroup>,
    /// Files decoded and extracted this pass.
    pub scanned: usize,
    /// Files skipped because their content was unchanged.
    pub skipped: usize,
    /// Files that failed to decode.
    pub failed: usize,
    /// Collected input size in bytes.
    pub total_bytes: u64,
}

enum FileOutcome {
    Scanned,
    Skipped,
    Failed,
}

// ============================================================================
// Scan
// ============================================================================

/// Scan a directory of PDFs and resolve duplicates across the whole store.
///
/// Records from earlier scans stay in the store, so resolution always sees
/// the union of every scan run against the same database.
pub async fn scan_directory(dir: &Path, store: &RunStore, config: &ScanConfig) -> Result<ScanOutcome> {
    let collector = PdfCollector::new(config.collector.clone());
    let files = collector.collect_directory(dir)?;
    let stats = CollectionStats::from_files(&files);

    let rules = RuleSet::with_defaults();

    let outcomes: Vec<FileOutcome> = stream::iter(files.iter())
        .map(|file| process_file(file, store, &rules, config))
        .buffer_unordered(config.jobs.max(1))
        .collect()
        .await;

    let mut scanned = 0;
    let mut skipped = 0;
    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            FileOutcome::Scanned => scanned += 1,
            FileOutcome::Skipped => skipped += 1,
            FileOutcome::Failed => failed += 1,
        }
    }

    let (records, pending) = resolve_store(store, &config.resolve)?;

    tracing::info!(
        "Scan complete: {} extracted, {} skipped, {} failed, {} pending groups",
        scanned,
        skipped,
        failed,
        pending.len()
    );

    Ok(ScanOutcome {
        records,
        pending,
        scanned,
        skipped,
        failed,
        total_bytes: stats.total_size,
    })
}

/// Re-run duplicate resolution over the stored records and persist the
/// resulting statuses. Used after a scan and after each adjudication.
pub fn resolve_store(
    store: &RunStore,
    config: &ResolveConfig,
) -> Result<(Vec<DrawingRecord>, Vec<PendingGroup>)> {
    let mut records = store.load_records().context("Failed to load records")?;
    let adjudications = store
        .load_adjudications()
        .context("Failed to load adjudications")?;

    let pending = group_and_resolve(&mut records, &adjudications, config);

    store
        .update_records(&records)
        .context("Failed to persist resolved records")?;

    Ok((records, pending))
}

/// Decode and extract one PDF, persisting the record.
///
/// Failures never abort the scan; the file is counted and logged.
async fn process_file(
    file: &CollectedPdf,
    store: &RunStore,
    rules: &RuleSet,
    config: &ScanConfig,
) -> FileOutcome {
    let source_file = file.path.to_string_lossy().to_string();

    let bytes = match tokio::fs::read(&file.path).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Failed to read {:?}: {}", file.path, e);
            return FileOutcome::Failed;
        }
    };

    let sha = content_hash(&bytes);

    // Unchanged content keeps its stored record
    if !config.force {
        match store.content_sha(&source_file) {
            Ok(Some(stored)) if stored == sha => {
                tracing::debug!("Unchanged, skipping: {}", source_file);
                return FileOutcome::Skipped;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Hash lookup failed for {}: {}", source_file, e);
            }
        }
    }

    let pages = match decode_pdf(&file.path, bytes).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Failed to decode {:?}: {}", file.path, e);
            return FileOutcome::Failed;
        }
    };

    let page_texts: Vec<(usize, String)> =
        pages.into_iter().map(|p| (p.page, p.text)).collect();

    let record = extract_record(
        &source_file,
        file.stem(),
        &page_texts,
        rules,
        &config.extract,
    );

    if let Err(e) = store.upsert_record(&record, &sha) {
        tracing::warn!("Failed to persist record for {}: {}", source_file, e);
        return FileOutcome::Failed;
    }

    FileOutcome::Scanned
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Tests
// ============================================================================
