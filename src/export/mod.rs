//! Result export.
//!
//! Two output shapes from the same records:
//! - CSV: the final weight sheet, superseded duplicates excluded
//! - JSON: the full audit dump, every record with its alternates
//!
//! Default file names carry a timestamp so repeated exports never clobber
//! each other.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;

use crate::drawing::{DrawingRecord, RecordStatus};

// ============================================================================
// Format
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Timestamped default output path, e.g. `drawing_weights_20260830_142301.csv`.
pub fn default_output_path(format: ExportFormat) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("drawing_weights_{}.{}", stamp, format.extension()))
}

// ============================================================================
// Export
// ============================================================================

/// Write records to `output` in the given format. Returns the number of
/// rows written.
pub fn export_records(
    records: &[DrawingRecord],
    format: ExportFormat,
    output: &Path,
) -> Result<usize> {
    match format {
        ExportFormat::Csv => export_csv(records, output),
        ExportFormat::Json => export_json(records, output),
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    source_file: &'a str,
    identifier: &'a str,
    revision: &'a str,
    title: &'a str,
    weight_lb: Option<f64>,
    confidence: &'a str,
    status: &'a str,
}

/// The final sheet: one row per surviving record, superseded ones dropped.
fn export_csv(records: &[DrawingRecord], output: &Path) -> Result<usize> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create CSV file: {:?}", output))?;

    let mut count = 0;
    for record in records {
        if record.status == RecordStatus::Superseded {
            continue;
        }

        writer
            .serialize(CsvRow {
                source_file: &record.source_file,
                identifier: &record.identifier,
                revision: &record.revision,
                title: &record.title,
                weight_lb: record.weight_lb,
                confidence: record.confidence.as_str(),
                status: record.status.as_str(),
            })
            .context("Failed to write CSV row")?;
        count += 1;
    }

    writer.flush().context("Failed to flush CSV file")?;
    Ok(count)
}

/// The audit dump: every record verbatim, alternates and page weights
/// included.
fn export_json(records: &[DrawingRecord], output: &Path) -> Result<usize> {
    let json =
        serde_json::to_string_pretty(records).context("Failed to serialize records")?;
    std::fs::write(output, json)
        .with_context(|| format!("Failed to write JSON file: {:?}", output))?;
    Ok(records.len())
}

// ============================================================================
// Tests
// ============================================================================
