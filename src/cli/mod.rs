//! CLI commands.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::CollectorConfig;
use crate::drawing::{
    get_data_dir, Adjudication, AdjudicationChoice, DrawingRecord, PendingGroup, RecordStatus,
    ResolveConfig, RunStore,
};
use crate::export::{default_output_path, export_records, ExportFormat};
use crate::pipeline::{resolve_store, scan_directory, ScanConfig};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "rebar-tally")]
#[command(version, about = "Rebar drawing weight extraction and tallying", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a folder of drawing PDFs and extract weights
    Scan {
        /// Folder to scan (recursive)
        dir: PathBuf,

        /// Database path (default: ~/.rebar-tally/runs.db)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Number of PDFs decoded concurrently
        #[arg(short, long, default_value = "4")]
        jobs: usize,

        /// Re-extract files even when their content is unchanged
        #[arg(long)]
        force: bool,

        /// Include hidden files
        #[arg(long)]
        include_hidden: bool,

        /// Walk into paths that .gitignore patterns exclude
        #[arg(long)]
        no_gitignore: bool,
    },

    /// List duplicate groups awaiting a decision
    Pending {
        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Decide a pending duplicate group
    Resolve {
        /// Drawing identifier of the group
        identifier: String,

        /// Keep this source file's record as canonical
        #[arg(short, long)]
        source: Option<String>,

        /// Override the group weight in pounds
        #[arg(short, long)]
        weight: Option<f64>,

        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Export results to a file
    Export {
        /// Output format: csv (final sheet) or json (full audit)
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Output path (default: timestamped file in the current folder)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show database status
    Status {
        /// Database path
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan {
            dir,
            db,
            jobs,
            force,
            include_hidden,
            no_gitignore,
        } => cmd_scan(dir, db, jobs, force, include_hidden, no_gitignore).await,
        Commands::Pending { db } => cmd_pending(db),
        Commands::Resolve {
            identifier,
            source,
            weight,
            db,
        } => cmd_resolve(identifier, source, weight, db),
        Commands::Export { format, output, db } => cmd_export(&format, output, db),
        Commands::Status { db } => cmd_status(db),
    }
}

fn open_store(db: Option<PathBuf>) -> Result<RunStore> {
    match db {
        Some(path) => RunStore::open(&path).context("Failed to open database"),
        None => RunStore::open_default().context("Failed to open database"),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Scan command.
///
/// Collects PDFs, extracts a record per file, then resolves duplicates
/// across everything the database holds.
async fn cmd_scan(
    dir: PathBuf,
    db: Option<PathBuf>,
    jobs: usize,
    force: bool,
    include_hidden: bool,
    no_gitignore: bool,
) -> Result<()> {
    let store = open_store(db)?;

    let config = ScanConfig {
        jobs,
        force,
        collector: CollectorConfig {
            include_hidden,
            respect_gitignore: !no_gitignore,
            ..Default::default()
        },
        ..Default::default()
    };

    println!("[*] Scanning: {}", dir.display());

    let outcome = scan_directory(&dir, &store, &config)
        .await
        .context("Scan failed")?;

    println!(
        "[OK] Scan complete: {} extracted, {} unchanged, {} failed ({})",
        outcome.scanned,
        outcome.skipped,
        outcome.failed,
        format_bytes(outcome.total_bytes as usize)
    );

    let failed_fields = outcome
        .records
        .iter()
        .filter(|r| r.status == RecordStatus::ExtractionFailed)
        .count();
    if failed_fields > 0 {
        println!(
            "[!] {} record(s) have missing fields; see the JSON export for details",
            failed_fields
        );
    }

    print_total(&outcome.records);

    if !outcome.pending.is_empty() {
        println!();
        println!(
            "[!] {} duplicate group(s) need a decision:",
            outcome.pending.len()
        );
        for group in &outcome.pending {
            print_pending_group(group);
        }
        println!("    Decide with: rebar-tally resolve <IDENTIFIER> --source <FILE> | --weight <LB>");
    }

    Ok(())
}

/// Pending command.
fn cmd_pending(db: Option<PathBuf>) -> Result<()> {
    let store = open_store(db)?;
    let (_, pending) = resolve_store(&store, &ResolveConfig::default())?;

    if pending.is_empty() {
        println!("[OK] No pending duplicate groups.");
        return Ok(());
    }

    println!("[!] {} pending group(s):\n", pending.len());
    for group in &pending {
        print_pending_group(group);
    }

    Ok(())
}

/// Resolve command.
///
/// Records the decision and re-runs resolution, so repeating a decision is
/// harmless and correcting one just overwrites it.
fn cmd_resolve(
    identifier: String,
    source: Option<String>,
    weight: Option<f64>,
    db: Option<PathBuf>,
) -> Result<()> {
    let choice = match (source, weight) {
        (Some(source), None) => AdjudicationChoice::ChosenSource(source),
        (None, Some(weight)) => {
            if !weight.is_finite() || weight <= 0.0 {
                bail!("Corrected weight must be a positive number of pounds");
            }
            AdjudicationChoice::CorrectedWeight(weight)
        }
        (Some(_), Some(_)) => bail!("Use either --source or --weight, not both"),
        (None, None) => bail!("One of --source or --weight is required"),
    };

    let store = open_store(db)?;
    let (records, pending) = resolve_store(&store, &ResolveConfig::default())?;

    // The decision must target a real group: either one still pending, or
    // one already decided (repeating or correcting that decision).
    let is_pending = pending.iter().any(|g| g.identifier == identifier);
    let decisions = store.load_adjudications()?;
    let has_decision = decisions.iter().any(|a| a.identifier == identifier);
    if !is_pending && !has_decision {
        bail!("No pending group for identifier '{}'", identifier);
    }

    if let AdjudicationChoice::ChosenSource(ref source) = choice {
        if !records
            .iter()
            .any(|r| r.identifier == identifier && &r.source_file == source)
        {
            bail!(
                "'{}' is not a member of group '{}'",
                source, identifier
            );
        }
    }

    // Repeating the recorded decision is a no-op, not an error
    if !is_pending
        && decisions
            .iter()
            .any(|a| a.identifier == identifier && a.choice == choice)
    {
        println!("[OK] '{}' is already resolved with this decision", identifier);
        return Ok(());
    }

    store.save_adjudication(&Adjudication {
        identifier: identifier.clone(),
        choice,
    })?;

    let (records, pending) = resolve_store(&store, &ResolveConfig::default())?;

    println!("[OK] Resolved '{}'", identifier);
    if pending.is_empty() {
        print_total(&records);
    } else {
        println!("[!] {} group(s) still pending", pending.len());
    }

    Ok(())
}

/// Export command.
fn cmd_export(format: &str, output: Option<PathBuf>, db: Option<PathBuf>) -> Result<()> {
    let format = ExportFormat::parse(format)
        .with_context(|| format!("Unknown format '{}'; use csv or json", format))?;

    let store = open_store(db)?;
    let (records, pending) = resolve_store(&store, &ResolveConfig::default())?;

    if records.is_empty() {
        println!("[!] Nothing to export; run a scan first.");
        return Ok(());
    }

    if !pending.is_empty() {
        println!(
            "[!] {} group(s) still pending; their rows carry status 'pending'",
            pending.len()
        );
    }

    let output = output.unwrap_or_else(|| default_output_path(format));
    let count = export_records(&records, format, &output)?;

    println!("[OK] Wrote {} row(s) to {}", count, output.display());
    Ok(())
}

/// Status command.
fn cmd_status(db: Option<PathBuf>) -> Result<()> {
    println!("rebar-tally v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] Data directory: {}", get_data_dir().display());

    match open_store(db) {
        Ok(store) => match store.stats() {
            Ok(stats) => {
                println!("[OK] Database: {}", stats.db_path.display());
                println!("     Records: {}", stats.record_count);
                println!("     Pending: {}", stats.pending_count);
                println!("     Superseded: {}", stats.superseded_count);
                println!("     Decisions: {}", stats.adjudication_count);
            }
            Err(e) => {
                println!("[!] Failed to read statistics: {}", e);
            }
        },
        Err(e) => {
            println!("[!] Failed to open database: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_pending_group(group: &PendingGroup) {
    println!("  {}", group.identifier);
    for record in &group.candidate_records {
        let weight = record
            .weight_lb
            .map(|w| format!("{:.1} lb", w))
            .unwrap_or_else(|| "no weight".to_string());
        println!(
            "    {} ({}, confidence {})",
            truncate_text(&record.source_file, 60),
            weight,
            record.confidence.as_str()
        );
    }
}

fn print_total(records: &[DrawingRecord]) {
    // Pending duplicates are left out; counting every member of an
    // undecided group would double count it.
    let total: f64 = records
        .iter()
        .filter(|r| matches!(r.status, RecordStatus::Ok | RecordStatus::ExtractionFailed))
        .filter_map(|r| r.weight_lb)
        .sum();
    println!("[*] Running total: {:.1} lb", total);
}

/// Byte size formatting.
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// UTF-8 safe truncation.
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::Confidence;

    fn record(source: &str, identifier: &str, weight_lb: f64) -> DrawingRecord {
        DrawingRecord {
            source_file: source.to_string(),
            identifier: identifier.to_string(),
            revision: String::new(),
            title: String::new(),
            weight_lb: Some(weight_lb),
            page_weights: vec![],
            confidence: Confidence::High,
            identifier_failed: false,
            weight_failed: false,
            status: RecordStatus::Ok,
            alternates: vec![],
        }
    }

    #[test]
    fn test_resolve_repeated_decision_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("runs.db");
        {
            let store = RunStore::open(&db).unwrap();
            store.upsert_record(&record("a.pdf", "DWG-1002", 1000.0), "sha-a").unwrap();
            store.upsert_record(&record("b.pdf", "DWG-1002", 1200.0), "sha-b").unwrap();
        }

        cmd_resolve(
            "DWG-1002".to_string(),
            Some("b.pdf".to_string()),
            None,
            Some(db.clone()),
        )
        .unwrap();

        // The identical decision again is acknowledged, not rejected
        cmd_resolve(
            "DWG-1002".to_string(),
            Some("b.pdf".to_string()),
            None,
            Some(db.clone()),
        )
        .unwrap();

        // A group that never existed still errors
        assert!(cmd_resolve(
            "DWG-9999".to_string(),
            Some("b.pdf".to_string()),
            None,
            Some(db),
        )
        .is_err());
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::try_parse_from(["rebar-tally", "scan", "drawings", "--jobs", "8"]).unwrap();
        match cli.command {
            Commands::Scan { dir, jobs, force, .. } => {
                assert_eq!(dir, PathBuf::from("drawings"));
                assert_eq!(jobs, 8);
                assert!(!force);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_cli_parses_resolve() {
        let cli = Cli::try_parse_from([
            "rebar-tally",
            "resolve",
            "DR-S-4001",
            "--weight",
            "512.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Resolve {
                identifier, weight, ..
            } => {
                assert_eq!(identifier, "DR-S-4001");
                assert_eq!(weight, Some(512.5));
            }
            _ => panic!("expected resolve"),
        }
    }
}
