//! rebar-tally - rebar drawing weight extraction
//!
//! Scans folders of rebar shop-drawing PDFs, pulls the drawing number and
//! total steel weight out of each one with a ranked pattern cascade, and
//! reconciles duplicate drawings into a single weight sheet.

pub mod cli;
pub mod collector;
pub mod drawing;
pub mod export;
pub mod extractor;
pub mod pipeline;

// Re-exports
pub use collector::{CollectedPdf, CollectionStats, CollectorConfig, PdfCollector};
pub use drawing::{
    build_record, extract_record, get_data_dir, group_and_resolve, normalize, normalize_weight,
    Adjudication, AdjudicationChoice, Candidate, CandidateKind, Confidence, DrawingRecord,
    DuplicateGroup, ExtractConfig, PageWeight, PendingGroup, RecordStatus, ResolveConfig,
    RuleSet, RunStore, StoreStats, TieBreak, Unit, UnitError,
};
pub use export::{export_records, ExportFormat};
pub use extractor::{decode_pdf, RawPage};
pub use pipeline::{scan_directory, ScanConfig, ScanOutcome};
