//! Run store - rusqlite-backed persistence for scan results.
//!
//! Scanning a large drawing set takes a while and adjudication may happen
//! days later, so records and adjudications persist between invocations.
//! Pending groups are derived state and are recomputed from these two tables
//! on load. Location: ~/.rebar-tally/runs.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};

use crate::drawing::record::DrawingRecord;
use crate::drawing::resolve::{Adjudication, AdjudicationChoice};

// ============================================================================
// Data Directory
// ============================================================================

/// Data directory path (~/.rebar-tally/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rebar-tally")
}

// ============================================================================
// Types
// ============================================================================

/// Store statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub record_count: usize,
    pub pending_count: usize,
    pub superseded_count: usize,
    pub adjudication_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// RunStore
// ============================================================================

/// Persistent store for drawing records and adjudication decisions.
pub struct RunStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl RunStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// Open at the default location (~/.rebar-tally/runs.db).
    pub fn open_default() -> Result<Self> {
        let data_dir = get_data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        }

        Self::open(&data_dir.join("runs.db"))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        // One row per source file; the record column holds the full record as
        // JSON, the scalar columns exist for queries.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                source_file TEXT PRIMARY KEY,
                content_sha TEXT NOT NULL,
                identifier TEXT NOT NULL,
                weight_lb REAL,
                status TEXT NOT NULL,
                record TEXT NOT NULL,
                scanned_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create records table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_identifier ON records(identifier)",
            [],
        )
        .context("Failed to create identifier index")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS adjudications (
                identifier TEXT PRIMARY KEY,
                choice TEXT NOT NULL,
                decided_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create adjudications table")?;

        tracing::debug!("Run store initialized at {:?}", self.db_path);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Insert or replace the record for a source file.
    pub fn upsert_record(&self, record: &DrawingRecord, content_sha: &str) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO records
                (source_file, content_sha, identifier, weight_lb, status, record, scanned_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(source_file) DO UPDATE SET
                content_sha = excluded.content_sha,
                identifier = excluded.identifier,
                weight_lb = excluded.weight_lb,
                status = excluded.status,
                record = excluded.record,
                scanned_at = excluded.scanned_at",
            params![
                record.source_file,
                content_sha,
                record.identifier,
                record.weight_lb,
                record.status.as_str(),
                json,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to upsert record")?;

        Ok(())
    }

    /// Content hash stored for a source file, if it was scanned before.
    pub fn content_sha(&self, source_file: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT content_sha FROM records WHERE source_file = ?1")
            .context("Failed to prepare content_sha query")?;

        let mut rows = stmt
            .query(params![source_file])
            .context("Failed to query content_sha")?;

        match rows.next().context("Failed to read content_sha row")? {
            Some(row) => Ok(Some(row.get(0).context("Failed to read content_sha")?)),
            None => Ok(None),
        }
    }

    /// The previously stored record for a source file, if any.
    pub fn get_record(&self, source_file: &str) -> Result<Option<DrawingRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT record FROM records WHERE source_file = ?1")
            .context("Failed to prepare record query")?;

        let mut rows = stmt
            .query(params![source_file])
            .context("Failed to query record")?;

        match rows.next().context("Failed to read record row")? {
            Some(row) => {
                let json: String = row.get(0).context("Failed to read record column")?;
                let record =
                    serde_json::from_str(&json).context("Failed to deserialize record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Load all records, ordered by source file for deterministic grouping.
    pub fn load_records(&self) -> Result<Vec<DrawingRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT record FROM records ORDER BY source_file")
            .context("Failed to prepare records query")?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query records")?;

        let mut records = Vec::new();
        for row in rows {
            let json = row.context("Failed to read record row")?;
            records.push(serde_json::from_str(&json).context("Failed to deserialize record")?);
        }

        Ok(records)
    }

    /// Write back resolution results (status/weight changes) for all records.
    pub fn update_records(&self, records: &[DrawingRecord]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to start transaction")?;

        for record in records {
            let json = serde_json::to_string(record).context("Failed to serialize record")?;
            tx.execute(
                "UPDATE records
                 SET identifier = ?2, weight_lb = ?3, status = ?4, record = ?5
                 WHERE source_file = ?1",
                params![
                    record.source_file,
                    record.identifier,
                    record.weight_lb,
                    record.status.as_str(),
                    json,
                ],
            )
            .context("Failed to update record")?;
        }

        tx.commit().context("Failed to commit record updates")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Adjudications
    // ------------------------------------------------------------------

    /// Save (or replace) the adjudication for an identifier.
    pub fn save_adjudication(&self, adjudication: &Adjudication) -> Result<()> {
        let choice = serde_json::to_string(&adjudication.choice)
            .context("Failed to serialize adjudication choice")?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO adjudications (identifier, choice, decided_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(identifier) DO UPDATE SET
                choice = excluded.choice,
                decided_at = excluded.decided_at",
            params![
                adjudication.identifier,
                choice,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to save adjudication")?;

        Ok(())
    }

    /// Load every stored adjudication.
    pub fn load_adjudications(&self) -> Result<Vec<Adjudication>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT identifier, choice FROM adjudications ORDER BY identifier")
            .context("Failed to prepare adjudications query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("Failed to query adjudications")?;

        let mut adjudications = Vec::new();
        for row in rows {
            let (identifier, choice_json) = row.context("Failed to read adjudication row")?;
            let choice: AdjudicationChoice = serde_json::from_str(&choice_json)
                .context("Failed to deserialize adjudication choice")?;
            adjudications.push(Adjudication { identifier, choice });
        }

        Ok(adjudications)
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn
                .query_row(sql, [], |row| row.get(0))
                .context("Failed to count rows")?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            record_count: count("SELECT COUNT(*) FROM records")?,
            pending_count: count("SELECT COUNT(*) FROM records WHERE status = 'pending'")?,
            superseded_count: count("SELECT COUNT(*) FROM records WHERE status = 'superseded'")?,
            adjudication_count: count("SELECT COUNT(*) FROM adjudications")?,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
