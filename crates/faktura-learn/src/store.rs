//! Embedded transactional store for corrections and learned patterns (spec
//! §4.9, §3, §5). Schema and connection-wrapper shape grounded on the wider
//! example pack's `rusqlite` usage (`sg-core::storage::DB`,
//! `rlm-core::memory::store`) since the direct teacher carries no embedded
//! SQL store of its own.
//!
//! Single-writer-many-reader is enforced with an internal `Mutex<Connection>`
//! (spec §5: "the Pattern Store must use ACID transactions for writes").

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use faktura_core::{FakturaError, Result};
use rusqlite::{params, Connection, OptionalExtension};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS corrections (
    id INTEGER PRIMARY KEY,
    invoice_id TEXT NOT NULL,
    supplier_name TEXT NOT NULL,
    layout_hash TEXT NOT NULL,
    field_name TEXT NOT NULL,
    corrected_value TEXT NOT NULL,
    bbox_x REAL NOT NULL,
    bbox_y REAL NOT NULL,
    bbox_w REAL NOT NULL,
    bbox_h REAL NOT NULL,
    page_index INTEGER NOT NULL,
    recorded_at INTEGER NOT NULL,
    UNIQUE(invoice_id, corrected_value)
);

CREATE TABLE IF NOT EXISTS patterns (
    id INTEGER PRIMARY KEY,
    supplier_name TEXT NOT NULL,
    layout_hash TEXT NOT NULL,
    field_name TEXT NOT NULL,
    anchor_x REAL NOT NULL,
    anchor_y REAL NOT NULL,
    anchor_w REAL NOT NULL,
    anchor_h REAL NOT NULL,
    sample_count INTEGER NOT NULL DEFAULT 1,
    boost_weight REAL NOT NULL,
    last_used_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patterns_supplier ON patterns(supplier_name);
CREATE INDEX IF NOT EXISTS idx_patterns_layout_hash ON patterns(layout_hash);
CREATE INDEX IF NOT EXISTS idx_corrections_supplier ON corrections(supplier_name);
";

/// Sentinel supplier used when a correction or match has no known supplier
/// (spec §4.9 Open Question, adopted as specified — see `DESIGN.md`).
pub const UNKNOWN_SUPPLIER: &str = "unknown";

/// A single row from the `patterns` table.
#[derive(Debug, Clone)]
pub struct PatternRow {
    pub id: i64,
    pub supplier_name: String,
    pub layout_hash: String,
    pub field_name: String,
    pub anchor_bbox: faktura_core::BBox,
    pub sample_count: u32,
    pub boost_weight: f32,
    pub last_used_at: DateTime<Utc>,
}

/// A single row from the `corrections` table.
#[derive(Debug, Clone)]
pub struct CorrectionRow {
    pub id: i64,
    pub invoice_id: String,
    pub supplier_name: String,
    pub layout_hash: String,
    pub field_name: String,
    pub corrected_value: String,
    pub bbox: faktura_core::BBox,
    pub page_index: usize,
    pub recorded_at: DateTime<Utc>,
}

/// The pattern store connection. Cheap to clone-share via `Arc` at the call
/// site; internally single-writer via `Mutex`.
pub struct PatternStore {
    conn: Mutex<Connection>,
}

impl PatternStore {
    /// Opens (creating if absent) the SQLite database at `path` and applies
    /// the schema.
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] if the file cannot be opened or
    /// the schema cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
            .map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        conn.execute_batch(SCHEMA).map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store, used by tests and by callers that run without
    /// persistence enabled.
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] if the schema cannot be applied.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        conn.execute_batch(SCHEMA).map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Inserts a correction, deduplicated on `(invoice_id, corrected_value)`
    /// (spec §4.9: "append-only, deduplicated"). Returns `Ok(false)` on a
    /// no-op duplicate insert rather than erroring.
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] on a database failure other
    /// than the uniqueness conflict.
    pub fn insert_correction(&self, correction: &faktura_core::Correction, invoice_id: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("pattern store mutex poisoned");
        let tx = conn.unchecked_transaction().map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        let rows = tx
            .execute(
                "INSERT OR IGNORE INTO corrections
                 (invoice_id, supplier_name, layout_hash, field_name, corrected_value,
                  bbox_x, bbox_y, bbox_w, bbox_h, page_index, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    invoice_id,
                    correction.supplier_name,
                    correction.layout_hash,
                    correction.field_name,
                    correction.corrected_value,
                    correction.bbox.x,
                    correction.bbox.y,
                    correction.bbox.w,
                    correction.bbox.h,
                    correction.page_index as i64,
                    correction.recorded_at.timestamp(),
                ],
            )
            .map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        tx.commit().map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        Ok(rows > 0)
    }

    /// Inserts or updates a pattern row, returning its id.
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] on a database failure.
    pub fn upsert_pattern(&self, pattern: &NewPattern) -> Result<i64> {
        let conn = self.conn.lock().expect("pattern store mutex poisoned");
        let tx = conn.unchecked_transaction().map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        tx.execute(
            "INSERT INTO patterns
             (supplier_name, layout_hash, field_name, anchor_x, anchor_y, anchor_w, anchor_h,
              sample_count, boost_weight, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)",
            params![
                pattern.supplier_name,
                pattern.layout_hash,
                pattern.field_name,
                pattern.anchor_bbox.x,
                pattern.anchor_bbox.y,
                pattern.anchor_bbox.w,
                pattern.anchor_bbox.h,
                pattern.boost_weight,
                pattern.recorded_at.timestamp(),
            ],
        )
        .map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        Ok(id)
    }

    /// Returns every pattern scoped to `supplier_name` and `field_name`.
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] on a database failure.
    pub fn patterns_for_supplier(&self, supplier_name: &str, field_name: &str) -> Result<Vec<PatternRow>> {
        let conn = self.conn.lock().expect("pattern store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, supplier_name, layout_hash, field_name, anchor_x, anchor_y, anchor_w, anchor_h,
                        sample_count, boost_weight, last_used_at
                 FROM patterns WHERE supplier_name = ?1 AND field_name = ?2",
            )
            .map_err(|e| FakturaError::PatternStore(e.to_string()))?;

        let rows = stmt
            .query_map(params![supplier_name, field_name], row_to_pattern)
            .map_err(|e| FakturaError::PatternStore(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| FakturaError::PatternStore(e.to_string()))
    }

    /// Increments usage count and bumps `last_used_at` to now (spec §4.9:
    /// "increment the pattern's usage count and last-used time").
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] on a database failure.
    pub fn record_pattern_use(&self, pattern_id: i64, used_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().expect("pattern store mutex poisoned");
        conn.execute(
            "UPDATE patterns SET sample_count = sample_count + 1, last_used_at = ?1 WHERE id = ?2",
            params![used_at.timestamp(), pattern_id],
        )
        .map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        Ok(())
    }

    /// Deletes a pattern by id (used by consolidation and cleanup).
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] on a database failure.
    pub fn delete_pattern(&self, pattern_id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("pattern store mutex poisoned");
        conn.execute("DELETE FROM patterns WHERE id = ?1", params![pattern_id])
            .map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        Ok(())
    }

    /// Replaces a pattern's usage/boost/anchor fields in place (used after
    /// consolidation merges a group into a single surviving row).
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] on a database failure.
    pub fn update_pattern(&self, pattern_id: i64, sample_count: u32, boost_weight: f32, last_used_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().expect("pattern store mutex poisoned");
        conn.execute(
            "UPDATE patterns SET sample_count = ?1, boost_weight = ?2, last_used_at = ?3 WHERE id = ?4",
            params![sample_count, boost_weight, last_used_at.timestamp(), pattern_id],
        )
        .map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        Ok(())
    }

    /// Returns every pattern in the store (used by the consolidation and
    /// cleanup sweeps, which operate store-wide rather than per-supplier).
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] on a database failure.
    pub fn all_patterns(&self) -> Result<Vec<PatternRow>> {
        let conn = self.conn.lock().expect("pattern store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, supplier_name, layout_hash, field_name, anchor_x, anchor_y, anchor_w, anchor_h,
                        sample_count, boost_weight, last_used_at
                 FROM patterns",
            )
            .map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        let rows = stmt.query_map([], row_to_pattern).map_err(|e| FakturaError::PatternStore(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| FakturaError::PatternStore(e.to_string()))
    }

    /// Returns every recorded correction for `supplier_name`, most recent
    /// first. Used by pattern extraction, which replays a supplier's
    /// correction history to (re)build its pattern set.
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] on a database failure.
    pub fn corrections_for_supplier(&self, supplier_name: &str) -> Result<Vec<CorrectionRow>> {
        let conn = self.conn.lock().expect("pattern store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, invoice_id, supplier_name, layout_hash, field_name, corrected_value,
                        bbox_x, bbox_y, bbox_w, bbox_h, page_index, recorded_at
                 FROM corrections WHERE supplier_name = ?1 ORDER BY recorded_at DESC",
            )
            .map_err(|e| FakturaError::PatternStore(e.to_string()))?;

        let rows = stmt
            .query_map(params![supplier_name], row_to_correction)
            .map_err(|e| FakturaError::PatternStore(e.to_string()))?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|e| FakturaError::PatternStore(e.to_string()))
    }

    /// Finds an existing correction-derived value for the same (invoice id,
    /// field), used by conflict resolution to know the "correct total" a
    /// pattern should converge toward.
    ///
    /// # Errors
    /// Returns [`FakturaError::PatternStore`] on a database failure.
    pub fn correction_value(&self, invoice_id: &str, field_name: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("pattern store mutex poisoned");
        conn.query_row(
            "SELECT corrected_value FROM corrections WHERE invoice_id = ?1 AND field_name = ?2 ORDER BY recorded_at DESC LIMIT 1",
            params![invoice_id, field_name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| FakturaError::PatternStore(e.to_string()))
    }
}

/// Input to [`PatternStore::upsert_pattern`] — not yet assigned an id.
#[derive(Debug, Clone)]
pub struct NewPattern {
    pub supplier_name: String,
    pub layout_hash: String,
    pub field_name: String,
    pub anchor_bbox: faktura_core::BBox,
    pub boost_weight: f32,
    pub recorded_at: DateTime<Utc>,
}

fn row_to_correction(row: &rusqlite::Row) -> rusqlite::Result<CorrectionRow> {
    let recorded_ts: i64 = row.get(11)?;
    Ok(CorrectionRow {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        supplier_name: row.get(2)?,
        layout_hash: row.get(3)?,
        field_name: row.get(4)?,
        corrected_value: row.get(5)?,
        bbox: faktura_core::BBox::new(row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?),
        page_index: row.get::<_, i64>(10)? as usize,
        recorded_at: DateTime::from_timestamp(recorded_ts, 0).unwrap_or_else(Utc::now),
    })
}

fn row_to_pattern(row: &rusqlite::Row) -> rusqlite::Result<PatternRow> {
    let last_used_ts: i64 = row.get(10)?;
    Ok(PatternRow {
        id: row.get(0)?,
        supplier_name: row.get(1)?,
        layout_hash: row.get(2)?,
        field_name: row.get(3)?,
        anchor_bbox: faktura_core::BBox::new(row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?),
        sample_count: row.get(8)?,
        boost_weight: row.get(9)?,
        last_used_at: DateTime::from_timestamp(last_used_ts, 0).unwrap_or_else(Utc::now),
    })
}
