use std::fmt::{Display, Formatter};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use caseboard_core::Board;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS board_revisions (
  revision_id TEXT PRIMARY KEY,
  table_location TEXT NOT NULL CHECK (length(trim(table_location)) > 0),
  generated_at TEXT NOT NULL,
  saved_at TEXT NOT NULL,
  summary TEXT NOT NULL,
  row_count INTEGER NOT NULL CHECK (row_count >= 0),
  content_sha256 TEXT NOT NULL CHECK (content_sha256 LIKE 'sha256:%'),
  content TEXT NOT NULL,
  board_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_board_revisions_location_saved_at
  ON board_revisions(table_location, saved_at);
";

const REVISION_COLUMNS: &str = "revision_id, table_location, generated_at, saved_at, summary, \
     row_count, content_sha256, content, board_json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BoardRevisionId(pub Ulid);

impl BoardRevisionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a revision identifier from its ULID text form.
    ///
    /// # Errors
    /// Returns an error when `value` is not a valid ULID.
    pub fn parse(value: &str) -> Result<Self> {
        Ulid::from_string(value)
            .map(Self)
            .with_context(|| format!("invalid revision_id ULID: {value}"))
    }
}

impl Default for BoardRevisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BoardRevisionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One saved rendering of the board at a table location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardRevision {
    pub revision_id: BoardRevisionId,
    pub table_location: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    pub summary: String,
    pub row_count: usize,
    pub content_sha256: String,
    pub content: String,
    pub board: Board,
}

/// Revision metadata without the rendered content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevisionSummary {
    pub revision_id: BoardRevisionId,
    pub table_location: String,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    pub summary: String,
    pub row_count: usize,
    pub content_sha256: String,
}

impl From<&BoardRevision> for RevisionSummary {
    fn from(revision: &BoardRevision) -> Self {
        Self {
            revision_id: revision.revision_id,
            table_location: revision.table_location.clone(),
            saved_at: revision.saved_at,
            summary: revision.summary.clone(),
            row_count: revision.row_count,
            content_sha256: revision.content_sha256.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
    pub inferred_from_legacy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub revision_count: i64,
    pub schema_status: SchemaStatus,
}

struct RawRevision {
    revision_id: String,
    table_location: String,
    generated_at: String,
    saved_at: String,
    summary: String,
    row_count: i64,
    content_sha256: String,
    content: String,
    board_json: String,
}

impl RawRevision {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            revision_id: row.get(0)?,
            table_location: row.get(1)?,
            generated_at: row.get(2)?,
            saved_at: row.get(3)?,
            summary: row.get(4)?,
            row_count: row.get(5)?,
            content_sha256: row.get(6)?,
            content: row.get(7)?,
            board_json: row.get(8)?,
        })
    }

    fn into_revision(self) -> Result<BoardRevision> {
        Ok(BoardRevision {
            revision_id: BoardRevisionId::parse(&self.revision_id)?,
            table_location: self.table_location,
            generated_at: parse_rfc3339(&self.generated_at)?,
            saved_at: parse_rfc3339(&self.saved_at)?,
            summary: self.summary,
            row_count: usize::try_from(self.row_count)
                .with_context(|| format!("invalid row_count {}", self.row_count))?,
            content_sha256: self.content_sha256,
            content: self.content,
            board: serde_json::from_str(&self.board_json)
                .context("failed to deserialize stored board")?,
        })
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a SQLite-backed revision store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let (current_version, inferred_from_legacy) = detect_effective_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
            inferred_from_legacy,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version == 0 {
            let tx = self.conn.transaction().context("failed to start migration transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).context("failed to apply migration 001")?;
            record_schema_version(&tx, 1)?;
            tx.commit().context("failed to commit migration 001")?;
            version = current_schema_version(&self.conn)?;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Persist one board revision.
    ///
    /// # Errors
    /// Returns an error when serialization fails, a check constraint is violated,
    /// or the revision id already exists.
    pub fn save_revision(&mut self, revision: &BoardRevision) -> Result<()> {
        let row_count = i64::try_from(revision.row_count)
            .with_context(|| format!("row_count {} out of range", revision.row_count))?;
        let tx = self.conn.transaction().context("failed to start transaction")?;
        tx.execute(
            "INSERT INTO board_revisions(
                revision_id, table_location, generated_at, saved_at, summary,
                row_count, content_sha256, content, board_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                revision.revision_id.to_string(),
                revision.table_location,
                rfc3339(revision.generated_at)?,
                rfc3339(revision.saved_at)?,
                revision.summary,
                row_count,
                revision.content_sha256,
                revision.content,
                serde_json::to_string(&revision.board).context("failed to serialize board")?,
            ],
        )
        .with_context(|| format!("failed to persist board revision {}", revision.revision_id))?;
        tx.commit().context("failed to commit board revision transaction")?;
        Ok(())
    }

    /// Retrieve a revision by its identifier.
    ///
    /// # Errors
    /// Returns an error when lookup or decoding fails.
    pub fn get_revision(&self, revision_id: BoardRevisionId) -> Result<Option<BoardRevision>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REVISION_COLUMNS} FROM board_revisions WHERE revision_id = ?1"
        ))?;
        let raw = stmt
            .query_row(params![revision_id.to_string()], RawRevision::from_row)
            .optional()?;
        raw.map(RawRevision::into_revision).transpose()
    }

    /// Most recently saved revision at `table_location`.
    ///
    /// # Errors
    /// Returns an error when lookup or decoding fails.
    pub fn latest_revision(&self, table_location: &str) -> Result<Option<BoardRevision>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REVISION_COLUMNS} FROM board_revisions
             WHERE table_location = ?1
             ORDER BY rowid DESC
             LIMIT 1"
        ))?;
        let raw = stmt.query_row(params![table_location], RawRevision::from_row).optional()?;
        raw.map(RawRevision::into_revision).transpose()
    }

    /// Revision history, newest first, optionally restricted to one location.
    ///
    /// # Errors
    /// Returns an error when the query or decoding fails.
    pub fn list_revisions(&self, table_location: Option<&str>) -> Result<Vec<RevisionSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REVISION_COLUMNS} FROM board_revisions
             WHERE ?1 IS NULL OR table_location = ?1
             ORDER BY rowid DESC"
        ))?;
        let rows = stmt.query_map(params![table_location], RawRevision::from_row)?;

        let mut summaries = Vec::new();
        for row in rows {
            let revision = row?.into_revision()?;
            summaries.push(RevisionSummary::from(&revision));
        }
        Ok(summaries)
    }

    /// Run quick-check and schema status health probes.
    ///
    /// # Errors
    /// Returns an error when any integrity probe query fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let revision_count = if table_exists(&self.conn, "board_revisions")? {
            self.conn
                .query_row("SELECT COUNT(*) FROM board_revisions", [], |row| row.get::<_, i64>(0))
                .context("failed to count board revisions")?
        } else {
            0
        };

        let schema_status = self.schema_status()?;
        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            revision_count,
            schema_status,
        })
    }
}

fn table_exists(conn: &Connection, table_name: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            params![table_name],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("failed to check if table exists: {table_name}"))?;
    Ok(exists == 1)
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn detect_effective_schema_version(conn: &Connection) -> Result<(i64, bool)> {
    let recorded = current_schema_version(conn)?;
    if recorded > 0 {
        return Ok((recorded, false));
    }

    // Tables created before migrations were tracked.
    if table_exists(conn, "board_revisions")? {
        return Ok((1, true));
    }

    Ok((0, false))
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc())
}

fn rfc3339(value: OffsetDateTime) -> Result<String> {
    value
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 timestamp: {value}"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;

    use super::*;
    use caseboard_core::{CaseRecord, RankingMetadata, StatusCode};
    use time::Duration;

    fn fixture_time(offset_minutes: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000) + Duration::minutes(offset_minutes)
    }

    fn mk_revision(location: &str, offset_minutes: i64, content: &str) -> BoardRevision {
        let board = Board {
            generated_at: fixture_time(offset_minutes),
            cases_seen: 1,
            determinism: RankingMetadata {
                ruleset_version: "ranking.v1".to_string(),
                tie_breakers: vec!["status_rank asc".to_string()],
            },
            rows: vec![CaseRecord {
                case_name: "Example".to_string(),
                status: StatusCode::Open,
                filing_time: "2024-01-01 03:00".to_string(),
                last_editor: "Reporter".to_string(),
                last_editor_time: "2024-01-02 04:00".to_string(),
                last_attendant: String::new(),
                last_attendant_time: String::new(),
            }],
            skipped: vec![],
        };
        BoardRevision {
            revision_id: BoardRevisionId::new(),
            table_location: location.to_string(),
            generated_at: fixture_time(offset_minutes),
            saved_at: fixture_time(offset_minutes),
            summary: "Updating SPI case list (1 active reports)".to_string(),
            row_count: board.rows.len(),
            content_sha256: "sha256:abc123".to_string(),
            content: content.to_string(),
            board,
        }
    }

    fn migrated_memory_store() -> Result<SqliteStore> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        store.migrate()?;
        Ok(store)
    }

    #[test]
    fn schema_status_reports_pending_migration_for_fresh_database() -> Result<()> {
        let mut store = SqliteStore::open(Path::new(":memory:"))?;
        let before = store.schema_status()?;
        assert_eq!(before.current_version, 0);
        assert_eq!(before.pending_versions, vec![1]);

        store.migrate()?;
        let after = store.schema_status()?;
        assert_eq!(after.current_version, 1);
        assert!(after.pending_versions.is_empty());
        assert!(!after.inferred_from_legacy);
        Ok(())
    }

    #[test]
    fn migrate_is_idempotent() -> Result<()> {
        let mut store = migrated_memory_store()?;
        store.migrate()?;
        assert_eq!(store.schema_status()?.current_version, 1);
        Ok(())
    }

    #[test]
    fn save_and_load_revision_round_trip() -> Result<()> {
        let mut store = migrated_memory_store()?;
        let revision = mk_revision("User:Example/SPI case list", 0, "{{SPIstatusheader}}\n|}");
        store.save_revision(&revision)?;

        let loaded = store
            .get_revision(revision.revision_id)?
            .ok_or_else(|| anyhow!("saved revision should be retrievable"))?;
        assert_eq!(loaded, revision);
        Ok(())
    }

    #[test]
    fn latest_revision_is_scoped_to_location() -> Result<()> {
        let mut store = migrated_memory_store()?;
        let older = mk_revision("User:A/list", 0, "old");
        let newer = mk_revision("User:A/list", 10, "new");
        let elsewhere = mk_revision("User:B/list", 20, "other");
        store.save_revision(&older)?;
        store.save_revision(&newer)?;
        store.save_revision(&elsewhere)?;

        let latest = store
            .latest_revision("User:A/list")?
            .ok_or_else(|| anyhow!("location should have a revision"))?;
        assert_eq!(latest.content, "new");
        assert!(store.latest_revision("User:C/list")?.is_none());

        let history = store.list_revisions(Some("User:A/list"))?;
        assert_eq!(
            history.iter().map(|summary| summary.revision_id).collect::<Vec<_>>(),
            vec![newer.revision_id, older.revision_id]
        );
        assert_eq!(store.list_revisions(None)?.len(), 3);
        Ok(())
    }

    #[test]
    fn duplicate_revision_id_is_rejected() -> Result<()> {
        let mut store = migrated_memory_store()?;
        let revision = mk_revision("User:A/list", 0, "content");
        store.save_revision(&revision)?;
        assert!(store.save_revision(&revision).is_err());
        Ok(())
    }

    #[test]
    fn check_constraints_reject_malformed_digest() -> Result<()> {
        let mut store = migrated_memory_store()?;
        let mut revision = mk_revision("User:A/list", 0, "content");
        revision.content_sha256 = "md5:abc".to_string();
        assert!(store.save_revision(&revision).is_err());
        Ok(())
    }

    #[test]
    fn integrity_check_reports_clean_database() -> Result<()> {
        let mut store = migrated_memory_store()?;
        store.save_revision(&mk_revision("User:A/list", 0, "content"))?;

        let report = store.integrity_check()?;
        assert!(report.quick_check_ok);
        assert_eq!(report.revision_count, 1);
        assert_eq!(report.schema_status.current_version, 1);
        Ok(())
    }

    #[test]
    fn concurrent_writes_and_reads_preserve_integrity() -> Result<()> {
        let db_path =
            std::env::temp_dir().join(format!("caseboard-concurrency-{}.sqlite3", Ulid::new()));
        {
            let mut init = SqliteStore::open(&db_path)?;
            init.migrate()?;
        }

        let writer_threads = 4;
        let writes_per_thread = 10;
        let mut handles = Vec::new();

        for thread_index in 0..writer_threads {
            let writer_path = db_path.clone();
            handles.push(thread::spawn(move || -> Result<()> {
                let mut store = SqliteStore::open(&writer_path)?;
                store.migrate()?;
                for write_index in 0..writes_per_thread {
                    let offset = i64::from(thread_index * 100 + write_index);
                    store.save_revision(&mk_revision("User:A/list", offset, "concurrent"))?;
                }
                Ok(())
            }));
        }

        let reader_path = db_path.clone();
        handles.push(thread::spawn(move || -> Result<()> {
            let store = SqliteStore::open(&reader_path)?;
            for _ in 0..20 {
                let _ = store.list_revisions(Some("User:A/list"))?;
            }
            Ok(())
        }));

        for handle in handles {
            let Ok(thread_result) = handle.join() else {
                return Err(anyhow!("concurrency thread panicked"));
            };
            thread_result?;
        }

        let store = SqliteStore::open(&db_path)?;
        let history = store.list_revisions(Some("User:A/list"))?;
        assert_eq!(history.len(), 40);
        assert!(store.integrity_check()?.quick_check_ok);

        for suffix in ["", "-wal", "-shm"] {
            let path = std::path::PathBuf::from(format!("{}{}", db_path.display(), suffix));
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to cleanup sqlite file {}", path.display()))?;
            }
        }

        Ok(())
    }
}
