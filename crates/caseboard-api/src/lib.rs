use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use caseboard_core::{
    assemble_board, edit_summary, parse_clerk_roster, render_table, Board, CaseRecord,
    CaseRecordBuilder, CaseSnapshot, NameNormalizer, PrivilegedSet, TableTemplate,
    TimestampExtractor,
};
use caseboard_store_sqlite::{
    BoardRevision, BoardRevisionId, IntegrityReport, RevisionSummary, SchemaStatus, SqliteStore,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

pub const API_CONTRACT_VERSION: &str = "api.v1";
pub const DEFAULT_TABLE_LOCATION: &str = "User:Mz7/SPI case list";

/// Supplies the inputs of one board run.
///
/// Implementations must return a consistent snapshot: edits newest first, tags and
/// page text as of the same moment.
pub trait BoardSource {
    /// Active clerks and checkusers.
    ///
    /// # Errors
    /// Returns an error when the underlying source cannot be read.
    fn privileged_users(&self) -> Result<PrivilegedSet>;

    /// Every open case page.
    ///
    /// # Errors
    /// Returns an error when the underlying source cannot be read.
    fn open_cases(&self) -> Result<Vec<CaseSnapshot>>;

    /// Pre-built `QUICK` rows from the quick-check request feed.
    ///
    /// # Errors
    /// Returns an error when the underlying source cannot be read.
    fn quick_requests(&self) -> Result<Vec<CaseRecord>>;
}

/// A board source loaded from one JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotFile {
    /// Raw text of the clerk roster page; parsed and merged into `clerks`.
    #[serde(default)]
    pub clerk_roster: Option<String>,
    #[serde(default)]
    pub clerks: Vec<String>,
    #[serde(default)]
    pub checkusers: Vec<String>,
    #[serde(default)]
    pub cases: Vec<CaseSnapshot>,
    #[serde(default)]
    pub quick_requests: Vec<CaseRecord>,
}

impl SnapshotFile {
    /// Read and parse a snapshot document from disk.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or is not a valid snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot file {}", path.display()))?;
        let snapshot = Self::from_json_str(&raw)
            .with_context(|| format!("failed to parse snapshot file {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            cases = snapshot.cases.len(),
            quick_requests = snapshot.quick_requests.len(),
            "loaded board snapshot"
        );
        Ok(snapshot)
    }

    /// Parse a snapshot document.
    ///
    /// # Errors
    /// Returns an error when `raw` is not a valid snapshot document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid snapshot JSON")
    }
}

impl BoardSource for SnapshotFile {
    fn privileged_users(&self) -> Result<PrivilegedSet> {
        let mut clerks = self.clerks.clone();
        if let Some(roster) = &self.clerk_roster {
            let listed = parse_clerk_roster(roster).context("failed to parse clerk roster")?;
            tracing::debug!(clerks = listed.len(), "parsed clerk roster");
            clerks.extend(listed);
        }
        Ok(PrivilegedSet::from_groups(clerks, self.checkusers.iter().cloned()))
    }

    fn open_cases(&self) -> Result<Vec<CaseSnapshot>> {
        Ok(self.cases.clone())
    }

    fn quick_requests(&self) -> Result<Vec<CaseRecord>> {
        Ok(self.quick_requests.clone())
    }
}

/// Board settings, loaded from YAML. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoardConfig {
    pub table_location: String,
    /// Display-name overrides keyed by username, matched case-insensitively.
    pub name_overrides: BTreeMap<String, String>,
    pub template: TableTemplate,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            table_location: DEFAULT_TABLE_LOCATION.to_string(),
            name_overrides: BTreeMap::new(),
            template: TableTemplate::default(),
        }
    }
}

impl BoardConfig {
    /// Load configuration from `path`, or defaults when no path is given.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed, or names a blank table location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Parse configuration YAML. An empty document yields defaults.
    ///
    /// # Errors
    /// Returns an error when `raw` is not valid YAML or names a blank table location.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(raw).context("invalid config YAML")?;
        if config.table_location.trim().is_empty() {
            return Err(anyhow!("table_location must not be empty"));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub inferred_from_legacy: bool,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Saved,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishResult {
    pub status: PublishStatus,
    /// The new revision, or the existing one whose content matched.
    pub revision_id: BoardRevisionId,
    pub table_location: String,
    pub summary: String,
    pub row_count: usize,
    pub skipped_count: usize,
    pub content_sha256: String,
}

#[derive(Debug, Clone)]
pub struct CaseBoardApi {
    db_path: PathBuf,
    config: BoardConfig,
}

impl CaseBoardApi {
    #[must_use]
    pub fn new(db_path: PathBuf, config: BoardConfig) -> Self {
        Self { db_path, config }
    }

    #[must_use]
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
    }

    fn open_migrated_store(&self) -> Result<SqliteStore> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    /// Classify, attribute, and rank every case from `source`.
    ///
    /// Cases that fail or resolve to no status are listed in [`Board::skipped`].
    ///
    /// # Errors
    /// Returns an error when the source cannot be read or signature patterns fail to compile.
    pub fn build_board(&self, source: &dyn BoardSource) -> Result<Board> {
        let privileged = source.privileged_users().context("failed to load privileged users")?;
        let cases = source.open_cases().context("failed to load open cases")?;
        let quick_requests = source.quick_requests().context("failed to load quick requests")?;

        let names = NameNormalizer::new(&self.config.name_overrides);
        let timestamps = TimestampExtractor::new()?;
        let builder = CaseRecordBuilder::new(&privileged, &names, &timestamps);

        let board = assemble_board(&cases, quick_requests, &builder, OffsetDateTime::now_utc());
        for skipped in &board.skipped {
            tracing::warn!(
                title = %skipped.title,
                source = ?skipped.source,
                reason = %skipped.reason,
                "left off the board"
            );
        }
        tracing::info!(
            cases = board.cases_seen,
            privileged = privileged.len(),
            rows = board.rows.len(),
            skipped = board.skipped.len(),
            "built case board"
        );
        Ok(board)
    }

    /// Render the board as wikitext using the configured table template.
    #[must_use]
    pub fn render_board(&self, board: &Board) -> String {
        render_table(&board.rows, &self.config.template)
    }

    /// Build, render, and save the board at the configured table location.
    ///
    /// Content identical to the latest revision at that location is not saved again.
    ///
    /// # Errors
    /// Returns an error when building fails or the revision store cannot be updated.
    pub fn publish(&self, source: &dyn BoardSource) -> Result<PublishResult> {
        let board = self.build_board(source)?;
        let content = self.render_board(&board);
        let content_sha256 = content_digest(&content);
        let summary = edit_summary(board.rows.len());
        let table_location = self.config.table_location.clone();

        let mut store = self.open_migrated_store()?;
        if let Some(latest) = store.latest_revision(&table_location)? {
            if latest.content_sha256 == content_sha256 {
                tracing::info!(
                    location = %table_location,
                    revision_id = %latest.revision_id,
                    "board unchanged; nothing saved"
                );
                return Ok(PublishResult {
                    status: PublishStatus::Unchanged,
                    revision_id: latest.revision_id,
                    table_location,
                    summary: latest.summary,
                    row_count: latest.row_count,
                    skipped_count: board.skipped.len(),
                    content_sha256,
                });
            }
        }

        let revision = BoardRevision {
            revision_id: BoardRevisionId::new(),
            table_location: table_location.clone(),
            generated_at: board.generated_at,
            saved_at: OffsetDateTime::now_utc(),
            summary: summary.clone(),
            row_count: board.rows.len(),
            content_sha256: content_sha256.clone(),
            content,
            board,
        };
        store.save_revision(&revision)?;
        tracing::info!(
            location = %table_location,
            revision_id = %revision.revision_id,
            rows = revision.row_count,
            "{summary}"
        );

        Ok(PublishResult {
            status: PublishStatus::Saved,
            revision_id: revision.revision_id,
            table_location,
            summary,
            row_count: revision.row_count,
            skipped_count: revision.board.skipped.len(),
            content_sha256,
        })
    }

    /// Saved revisions, newest first.
    ///
    /// # Errors
    /// Returns an error when the store cannot be opened or queried.
    pub fn revisions(&self, table_location: Option<&str>) -> Result<Vec<RevisionSummary>> {
        let store = self.open_migrated_store()?;
        store.list_revisions(table_location)
    }

    /// Load one saved revision with its content and board.
    ///
    /// # Errors
    /// Returns an error when the id is malformed, unknown, or the store cannot be read.
    pub fn revision_show(&self, revision_id: &str) -> Result<BoardRevision> {
        let id = BoardRevisionId::parse(revision_id)?;
        let store = self.open_migrated_store()?;
        store
            .get_revision(id)?
            .ok_or_else(|| anyhow!("board revision not found: {revision_id}"))
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                inferred_from_legacy: before.inferred_from_legacy,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            inferred_from_legacy: before.inferred_from_legacy,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Run database health probes.
    ///
    /// # Errors
    /// Returns an error when the store cannot be opened or a probe fails.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let store = self.open_store()?;
        store.integrity_check()
    }
}

fn content_digest(content: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(content.as_bytes())))
}
