use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::merge::MergeStats;
use crate::types::{ArtifactKind, IndexTables, Scope};

use super::schema;
use super::traits::{IndexStore, MergeRecord, StoredRow, encode_tables};

/// SQLite-backed implementation of `IndexStore`.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initialize(&self) -> crate::error::Result<()> {
        let conn = self.lock();
        conn.execute_batch(schema::PRAGMAS_SQL)
            .map_err(StoreError::Sqlite)?;
        // Ignored for in-memory databases
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        conn.execute(
            "INSERT OR IGNORE INTO strata_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )
        .map_err(StoreError::Sqlite)?;

        let version: String = conn
            .query_row(
                "SELECT value FROM strata_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        if version != schema::SCHEMA_VERSION {
            return Err(StoreError::Migration(format!(
                "database schema version {version}, expected {}",
                schema::SCHEMA_VERSION
            ))
            .into());
        }
        Ok(())
    }

    // ── Transaction helpers ─────────────────────────────────────────

    fn delete_table(tx: &Transaction<'_>, scope: Scope, kind: ArtifactKind) -> rusqlite::Result<()> {
        tx.execute(
            "DELETE FROM artifacts WHERE scope = ?1 AND kind = ?2",
            params![scope.as_str(), kind.as_str()],
        )?;
        Ok(())
    }

    fn write_table(
        tx: &Transaction<'_>,
        scope: Scope,
        kind: ArtifactKind,
        rows: &[StoredRow],
    ) -> rusqlite::Result<()> {
        Self::delete_table(tx, scope, kind)?;
        let mut stmt = tx.prepare_cached(
            "INSERT INTO artifacts (scope, kind, position, record_id, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (position, row) in rows.iter().enumerate() {
            #[allow(clippy::cast_possible_wrap)]
            let position = position as i64;
            stmt.execute(params![
                scope.as_str(),
                kind.as_str(),
                position,
                row.record_id,
                row.body
            ])?;
        }
        Ok(())
    }

    fn write_scope(tx: &Transaction<'_>, scope: Scope, tables: &IndexTables) -> crate::error::Result<()> {
        for (kind, rows) in encode_tables(tables)? {
            Self::write_table(tx, scope, kind, &rows).map_err(StoreError::Sqlite)?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IndexStore for SqliteStore {
    // ── Row operations ─────────────────────────────────────────────

    async fn load_rows(
        &self,
        scope: Scope,
        kind: ArtifactKind,
    ) -> crate::error::Result<Vec<StoredRow>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT record_id, body FROM artifacts
                 WHERE scope = ?1 AND kind = ?2 ORDER BY position",
            )
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![scope.as_str(), kind.as_str()], |row| {
                Ok(StoredRow {
                    record_id: row.get(0)?,
                    body: row.get(1)?,
                })
            })
            .map_err(StoreError::Sqlite)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)?;
        debug!(%scope, %kind, rows = rows.len(), "Loaded table");
        Ok(rows)
    }

    async fn replace_rows(
        &self,
        scope: Scope,
        kind: ArtifactKind,
        rows: &[StoredRow],
    ) -> crate::error::Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        Self::write_table(&tx, scope, kind, rows).map_err(StoreError::Sqlite)?;
        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(())
    }

    async fn row_count(&self, scope: Scope, kind: ArtifactKind) -> crate::error::Result<usize> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM artifacts WHERE scope = ?1 AND kind = ?2",
                params![scope.as_str(), kind.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(count as usize)
    }

    // ── Whole-scope operations ─────────────────────────────────────

    async fn save_tables(&self, scope: Scope, tables: &IndexTables) -> crate::error::Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;
        Self::write_scope(&tx, scope, tables)?;
        tx.commit().map_err(StoreError::Sqlite)?;
        info!(%scope, entities = tables.entities.len(), "Saved index tables");
        Ok(())
    }

    async fn clear_scope(&self, scope: Scope) -> crate::error::Result<()> {
        let conn = self.lock();
        let removed = conn
            .execute(
                "DELETE FROM artifacts WHERE scope = ?1",
                params![scope.as_str()],
            )
            .map_err(StoreError::Sqlite)?;
        debug!(%scope, removed, "Cleared scope");
        Ok(())
    }

    async fn commit_merge(
        &self,
        merged: &IndexTables,
        stats: &MergeStats,
        clear_delta: bool,
    ) -> crate::error::Result<()> {
        let stats_json = serde_json::to_string(stats).map_err(StoreError::Serialization)?;
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StoreError::Sqlite)?;

        Self::write_scope(&tx, Scope::Main, merged)?;
        tx.execute(
            "INSERT INTO merge_log (merged_at, stats) VALUES (?1, ?2)",
            params![Utc::now().to_rfc3339(), stats_json],
        )
        .map_err(StoreError::Sqlite)?;
        if clear_delta {
            tx.execute(
                "DELETE FROM artifacts WHERE scope = ?1",
                params![Scope::Delta.as_str()],
            )
            .map_err(StoreError::Sqlite)?;
        }

        tx.commit().map_err(StoreError::Sqlite)?;
        Ok(())
    }

    // ── Merge log ──────────────────────────────────────────────────

    async fn last_merge(&self) -> crate::error::Result<Option<MergeRecord>> {
        let conn = self.lock();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT merged_at, stats FROM merge_log ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StoreError::Sqlite)?;

        let Some((merged_at, stats)) = row else {
            return Ok(None);
        };
        Ok(Some(MergeRecord {
            merged_at: DateTime::parse_from_rfc3339(&merged_at)
                .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc)),
            stats: serde_json::from_str(&stats).map_err(StoreError::Serialization)?,
        }))
    }
}
