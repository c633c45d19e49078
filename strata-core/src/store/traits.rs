use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::merge::MergeStats;
use crate::types::{
    Artifact, ArtifactKind, Claim, Community, CommunityReport, Entity, IndexTables, Relationship,
    Scope, TextUnit,
};

/// One serialized record as the store holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub record_id: String,
    /// JSON body of the record.
    pub body: String,
}

/// A completed merge, as recorded in the merge log.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRecord {
    pub merged_at: DateTime<Utc>,
    pub stats: MergeStats,
}

/// Persistence for the main and delta index scopes. Tables are stored and
/// returned in record order.
#[async_trait::async_trait]
pub trait IndexStore: Send + Sync {
    // ── Row operations ─────────────────────────────────────────────

    /// All rows of one table, in order.
    async fn load_rows(&self, scope: Scope, kind: ArtifactKind)
    -> crate::error::Result<Vec<StoredRow>>;

    /// Replace one table's contents.
    async fn replace_rows(
        &self,
        scope: Scope,
        kind: ArtifactKind,
        rows: &[StoredRow],
    ) -> crate::error::Result<()>;

    /// Number of rows in one table.
    async fn row_count(&self, scope: Scope, kind: ArtifactKind) -> crate::error::Result<usize>;

    // ── Whole-scope operations ─────────────────────────────────────

    /// Replace every table of `scope` in one transaction.
    async fn save_tables(&self, scope: Scope, tables: &IndexTables) -> crate::error::Result<()>;

    /// Remove every row of `scope`.
    async fn clear_scope(&self, scope: Scope) -> crate::error::Result<()>;

    /// Atomically write the merged main index, log the merge and, when
    /// `clear_delta` is set, empty the delta scope.
    async fn commit_merge(
        &self,
        merged: &IndexTables,
        stats: &MergeStats,
        clear_delta: bool,
    ) -> crate::error::Result<()>;

    // ── Merge log ──────────────────────────────────────────────────

    async fn last_merge(&self) -> crate::error::Result<Option<MergeRecord>>;
}

// ── Encoding helpers ───────────────────────────────────────────────

/// Serialize records into stored rows.
pub fn encode_rows<T: Artifact>(records: &[T]) -> Result<Vec<StoredRow>, StoreError> {
    records
        .iter()
        .map(|r| {
            Ok(StoredRow {
                record_id: r.record_id().to_string(),
                body: serde_json::to_string(r)?,
            })
        })
        .collect()
}

/// Decode stored rows of one table.
pub fn decode_rows<T: Artifact>(rows: &[StoredRow]) -> Result<Vec<T>, StoreError> {
    rows.iter()
        .enumerate()
        .map(|(position, row)| {
            serde_json::from_str(&row.body).map_err(|source| StoreError::Decode {
                kind: T::KIND,
                position,
                source,
            })
        })
        .collect()
}

/// Every table of `tables` as stored rows, in [`ArtifactKind::ALL`] order.
pub fn encode_tables(
    tables: &IndexTables,
) -> Result<Vec<(ArtifactKind, Vec<StoredRow>)>, StoreError> {
    Ok(vec![
        (ArtifactKind::Entity, encode_rows(&tables.entities)?),
        (ArtifactKind::Relationship, encode_rows(&tables.relationships)?),
        (ArtifactKind::Community, encode_rows(&tables.communities)?),
        (ArtifactKind::CommunityReport, encode_rows(&tables.reports)?),
        (ArtifactKind::TextUnit, encode_rows(&tables.text_units)?),
        (ArtifactKind::Claim, encode_rows(&tables.claims)?),
    ])
}

/// Load and decode one table.
pub async fn load_table<T: Artifact>(
    store: &dyn IndexStore,
    scope: Scope,
) -> crate::error::Result<Vec<T>> {
    let rows = store.load_rows(scope, T::KIND).await?;
    Ok(decode_rows(&rows)?)
}

/// Load every table of `scope`.
pub async fn load_tables(store: &dyn IndexStore, scope: Scope) -> crate::error::Result<IndexTables> {
    Ok(IndexTables {
        entities: load_table::<Entity>(store, scope).await?,
        relationships: load_table::<Relationship>(store, scope).await?,
        communities: load_table::<Community>(store, scope).await?,
        reports: load_table::<CommunityReport>(store, scope).await?,
        text_units: load_table::<TextUnit>(store, scope).await?,
        claims: load_table::<Claim>(store, scope).await?,
    })
}
