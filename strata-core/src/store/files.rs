// Table files: one JSON array per artifact kind, named `<kind>.json`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StoreError;
use crate::types::{ArtifactKind, IndexTables};

pub fn table_path(dir: &Path, kind: ArtifactKind) -> PathBuf {
    dir.join(format!("{}.json", kind.as_str()))
}

fn read_table<T: DeserializeOwned>(dir: &Path, kind: ArtifactKind) -> Result<Vec<T>, StoreError> {
    let path = table_path(dir, kind);
    if !path.exists() {
        debug!(path = %path.display(), "Table file absent, treating as empty");
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&text)?)
}

fn write_table<T: Serialize>(dir: &Path, kind: ArtifactKind, rows: &[T]) -> Result<(), StoreError> {
    let text = serde_json::to_string_pretty(rows)?;
    std::fs::write(table_path(dir, kind), text)?;
    Ok(())
}

/// Read every table file present in `dir`. Missing files are empty tables.
pub fn read_tables_dir(dir: &Path) -> Result<IndexTables, StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )));
    }
    Ok(IndexTables {
        entities: read_table(dir, ArtifactKind::Entity)?,
        relationships: read_table(dir, ArtifactKind::Relationship)?,
        communities: read_table(dir, ArtifactKind::Community)?,
        reports: read_table(dir, ArtifactKind::CommunityReport)?,
        text_units: read_table(dir, ArtifactKind::TextUnit)?,
        claims: read_table(dir, ArtifactKind::Claim)?,
    })
}

/// Write all six table files into `dir`, creating it if needed.
pub fn write_tables_dir(dir: &Path, tables: &IndexTables) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir)?;
    write_table(dir, ArtifactKind::Entity, &tables.entities)?;
    write_table(dir, ArtifactKind::Relationship, &tables.relationships)?;
    write_table(dir, ArtifactKind::Community, &tables.communities)?;
    write_table(dir, ArtifactKind::CommunityReport, &tables.reports)?;
    write_table(dir, ArtifactKind::TextUnit, &tables.text_units)?;
    write_table(dir, ArtifactKind::Claim, &tables.claims)?;
    Ok(())
}
