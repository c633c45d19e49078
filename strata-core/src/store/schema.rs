/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for the Strata `SQLite` database.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS strata_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per artifact record, in table order
CREATE TABLE IF NOT EXISTS artifacts (
    scope TEXT NOT NULL,
    kind TEXT NOT NULL,
    position INTEGER NOT NULL,
    record_id TEXT NOT NULL,
    body TEXT NOT NULL,
    PRIMARY KEY (scope, kind, position)
);
CREATE INDEX IF NOT EXISTS idx_artifacts_record ON artifacts(scope, kind, record_id);

-- Completed merges
CREATE TABLE IF NOT EXISTS merge_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    merged_at TEXT NOT NULL,
    stats TEXT NOT NULL DEFAULT '{}'
);
";

/// `SQLite` PRAGMAs applied on open. WAL is attempted separately.
pub const PRAGMAS_SQL: &str = r"
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;
";
