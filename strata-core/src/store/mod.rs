//! Index persistence.
//!
//! [`IndexStore`] holds two scopes of the six artifact tables: the committed
//! main index and the pending delta batch. [`SqliteStore`] is the `SQLite`
//! implementation; [`files`] reads and writes table files for import and export.

pub mod files;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    IndexStore, MergeRecord, StoredRow, decode_rows, encode_rows, encode_tables, load_table,
    load_tables,
};
