use crate::types::ArtifactKind;

/// Top-level Strata error type.
///
/// All fallible operations in `strata-core` return [`Result<T, StrataError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum StrataError {
    /// Error from the index store layer (`SQLite` operations, row decoding).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The incremental merge was aborted because input data is corrupt.
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// Error while assembling community context.
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error communicating with an LLM provider.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Error generating or parsing a community report.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Errors from the SQLite-backed index store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema creation or upgrade failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// A stored row could not be decoded into its artifact type.
    #[error("Cannot decode {kind} row {position}: {source}")]
    Decode {
        kind: ArtifactKind,
        position: usize,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization of an artifact failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem I/O error while importing or exporting tables.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Data-integrity failures that abort a merge.
///
/// These are distinct from records that are merely skipped: a record without
/// a merge key is dropped with a warning and never surfaces here.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum MergeError {
    /// A numeric identifier that must be present is missing or out of range.
    #[error("Corrupt {kind} record {record}: field `{field}` {problem}")]
    CorruptField {
        kind: ArtifactKind,
        /// Opaque id (or position) of the offending record.
        record: String,
        field: &'static str,
        problem: String,
    },

    /// A record refers to an identifier that the merge cannot resolve.
    #[error("Dangling reference in {kind} record {record}: {field} = {value}")]
    DanglingReference {
        kind: ArtifactKind,
        record: String,
        field: &'static str,
        value: i64,
    },
}

/// Errors during community context assembly.
#[derive(thiserror::Error, Debug)]
pub enum ContextError {
    /// The tokenizer could not be loaded.
    #[error("Tokenizer unavailable: {0}")]
    Tokenizer(String),

    /// Tabular rendering of context records failed.
    #[error("Render error: {0}")]
    Render(String),

    /// A record lacks a field the serializer needs.
    #[error("{kind} record '{record}' has no {field}")]
    MissingField {
        kind: ArtifactKind,
        record: String,
        field: &'static str,
    },
}

/// Errors in Strata configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from LLM provider interactions.
#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    /// Network-level failure connecting to the LLM provider.
    #[error("Network error: {0}")]
    Network(String),

    /// LLM API returned a non-success HTTP status.
    #[error("API error (HTTP {status}): {body}")]
    ApiError {
        /// HTTP status code from the provider.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// LLM response could not be parsed into the expected format.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// LLM configuration is missing or invalid (API key, model, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cumulative LLM cost has exceeded the configured budget.
    #[error("Cost budget exceeded: {0}")]
    BudgetExceeded(String),
}

/// Errors while producing community reports.
#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    /// The model returned something that is not a report.
    #[error("Malformed report for community {community}: {message}")]
    Malformed { community: i64, message: String },

    /// A worker task panicked or was cancelled.
    #[error("Report task failed: {0}")]
    Task(String),
}

impl MergeError {
    pub(crate) fn missing(kind: ArtifactKind, record: &str, field: &'static str) -> Self {
        Self::CorruptField {
            kind,
            record: record.to_string(),
            field,
            problem: "is missing".to_string(),
        }
    }
}

/// Convenience alias for `Result<T, StrataError>`.
pub type Result<T> = std::result::Result<T, StrataError>;
