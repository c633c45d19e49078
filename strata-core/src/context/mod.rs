//! Token-budgeted community context assembly.
//!
//! [`local::LocalContextBuilder`] gathers raw node, edge and claim detail per
//! community. [`sort::ContextSerializer`] renders that detail into CSV tables
//! under a token budget. [`level::LevelContextBuilder`] walks one hierarchy
//! level, substituting child report summaries through
//! [`mixed::build_mixed_context`] when a community is oversized.

pub mod level;
pub mod local;
pub mod mixed;
pub mod sort;
pub mod tokens;

use serde::Serialize;

use crate::config::ContextSection;
use crate::error::ContextError;
use crate::merge::communities::hierarchy;
use crate::types::IndexTables;

pub use level::LevelContextBuilder;
pub use local::{LocalContextBuilder, LocalContexts};
pub use sort::ContextSerializer;
pub use tokens::{EstimateCounter, TiktokenCounter, TokenCounter, counter_for};

/// Terminal assembly state of a community's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextState {
    /// Full local detail fits the budget.
    Fits,
    /// Local detail exceeds the budget; not yet resolved.
    Oversized,
    /// Child raw detail partly or fully replaced by child report summaries.
    Substituted,
    /// Greedy budgeted trim of the community's own local detail.
    Truncated,
}

impl ContextState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fits => "fits",
            Self::Oversized => "oversized",
            Self::Substituted => "substituted",
            Self::Truncated => "truncated",
        }
    }
}

/// Row of the entities table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDetails {
    pub short_id: i64,
    pub title: String,
    pub description: String,
    pub degree: u64,
}

/// Row of the relationships table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeDetails {
    pub short_id: i64,
    pub source: String,
    pub target: String,
    pub description: String,
    pub combined_degree: u64,
}

/// Row of the claims table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimDetails {
    pub short_id: i64,
    pub subject: String,
    pub claim_type: String,
    pub status: String,
    pub description: String,
}

/// Everything the serializer knows about one member entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeContext {
    pub title: String,
    pub degree: u64,
    pub details: NodeDetails,
    pub edges: Vec<EdgeDetails>,
    pub claims: Vec<ClaimDetails>,
}

/// Report summary standing in for a child community's raw detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub community: i64,
    pub summary: String,
}

/// Assembled context for one community at one level. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ContextRow {
    pub community: i64,
    pub level: u32,
    pub nodes: Vec<NodeContext>,
    pub context: String,
    pub size: usize,
    pub exceeds_budget: bool,
    pub state: ContextState,
}

/// Serializer configured from the `[context]` section.
pub fn serializer_for(section: &ContextSection) -> Result<ContextSerializer, ContextError> {
    Ok(ContextSerializer::new(
        counter_for(section.tokenizer)?,
        section.edgeless_fallback,
    ))
}

/// Context rows for one level, substituting from the reports already in
/// `tables`.
pub fn assemble_level(
    tables: &IndexTables,
    serializer: &ContextSerializer,
    section: &ContextSection,
    level: u32,
) -> Result<Vec<ContextRow>, ContextError> {
    let budget = section.max_context_tokens;
    let local = LocalContextBuilder::new(tables).build_all(serializer, budget)?;
    let tree = hierarchy(&tables.communities);
    LevelContextBuilder::new(serializer, budget, section.sub_report_mode).build_level(
        level,
        &local,
        &tree,
        &tables.reports,
    )
}
