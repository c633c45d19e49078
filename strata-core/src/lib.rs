//! Strata core library: incremental knowledge-graph index merging and
//! token-budgeted community context assembly.
//!
//! [`pipeline::IndexUpdatePipeline`] folds a delta batch into the committed
//! index held by a [`store::IndexStore`]. [`report::ReportPipeline`] assembles
//! community contexts bottom-up and generates community reports from them.

pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod merge;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod store;
pub mod summarize;
pub mod types;
