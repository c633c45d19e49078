// Index update pipeline: load main and delta, merge, optionally summarize,
// validate, then commit main and clear delta in one transaction.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use crate::cluster::{ClusterParams, CommunityDetector, detect_communities};
use crate::config::{ClusteringSection, MergeSection};
use crate::error::MergeError;
use crate::llm::CostTracker;
use crate::merge::{MergeStats, merge_index};
use crate::store::{IndexStore, load_tables};
use crate::summarize::{DescriptionSummarizer, SummaryStats};
use crate::types::{ArtifactKind, IndexTables, NO_COMMUNITY, Scope};

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct UpdateResult {
    pub stats: MergeStats,
    /// Present when descriptions were summarized.
    pub summary: Option<SummaryStats>,
    pub costs: CostTracker,
    /// False when the delta scope was empty and nothing was written.
    pub committed: bool,
    pub duration: Duration,
}

/// Folds the pending delta batch into the committed index.
#[derive(Debug, Clone)]
pub struct IndexUpdatePipeline {
    clear_delta: bool,
    summarizer: Option<DescriptionSummarizer>,
    clustering: Option<(Arc<dyn CommunityDetector>, ClusterParams)>,
}

impl IndexUpdatePipeline {
    pub fn new(settings: &MergeSection) -> Self {
        Self {
            clear_delta: settings.clear_delta,
            summarizer: None,
            clustering: None,
        }
    }

    /// Cluster delta batches that arrive without communities.
    #[must_use]
    pub fn with_detector(
        mut self,
        detector: Arc<dyn CommunityDetector>,
        settings: &ClusteringSection,
    ) -> Self {
        self.clustering = Some((detector, ClusterParams::from(settings)));
        self
    }

    #[must_use]
    pub fn with_summarizer(mut self, summarizer: DescriptionSummarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Run the update against `store`. On any merge or validation error
    /// nothing is written.
    #[instrument(skip_all, name = "index_update")]
    pub async fn run(&self, store: &dyn IndexStore) -> crate::error::Result<UpdateResult> {
        let start = Instant::now();
        let main = load_tables(store, Scope::Main).await?;
        let mut delta = load_tables(store, Scope::Delta).await?;

        if delta.is_empty() {
            info!("Delta scope is empty, nothing to merge");
            return Ok(UpdateResult {
                duration: start.elapsed(),
                ..UpdateResult::default()
            });
        }

        if let Some((detector, params)) = &self.clustering {
            if delta.communities.is_empty() && !delta.entities.is_empty() {
                delta.communities = detect_communities(
                    detector.as_ref(),
                    &delta.entities,
                    &delta.relationships,
                    params,
                )?;
            }
        }

        info!(
            main_entities = main.entities.len(),
            delta_entities = delta.entities.len(),
            delta_communities = delta.communities.len(),
            "Merging delta into main"
        );

        let outcome = merge_index(main, delta)?;
        let mut tables = outcome.tables;

        let mut costs = CostTracker::default();
        let summary = match &self.summarizer {
            Some(summarizer) => Some(summarizer.summarize(&mut tables, &mut costs).await),
            None => None,
        };

        validate(&tables)?;
        store
            .commit_merge(&tables, &outcome.stats, self.clear_delta)
            .await?;

        let result = UpdateResult {
            stats: outcome.stats,
            summary,
            costs,
            committed: true,
            duration: start.elapsed(),
        };
        info!(
            entities = tables.entities.len(),
            communities = tables.communities.len(),
            reports = tables.reports.len(),
            duration_ms = result.duration.as_millis(),
            "Index update committed"
        );
        Ok(result)
    }
}

/// Cross-table checks on a merged index.
pub fn validate(tables: &IndexTables) -> Result<(), MergeError> {
    let mut titles = HashSet::new();
    for entity in &tables.entities {
        if !titles.insert(entity.title.as_str()) {
            return Err(MergeError::CorruptField {
                kind: ArtifactKind::Entity,
                record: entity.id.clone(),
                field: "title",
                problem: format!("duplicates title '{}'", entity.title),
            });
        }
    }

    let mut ids = HashSet::new();
    for community in &tables.communities {
        if !ids.insert(community.community) {
            return Err(MergeError::CorruptField {
                kind: ArtifactKind::Community,
                record: community.id.clone(),
                field: "community",
                problem: format!("duplicates id {}", community.community),
            });
        }
    }
    for community in &tables.communities {
        if community.parent != NO_COMMUNITY && !ids.contains(&community.parent) {
            return Err(MergeError::DanglingReference {
                kind: ArtifactKind::Community,
                record: community.id.clone(),
                field: "parent",
                value: community.parent,
            });
        }
    }
    Ok(())
}
