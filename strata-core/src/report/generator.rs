// Report generation: bounded parallel calls per level, levels bottom-up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::config::{ContextSection, ReportsSection};
use crate::context::{
    ContextRow, ContextSerializer, ContextState, LevelContextBuilder, LocalContextBuilder,
};
use crate::error::{ReportError, StrataError};
use crate::llm::{CompletionRequest, CostTracker, LlmProvider, TokenUsage};
use crate::merge::communities::hierarchy;
use crate::progress::ProgressReporter;
use crate::types::{Community, CommunityReport, IndexTables};

use super::ReportPayload;
use super::prompt::community_report_prompt;

/// What one worker task hands back.
struct TaskOutcome {
    community: i64,
    usage: Option<TokenUsage>,
    result: Result<CommunityReport, StrataError>,
}

/// Sends community contexts to the model, `max_concurrent` at a time.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    provider: Arc<dyn LlmProvider>,
    settings: ReportsSection,
    cost_budget: f64,
}

impl ReportGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: ReportsSection, cost_budget: f64) -> Self {
        Self {
            provider,
            settings,
            cost_budget,
        }
    }

    /// Generate reports for every row of one level.
    ///
    /// All tasks are joined before returning. A failed community is logged and
    /// left out; usage is recorded into `costs` after the join.
    #[instrument(skip_all, name = "report_level", fields(level = level))]
    pub async fn generate_level(
        &self,
        level: u32,
        rows: &[ContextRow],
        communities: &HashMap<i64, &Community>,
        costs: &mut CostTracker,
        progress: &dyn ProgressReporter,
    ) -> Vec<CommunityReport> {
        let max_concurrent = self.settings.max_concurrent.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut reports = Vec::with_capacity(rows.len());
        progress.begin(&format!("Reports for level {level}"), Some(rows.len() as u64));

        for row in rows {
            // Finished calls are recorded before the budget check.
            if tasks.len() >= max_concurrent {
                if let Some(joined) = tasks.join_next().await {
                    self.collect(joined, costs, &mut reports, progress);
                }
            }
            while let Some(joined) = tasks.try_join_next() {
                self.collect(joined, costs, &mut reports, progress);
            }
            if costs.is_over_budget(self.cost_budget) {
                warn!(
                    cost = costs.estimated_cost_usd,
                    budget = self.cost_budget,
                    "Cost budget exceeded, no further reports scheduled"
                );
                break;
            }
            let Some(community) = communities.get(&row.community) else {
                warn!(community = row.community, "Context row has no community record");
                progress.advance(1);
                continue;
            };
            if row.context.is_empty() {
                debug!(community = row.community, "Empty context, no report");
                progress.advance(1);
                continue;
            }

            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let prompt = community_report_prompt(&row.context, self.settings.max_report_length);
            let community = (*community).clone();
            let temperature = self.settings.temperature;
            let max_tokens = self.settings.max_output_tokens;

            tasks.spawn(async move {
                let id = community.community;
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return TaskOutcome {
                        community: id,
                        usage: None,
                        result: Err(ReportError::Task("semaphore closed".to_string()).into()),
                    };
                };
                let request = CompletionRequest::text(&prompt, temperature, max_tokens).json();
                match provider.complete(request).await {
                    Ok((text, usage)) => TaskOutcome {
                        community: id,
                        usage: Some(usage),
                        result: ReportPayload::parse(id, &text)
                            .and_then(|p| p.into_report(&community))
                            .map_err(StrataError::from),
                    },
                    Err(e) => TaskOutcome {
                        community: id,
                        usage: None,
                        result: Err(e.into()),
                    },
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            self.collect(joined, costs, &mut reports, progress);
        }
        progress.finish();

        reports.sort_by_key(|r| r.community);
        info!(
            level,
            requested = rows.len(),
            generated = reports.len(),
            cost_usd = costs.estimated_cost_usd,
            "Level reports generated"
        );
        reports
    }

    fn collect(
        &self,
        joined: Result<TaskOutcome, JoinError>,
        costs: &mut CostTracker,
        reports: &mut Vec<CommunityReport>,
        progress: &dyn ProgressReporter,
    ) {
        progress.advance(1);
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Report task aborted");
                costs.record_failure();
                return;
            }
        };
        match outcome.usage {
            Some(usage) => costs.record_call(
                &usage,
                self.provider.cost_per_1k_input(),
                self.provider.cost_per_1k_output(),
            ),
            None => costs.record_failure(),
        }
        match outcome.result {
            Ok(report) => reports.push(report),
            Err(e) => warn!(community = outcome.community, error = %e, "Report generation failed"),
        }
    }
}

/// Result of a full report run.
#[derive(Debug, Clone, Default)]
pub struct ReportRun {
    pub reports: Vec<CommunityReport>,
    pub costs: CostTracker,
    pub fits: usize,
    pub substituted: usize,
    pub truncated: usize,
}

/// Assembles contexts and generates reports level by level, deepest first.
#[derive(Debug, Clone)]
pub struct ReportPipeline {
    generator: ReportGenerator,
    serializer: ContextSerializer,
    context: ContextSection,
}

impl ReportPipeline {
    pub fn new(
        generator: ReportGenerator,
        serializer: ContextSerializer,
        context: ContextSection,
    ) -> Self {
        Self {
            generator,
            serializer,
            context,
        }
    }

    /// Produce a fresh report set for every community in `tables`.
    #[instrument(skip_all, name = "report_pipeline")]
    pub async fn run(
        &self,
        tables: &IndexTables,
        progress: &dyn ProgressReporter,
    ) -> crate::error::Result<ReportRun> {
        let start = Instant::now();
        let budget = self.context.max_context_tokens;
        let local = LocalContextBuilder::new(tables).build_all(&self.serializer, budget)?;
        let tree = hierarchy(&tables.communities);
        let by_id: HashMap<i64, &Community> = tables
            .communities
            .iter()
            .map(|c| (c.community, c))
            .collect();
        let builder = LevelContextBuilder::new(&self.serializer, budget, self.context.sub_report_mode);

        let mut run = ReportRun::default();
        for &level in local.keys().rev() {
            let rows = builder.build_level(level, &local, &tree, &run.reports)?;
            for row in &rows {
                match row.state {
                    ContextState::Fits => run.fits += 1,
                    ContextState::Substituted => run.substituted += 1,
                    ContextState::Truncated | ContextState::Oversized => run.truncated += 1,
                }
            }
            let generated = self
                .generator
                .generate_level(level, &rows, &by_id, &mut run.costs, progress)
                .await;
            run.reports.extend(generated);
        }

        info!(
            reports = run.reports.len(),
            communities = tables.communities.len(),
            requests = run.costs.total_requests,
            failed = run.costs.failed_requests,
            duration = ?start.elapsed(),
            "Report run complete"
        );
        Ok(run)
    }
}
