// Description summarization: collapse multi-fragment descriptions left by a
// merge into one text per entity or relationship.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::error::LlmError;
use crate::llm::{CompletionRequest, CostTracker, LlmProvider, TokenUsage};
use crate::types::{Description, IndexTables};

const SUMMARY_TEMPERATURE: f64 = 0.0;

/// Prompt asking for one merged description of `subject`.
pub fn description_summary_prompt(
    subject: &str,
    fragments: &[&str],
    max_summary_tokens: usize,
) -> String {
    let mut listed = String::new();
    for fragment in fragments {
        listed.push_str("- ");
        listed.push_str(fragment.trim());
        listed.push('\n');
    }
    format!(
        "You are given several descriptions of the same item in a knowledge graph.\n\
         Combine them into one comprehensive description written in the third person.\n\
         Include every distinct fact. If descriptions contradict each other, resolve\n\
         the contradiction and keep the result coherent. Mention the item by name.\n\
         Limit the description to {max_summary_tokens} tokens and reply with the\n\
         description only.\n\n\
         Item: {subject}\n\
         Descriptions:\n{listed}"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Entity(usize),
    Relationship(usize),
}

struct SummaryOutcome {
    target: Target,
    result: Result<(String, TokenUsage), LlmError>,
}

/// Counts for one summarization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryStats {
    pub summarized: usize,
    pub failed: usize,
    /// Items left as fragments because the cost budget ran out.
    pub skipped: usize,
}

/// Summarizes descriptions with bounded concurrency.
#[derive(Debug, Clone)]
pub struct DescriptionSummarizer {
    provider: Arc<dyn LlmProvider>,
    max_summary_tokens: usize,
    max_concurrent: usize,
    cost_budget: f64,
}

impl DescriptionSummarizer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        max_summary_tokens: usize,
        max_concurrent: usize,
        cost_budget: f64,
    ) -> Self {
        Self {
            provider,
            max_summary_tokens,
            max_concurrent: max_concurrent.max(1),
            cost_budget,
        }
    }

    /// Replace every description with more than one distinct fragment by an
    /// LLM summary. Items whose call fails keep their fragments.
    #[instrument(skip_all, name = "summarize_descriptions")]
    pub async fn summarize(&self, tables: &mut IndexTables, costs: &mut CostTracker) -> SummaryStats {
        let mut jobs: Vec<(Target, String, Vec<String>)> = Vec::new();
        for (i, entity) in tables.entities.iter().enumerate() {
            let distinct = entity.description.distinct();
            if distinct.len() > 1 {
                jobs.push((Target::Entity(i), entity.title.clone(), owned(&distinct)));
            }
        }
        for (i, rel) in tables.relationships.iter().enumerate() {
            let distinct = rel.description.distinct();
            if distinct.len() > 1 {
                let subject = format!("{} -> {}", rel.source, rel.target);
                jobs.push((Target::Relationship(i), subject, owned(&distinct)));
            }
        }

        let mut stats = SummaryStats::default();
        if jobs.is_empty() {
            debug!("No multi-fragment descriptions to summarize");
            return stats;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let max_tokens = u32::try_from(self.max_summary_tokens).unwrap_or(u32::MAX);
        let mut tasks: JoinSet<SummaryOutcome> = JoinSet::new();
        let total = jobs.len();

        for (scheduled, (target, subject, fragments)) in jobs.into_iter().enumerate() {
            // Usage is recorded as tasks finish, so the budget check sees
            // every call that completed before this one is spawned.
            if tasks.len() >= self.max_concurrent {
                if let Some(joined) = tasks.join_next().await {
                    self.collect(joined, tables, costs, &mut stats);
                }
            }
            while let Some(joined) = tasks.try_join_next() {
                self.collect(joined, tables, costs, &mut stats);
            }
            if costs.is_over_budget(self.cost_budget) {
                stats.skipped = total - scheduled;
                warn!(
                    skipped = stats.skipped,
                    cost = costs.estimated_cost_usd,
                    budget = self.cost_budget,
                    "Cost budget exceeded, stopping summarization"
                );
                break;
            }

            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let refs: Vec<&str> = fragments.iter().map(String::as_str).collect();
            let prompt = description_summary_prompt(&subject, &refs, self.max_summary_tokens);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return SummaryOutcome {
                        target,
                        result: Err(LlmError::Config("semaphore closed".to_string())),
                    };
                };
                let request = CompletionRequest::text(&prompt, SUMMARY_TEMPERATURE, max_tokens);
                SummaryOutcome {
                    target,
                    result: provider.complete(request).await,
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            self.collect(joined, tables, costs, &mut stats);
        }

        info!(
            summarized = stats.summarized,
            failed = stats.failed,
            skipped = stats.skipped,
            "Descriptions summarized"
        );
        stats
    }
    fn collect(
        &self,
        joined: Result<SummaryOutcome, JoinError>,
        tables: &mut IndexTables,
        costs: &mut CostTracker,
        stats: &mut SummaryStats,
    ) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Summary task aborted");
                costs.record_failure();
                stats.failed += 1;
                return;
            }
        };
        match outcome.result {
            Ok((text, usage)) => {
                costs.record_call(
                    &usage,
                    self.provider.cost_per_1k_input(),
                    self.provider.cost_per_1k_output(),
                );
                if text.trim().is_empty() {
                    warn!(item = ?outcome.target, "Empty summary, keeping fragments");
                    stats.failed += 1;
                    return;
                }
                let summary = Description::new(text.trim());
                match outcome.target {
                    Target::Entity(i) => tables.entities[i].description = summary,
                    Target::Relationship(i) => tables.relationships[i].description = summary,
                }
                stats.summarized += 1;
            }
            Err(e) => {
                costs.record_failure();
                warn!(item = ?outcome.target, error = %e, "Summary failed, keeping fragments");
                stats.failed += 1;
            }
        }
    }
}

fn owned(fragments: &[&str]) -> Vec<String> {
    fragments.iter().map(|f| (*f).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, Relationship};

    /// Echoes a fixed summary; fails for prompts naming `fail_on`.
    #[derive(Debug)]
    struct EchoProvider {
        fail_on: Option<&'static str>,
    }

    #[async_trait::async_trait]
    #[allow(clippy::unnecessary_literal_bound)]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        fn model_id(&self) -> &str {
            "echo-1"
        }

        async fn complete(
            &self,
            request: CompletionRequest<'_>,
        ) -> Result<(String, TokenUsage), LlmError> {
            if self.fail_on.is_some_and(|s| request.prompt.contains(s)) {
                return Err(LlmError::Network("connection reset".to_string()));
            }
            let usage = TokenUsage {
                input_tokens: 100,
                output_tokens: 10,
            };
            Ok(("  merged summary  ".to_string(), usage))
        }

        fn cost_per_1k_input(&self) -> f64 {
            0.001
        }

        fn cost_per_1k_output(&self) -> f64 {
            0.002
        }
    }

    /// Every call costs exactly one dollar.
    #[derive(Debug)]
    struct DollarProvider;

    #[async_trait::async_trait]
    #[allow(clippy::unnecessary_literal_bound)]
    impl LlmProvider for DollarProvider {
        fn name(&self) -> &str {
            "dollar"
        }

        fn model_id(&self) -> &str {
            "dollar-1"
        }

        async fn complete(
            &self,
            _request: CompletionRequest<'_>,
        ) -> Result<(String, TokenUsage), LlmError> {
            let usage = TokenUsage {
                input_tokens: 1_000,
                output_tokens: 0,
            };
            Ok(("summary".to_string(), usage))
        }

        fn cost_per_1k_input(&self) -> f64 {
            1.0
        }

        fn cost_per_1k_output(&self) -> f64 {
            0.0
        }
    }

    fn entity(title: &str, fragments: &[&str]) -> Entity {
        Entity {
            id: format!("e-{title}"),
            human_readable_id: Some(0),
            title: title.to_string(),
            entity_type: "ORG".to_string(),
            description: Description::from(
                fragments.iter().map(|f| (*f).to_string()).collect::<Vec<_>>(),
            ),
            text_unit_ids: Vec::new(),
            frequency: 1,
            degree: 0,
            x: None,
            y: None,
        }
    }

    fn tables() -> IndexTables {
        IndexTables {
            entities: vec![
                entity("ACME", &["makes anvils", "sells anvils"]),
                entity("ROAD", &["a bird", "a bird"]),
                entity("COYOTE", &["hungry", "persistent"]),
            ],
            relationships: vec![Relationship {
                id: "r0".to_string(),
                human_readable_id: Some(0),
                source: "COYOTE".to_string(),
                target: "ACME".to_string(),
                description: Description::from(vec!["buys from".to_string(), "sues".to_string()]),
                weight: 1.0,
                combined_degree: 0,
                text_unit_ids: Vec::new(),
            }],
            ..IndexTables::default()
        }
    }

    fn summarizer(fail_on: Option<&'static str>, budget: f64) -> DescriptionSummarizer {
        DescriptionSummarizer::new(Arc::new(EchoProvider { fail_on }), 200, 2, budget)
    }

    #[test]
    fn prompt_lists_fragments_and_cap() {
        let p = description_summary_prompt("ACME", &["makes anvils", " sells anvils "], 150);
        assert!(p.contains("Item: ACME"));
        assert!(p.contains("- makes anvils\n- sells anvils\n"));
        assert!(p.contains("150 tokens"));
    }

    #[tokio::test]
    async fn multi_fragment_descriptions_are_collapsed() {
        let mut t = tables();
        let mut costs = CostTracker::default();
        let stats = summarizer(None, 0.0).summarize(&mut t, &mut costs).await;

        assert_eq!(stats.summarized, 3);
        assert_eq!(t.entities[0].description.fragments(), ["merged summary"]);
        // Duplicate fragments count once, so ROAD is left alone.
        assert_eq!(t.entities[1].description.fragments().len(), 2);
        assert_eq!(t.relationships[0].description.fragments(), ["merged summary"]);
        assert_eq!(costs.total_requests, 3);
    }

    #[tokio::test]
    async fn failures_keep_fragments() {
        let mut t = tables();
        let mut costs = CostTracker::default();
        let stats = summarizer(Some("Item: COYOTE\n"), 0.0)
            .summarize(&mut t, &mut costs)
            .await;

        assert_eq!((stats.summarized, stats.failed), (2, 1));
        assert_eq!(t.entities[2].description.fragments(), ["hungry", "persistent"]);
        assert_eq!(costs.failed_requests, 1);
    }

    #[tokio::test]
    async fn exhausted_budget_skips_everything() {
        let mut t = tables();
        let mut costs = CostTracker {
            estimated_cost_usd: 5.0,
            ..CostTracker::default()
        };
        let stats = summarizer(None, 1.0).summarize(&mut t, &mut costs).await;
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.summarized, 0);
        assert_eq!(t.entities[0].description.fragments().len(), 2);
    }

    #[tokio::test]
    async fn budget_stops_calls_within_a_pass() {
        let mut t = IndexTables {
            entities: (0..10)
                .map(|i| entity(&format!("E{i}"), &["first", "second"]))
                .collect(),
            ..IndexTables::default()
        };
        let mut costs = CostTracker::default();
        let stats = DescriptionSummarizer::new(Arc::new(DollarProvider), 200, 1, 1.5)
            .summarize(&mut t, &mut costs)
            .await;

        assert_eq!(stats.summarized, 2);
        assert_eq!(stats.skipped, 8);
        assert_eq!(costs.total_requests, 2);
        assert!(costs.estimated_cost_usd < 1.5 + 1.0);
        assert_eq!(t.entities[9].description.fragments().len(), 2);
    }
}
