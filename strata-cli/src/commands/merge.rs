use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use strata_core::llm::providers::create_provider;
use strata_core::pipeline::IndexUpdatePipeline;
use strata_core::summarize::DescriptionSummarizer;

use super::Project;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Summarize multi-fragment descriptions with the LLM
    #[arg(long, conflicts_with = "no_summarize")]
    pub summarize: bool,

    /// Skip description summarization even if enabled in config
    #[arg(long)]
    pub no_summarize: bool,

    /// Keep the delta scope after merging
    #[arg(long)]
    pub keep_delta: bool,
}

pub async fn run(args: MergeArgs) -> anyhow::Result<()> {
    let project = Project::open(&args.path)?;
    let store = project.open_store()?;
    let config = &project.config;

    let mut settings = config.merge.clone();
    if args.keep_delta {
        settings.clear_delta = false;
    }
    let summarize = (settings.summarize_descriptions || args.summarize) && !args.no_summarize;

    let mut pipeline = IndexUpdatePipeline::new(&settings);
    if summarize {
        let provider = create_provider(&config.llm).context("LLM provider setup failed")?;
        pipeline = pipeline.with_summarizer(DescriptionSummarizer::new(
            provider,
            settings.max_summary_tokens,
            config.reports.max_concurrent as usize,
            config.llm.cost_budget,
        ));
    }

    let result = pipeline.run(&store).await.context("Index merge failed")?;
    if !result.committed {
        println!("Nothing to merge: the delta scope is empty.");
        return Ok(());
    }

    let stats = &result.stats;
    println!("Merged delta into {}", project.root.display());
    println!();
    println!(
        "  Entities:       {} added, {} merged, {} dropped",
        stats.entities_added, stats.entities_merged, stats.entities_dropped
    );
    println!(
        "  Relationships:  {} added, {} merged, {} dropped",
        stats.relationships_added, stats.relationships_merged, stats.relationships_dropped
    );
    println!("  Text units:     {} added", stats.text_units_added);
    println!("  Claims:         {} added", stats.claims_added);
    println!("  Communities:    {} added", stats.communities_added);
    println!("  Reports:        {} added", stats.reports_added);
    if let Some(summary) = result.summary {
        println!(
            "  Summaries:      {} written, {} failed, {} skipped (${:.4})",
            summary.summarized, summary.failed, summary.skipped, result.costs.estimated_cost_usd
        );
    }
    println!("  Duration:       {:.2?}", result.duration);
    Ok(())
}
