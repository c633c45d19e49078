use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use strata_core::context::serializer_for;
use strata_core::llm::providers::create_provider;
use strata_core::progress::IndicatifReporter;
use strata_core::report::{ReportGenerator, ReportPipeline};
use strata_core::store::{IndexStore, encode_rows, load_tables};
use strata_core::types::{ArtifactKind, Scope};

use super::Project;

#[derive(Args, Debug)]
pub struct ReportsArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Maximum concurrent LLM calls (default: reports.max_concurrent)
    #[arg(long)]
    pub concurrency: Option<u32>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

pub async fn run(args: ReportsArgs) -> anyhow::Result<()> {
    let project = Project::open(&args.path)?;
    let store = project.open_store()?;
    let config = &project.config;

    let mut settings = config.reports.clone();
    if let Some(n) = args.concurrency {
        settings.max_concurrent = n.max(1);
    }

    let tables = load_tables(&store, Scope::Main)
        .await
        .context("Cannot load main tables")?;
    if tables.communities.is_empty() {
        println!("No communities in the main index; nothing to report.");
        return Ok(());
    }

    let provider = create_provider(&config.llm).context("LLM provider setup failed")?;
    let serializer = serializer_for(&config.context).context("Tokenizer setup failed")?;
    let generator = ReportGenerator::new(provider, settings, config.llm.cost_budget);
    let pipeline = ReportPipeline::new(generator, serializer, config.context.clone());

    let progress = IndicatifReporter::new(!args.no_progress);
    let run = pipeline
        .run(&tables, &progress)
        .await
        .context("Report generation failed")?;

    let rows = encode_rows(&run.reports).context("Cannot encode reports")?;
    store
        .replace_rows(Scope::Main, ArtifactKind::CommunityReport, &rows)
        .await
        .context("Cannot save reports")?;

    println!("Community reports for {}", project.root.display());
    println!();
    println!(
        "  Reports:      {} of {} communities",
        run.reports.len(),
        tables.communities.len()
    );
    println!(
        "  Contexts:     {} fit, {} substituted, {} truncated",
        run.fits, run.substituted, run.truncated
    );
    println!(
        "  LLM calls:    {} ok, {} failed",
        run.costs.total_requests, run.costs.failed_requests
    );
    println!(
        "  Tokens:       {} in, {} out",
        run.costs.total_input_tokens, run.costs.total_output_tokens
    );
    println!("  Est. cost:    ${:.4}", run.costs.estimated_cost_usd);
    Ok(())
}
