use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, ValueEnum};

use strata_core::config::{SubReportMode, TokenizerKind};
use strata_core::context::{assemble_level, serializer_for};
use strata_core::store::load_tables;
use strata_core::types::Scope;

use super::Project;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct ContextArgs {
    /// Hierarchy level to assemble
    #[arg(long, default_value_t = 0)]
    pub level: u32,

    /// Only print this community
    #[arg(long)]
    pub community: Option<i64>,

    /// Token budget (default: context.max_context_tokens)
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Token counter (default: context.tokenizer)
    #[arg(long, value_enum)]
    pub tokenizer: Option<TokenizerArg>,

    /// Ignore child reports during substitution
    #[arg(long)]
    pub legacy: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Project directory (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerArg {
    Cl100k,
    O200k,
    Estimate,
}

impl From<TokenizerArg> for TokenizerKind {
    fn from(arg: TokenizerArg) -> Self {
        match arg {
            TokenizerArg::Cl100k => Self::Cl100kBase,
            TokenizerArg::O200k => Self::O200kBase,
            TokenizerArg::Estimate => Self::Estimate,
        }
    }
}

pub async fn run(args: ContextArgs) -> anyhow::Result<()> {
    let project = Project::open(&args.path)?;
    let store = project.open_store()?;

    let mut section = project.config.context.clone();
    if let Some(max) = args.max_tokens {
        section.max_context_tokens = max;
    }
    if let Some(tokenizer) = args.tokenizer {
        section.tokenizer = tokenizer.into();
    }
    if args.legacy {
        section.sub_report_mode = SubReportMode::Legacy;
    }

    let tables = load_tables(&store, Scope::Main)
        .await
        .context("Cannot load main tables")?;
    let serializer = serializer_for(&section).context("Tokenizer setup failed")?;
    let mut rows = assemble_level(&tables, &serializer, &section, args.level)
        .with_context(|| format!("Context assembly failed for level {}", args.level))?;
    if let Some(community) = args.community {
        rows.retain(|r| r.community == community);
    }

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No communities at level {}.", args.level);
            }
            for row in &rows {
                println!(
                    "===== Community {} (level {}, {}, {} tokens{}) =====",
                    row.community,
                    row.level,
                    row.state.as_str(),
                    row.size,
                    if row.exceeds_budget { ", over budget" } else { "" }
                );
                println!("{}", row.context);
                println!();
            }
        }
    }
    Ok(())
}
