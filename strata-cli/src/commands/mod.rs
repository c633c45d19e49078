pub mod context;
pub mod export;
pub mod import;
pub mod init;
pub mod merge;
pub mod reports;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Subcommand, ValueEnum};

use strata_core::config::StrataConfig;
use strata_core::store::SqliteStore;
use strata_core::types::Scope;

/// Config file name at the project root.
pub const CONFIG_FILE: &str = "strata.toml";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create strata.toml and an empty index database
    Init(init::InitArgs),
    /// Load table files into the delta (or main) scope
    Import(import::ImportArgs),
    /// Write a scope's tables as JSON files
    Export(export::ExportArgs),
    /// Merge the delta batch into the main index
    Merge(merge::MergeArgs),
    /// Print assembled community contexts for one level
    Context(context::ContextArgs),
    /// Generate community reports for the main index
    Reports(reports::ReportsArgs),
    /// Show table counts and the last merge
    Status(status::StatusArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Init(args) => init::run(args).await,
        Command::Import(args) => import::run(args).await,
        Command::Export(args) => export::run(args).await,
        Command::Merge(args) => merge::run(args).await,
        Command::Context(args) => context::run(args).await,
        Command::Reports(args) => reports::run(args).await,
        Command::Status(args) => status::run(args).await,
    }
}

/// Index scope as a command-line value.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeArg {
    Main,
    Delta,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Main => Self::Main,
            ScopeArg::Delta => Self::Delta,
        }
    }
}

/// An initialized project directory.
pub struct Project {
    pub root: PathBuf,
    pub config: StrataConfig,
}

impl Project {
    /// Open the project at `path`, failing if `strata init` has not run.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let root = std::fs::canonicalize(path)
            .with_context(|| format!("Cannot resolve path: {}", path.display()))?;
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            anyhow::bail!(
                "Strata is not initialized in {}. Run `strata init` first.",
                root.display()
            );
        }
        let config = StrataConfig::load(&config_path)
            .with_context(|| format!("Cannot load config: {}", config_path.display()))?;
        Ok(Self { root, config })
    }

    pub fn db_path(&self) -> PathBuf {
        resolve_db_path(&self.root, &self.config)
    }

    pub fn open_store(&self) -> anyhow::Result<SqliteStore> {
        let db_path = self.db_path();
        SqliteStore::open(&db_path)
            .with_context(|| format!("Cannot open database: {}", db_path.display()))
    }
}

/// Database location: `index.db_path`, relative to the project root unless
/// absolute.
pub fn resolve_db_path(root: &Path, config: &StrataConfig) -> PathBuf {
    if config.index.db_path.is_absolute() {
        config.index.db_path.clone()
    } else {
        root.join(&config.index.db_path)
    }
}
