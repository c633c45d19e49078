use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use strata_core::config::StrataConfig;
use strata_core::store::SqliteStore;

use super::{CONFIG_FILE, resolve_db_path};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite an existing strata.toml
    #[arg(long)]
    pub force: bool,

    /// Custom database location
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

#[allow(clippy::unused_async)]
pub async fn run(args: InitArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.path)
        .with_context(|| format!("Cannot create directory: {}", args.path.display()))?;
    let root = std::fs::canonicalize(&args.path)
        .with_context(|| format!("Cannot resolve path: {}", args.path.display()))?;
    let config_path = root.join(CONFIG_FILE);

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            config_path.display()
        );
    }

    let mut config = StrataConfig::default();
    if let Some(db_path) = args.db_path {
        config.index.db_path = db_path;
    }
    let text = toml::to_string_pretty(&config).context("Cannot serialize default config")?;
    std::fs::write(&config_path, text)
        .with_context(|| format!("Cannot write config: {}", config_path.display()))?;

    let db_path = resolve_db_path(&root, &config);
    SqliteStore::open(&db_path)
        .with_context(|| format!("Cannot open database: {}", db_path.display()))?;

    println!("Strata initialized in {}", root.display());
    println!();
    println!("  Config:   {}", config_path.display());
    println!("  Database: {}", db_path.display());
    println!();
    println!("Next: `strata import <dir>` to load a delta batch, then `strata merge`.");
    Ok(())
}
