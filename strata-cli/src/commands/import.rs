use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::info;

use strata_core::store::IndexStore;
use strata_core::store::files::read_tables_dir;
use strata_core::types::{ArtifactKind, Scope};

use super::{Project, ScopeArg};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Directory holding <table>.json files
    pub dir: PathBuf,

    /// Project directory (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Scope to replace with the imported tables
    #[arg(long, value_enum, default_value_t = ScopeArg::Delta)]
    pub scope: ScopeArg,
}

pub async fn run(args: ImportArgs) -> anyhow::Result<()> {
    let project = Project::open(&args.path)?;
    let store = project.open_store()?;
    let scope = Scope::from(args.scope);

    let tables = read_tables_dir(&args.dir)
        .with_context(|| format!("Cannot read tables from {}", args.dir.display()))?;
    store
        .save_tables(scope, &tables)
        .await
        .with_context(|| format!("Cannot save {scope} tables"))?;
    info!(%scope, dir = %args.dir.display(), "Imported tables");

    println!("Imported into {scope} from {}", args.dir.display());
    println!();
    for kind in ArtifactKind::ALL {
        println!("  {:<20} {:>8}", kind.as_str(), tables.count(kind));
    }
    Ok(())
}
