use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use strata_core::store::files::write_tables_dir;
use strata_core::store::load_tables;
use strata_core::types::{ArtifactKind, Scope};

use super::{Project, ScopeArg};

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output directory; created if missing
    pub dir: PathBuf,

    /// Project directory (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Scope to export
    #[arg(long, value_enum, default_value_t = ScopeArg::Main)]
    pub scope: ScopeArg,
}

pub async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let project = Project::open(&args.path)?;
    let store = project.open_store()?;
    let scope = Scope::from(args.scope);

    let tables = load_tables(&store, scope)
        .await
        .with_context(|| format!("Cannot load {scope} tables"))?;
    write_tables_dir(&args.dir, &tables)
        .with_context(|| format!("Cannot write tables to {}", args.dir.display()))?;

    println!("Exported {scope} to {}", args.dir.display());
    println!();
    for kind in ArtifactKind::ALL {
        println!("  {:<20} {:>8}", kind.as_str(), tables.count(kind));
    }
    Ok(())
}
