use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use strata_core::store::IndexStore;
use strata_core::types::{ArtifactKind, Scope};

use super::Project;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: StatusArgs) -> anyhow::Result<()> {
    let project = Project::open(&args.path)?;
    let db_path = project.db_path();
    let store = project.open_store()?;

    println!("Strata status for {}", project.root.display());
    println!();
    println!("  Database: {}", db_path.display());
    if let Ok(meta) = std::fs::metadata(&db_path) {
        println!("  Size:     {}", format_bytes(meta.len()));
    }
    println!();

    println!("  {:<20} {:>8} {:>8}", "table", "main", "delta");
    for kind in ArtifactKind::ALL {
        let main = store
            .row_count(Scope::Main, kind)
            .await
            .context("Failed to count rows")?;
        let delta = store
            .row_count(Scope::Delta, kind)
            .await
            .context("Failed to count rows")?;
        println!("  {:<20} {main:>8} {delta:>8}", kind.as_str());
    }
    println!();

    match store.last_merge().await.context("Failed to read merge log")? {
        Some(record) => {
            println!(
                "  Last merge: {}",
                record.merged_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!(
                "    +{} entities, +{} relationships, +{} communities",
                record.stats.entities_added,
                record.stats.relationships_added,
                record.stats.communities_added
            );
        }
        None => println!("  Last merge: never"),
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1_048_576), "5.0 MB");
    }
}
