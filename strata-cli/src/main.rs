use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Maintain an incremental knowledge-graph index and its community reports"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into an exit code.
///
/// Exit codes:
///   0: success
///   1: general/unknown error
///   2: configuration error
///   3: project not found / not initialized
///   4: database error
///   5: corrupt index data (merge aborted)
///   6: LLM API error
///   7: context assembly or report generation failed
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}");
    let lower = msg.to_lowercase();

    if lower.contains("not initialized") || lower.contains("cannot resolve path") {
        3
    } else if lower.contains("config") {
        2
    } else if lower.contains("database") || lower.contains("sqlite") {
        4
    } else if lower.contains("merge error")
        || lower.contains("corrupt")
        || lower.contains("dangling reference")
    {
        5
    } else if lower.contains("llm") || lower.contains("api key") {
        6
    } else if lower.contains("context") || lower.contains("report") || lower.contains("tokenizer")
    {
        7
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    // reqwest is built without a bundled crypto provider.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_not_initialized() {
        let err = anyhow::anyhow!("Strata is not initialized in /foo. Run `strata init` first.");
        assert_eq!(classify_exit_code(&err), 3);
    }

    #[test]
    fn exit_code_config() {
        let err = anyhow::anyhow!("Cannot load config: /foo/strata.toml");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_database() {
        let err = anyhow::anyhow!("Cannot open database: /foo/.strata/index.db");
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_corrupt_merge() {
        let err = anyhow::anyhow!(
            "Index merge failed: Merge error: Corrupt community record c1: field `parent` is not a delta community"
        );
        assert_eq!(classify_exit_code(&err), 5);
    }

    #[test]
    fn exit_code_llm() {
        let err = anyhow::anyhow!("LLM provider setup failed: environment variable X is not set");
        assert_eq!(classify_exit_code(&err), 6);
    }

    #[test]
    fn exit_code_report() {
        let err = anyhow::anyhow!("Report generation failed: Render error: bad row");
        assert_eq!(classify_exit_code(&err), 7);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Something unexpected happened");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
