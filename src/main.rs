use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use triage::{standard_runner, TriageConfig, TriageResult};

#[derive(Parser)]
#[command(name = "triage", version, about = "Sample triage pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check samples: local files, URLs, hashes of previously seen samples,
    /// or @list-files containing one item per line
    Check {
        /// Items to check; `@path` expands to the lines of a list file
        #[arg(required = true)]
        what: Vec<String>,

        /// Path to the sample database
        #[arg(long)]
        db: Option<PathBuf>,

        /// Directory holding the encrypted sample archive
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// Base URL of the sandbox service
        #[arg(long)]
        sandbox_url: Option<String>,

        /// Number of samples processed concurrently
        #[arg(long, short = 'j')]
        jobs: Option<usize>,

        /// Refuse local file paths as sources
        #[arg(long)]
        no_local_files: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        error!(%err, "aborted");
        std::process::exit(1);
    }
}

fn run() -> TriageResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Check {
            what,
            db,
            archive_dir,
            sandbox_url,
            jobs,
            no_local_files,
        } => {
            let mut config = TriageConfig::from_env()?;
            if let Some(db) = db {
                config.db_path = db;
            }
            if let Some(archive_dir) = archive_dir {
                config.archive_dir = archive_dir;
            }
            if let Some(sandbox_url) = sandbox_url {
                config.sandbox_url = sandbox_url;
            }
            if let Some(jobs) = jobs {
                config.workers = jobs.max(1);
            }
            if no_local_files {
                config.allow_local_files = false;
            }

            let items = expand_items(&what)?;
            let runner = standard_runner(&config)?;
            for result in runner.check(&items)? {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }
    }
    Ok(())
}

/// Expand `@list-file` arguments into their lines; everything else passes
/// through unchanged.
fn expand_items(args: &[String]) -> TriageResult<Vec<String>> {
    let mut items = Vec::new();
    for arg in args {
        if let Some(list_path) = arg.strip_prefix('@') {
            let contents = std::fs::read_to_string(list_path)?;
            items.extend(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        } else {
            items.push(arg.clone());
        }
    }
    Ok(items)
}
