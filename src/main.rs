use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::Level;

#[derive(Parser)]
#[command(name = "expunge")]
#[command(about = "Strip secret files from every commit and force-push the rewritten history")]
struct Cli {
    /// TOML plan file (repo, files, remote, branch)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Repository to rewrite (default: current directory)
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Remote to force-push to (default: origin)
    #[arg(long)]
    remote: Option<String>,

    /// Branch to force-push (default: main)
    #[arg(long)]
    branch: Option<String>,

    /// File to remove from history (can be specified multiple times)
    #[arg(long = "file", value_name = "NAME")]
    files: Vec<String>,

    /// Print what would be removed and run, without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Log each git invocation to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let mut plan = match &cli.config {
        Some(path) => expunge::ScrubPlan::load(path)
            .with_context(|| format!("loading plan from {}", path.display()))?,
        None => expunge::ScrubPlan::default(),
    };
    if let Some(repo) = cli.repo {
        plan.repo = repo;
    }
    if let Some(remote) = cli.remote {
        plan.remote = remote;
    }
    if let Some(branch) = cli.branch {
        plan.branch = branch;
    }
    if !cli.files.is_empty() {
        plan.files = cli.files;
    }
    plan.validate()?;

    let git = expunge::Git::open(&plan.repo)
        .with_context(|| format!("opening repository at {}", plan.repo.display()))?;

    let options = expunge::Options {
        dry_run: cli.dry_run,
    };
    let outcome = expunge::scrub(&git, &plan, options, &mut std::io::stdout().lock())?;

    Ok(ExitCode::from(outcome.exit_code()))
}
