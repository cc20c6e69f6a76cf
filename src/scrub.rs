//! Run the scrub: clear a stuck rebase, rewrite history without the secret
//! files, purge the old objects, and force-push.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::git::{self, Captured, Git};
use crate::plan::ScrubPlan;

/// Directories git leaves behind while a rebase is in progress.
const REBASE_MARKERS: &[&str] = &["rebase-merge", "rebase-apply"];

/// Namespace where filter-branch keeps the pre-rewrite branch tips.
const BACKUP_REFS: &str = "refs/original";

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The rewritten branch reached the remote.
    Pushed,
    /// The remote refused the push.
    PushFailed,
    /// Nothing was executed.
    DryRun,
}

impl Outcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Pushed | Self::DryRun => 0,
            Self::PushFailed => 1,
        }
    }
}

/// Knobs that change how the scrub runs, not what it scrubs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Report what would happen without touching the repository.
    pub dry_run: bool,
}

/// The git invocations a scrub makes, in the order it makes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Status,
    Rewrite,
    ExpireReflog,
    CollectGarbage,
    Push,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Status,
        Step::Rewrite,
        Step::ExpireReflog,
        Step::CollectGarbage,
        Step::Push,
    ];
}

/// A single git command line plus any environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCall {
    pub step: Step,
    pub args: Vec<String>,
    pub env: Vec<(&'static str, &'static str)>,
}

impl GitCall {
    fn new(step: Step, args: &[&str]) -> Self {
        Self {
            step,
            args: args.iter().map(|a| (*a).to_string()).collect(),
            env: Vec::new(),
        }
    }

    fn run(&self, git: &Git) -> Result<Captured, git::Error> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        git.capture_with_env(&args, &self.env)
    }
}

impl fmt::Display for GitCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={} ", shell_words::quote(value))?;
        }
        write!(f, "git {}", shell_words::join(&self.args))
    }
}

/// Build the git invocation for one step of `plan`.
#[must_use]
pub fn call(plan: &ScrubPlan, step: Step) -> GitCall {
    match step {
        Step::Status => GitCall::new(step, &["status", "--short"]),
        Step::Rewrite => {
            let filter = plan.tree_filter();
            let mut call = GitCall::new(
                step,
                &["filter-branch", "-f", "--tree-filter", filter.as_str(), "HEAD"],
            );
            call.env = vec![("GIT_PAGER", ""), ("FILTER_BRANCH_SQUELCH_WARNING", "1")];
            call
        }
        Step::ExpireReflog => GitCall::new(step, &["reflog", "expire", "--expire=now", "--all"]),
        Step::CollectGarbage => GitCall::new(step, &["gc", "--prune=now", "--aggressive"]),
        Step::Push => GitCall::new(
            step,
            &["push", "-f", plan.remote.as_str(), plan.branch.as_str()],
        ),
    }
}

/// Every git invocation for `plan`, in execution order.
#[must_use]
pub fn commands(plan: &ScrubPlan) -> Vec<GitCall> {
    Step::ALL.iter().map(|step| call(plan, *step)).collect()
}

/// Execute the scrub against an opened repository.
///
/// Only a failed push changes the outcome; failures of the intermediate git
/// commands are printed and the run carries on.
pub fn scrub(
    git: &Git,
    plan: &ScrubPlan,
    options: Options,
    out: &mut dyn Write,
) -> Result<Outcome, Error> {
    if options.dry_run {
        return dry_run(git, plan, out);
    }

    // Stuck rebase
    writeln!(out, "Checking for stuck rebase...")?;
    for marker in rebase_markers(git.git_dir()) {
        if marker.exists() {
            writeln!(out, "Found stuck rebase, removing...")?;
            remove_marker(&marker)?;
            writeln!(out, "Removed rebase directory")?;
        }
    }

    // Status
    writeln!(out, "\nCurrent git status:")?;
    let status = run_step(git, plan, Step::Status)?;
    writeln!(out, "{}", status.stdout_text())?;
    write_stderr(out, &status)?;

    // Rewrite
    writeln!(out, "\nRemoving secrets from git history...")?;
    let rewrite = run_step(git, plan, Step::Rewrite)?;
    writeln!(out, "{}", rewrite.stdout_text())?;
    write_stderr(out, &rewrite)?;

    // Purge
    writeln!(out, "\nCleaning up...")?;
    drop_backup_refs(git, out)?;
    for step in [Step::ExpireReflog, Step::CollectGarbage] {
        let captured = run_step(git, plan, step)?;
        write_stderr(out, &captured)?;
    }

    // Push
    writeln!(out, "\nForce pushing to remote...")?;
    let push = run_step(git, plan, Step::Push)?;
    writeln!(out, "{}", push.stdout_text())?;
    if !push.success() {
        writeln!(out, "Push output: {}", push.stderr_text())?;
        tracing::error!(
            remote = %plan.remote,
            branch = %plan.branch,
            code = ?push.code,
            "push failed"
        );
        return Ok(Outcome::PushFailed);
    }

    writeln!(out, "\nSuccess! Secrets removed and pushed.")?;
    Ok(Outcome::Pushed)
}

fn dry_run(git: &Git, plan: &ScrubPlan, out: &mut dyn Write) -> Result<Outcome, Error> {
    writeln!(out, "Dry run in {}", git.root().display())?;
    for marker in rebase_markers(git.git_dir()) {
        if marker.exists() {
            writeln!(out, "would remove {}", marker.display())?;
        }
    }
    for call in commands(plan) {
        if call.step == Step::ExpireReflog {
            writeln!(out, "would remove backup refs under {BACKUP_REFS}/")?;
        }
        writeln!(out, "would run: {call}")?;
    }
    Ok(Outcome::DryRun)
}

fn run_step(git: &Git, plan: &ScrubPlan, step: Step) -> Result<Captured, Error> {
    tracing::info!(?step, "running");
    let captured = call(plan, step).run(git)?;
    if !captured.success() && step != Step::Push {
        tracing::warn!(?step, code = ?captured.code, "step failed, continuing");
    }
    Ok(captured)
}

/// Remove the backup namespace filter-branch created, loose and packed.
fn drop_backup_refs(git: &Git, out: &mut dyn Write) -> Result<(), Error> {
    let loose = git.git_dir().join(BACKUP_REFS);
    if loose.exists() {
        remove_marker(&loose)?;
    }

    let namespace = format!("{BACKUP_REFS}/");
    let listed = git.capture(&["for-each-ref", "--format=%(refname)", namespace.as_str()])?;
    let refnames = listed.stdout_text();
    for refname in refnames.lines().filter(|l| !l.trim().is_empty()) {
        tracing::debug!(%refname, "deleting backup ref");
        let deleted = git.capture(&["update-ref", "-d", refname.trim()])?;
        write_stderr(out, &deleted)?;
    }
    Ok(())
}

fn rebase_markers(git_dir: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    REBASE_MARKERS.iter().map(move |name| git_dir.join(name))
}

/// Recursively delete a marker directory.
fn remove_marker(path: &Path) -> Result<(), Error> {
    tracing::info!(path = %path.display(), "removing");
    std::fs::remove_dir_all(path).map_err(|e| Error::RemoveMarker {
        path: path.display().to_string(),
        source: e,
    })
}

fn write_stderr(out: &mut dyn Write, captured: &Captured) -> io::Result<()> {
    let stderr = captured.stderr_text();
    if stderr.is_empty() {
        return Ok(());
    }
    writeln!(out, "STDERR: {stderr}")
}

/// Errors that stop a scrub.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Git(#[from] git::Error),

    #[error("failed to remove '{path}'")]
    RemoveMarker {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write output")]
    Output(#[from] io::Error),
}
