//! Git repository operations.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// A git repository handle. Every command runs with the work-tree root as
/// its working directory.
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
    git_dir: PathBuf,
}

/// What a finished git invocation left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl Captured {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl From<Output> for Captured {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

impl Git {
    /// Open the repository containing `path`.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let root = rev_parse(path, "--show-toplevel")?;
        let git_dir = rev_parse(path, "--absolute-git-dir")?;
        tracing::debug!(root = %root.display(), git_dir = %git_dir.display(), "opened repository");
        Ok(Self { root, git_dir })
    }

    /// Get the repository root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the repository metadata directory (usually `<root>/.git`).
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Run a git command to completion and capture its output.
    ///
    /// A non-zero exit is reported through [`Captured::code`], not as an error.
    pub fn capture(&self, args: &[&str]) -> Result<Captured, Error> {
        self.capture_with_env(args, &[])
    }

    /// Like [`Git::capture`], with extra variables layered over the inherited environment.
    pub fn capture_with_env(&self, args: &[&str], env: &[(&str, &str)]) -> Result<Captured, Error> {
        let output = Command::new("git")
            .args(args)
            .envs(env.iter().copied())
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::Exec(format!("git {}: {e}", args.first().unwrap_or(&""))))?;

        let captured = Captured::from(output);
        tracing::debug!(args = %args.join(" "), code = ?captured.code, "git finished");
        Ok(captured)
    }
}

fn rev_parse(start: &Path, flag: &str) -> Result<PathBuf, Error> {
    let output = Command::new("git")
        .args(["rev-parse", flag])
        .current_dir(start)
        .output()
        .map_err(|e| Error::Exec(format!("git rev-parse in '{}': {e}", start.display())))?;

    if !output.status.success() {
        return Err(Error::NotARepo(start.display().to_string()));
    }

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(PathBuf::from(path))
}

/// Errors from git operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to execute: {0}")]
    Exec(String),

    #[error("not a git repository (searched from '{0}')")]
    NotARepo(String),
}
