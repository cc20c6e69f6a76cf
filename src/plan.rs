//! Scrub plan types.
//!
//! The plan names the repository, the files to strip from every commit, and
//! where the rewritten history is pushed. It can be written as TOML; every
//! field is optional and falls back to the defaults below.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Files removed when the plan does not name any.
pub const DEFAULT_FILES: &[&str] = &[".env.production", "set-vercel-env.ps1"];

/// The complete scrub plan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScrubPlan {
    /// Repository to rewrite
    pub repo: PathBuf,

    /// File names deleted from every historical commit
    pub files: Vec<String>,

    /// Remote that receives the force-push
    pub remote: String,

    /// Branch that is force-pushed
    pub branch: String,
}

impl Default for ScrubPlan {
    fn default() -> Self {
        Self {
            repo: PathBuf::from("."),
            files: DEFAULT_FILES.iter().map(|f| (*f).to_string()).collect(),
            remote: "origin".to_string(),
            branch: "main".to_string(),
        }
    }
}

impl ScrubPlan {
    /// Parse a plan from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Read and parse a plan file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self::from_toml(&content)?)
    }

    /// Reject plans that would run a meaningless rewrite or push.
    pub fn validate(&self) -> Result<(), Error> {
        if self.files.is_empty() {
            return Err(Error::Invalid("no files to remove".to_string()));
        }
        if self.files.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::Invalid("file names must not be empty".to_string()));
        }
        if self.remote.trim().is_empty() {
            return Err(Error::Invalid("remote must not be empty".to_string()));
        }
        if self.branch.trim().is_empty() {
            return Err(Error::Invalid("branch must not be empty".to_string()));
        }
        Ok(())
    }

    /// The shell command run against each commit's checked-out tree.
    #[must_use]
    pub fn tree_filter(&self) -> String {
        let mut words = vec!["rm", "-f", "--"];
        words.extend(self.files.iter().map(String::as_str));
        shell_words::join(words)
    }
}

/// Errors loading or checking a plan.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read plan file '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plan file")]
    Parse(#[from] toml::de::Error),

    #[error("invalid plan: {0}")]
    Invalid(String),
}
