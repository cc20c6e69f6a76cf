//! Expunge: strip accidentally committed secret files from a repository's
//! entire history, then force-push the rewritten branch.
//!
//! # Architecture
//!
//! - **Plan**: Which repository, which files, which remote and branch
//! - **Git**: Run git against the repository and capture what it says
//! - **Scrub**: Clear a stuck rebase, rewrite, purge, and push

mod git;
mod plan;
mod scrub;

pub use git::Git;
pub use plan::ScrubPlan;
pub use scrub::{Options, Outcome, scrub};
