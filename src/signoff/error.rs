// ABOUTME: Error types for the signoff workflow
// Local-state violations, wrapped remote-call failures and precondition failures

use crate::git::SourceTreeError;
use crate::sandbox::SandboxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignoffError {
    #[error("found uncommitted changes in the repo")]
    UncommittedChanges,

    #[error("no tracking branch found")]
    NoTrackingBranch,

    #[error("found unpushed commits in the repo")]
    UnpushedCommits,

    #[error("could not get the default branch: {0}")]
    DefaultBranch(#[source] SandboxError),

    #[error("could not {action} without a branch name")]
    MissingBranch { action: &'static str },

    #[error(transparent)]
    InvalidBranch(#[from] SourceTreeError),

    #[error("{output}: {source}")]
    StatusPost {
        output: String,
        #[source]
        source: SandboxError,
    },

    #[error("could not install signoff check {check_name:?} to branch {branch:?}: {source}\n{output}")]
    Install {
        check_name: String,
        branch: String,
        output: String,
        #[source]
        source: SandboxError,
    },

    #[error("could not uninstall branch protection for branch {branch:?}: {source}\n{output}")]
    Uninstall {
        branch: String,
        output: String,
        #[source]
        source: SandboxError,
    },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
