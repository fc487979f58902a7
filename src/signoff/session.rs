// ABOUTME: Signoff session running git and gh inside a sandbox
// Composes the cleanliness gate, commit status posting and branch protection management

use super::error::SignoffError;
use crate::config::DEFAULT_CHECK_NAME;
use crate::git::{validate_branch_name, SourceTree};
use crate::sandbox::{Exec, Sandbox, SandboxError};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of the cleanliness check. Only the first violation found is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanState {
    Clean,
    /// Uncommitted changes in the working tree
    Dirty,
    /// The current branch has no push/upstream branch
    Untracked,
    /// Local commits not yet pushed
    Ahead,
}

impl CleanState {
    pub fn into_result(self) -> Result<(), SignoffError> {
        match self {
            Self::Clean => Ok(()),
            Self::Dirty => Err(SignoffError::UncommittedChanges),
            Self::Untracked => Err(SignoffError::NoTrackingBranch),
            Self::Ahead => Err(SignoffError::UnpushedCommits),
        }
    }
}

/// One signoff session: a source tree, the sandbox it is mounted in, and the check name.
///
/// Running a command never changes the session; every command is built as a
/// fresh [`Exec`] and run on its own. Operations still issue their commands one
/// after the other and never in parallel.
pub struct Signoff {
    source: SourceTree,
    sandbox: Arc<dyn Sandbox>,
    check_name: String,
}

impl fmt::Debug for Signoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signoff")
            .field("source", &self.source)
            .field("check_name", &self.check_name)
            .finish_non_exhaustive()
    }
}

impl Signoff {
    pub fn new(source: SourceTree, sandbox: Arc<dyn Sandbox>, check_name: Option<&str>) -> Self {
        let check_name = check_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_CHECK_NAME)
            .to_string();

        Self {
            source,
            sandbox,
            check_name,
        }
    }

    pub fn check_name(&self) -> &str {
        &self.check_name
    }

    /// Describe an arbitrary command.
    pub fn command<I, S>(&self, args: I) -> Exec<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Exec::new(self.sandbox.as_ref(), args)
    }

    /// Describe a git command; `git` is prepended to `args`.
    pub fn git<I, S>(&self, args: I) -> Exec<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(std::iter::once("git".to_string()).chain(args.into_iter().map(Into::into)))
    }

    /// Describe a gh command; `gh` is prepended to `args`.
    pub fn gh<I, S>(&self, args: I) -> Exec<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command(std::iter::once("gh".to_string()).chain(args.into_iter().map(Into::into)))
    }

    /// Evaluate the working tree: uncommitted changes, then tracking branch, then unpushed commits.
    pub async fn clean_state(&self) -> CleanState {
        match self.git(["status", "--porcelain"]).output().await {
            Ok(output) if output.is_success() && output.stdout.trim().is_empty() => {}
            Ok(_) => return CleanState::Dirty,
            Err(e) => {
                warn!("git status could not run: {}", e);
                return CleanState::Dirty;
            }
        }

        match self.git(["rev-parse", "--abbrev-ref", "@{push}"]).exit_code().await {
            Ok(0) => {}
            Ok(_) => return CleanState::Untracked,
            Err(e) => {
                warn!("git rev-parse could not run: {}", e);
                return CleanState::Untracked;
            }
        }

        match self.git(["log", "@{push}.."]).output().await {
            Ok(output) if output.is_success() && output.stdout.trim().is_empty() => CleanState::Clean,
            Ok(_) => CleanState::Ahead,
            Err(e) => {
                warn!("git log could not run: {}", e);
                CleanState::Ahead
            }
        }
    }

    /// Succeeds only when there are no uncommitted changes, the branch tracks a
    /// remote one and every commit has been pushed.
    pub async fn is_clean(&self) -> Result<(), SignoffError> {
        let state = self.clean_state().await;
        info!("Repository {} is {:?}", self.source.root().display(), state);
        state.into_result()
    }

    /// Sign off the current commit by posting a successful status for the check.
    ///
    /// Returns the signed-off commit. Nothing is posted unless the repository is clean.
    pub async fn create(&self) -> Result<String, SignoffError> {
        self.is_clean().await?;

        let sha = self.sha().await?;
        let user = self.who_is().await?;

        let endpoint = format!("repos/:owner/:repo/statuses/{}", sha);
        let context = format!("context={}", self.check_name);
        let description = format!("description={} signed off", user);

        self.gh([
            "api",
            "--method",
            "POST",
            endpoint.as_str(),
            "-f",
            "state=success",
            "-f",
            context.as_str(),
            "-f",
            description.as_str(),
        ])
        .out()
        .await
        .map_err(|source| SignoffError::StatusPost {
            output: source.output().to_string(),
            source,
        })?;

        info!("{} signed off on {} for check {}", user, sha, self.check_name);
        Ok(sha)
    }

    /// Require the check on `branch`, or on the default branch when none is given.
    ///
    /// Returns the protected branch.
    pub async fn install(&self, branch: Option<&str>) -> Result<String, SignoffError> {
        let branch = self.resolve_branch(branch, "install").await?;

        let endpoint = format!("/repos/:owner/:repo/branches/{}/protection", branch);
        let context = format!("required_status_checks[contexts][]={}", self.check_name);

        self.gh([
            "api",
            endpoint.as_str(),
            "--method",
            "PUT",
            "-H",
            "Accept: application/vnd.github+json",
            "-H",
            "X-GitHub-Api-Version: 2022-11-28",
            "--field",
            "required_status_checks[strict]=false",
            "--field",
            context.as_str(),
            "--field",
            "enforce_admins=null",
            "--field",
            "required_pull_request_reviews=null",
            "--field",
            "restrictions=null",
        ])
        .out()
        .await
        .map_err(|source| SignoffError::Install {
            check_name: self.check_name.clone(),
            branch: branch.clone(),
            output: source.output().to_string(),
            source,
        })?;

        info!("Branch {} now requires check {}", branch, self.check_name);
        Ok(branch)
    }

    /// Delete every protection rule on `branch`, or on the default branch when none is given.
    pub async fn uninstall(&self, branch: Option<&str>) -> Result<String, SignoffError> {
        let branch = self.resolve_branch(branch, "uninstall").await?;

        let endpoint = format!("/repos/:owner/:repo/branches/{}/protection", branch);

        self.gh(["api", endpoint.as_str(), "--method", "DELETE"])
            .out()
            .await
            .map_err(|source| SignoffError::Uninstall {
                branch: branch.clone(),
                output: source.output().to_string(),
                source,
            })?;

        info!("Removed branch protection from {}", branch);
        Ok(branch)
    }

    async fn resolve_branch(
        &self,
        branch: Option<&str>,
        action: &'static str,
    ) -> Result<String, SignoffError> {
        let branch = match branch.map(str::trim).filter(|b| !b.is_empty()) {
            Some(branch) => branch.to_string(),
            None => self
                .default_branch()
                .await
                .map_err(SignoffError::DefaultBranch)?,
        };

        if branch.is_empty() {
            return Err(SignoffError::MissingBranch { action });
        }

        validate_branch_name(&branch)?;
        Ok(branch)
    }

    /// Commit SHA of HEAD.
    pub async fn sha(&self) -> Result<String, SandboxError> {
        self.git(["rev-parse", "HEAD"]).trimmed().await
    }

    /// Login of the user the token belongs to.
    pub async fn who_is(&self) -> Result<String, SandboxError> {
        self.gh(["api", "user", "--jq", ".login"]).trimmed().await
    }

    pub async fn default_branch(&self) -> Result<String, SandboxError> {
        self.gh(["api", "repos/:owner/:repo", "--jq", ".default_branch"])
            .trimmed()
            .await
    }

    pub async fn current_branch(&self) -> Result<String, SandboxError> {
        self.git(["rev-parse", "--abbrev-ref", "HEAD"]).trimmed().await
    }

    /// URL of the open pull request from the current branch into the default branch, if any.
    pub async fn pull_request(&self) -> Result<Option<String>, SandboxError> {
        let default_branch = self.default_branch().await?;
        let head = self.current_branch().await?;

        let filter = format!(
            ".[] | select(.state == \"open\") | select(.base.ref == \"{}\") | select(.head.ref == \"{}\") | .html_url",
            default_branch, head
        );

        let url = self
            .gh(["api", "repos/:owner/:repo/pulls", "--jq", filter.as_str()])
            .trimmed()
            .await?;

        Ok(url.lines().next().map(str::to_string).filter(|u| !u.is_empty()))
    }

    /// Open a pull request for the current branch, filling title and body from the commits.
    pub async fn open_pr(&self, verbose: bool) -> Result<String, SandboxError> {
        let fill = if verbose { "--fill-verbose" } else { "--fill" };
        self.gh(["pr", "create", fill]).out().await
    }

    /// Run any command, returning combined output or failing on a non-zero exit.
    pub async fn exec(&self, args: &[String]) -> Result<String, SandboxError> {
        self.command(args.iter().cloned()).out().await
    }

    pub async fn stdout(&self, args: &[String]) -> Result<String, SandboxError> {
        self.command(args.iter().cloned()).stdout().await
    }

    pub async fn stderr(&self, args: &[String]) -> Result<String, SandboxError> {
        self.command(args.iter().cloned()).stderr().await
    }

    pub async fn exit_code(&self, args: &[String]) -> Result<i64, SandboxError> {
        self.command(args.iter().cloned()).exit_code().await
    }

    /// Open an interactive shell in the sandbox.
    pub async fn terminal(&self) -> Result<(), SandboxError> {
        self.sandbox.terminal().await
    }
}
