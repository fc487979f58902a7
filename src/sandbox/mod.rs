// ABOUTME: Execution context abstraction for running git and gh commands
// Commands are described as pending `Exec` values and only run when an executor method is awaited

pub mod error;

pub use error::SandboxError;

use async_trait::async_trait;
use tracing::debug;

/// Output of a single command run inside a sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i64) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr joined by a newline.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Turns a non-zero exit into `SandboxError::NonZeroExit` carrying the combined output.
    pub fn into_success(self) -> Result<Self, SandboxError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SandboxError::NonZeroExit {
                exit_code: self.exit_code,
                output: self.combined(),
            })
        }
    }
}

/// An isolated environment with the source tree mounted and `git`/`gh` authenticated.
///
/// Implementations must treat a non-zero exit status as a normal result and only
/// return `Err` when the command could not be run at all.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `args` (program first) to completion and capture its output.
    async fn run(&self, args: &[String]) -> Result<CommandOutput, SandboxError>;

    /// Attach an interactive shell to the sandbox until the user exits it.
    async fn terminal(&self) -> Result<(), SandboxError>;
}

/// A command that has been described but not yet run.
pub struct Exec<'a> {
    sandbox: &'a dyn Sandbox,
    args: Vec<String>,
}

impl<'a> Exec<'a> {
    pub fn new<I, S>(sandbox: &'a dyn Sandbox, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sandbox,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub async fn output(self) -> Result<CommandOutput, SandboxError> {
        debug!("Running in sandbox: {}", self.args.join(" "));
        let output = self.sandbox.run(&self.args).await?;
        debug!(
            "Command {} exited with {}",
            self.args.first().map_or("", String::as_str),
            output.exit_code
        );
        Ok(output)
    }

    /// Raw stdout, whatever the exit status.
    pub async fn stdout(self) -> Result<String, SandboxError> {
        Ok(self.output().await?.stdout)
    }

    /// Raw stderr, whatever the exit status.
    pub async fn stderr(self) -> Result<String, SandboxError> {
        Ok(self.output().await?.stderr)
    }

    pub async fn exit_code(self) -> Result<i64, SandboxError> {
        Ok(self.output().await?.exit_code)
    }

    /// Combined stdout and stderr, failing on a non-zero exit.
    pub async fn out(self) -> Result<String, SandboxError> {
        let output = self.output().await?.into_success()?;
        Ok(output.combined())
    }

    /// Trimmed stdout, failing on a non-zero exit.
    pub async fn trimmed(self) -> Result<String, SandboxError> {
        let output = self.output().await?.into_success()?;
        Ok(output.stdout.trim().to_string())
    }
}
