// ABOUTME: Error types for commands executed inside a sandbox
// Separates runtime failures from commands that ran but exited non-zero

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Sandbox runtime error: {0}")]
    Runtime(String),

    #[error("exit code {exit_code}")]
    NonZeroExit { exit_code: i64, output: String },

    #[error("Terminal session failed: {0}")]
    Terminal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Captured command output, empty when the command never ran.
    pub fn output(&self) -> &str {
        match self {
            Self::NonZeroExit { output, .. } => output,
            _ => "",
        }
    }
}
