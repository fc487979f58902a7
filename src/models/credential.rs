// ABOUTME: Opaque credential handle for the GitHub token injected into the sandbox
// Never printed: Debug output is redacted and the value is only exposed to the container runtime

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Environment variable {0} is not set")]
    Missing(String),
    #[error("Environment variable {0} is empty")]
    Empty(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Read the credential from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self, CredentialError> {
        let value = std::env::var(var).map_err(|_| CredentialError::Missing(var.to_string()))?;
        Self::new(value).ok_or_else(|| CredentialError::Empty(var.to_string()))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}
