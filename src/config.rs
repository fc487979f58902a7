// ABOUTME: Application configuration loaded from TOML
// Holds the check name, Docker connection override and sandbox image settings

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_CHECK_NAME: &str = "signoff";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine the configuration directory")]
    NoConfigDir,
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub signoff: SignoffConfig,
    pub docker: DockerConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignoffConfig {
    /// Status context posted on sign-off and required by branch protection
    pub check_name: String,
    /// Environment variable holding the GitHub token
    pub token_env: String,
}

impl Default for SignoffConfig {
    fn default() -> Self {
        Self {
            check_name: DEFAULT_CHECK_NAME.to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker host override, e.g. `unix:///var/run/docker.sock`
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub image: String,
    /// Packages installed with `apk add` before the first command
    pub packages: Vec<String>,
    pub github_host: String,
    /// Mount point of the source tree inside the container
    pub workdir: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "alpine:3.20".to_string(),
            packages: vec!["git".to_string(), "github-cli".to_string()],
            github_host: "github.com".to_string(),
            workdir: "/work/repo".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the default location, falling back to defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("signoff-box").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Check name to use, treating a blank value as unset.
    pub fn check_name(&self) -> &str {
        let name = self.signoff.check_name.trim();
        if name.is_empty() {
            DEFAULT_CHECK_NAME
        } else {
            name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.check_name(), "signoff");
        assert_eq!(config.signoff.token_env, "GITHUB_TOKEN");
        assert_eq!(config.sandbox.workdir, "/work/repo");
        assert!(config.docker.host.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = AppConfig::parse(
            r#"
[signoff]
check_name = "local-ci"

[docker]
host = "unix:///tmp/docker.sock"
"#,
        )
        .unwrap();

        assert_eq!(config.check_name(), "local-ci");
        assert_eq!(config.signoff.token_env, "GITHUB_TOKEN");
        assert_eq!(config.docker.host.as_deref(), Some("unix:///tmp/docker.sock"));
        assert_eq!(config.sandbox, SandboxConfig::default());
    }

    #[test]
    fn test_blank_check_name_falls_back_to_default() {
        let config = AppConfig::parse("[signoff]\ncheck_name = \"  \"\n").unwrap();
        assert_eq!(config.check_name(), DEFAULT_CHECK_NAME);
    }

    #[test]
    fn test_load_from_reports_parse_errors_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[signoff\ncheck_name = 1").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }
}
