// ABOUTME: Docker-backed Sandbox with git and gh installed and authenticated
// Provisions the container once per invocation and removes it on shutdown

use super::container_manager::{ContainerConfig, ContainerError, ContainerManager};
use crate::config::{AppConfig, SandboxConfig};
use crate::git::SourceTree;
use crate::models::Secret;
use crate::sandbox::{CommandOutput, Sandbox, SandboxError};
use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

impl From<ContainerError> for SandboxError {
    fn from(err: ContainerError) -> Self {
        Self::Runtime(err.to_string())
    }
}

pub struct DockerSandbox {
    manager: ContainerManager,
    container_id: String,
    container_name: String,
    workdir: String,
}

impl DockerSandbox {
    /// Start the sandbox: create the container, install tooling and authenticate git through gh.
    pub async fn start(
        config: &AppConfig,
        source: &SourceTree,
        token: &Secret,
    ) -> Result<Self, ContainerError> {
        let manager = ContainerManager::new(config.docker.host.as_deref()).await?;
        let sandbox_config = &config.sandbox;
        let session_id = Uuid::new_v4();
        let container_name = format!("signoff-sandbox-{}", session_id);

        let container_config = Self::container_config(sandbox_config, source, token)
            .with_label("signoff-session-id", session_id.to_string());

        let container_id = manager
            .create_sandbox_container(&container_name, &container_config)
            .await?;

        let sandbox = Self {
            manager,
            container_id,
            container_name,
            workdir: sandbox_config.workdir.clone(),
        };

        if let Err(e) = sandbox.provision(sandbox_config).await {
            warn!("Sandbox provisioning failed, removing container: {}", e);
            let cleanup = sandbox.shutdown().await;
            return Err(Self::provisioning_error(e, cleanup));
        }

        info!("Sandbox {} ready", sandbox.container_name);
        Ok(sandbox)
    }

    /// The provisioning error wins over a failed cleanup, which is only logged.
    fn provisioning_error(
        error: ContainerError,
        cleanup: Result<(), ContainerError>,
    ) -> ContainerError {
        if let Err(cleanup) = cleanup {
            warn!("Failed to remove sandbox container after setup failure: {}", cleanup);
        }
        error
    }

    fn container_config(config: &SandboxConfig, source: &SourceTree, token: &Secret) -> ContainerConfig {
        ContainerConfig::new(
            config.image.clone(),
            source.root().to_path_buf(),
            config.workdir.clone(),
        )
        .with_env("GH_PROMPT_DISABLED", "true")
        .with_env("GH_NO_UPDATE_NOTIFIER", "true")
        .with_env("CACHE_BUSTER", chrono::Utc::now().to_rfc3339())
        .with_env("GITHUB_TOKEN", token.expose())
        .with_env("GH_TOKEN", token.expose())
    }

    async fn provision(&self, config: &SandboxConfig) -> Result<(), ContainerError> {
        for step in Self::setup_steps(config) {
            info!("Sandbox setup: {}", step.join(" "));
            self.manager
                .exec_checked(&self.container_id, &step, &self.workdir)
                .await?;
        }
        Ok(())
    }

    fn setup_steps(config: &SandboxConfig) -> Vec<Vec<String>> {
        let mut steps = Vec::new();

        if !config.packages.is_empty() {
            let mut install = vec!["apk".to_string(), "add".to_string(), "--no-cache".to_string()];
            install.extend(config.packages.iter().cloned());
            steps.push(install);
        }

        // The mount is owned by the host user, which git refuses without this
        steps.push(
            ["git", "config", "--global", "--add", "safe.directory", config.workdir.as_str()]
                .iter()
                .map(ToString::to_string)
                .collect(),
        );

        // --force avoids a network round trip when setting up the credential helper
        steps.push(
            ["gh", "auth", "setup-git", "--force", "--hostname", config.github_host.as_str()]
                .iter()
                .map(ToString::to_string)
                .collect(),
        );

        steps
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub async fn shutdown(&self) -> Result<(), ContainerError> {
        info!("Shutting down sandbox {}", self.container_name);
        self.manager.remove_container(&self.container_id).await
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn run(&self, args: &[String]) -> Result<CommandOutput, SandboxError> {
        Ok(self.manager.exec(&self.container_id, args, &self.workdir).await?)
    }

    async fn terminal(&self) -> Result<(), SandboxError> {
        info!("Opening terminal in {}", self.container_name);

        let status = tokio::process::Command::new("docker")
            .args(["exec", "-it", "-w", self.workdir.as_str(), self.container_id.as_str(), "sh"])
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(SandboxError::Terminal(format!("docker exec exited with {}", status)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_setup_installs_packages_then_configures_git() {
        let steps = DockerSandbox::setup_steps(&SandboxConfig::default());
        let rendered: Vec<String> = steps.iter().map(|s| s.join(" ")).collect();

        assert_eq!(
            rendered,
            vec![
                "apk add --no-cache git github-cli",
                "git config --global --add safe.directory /work/repo",
                "gh auth setup-git --force --hostname github.com",
            ]
        );
    }

    #[test]
    fn test_setup_skips_install_without_packages() {
        let config = SandboxConfig {
            image: "ghcr.io/acme/git-gh:latest".to_string(),
            packages: vec![],
            ..SandboxConfig::default()
        };
        let steps = DockerSandbox::setup_steps(&config);

        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0][0], "git");
    }

    #[test]
    fn test_setup_failure_is_reported_even_when_cleanup_fails() {
        let setup = ContainerError::SetupFailed {
            command: "apk add --no-cache git github-cli".to_string(),
            exit_code: 1,
            output: "\nERROR: unable to select packages".to_string(),
        };
        let cleanup = Err(ContainerError::OperationFailed("daemon went away".to_string()));

        let err = DockerSandbox::provisioning_error(setup, cleanup);
        match err {
            ContainerError::SetupFailed { exit_code, output, .. } => {
                assert_eq!(exit_code, 1);
                assert!(output.contains("unable to select packages"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_container_config_injects_token_and_gh_settings() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        git2::Repository::init(temp_dir.path()).unwrap();
        let source = SourceTree::open(temp_dir.path()).unwrap();
        let token = Secret::new("ghp_token").unwrap();

        let config = DockerSandbox::container_config(&SandboxConfig::default(), &source, &token);

        let env = &config.environment_vars;
        assert_eq!(env.get("GITHUB_TOKEN").map(String::as_str), Some("ghp_token"));
        assert_eq!(env.get("GH_PROMPT_DISABLED").map(String::as_str), Some("true"));
        assert_eq!(env.get("GH_NO_UPDATE_NOTIFIER").map(String::as_str), Some("true"));
        assert!(env.contains_key("CACHE_BUSTER"));
        assert_eq!(config.source_path, source.root());
        assert_eq!(config.working_dir, "/work/repo");
    }
}
