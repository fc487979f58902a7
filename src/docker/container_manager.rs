// ABOUTME: Docker container management using Bollard for the signoff sandbox
// Connects to the daemon, creates the sandbox container and runs commands through the exec API

use crate::sandbox::CommandOutput;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use futures_util::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const MANAGED_LABEL: &str = "signoff-managed";

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Docker connection error: {0}")]
    Connection(#[from] bollard::errors::Error),
    #[error("Container already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Container operation failed: {0}")]
    OperationFailed(String),
    #[error("Sandbox setup command `{command}` failed with exit code {exit_code}:\n{output}")]
    SetupFailed {
        command: String,
        exit_code: i64,
        output: String,
    },
}

/// What the sandbox container is built from.
#[derive(Clone)]
pub struct ContainerConfig {
    pub image: String,
    pub working_dir: String,
    pub source_path: PathBuf,
    /// Main process; keeps the container alive between execs
    pub command: Vec<String>,
    pub environment_vars: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

// Environment values carry the GitHub token, so only the names are printed
impl fmt::Debug for ContainerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut env_names: Vec<&str> = self.environment_vars.keys().map(String::as_str).collect();
        env_names.sort_unstable();

        f.debug_struct("ContainerConfig")
            .field("image", &self.image)
            .field("working_dir", &self.working_dir)
            .field("source_path", &self.source_path)
            .field("command", &self.command)
            .field("environment_vars", &env_names)
            .field("labels", &self.labels)
            .finish()
    }
}

impl ContainerConfig {
    pub fn new(image: String, source_path: PathBuf, working_dir: String) -> Self {
        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

        Self {
            image,
            working_dir,
            source_path,
            command: vec!["sleep".to_string(), "infinity".to_string()],
            environment_vars: HashMap::new(),
            labels,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ContainerManager {
    docker: Docker,
}

impl ContainerManager {
    pub async fn new(docker_host: Option<&str>) -> Result<Self, ContainerError> {
        let docker = Self::connect_to_docker(docker_host)?;

        // Test the connection
        docker.ping().await?;

        info!("Successfully connected to Docker daemon");
        Ok(Self { docker })
    }

    fn connect_to_docker(docker_host: Option<&str>) -> Result<Docker, bollard::errors::Error> {
        if let Some(docker_host) = docker_host {
            info!("Using Docker host from config: {}", docker_host);
            std::env::set_var("DOCKER_HOST", docker_host);
            return Docker::connect_with_local_defaults();
        }

        if let Ok(docker_host) = std::env::var("DOCKER_HOST") {
            info!("Using DOCKER_HOST: {}", docker_host);
            return Docker::connect_with_local_defaults();
        }

        for socket_path in Self::get_docker_socket_paths() {
            if !std::path::Path::new(&socket_path).exists() {
                continue;
            }

            info!("Found Docker socket at: {}", socket_path);
            std::env::set_var("DOCKER_HOST", format!("unix://{}", socket_path));

            match Docker::connect_with_local_defaults() {
                Ok(docker) => return Ok(docker),
                Err(e) => {
                    warn!("Failed to connect to Docker socket {}: {}", socket_path, e);
                }
            }
        }

        warn!("No Docker socket found, trying default connection");
        Docker::connect_with_local_defaults()
    }

    fn get_docker_socket_paths() -> Vec<String> {
        let mut paths = Vec::new();
        let home = std::env::var("HOME").ok();

        if cfg!(target_os = "macos") {
            if let Some(home) = &home {
                // Docker Desktop, Colima
                paths.push(format!("{}/.docker/run/docker.sock", home));
                paths.push(format!("{}/.colima/default/docker.sock", home));
            }
        }

        if cfg!(target_os = "linux") {
            paths.push("/var/run/docker.sock".to_string());

            // Rootless Docker, Podman
            if let Ok(xdg_runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
                paths.push(format!("{}/docker.sock", xdg_runtime_dir));
                paths.push(format!("{}/podman/podman.sock", xdg_runtime_dir));
            }
        }

        paths
    }

    /// Create and start a long-running container with the source tree bind-mounted.
    pub async fn create_sandbox_container(
        &self,
        name: &str,
        config: &ContainerConfig,
    ) -> Result<String, ContainerError> {
        info!("Creating sandbox container {}", name);

        if self.container_exists(name).await? {
            return Err(ContainerError::AlreadyExists(name.to_string()));
        }

        let source = config.source_path.to_str().ok_or_else(|| {
            ContainerError::InvalidConfig(format!(
                "Source path is not valid UTF-8: {}",
                config.source_path.display()
            ))
        })?;

        self.ensure_image_available(&config.image).await?;

        let host_config = HostConfig {
            mounts: Some(vec![Mount {
                target: Some(config.working_dir.clone()),
                source: Some(source.to_string()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(false),
                ..Default::default()
            }]),
            auto_remove: Some(false),
            ..Default::default()
        };

        let mut env: Vec<String> = config
            .environment_vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        env.sort();

        let container_config = Config {
            image: Some(config.image.clone()),
            working_dir: Some(config.working_dir.clone()),
            env: Some(env),
            cmd: Some(config.command.clone()),
            host_config: Some(host_config),
            labels: Some(config.labels.clone()),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(create_options), container_config)
            .await?;
        info!("Created container {} with ID {}", name, response.id);

        if let Err(e) = self
            .docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
        {
            error!("Failed to start container {}: {}", name, e);
            if let Err(cleanup) = self.remove_container(&response.id).await {
                warn!("Failed to remove unstarted container {}: {}", name, cleanup);
            }
            return Err(ContainerError::Connection(e));
        }
        info!("Started container {}", response.id);

        Ok(response.id)
    }

    pub async fn remove_container(&self, container_id: &str) -> Result<(), ContainerError> {
        info!("Removing container {}", container_id);

        let remove_options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self.docker.remove_container(container_id, Some(remove_options)).await {
            Ok(()) => {
                info!("Successfully removed container {}", container_id);
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => {
                debug!("Container {} was already removed", container_id);
                Ok(())
            }
            Err(e) => Err(ContainerError::Connection(e)),
        }
    }

    /// Run a command in a running container. A non-zero exit is part of the output.
    pub async fn exec(
        &self,
        container_id: &str,
        args: &[String],
        working_dir: &str,
    ) -> Result<CommandOutput, ContainerError> {
        if args.is_empty() {
            return Err(ContainerError::InvalidConfig("Empty command".to_string()));
        }

        let options = CreateExecOptions::<String> {
            cmd: Some(args.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            working_dir: Some(working_dir.to_string()),
            ..Default::default()
        };

        let exec = self.docker.create_exec(container_id, options).await?;

        let (stdout, stderr) = match self.docker.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { output, .. } => collect_output(output).await?,
            StartExecResults::Detached => {
                return Err(ContainerError::OperationFailed(
                    "Exec started detached, no output available".to_string(),
                ));
            }
        };

        let exit_code = self.wait_exec_exit_code(&exec.id).await?;
        Ok(CommandOutput::new(stdout, stderr, exit_code))
    }

    async fn wait_exec_exit_code(&self, exec_id: &str) -> Result<i64, ContainerError> {
        // The output stream can close slightly before the daemon records the exit code
        loop {
            let inspect = self.docker.inspect_exec(exec_id).await?;
            if inspect.running != Some(true) {
                return inspect.exit_code.ok_or_else(|| {
                    ContainerError::OperationFailed(format!("No exit code for exec {}", exec_id))
                });
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Run a setup step, failing when it exits non-zero.
    pub async fn exec_checked(
        &self,
        container_id: &str,
        args: &[String],
        working_dir: &str,
    ) -> Result<(), ContainerError> {
        let output = self.exec(container_id, args, working_dir).await?;
        if output.is_success() {
            return Ok(());
        }

        error!("Setup step `{}` exited with {}", args.join(" "), output.exit_code);
        Err(ContainerError::SetupFailed {
            command: args.join(" "),
            exit_code: output.exit_code,
            output: output.combined(),
        })
    }

    async fn container_exists(&self, name: &str) -> Result<bool, ContainerError> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters: {
                    let mut filters = HashMap::new();
                    filters.insert("name".to_string(), vec![name.to_string()]);
                    filters
                },
                ..Default::default()
            }))
            .await?;

        Ok(!containers.is_empty())
    }

    async fn ensure_image_available(&self, image: &str) -> Result<(), ContainerError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                filters: {
                    let mut filters = HashMap::new();
                    filters.insert("reference".to_string(), vec![image.to_string()]);
                    filters
                },
                ..Default::default()
            }))
            .await?;

        if !images.is_empty() {
            debug!("Image {} already exists locally", image);
            return Ok(());
        }

        info!("Pulling image {}", image);

        let create_image_options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(create_image_options), None, None);

        while let Some(result) = stream.next().await {
            if let Err(e) = result {
                error!("Failed to pull image {}: {}", image, e);
                return Err(ContainerError::OperationFailed(format!(
                    "Failed to pull image: {}",
                    e
                )));
            }
        }

        info!("Successfully pulled image {}", image);
        Ok(())
    }
}

/// Drain an attached exec stream into stdout and stderr.
///
/// Bytes are decoded once per stream, so a character split across frames survives.
async fn collect_output<S>(mut output: S) -> Result<(String, String), ContainerError>
where
    S: Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin,
{
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    while let Some(chunk) = output.next().await {
        match chunk? {
            LogOutput::StdOut { message } | LogOutput::Console { message } => {
                stdout.extend_from_slice(&message);
            }
            LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
            LogOutput::StdIn { .. } => {}
        }
    }

    Ok((
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[test]
    fn test_container_config_is_labelled_as_managed() {
        let config = ContainerConfig::new(
            "alpine:3.20".to_string(),
            PathBuf::from("/tmp/repo"),
            "/work/repo".to_string(),
        )
        .with_env("GH_PROMPT_DISABLED", "true")
        .with_label("signoff-session-id", "abc");

        assert_eq!(config.labels.get(MANAGED_LABEL).map(String::as_str), Some("true"));
        assert_eq!(config.labels.get("signoff-session-id").map(String::as_str), Some("abc"));
        assert_eq!(
            config.environment_vars.get("GH_PROMPT_DISABLED").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn test_container_config_debug_hides_env_values() {
        let config = ContainerConfig::new(
            "alpine:3.20".to_string(),
            PathBuf::from("/tmp/repo"),
            "/work/repo".to_string(),
        )
        .with_env("GITHUB_TOKEN", "ghp_do_not_print");

        let printed = format!("{:?}", config);
        assert!(printed.contains("GITHUB_TOKEN"));
        assert!(!printed.contains("ghp_do_not_print"));
    }

    #[tokio::test]
    async fn test_collect_output_keeps_characters_split_across_frames() {
        // "é" is 0xC3 0xA9; the daemon may deliver the two bytes in separate frames
        let frames: Vec<Result<LogOutput, bollard::errors::Error>> = vec![
            Ok(LogOutput::StdOut { message: vec![b'c', b'a', b'f', 0xC3].into() }),
            Ok(LogOutput::StdErr { message: b"warn".to_vec().into() }),
            Ok(LogOutput::StdOut { message: vec![0xA9, b'\n'].into() }),
        ];

        let (stdout, stderr) = collect_output(stream::iter(frames)).await.unwrap();
        assert_eq!(stdout, "café\n");
        assert_eq!(stderr, "warn");
    }

    // Note: These tests require Docker to be running
    // They are integration tests and should be run with `cargo test --ignored`

    #[tokio::test]
    #[ignore]
    async fn test_container_manager_creation() {
        let manager = ContainerManager::new(None).await;
        assert!(manager.is_ok(), "Should be able to connect to Docker");
    }

    #[tokio::test]
    #[ignore]
    async fn test_exec_captures_streams_and_exit_code() {
        let manager = ContainerManager::new(None).await.unwrap();
        let temp_dir = tempfile::TempDir::new().unwrap();
        let name = format!("signoff-test-{}", uuid::Uuid::new_v4());
        let config = ContainerConfig::new(
            "alpine:3.20".to_string(),
            temp_dir.path().to_path_buf(),
            "/work/repo".to_string(),
        );

        let id = manager.create_sandbox_container(&name, &config).await.unwrap();

        let args: Vec<String> = ["sh", "-c", "echo out; echo err >&2; exit 3"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let output = manager.exec(&id, &args, "/work/repo").await.unwrap();

        manager.remove_container(&id).await.unwrap();

        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.exit_code, 3);
    }

    #[tokio::test]
    #[ignore]
    async fn test_container_that_fails_to_start_is_removed() {
        let manager = ContainerManager::new(None).await.unwrap();
        let temp_dir = tempfile::TempDir::new().unwrap();
        let name = format!("signoff-test-{}", uuid::Uuid::new_v4());
        let config = ContainerConfig::new(
            "alpine:3.20".to_string(),
            temp_dir.path().to_path_buf(),
            "/work/repo".to_string(),
        )
        .with_command(["/no/such/executable"]);

        let result = manager.create_sandbox_container(&name, &config).await;

        assert!(result.is_err(), "start should fail for a missing executable");
        assert!(!manager.container_exists(&name).await.unwrap());
    }
}
