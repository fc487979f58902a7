// ABOUTME: Docker integration for the sandbox that runs git and gh

pub mod container_manager;
pub mod docker_sandbox;

pub use container_manager::{ContainerConfig, ContainerError, ContainerManager};
pub use docker_sandbox::DockerSandbox;
