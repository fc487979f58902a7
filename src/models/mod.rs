// ABOUTME: Core data models shared by the signoff workflow and the sandbox

pub mod credential;

pub use credential::{CredentialError, Secret};
