// ABOUTME: Shared test helpers: a recording fake sandbox and a throwaway source tree
// Unscripted commands succeed with empty output, which is what a clean repository returns

#![allow(dead_code)]

use async_trait::async_trait;
use signoff_box::git::SourceTree;
use signoff_box::sandbox::{CommandOutput, Sandbox, SandboxError};
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Default)]
pub struct FakeSandbox {
    responses: Vec<(String, CommandOutput)>,
    calls: Mutex<Vec<String>>,
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command starting with `prefix`. The longest matching prefix wins,
    /// and among equal prefixes the one added last.
    pub fn respond(mut self, prefix: &str, stdout: &str, exit_code: i64) -> Self {
        self.responses
            .push((prefix.to_string(), CommandOutput::new(stdout, "", exit_code)));
        self
    }

    pub fn fail(mut self, prefix: &str, stderr: &str, exit_code: i64) -> Self {
        self.responses
            .push((prefix.to_string(), CommandOutput::new("", stderr, exit_code)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|call| call.starts_with(prefix))
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    async fn run(&self, args: &[String]) -> Result<CommandOutput, SandboxError> {
        let command = args.join(" ");
        self.calls.lock().unwrap().push(command.clone());

        let output = self
            .responses
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }

    async fn terminal(&self) -> Result<(), SandboxError> {
        self.calls.lock().unwrap().push("<terminal>".to_string());
        Ok(())
    }
}

/// A fresh git repository to use as the session's source tree.
pub fn source_tree() -> (TempDir, SourceTree) {
    let temp_dir = TempDir::new().unwrap();
    git2::Repository::init(temp_dir.path()).unwrap();
    let tree = SourceTree::open(temp_dir.path()).unwrap();
    (temp_dir, tree)
}
