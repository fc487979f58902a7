// ABOUTME: Tests for the pass-through queries and raw command accessors of a signoff session

mod common;

use common::{source_tree, FakeSandbox};
use pretty_assertions::assert_eq;
use signoff_box::sandbox::SandboxError;
use signoff_box::signoff::Signoff;
use std::sync::Arc;

fn args(command: &str) -> Vec<String> {
    command.split_whitespace().map(String::from).collect()
}

#[tokio::test]
async fn test_queries_are_trimmed() {
    // BEHAVIOR: default branch, sha and identity never carry surrounding whitespace
    let (_dir, tree) = source_tree();
    let sandbox = Arc::new(
        FakeSandbox::new()
            .respond("gh api repos/:owner/:repo --jq .default_branch", "  main\n", 0)
            .respond("git rev-parse HEAD", "\tabc123\n\n", 0)
            .respond("gh api user --jq .login", "alice\r\n", 0),
    );
    let signoff = Signoff::new(tree, sandbox, None);

    assert_eq!(signoff.default_branch().await.unwrap(), "main");
    assert_eq!(signoff.sha().await.unwrap(), "abc123");
    assert_eq!(signoff.who_is().await.unwrap(), "alice");
}

#[tokio::test]
async fn test_pull_request_of_current_branch() {
    let (_dir, tree) = source_tree();
    let sandbox = Arc::new(
        FakeSandbox::new()
            .respond("gh api repos/:owner/:repo --jq", "main\n", 0)
            .respond("git rev-parse --abbrev-ref HEAD", "feature/login\n", 0)
            .respond("gh api repos/:owner/:repo/pulls", "https://github.com/acme/app/pull/42\n", 0),
    );
    let signoff = Signoff::new(tree, sandbox.clone(), None);

    let url = signoff.pull_request().await.unwrap();
    assert_eq!(url.as_deref(), Some("https://github.com/acme/app/pull/42"));

    let query = sandbox.calls().last().unwrap().clone();
    assert!(query.contains("select(.state == \"open\")"));
    assert!(query.contains("select(.base.ref == \"main\")"));
    assert!(query.contains("select(.head.ref == \"feature/login\")"));
}

#[tokio::test]
async fn test_open_pr_fills_from_commits() {
    let (_dir, tree) = source_tree();
    let sandbox = Arc::new(FakeSandbox::new().respond("gh pr create", "https://github.com/acme/app/pull/43", 0));
    let signoff = Signoff::new(tree, sandbox.clone(), None);

    let out = signoff.open_pr(false).await.unwrap();
    assert_eq!(out, "https://github.com/acme/app/pull/43\n");
    assert_eq!(sandbox.calls(), vec!["gh pr create --fill"]);
}

#[tokio::test]
async fn test_exec_returns_combined_output_or_fails() {
    let (_dir, tree) = source_tree();
    let sandbox = Arc::new(
        FakeSandbox::new()
            .respond("git --version", "git version 2.45.2\n", 0)
            .fail("git push", "rejected", 1),
    );
    let signoff = Signoff::new(tree, sandbox, None);

    let out = signoff.exec(&args("git --version")).await.unwrap();
    assert_eq!(out, "git version 2.45.2\n\n");

    let err = signoff.exec(&args("git push origin main")).await.unwrap_err();
    match err {
        SandboxError::NonZeroExit { exit_code, output } => {
            assert_eq!(exit_code, 1);
            assert_eq!(output, "\nrejected");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_raw_accessors_ignore_exit_status() {
    let (_dir, tree) = source_tree();
    let sandbox = Arc::new(FakeSandbox::new().fail("git fetch", "could not resolve host", 128));
    let signoff = Signoff::new(tree, sandbox, None);

    let command = args("git fetch origin");
    assert_eq!(signoff.stdout(&command).await.unwrap(), "");
    assert_eq!(signoff.stderr(&command).await.unwrap(), "could not resolve host");
    assert_eq!(signoff.exit_code(&command).await.unwrap(), 128);
}

#[tokio::test]
async fn test_terminal_is_delegated_to_sandbox() {
    let (_dir, tree) = source_tree();
    let sandbox = Arc::new(FakeSandbox::new());
    let signoff = Signoff::new(tree, sandbox.clone(), None);

    signoff.terminal().await.unwrap();
    assert_eq!(sandbox.calls(), vec!["<terminal>"]);
}
