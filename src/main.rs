// ABOUTME: Main entry point for the signoff-box CLI

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use signoff_box::config::AppConfig;
use signoff_box::docker::DockerSandbox;
use signoff_box::git::SourceTree;
use signoff_box::markdown;
use signoff_box::models::Secret;
use signoff_box::signoff::Signoff;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "signoff-box")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sign off commits from the developer machine and render markdown", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render markdown for the terminal
    #[command(subcommand)]
    Markdown(MarkdownCommand),

    /// Sign off commits and manage the required status check
    Signoff(SignoffArgs),
}

#[derive(Subcommand)]
enum MarkdownCommand {
    /// Render a markdown string
    Render { text: String },

    /// Render a markdown file
    Readme {
        #[arg(default_value = "README.md")]
        file: PathBuf,
    },
}

#[derive(Args)]
struct SignoffArgs {
    /// Local directory containing the git clone
    #[arg(long, default_value = ".")]
    source: PathBuf,

    /// Name of the status check (default: signoff)
    #[arg(long)]
    check_name: Option<String>,

    /// Container image with apk available
    #[arg(long)]
    image: Option<String>,

    /// Environment variable holding the GitHub token
    #[arg(long)]
    token_env: Option<String>,

    #[command(subcommand)]
    command: SignoffCommand,
}

#[derive(Subcommand)]
enum SignoffCommand {
    /// Check for uncommitted changes, a tracking branch and unpushed commits
    IsClean,
    /// Sign off the current commit
    Create,
    /// Require the check on a branch (default branch if omitted)
    Install {
        #[arg(long)]
        branch: Option<String>,
    },
    /// Remove all protection from a branch (default branch if omitted)
    Uninstall {
        #[arg(long)]
        branch: Option<String>,
    },
    /// Print the commit SHA of HEAD
    Sha,
    /// Print the authenticated GitHub user
    #[command(name = "whois")]
    WhoIs,
    /// Print the open pull request of the current branch
    PullRequest,
    /// Open a pull request for the current branch
    OpenPr {
        /// Fill the description with full commit messages
        #[arg(long)]
        fill_verbose: bool,
    },
    /// Print the repository's default branch
    DefaultBranch,
    /// Run a command, failing on a non-zero exit
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Run a command and print its stdout
    Stdout {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Run a command and print its stderr
    Stderr {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Run a command and print its exit code
    ExitCode {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Open an interactive shell in the sandbox
    Terminal,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Markdown(command) => run_markdown(command),
        Commands::Signoff(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_signoff(config, args).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path).context("Failed to load configuration"),
        None => AppConfig::load().context("Failed to load configuration"),
    }
}

fn run_markdown(command: MarkdownCommand) -> Result<()> {
    let rendered = match command {
        MarkdownCommand::Render { text } => markdown::render(&text)?,
        MarkdownCommand::Readme { file } => markdown::render_file(&file)?,
    };
    print!("{}", rendered);
    Ok(())
}

async fn run_signoff(mut config: AppConfig, args: SignoffArgs) -> Result<()> {
    if let Some(check_name) = args.check_name {
        config.signoff.check_name = check_name;
    }
    if let Some(image) = args.image {
        config.sandbox.image = image;
    }
    if let Some(token_env) = args.token_env {
        config.signoff.token_env = token_env;
    }

    let source = SourceTree::open(&args.source)
        .with_context(|| format!("{} is not inside a git repository", args.source.display()))?;
    let token = Secret::from_env(&config.signoff.token_env)
        .context("A GitHub token is required to run signoff commands")?;

    let sandbox = Arc::new(
        DockerSandbox::start(&config, &source, &token)
            .await
            .context("Failed to start the sandbox")?,
    );
    info!("Sandbox container {} started", sandbox.container_id());

    let signoff = Signoff::new(source, sandbox.clone(), Some(config.check_name()));
    let result = dispatch(&signoff, args.command).await;

    if let Err(e) = sandbox.shutdown().await {
        warn!("Failed to remove sandbox container: {}", e);
    }

    let message = result?;
    if !message.is_empty() {
        println!("{}", message);
    }
    Ok(())
}

async fn dispatch(signoff: &Signoff, command: SignoffCommand) -> Result<String> {
    let message = match command {
        SignoffCommand::IsClean => {
            signoff.is_clean().await?;
            "✓ Repository is clean".to_string()
        }
        SignoffCommand::Create => {
            let sha = signoff.create().await?;
            format!("✓ Signed off on {}", sha)
        }
        SignoffCommand::Install { branch } => {
            let branch = signoff.install(branch.as_deref()).await?;
            format!(
                "✓ GitHub {} branch now requires signoff on check {:?}",
                branch,
                signoff.check_name()
            )
        }
        SignoffCommand::Uninstall { branch } => {
            let branch = signoff.uninstall(branch.as_deref()).await?;
            format!("✓ GitHub {} branch no longer requires signoff", branch)
        }
        SignoffCommand::Sha => signoff.sha().await?,
        SignoffCommand::WhoIs => signoff.who_is().await?,
        SignoffCommand::PullRequest => signoff
            .pull_request()
            .await?
            .unwrap_or_else(|| "No open pull request for the current branch".to_string()),
        SignoffCommand::OpenPr { fill_verbose } => signoff.open_pr(fill_verbose).await?,
        SignoffCommand::DefaultBranch => signoff.default_branch().await?,
        SignoffCommand::Exec { args } => signoff.exec(&args).await?,
        SignoffCommand::Stdout { args } => signoff.stdout(&args).await?,
        SignoffCommand::Stderr { args } => signoff.stderr(&args).await?,
        SignoffCommand::ExitCode { args } => signoff.exit_code(&args).await?.to_string(),
        SignoffCommand::Terminal => {
            signoff.terminal().await?;
            String::new()
        }
    };
    Ok(message)
}

fn setup_logging(verbose: bool) {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let default_filter = if verbose {
        "signoff_box=debug"
    } else {
        "signoff_box=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let log_dir = dirs::data_local_dir()
        .map(|dir| dir.join("signoff-box").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".signoff-box/logs"));

    // Create log file with timestamp
    let log_file = std::fs::create_dir_all(&log_dir).ok().and_then(|()| {
        let path = log_dir.join(format!(
            "signoff-box-{}.log",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));
        OpenOptions::new().create(true).append(true).open(path).ok()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match log_file {
        Some(file) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(file)
                    .with_ansi(false), // No ANSI colors in log file
            )
            .init(),
        None => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_keeps_hyphenated_arguments() {
        let cli = Cli::parse_from([
            "signoff-box", "signoff", "exec", "git", "log", "--oneline", "-n", "3",
        ]);

        match cli.command {
            Commands::Signoff(SignoffArgs {
                command: SignoffCommand::Exec { args },
                ..
            }) => assert_eq!(args, vec!["git", "log", "--oneline", "-n", "3"]),
            _ => panic!("expected signoff exec"),
        }
    }

    #[test]
    fn test_install_branch_and_check_name() {
        let cli = Cli::parse_from([
            "signoff-box", "signoff", "--check-name", "local-ci", "install", "--branch", "develop",
        ]);

        match cli.command {
            Commands::Signoff(SignoffArgs {
                check_name,
                command: SignoffCommand::Install { branch },
                ..
            }) => {
                assert_eq!(check_name.as_deref(), Some("local-ci"));
                assert_eq!(branch.as_deref(), Some("develop"));
            }
            _ => panic!("expected signoff install"),
        }
    }

    #[test]
    fn test_readme_defaults_to_readme_md() {
        let cli = Cli::parse_from(["signoff-box", "markdown", "readme"]);

        match cli.command {
            Commands::Markdown(MarkdownCommand::Readme { file }) => {
                assert_eq!(file, PathBuf::from("README.md"));
            }
            _ => panic!("expected markdown readme"),
        }
    }
}
