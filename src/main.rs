//! # Widget CLI
//!
//! Scaffold, develop, package and publish widgets for the widget marketplace.

mod bundler;
mod commands;
mod config;
mod display;
mod ids;
mod manifest;
mod package;
mod pipeline;
mod project;
mod prompt;
mod registry;
mod server;
mod upload;
mod version;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use bundler::WebpackBundler;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use commands::Env;
use prompt::Terminal;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "widget-cli")]
#[command(about = "Widget marketplace command line tool", long_about = None)]
#[command(version, disable_help_flag = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Never prompt; fail when a required value is missing
    #[arg(long, global = true)]
    ci: bool,

    /// Command used to run the bundler
    #[arg(long, global = true, env = "WIDGET_CLI_BUNDLER", default_value = config::DEFAULT_BUNDLER)]
    bundler: String,

    /// Print help (`-h` is the host flag)
    #[arg(long, global = true, action = ArgAction::Help)]
    help: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with your API token
    #[command(disable_help_flag = true)]
    Auth(commands::auth::AuthArgs),
    /// Ban or unban a widget package
    #[command(disable_help_flag = true)]
    Ban(commands::ban::BanArgs),
    /// Create a widget project and register it in your space
    #[command(disable_help_flag = true)]
    Init(commands::init::InitArgs),
    /// Link an existing widget into another space
    #[command(disable_help_flag = true)]
    Link,
    /// List the releases of a widget package
    #[command(disable_help_flag = true)]
    ListRelease(commands::list_release::ListReleaseArgs),
    /// Release a new version of the widget
    #[command(disable_help_flag = true)]
    Release(commands::release::ReleaseArgs),
    /// Rollback a widget package to an earlier version
    #[command(disable_help_flag = true)]
    Rollback(commands::rollback::RollbackArgs),
    /// Start a dev server that serves the widget bundle
    #[command(disable_help_flag = true)]
    Start(commands::start::StartArgs),
    /// Submit a global widget for review
    #[command(disable_help_flag = true)]
    Submit(commands::submit::SubmitArgs),
    /// Take a widget package offline
    #[command(disable_help_flag = true)]
    Unpublish(commands::unpublish::UnpublishArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let bundler = WebpackBundler::from_command_line(&cli.bundler)?;
    let env = Env {
        cwd,
        prompter: &Terminal,
        bundler: &bundler,
        ci: cli.ci,
    };

    match cli.command {
        Commands::Auth(args) => commands::auth::execute(&env, args).await,
        Commands::Ban(args) => commands::ban::execute(&env, args).await,
        Commands::Init(args) => commands::init::execute(&env, args).await,
        Commands::Link => commands::link::execute(),
        Commands::ListRelease(args) => commands::list_release::execute(&env, args).await,
        Commands::Release(args) => commands::release::execute(&env, args).await,
        Commands::Rollback(args) => commands::rollback::execute(&env, args).await,
        Commands::Start(args) => commands::start::execute(&env, args).await,
        Commands::Submit(args) => commands::submit::execute(&env, args).await,
        Commands::Unpublish(args) => commands::unpublish::execute(&env, args).await,
    }
}
