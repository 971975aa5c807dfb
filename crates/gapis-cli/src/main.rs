//! gapis CLI - Command-line interface for gapis
//!
//! Provides commands for:
//! - Storing and checking the Drive access token
//! - Uploading and sharing files
//! - Mirroring directories to and from Drive folders (push / pull)
//! - Small folder operations (ls, mkdir, clear, search, rm, rename)
//! - Inspecting the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    auth::AuthCommand, completions::CompletionsCommand, config::ConfigCommand,
    drive::DriveCommand, AppContext,
};
use gapis_core::config::Config;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "gapis", version, about = "Push and pull directories to Google Drive")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage the stored access token
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Work with files and folders on Drive
    #[command(subcommand)]
    Drive(DriveCommand),
    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Filter directive: `-q` and `-v` override the configured level
fn log_level(verbose: u8, quiet: bool, configured: &str) -> String {
    match (quiet, verbose) {
        (true, _) => "error".to_string(),
        (false, 0) => configured.to_string(),
        (false, 1) => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(cli: &Cli, config: &Config) {
    let level = log_level(cli.verbose, cli.quiet, &config.logging.level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);
    init_tracing(&cli, &config);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = AppContext {
        format,
        quiet: cli.quiet,
        config_path,
        config,
    };

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(&ctx).await,
        Commands::Drive(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
        Commands::Completions(cmd) => cmd.execute(&ctx).await,
    }
}
