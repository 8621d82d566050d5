//! gitsync CLI - Command line interface for gitsync
//!
//! Fetch and pull with stored credentials, live progress and Ctrl-C cancellation.

mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gitsync_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CredentialsArgs, FetchArgs, PullArgs, RemotesArgs};

/// gitsync: fetch and pull with credential resolution
#[derive(Parser, Debug)]
#[command(name = "gitsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Credential store location (overrides config and env)
    #[arg(long, global = true, env = "GITSYNC_CREDENTIALS_PATH")]
    credentials_path: Option<PathBuf>,

    /// Remove remote-tracking references that vanished upstream
    #[arg(long, global = true)]
    prune: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Fetch from a remote
    #[command(visible_alias = "f")]
    Fetch(FetchArgs),

    /// Fetch and merge the upstream branch
    #[command(visible_alias = "p")]
    Pull(PullArgs),

    /// List remotes and branches
    Remotes(RemotesArgs),

    /// Manage stored credentials
    #[command(visible_alias = "creds")]
    Credentials(CredentialsArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; --verbose only changes the fallback
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let prune = cli.prune.then_some(true);
    let config = Config::load_with_overrides(cli.credentials_path.clone(), prune)?;

    if cli.verbose {
        tracing::info!(
            credentials_path = ?config.credentials_path(),
            prune = config.fetch.prune,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("gitsync {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Fetch(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Pull(args)) => {
            args.execute(cli.verbose, &config).await?;
        }
        Some(Commands::Remotes(args)) => {
            args.execute(cli.verbose)?;
        }
        Some(Commands::Credentials(args)) => {
            args.execute(&config)?;
        }
        Some(Commands::Config) => print_config(&config),
        None => {
            println!("gitsync - fetch and pull with credential resolution");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config) {
    println!("gitsync Configuration");
    println!("=====================");
    println!();
    println!("Fetch:");
    println!("  prune: {}", config.fetch.prune);
    println!();
    println!("Merge:");
    println!("  commit_on_success: {}", config.merge.commit_on_success);
    println!("  fast_forward: {:?}", config.merge.fast_forward);
    println!("  file_favor: {:?}", config.merge.file_favor);
    println!();
    println!("Signature:");
    println!(
        "  name: {}",
        config.signature.name.as_deref().unwrap_or("(repository default)")
    );
    println!(
        "  email: {}",
        config.signature.email.as_deref().unwrap_or("(repository default)")
    );
    println!();
    println!("Credentials:");
    match config.credentials_path() {
        Some(path) => {
            println!("  store: {}", path.display());
            if path.exists() {
                println!("    (exists)");
            } else {
                println!("    (not found - no stored credentials)");
            }
        }
        None => println!("  store: (no config directory)"),
    }
    println!("  auto_fetch: {}", config.credentials.auto_fetch);
    println!();
    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
}
