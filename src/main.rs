//! Shelf - Shared Library Resolver
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use shelf::cli::{Cli, Commands, LocalScope};
use shelf::config::ConfigManager;
use shelf::error::ShelfResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ShelfResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("shelf=warn"),
        1 => EnvFilter::new("shelf=info"),
        _ => EnvFilter::new("shelf=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    // Completions don't need configuration
    if let Commands::Completions(args) = cli.command {
        return shelf::cli::commands::completions(args);
    }

    // Load the global configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    // Discover a project-local .shelf.toml unless --no-local is set
    let local = if cli.no_local {
        debug!("Local config discovery disabled (--no-local)");
        None
    } else {
        discover_local_scope(&config_manager).await?
    };

    // Ensure state directories exist
    ConfigManager::ensure_state_dirs().await?;

    // Dispatch to command
    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Resolve(args) => {
            shelf::cli::commands::resolve(args, &config, local.as_ref()).await
        }
        Commands::List(args) => shelf::cli::commands::list(args, &config, local.as_ref()).await,
        Commands::Config(args) => shelf::cli::commands::config(args, &config).await,
        Commands::Cache(args) => shelf::cli::commands::cache(args, &config).await,
    }
}

/// Find and parse a project-local config; its folder becomes an
/// (untrusted) scope in the lookup chain
async fn discover_local_scope(manager: &ConfigManager) -> ShelfResult<Option<LocalScope>> {
    let cwd = std::env::current_dir()
        .map_err(|e| shelf::error::ShelfError::io("getting current directory", e))?;

    let Some(path) = ConfigManager::find_local_config(&cwd) else {
        return Ok(None);
    };
    debug!("Found local config: {}", path.display());

    let config = manager.load_from_file(&path).await?;
    let name = path
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string());

    Ok(Some(LocalScope { name, config }))
}
