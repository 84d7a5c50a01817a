//! remote-cache CLI application
//!
//! Command-line interface for inspecting and filling the local cache of
//! remotely stored data.

use std::process;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use remote_cache::cli::{
    handle_check, handle_clear, handle_config, handle_delete, handle_fetch, handle_find,
    handle_info, handle_list, Cli, Commands,
};
use remote_cache::config::AppConfig;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> anyhow::Result<()> {
    // Ignore errors if the file doesn't exist
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    let mut config = AppConfig::load(cli.global.config.clone())
        .await
        .context("Failed to load configuration")?;
    config.apply_cli_overrides(cli.global.cache_dir.as_deref());

    init_logging(&cli, &config)?;
    info!("remote-cache v{} starting", env!("CARGO_PKG_VERSION"));

    let quiet = cli.global.quiet;
    match cli.command {
        Commands::Info => handle_info(&config).await?,
        Commands::List { json } => handle_list(&config, json).await?,
        Commands::Find { name } => handle_find(&config, &name).await?,
        Commands::Delete { target, scene } => {
            handle_delete(&config, &target, scene.as_deref()).await?
        }
        Commands::Clear { yes, scene } => handle_clear(&config, yes, scene.as_deref()).await?,
        Commands::Check => handle_check(&config).await?,
        Commands::Fetch(args) => {
            info!("Executing fetch command");
            handle_fetch(&config, args, quiet).await?
        }
        Commands::Config { action } => handle_config(&config, action).await?,
    }
    Ok(())
}

/// Initialize logging from the CLI flags, falling back to the configured level
fn init_logging(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    let directive = cli.log_directive(&config.logging.level);

    // RUST_LOG takes precedence over flags and configuration
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .with_context(|| format!("Invalid log level: {}", config.logging.level))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
    Ok(())
}
