//! Command-line argument parsing for remote-cache
//!
//! This module defines the CLI structure using clap derive macros: cache
//! inspection and cleanup, scene-aware deletion, and fetching URIs through
//! the transfer worker.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// remote-cache - Local cache for remotely stored scene data
#[derive(Parser, Debug)]
#[command(
    name = "remote-cache",
    version,
    about = "Manage a local cache of remotely stored data files",
    long_about = "Inspect, clean and fill the local cache used to stage remote data.
Fetches run through an asynchronous transfer worker with per-transfer progress."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show cache location, usage and limits
    Info,

    /// List cached files
    List {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find a cached file by name
    Find {
        /// File name to look for
        name: String,
    },

    /// Delete a file from the cache
    Delete {
        /// File name or path inside the cache
        target: String,

        /// Scene document whose nodes should be flagged as modified
        #[arg(long, value_name = "FILE")]
        scene: Option<PathBuf>,
    },

    /// Remove every file in the cache
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Scene document whose nodes should be flagged as modified
        #[arg(long, value_name = "FILE")]
        scene: Option<PathBuf>,
    },

    /// Check the cache against its size limit and free buffer
    Check,

    /// Fetch URIs into the cache
    Fetch(FetchArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// URIs to stage into the cache (http, https or file)
    #[arg(required = true, value_name = "URI")]
    pub uris: Vec<String>,

    /// Delete cached copies before fetching again
    #[arg(short, long)]
    pub force: bool,

    /// Run transfers one after another instead of concurrently
    #[arg(long)]
    pub sync: bool,

    /// Number of concurrent transfers (overrides the configuration)
    #[arg(short, long)]
    pub workers: Option<usize>,
}

/// Configuration file actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file if none exists
    Init,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level requested by flags, if any
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.global.quiet {
            Some(tracing::Level::ERROR)
        } else if self.global.very_verbose {
            Some(tracing::Level::DEBUG)
        } else if self.global.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }

    /// Filter directive for this crate; flags win over the configured level
    pub fn log_directive(&self, configured_level: &str) -> String {
        let level = match self.log_level() {
            Some(level) => level.to_string().to_lowercase(),
            None => configured_level.to_lowercase(),
        };
        format!("remote_cache={}", level)
    }
}

impl FetchArgs {
    /// Check argument combinations clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("Number of workers must be greater than 0".to_string());
        }
        if self.uris.iter().any(|uri| uri.trim().is_empty()) {
            return Err("URIs must not be empty".to_string());
        }
        Ok(())
    }
}
