//! Command-line interface components
//!
//! This module contains CLI-specific code for remote-cache, including
//! argument parsing, command handlers and progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Cli, Commands, ConfigAction, FetchArgs, GlobalArgs};
pub use commands::{
    handle_check, handle_clear, handle_config, handle_delete, handle_fetch, handle_find,
    handle_info, handle_list,
};
pub use progress::{ProgressConfig, ProgressDisplay};
