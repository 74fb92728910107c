//! Command-line interface components
//!
//! This module contains CLI-specific code for chat_media_fetcher, including
//! argument parsing, command handlers and progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    Cli, Commands, ConfigAction, ConfigArgs, DownloadArgs, GlobalArgs, InspectArgs,
};
pub use commands::{handle_config, handle_download, handle_inspect};
pub use progress::{DisplayMode, DownloadSummary, ProgressDisplay};
