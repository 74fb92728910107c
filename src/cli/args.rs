//! Command-line argument parsing for chat_media_fetcher
//!
//! This module defines the CLI structure using clap derive macros: the
//! download command, key inspection and configuration management.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::constants::chunks;

/// chat_media_fetcher - Download media from web chat stream URLs
#[derive(Parser, Debug)]
#[command(
    name = "chat_media_fetcher",
    version,
    about = "Download media from web chat stream URLs in byte-range chunks",
    long_about = "Downloads videos referenced by web chat media URLs (stream/ and progressive/ shapes).
Each resource is fetched in sequential byte ranges, at most once at a time, with a
configurable number of downloads running concurrently."
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
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download one or more resource keys
    Download(DownloadArgs),

    /// Parse a resource key and show what would be fetched
    Inspect(InspectArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the download command
#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Resource keys (media URLs) to download
    #[arg(value_name = "KEYS")]
    pub keys: Vec<String>,

    /// File with one resource key per line (`#` starts a comment)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Maximum concurrent downloads (default: unlimited)
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Directory for saved files
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Bytes per ranged request
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<u64>,

    /// Print state snapshots as JSON lines instead of progress bars
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Resource key to parse
    pub key: String,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Where to write (default: user config directory)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Logging level requested by flags, if any
    ///
    /// Without a flag the configured level applies.
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
}

impl DownloadArgs {
    /// Check values clap cannot check on its own
    pub fn validate(&self) -> Result<(), String> {
        if self.keys.is_empty() && self.input.is_none() {
            return Err("Provide at least one resource key or --input FILE".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be greater than 0".to_string());
        }

        if let Some(chunk_size) = self.chunk_size {
            if chunk_size < chunks::MIN_CHUNK_SIZE {
                return Err(format!(
                    "Chunk size must be at least {} bytes",
                    chunks::MIN_CHUNK_SIZE
                ));
            }
        }

        Ok(())
    }
}

/// Parse a key list: one key per line, blank lines and `#` comments skipped
pub fn parse_key_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
