//! chat_media_fetcher CLI application
//!
//! Command-line interface for downloading media from web chat stream URLs.

use std::process;

use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use chat_media_fetcher::cli::{handle_config, handle_download, handle_inspect, Cli, Commands};
use chat_media_fetcher::config::AppConfig;
use chat_media_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let config_path = cli.global.config.clone();

    // `config` subcommands must work even when the existing file is broken
    let config = match &cli.command {
        Commands::Config(_) => None,
        _ => Some(AppConfig::load(config_path.clone()).await?),
    };

    let level = cli
        .log_level()
        .map(|level| level.to_string().to_lowercase())
        .or_else(|| config.as_ref().map(|c| c.logging.level.to_lowercase()))
        .unwrap_or_else(|| "warn".to_string());
    init_logging(&level, cli.global.very_verbose);

    info!("chat_media_fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Download(args) => {
            info!("Executing download command");
            handle_download(args, config.unwrap_or_default(), cli.global.quiet).await
        }
        Commands::Inspect(args) => handle_inspect(args).await,
        Commands::Config(args) => handle_config(args, config_path).await,
    }
}

/// Initialize logging at the given level
fn init_logging(level: &str, very_verbose: bool) {
    let directive = format!("chat_media_fetcher={}", level)
        .parse()
        .unwrap_or_else(|_| LevelFilter::WARN.into());
    let filter = EnvFilter::from_default_env().add_directive(directive);

    // Show levels only in very verbose mode
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(very_verbose)
        .with_writer(std::io::stderr)
        .init();
}
