//! Command handlers for the chat_media_fetcher CLI
//!
//! This module implements the command handlers that connect CLI arguments to
//! the orchestrator, the key parser and the configuration file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::app::{
    create_shutdown_channel, DiskSink, MediaClient, Orchestrator, RequestOutcome,
    ResourceDescriptor, SignalHandler,
};
use crate::cli::args::parse_key_list;
use crate::cli::{
    ConfigAction, ConfigArgs, DisplayMode, DownloadArgs, DownloadSummary, InspectArgs,
    ProgressDisplay,
};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Handle the download command
///
/// Requests every key, renders progress until all of them settle and prints
/// a summary. Fails if any key ended in `error`.
pub async fn handle_download(args: DownloadArgs, config: AppConfig, quiet: bool) -> Result<()> {
    let start_time = Instant::now();
    args.validate().map_err(AppError::generic)?;

    let keys = collect_keys(&args).await?;
    if keys.is_empty() {
        return Err(AppError::generic("No resource keys to download"));
    }

    let (client_config, mut orchestrator_config) = config.to_runtime_config();
    if let Some(limit) = args.concurrency {
        orchestrator_config.max_concurrency = Some(limit);
    }
    if let Some(chunk_size) = args.chunk_size {
        orchestrator_config.chunk_size = chunk_size;
    }
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.output_dir.clone());

    info!(
        "Downloading {} keys into {} (limit {:?})",
        keys.len(),
        output_dir.display(),
        orchestrator_config.max_concurrency
    );

    let client = MediaClient::with_config(client_config)?;
    let orchestrator = Orchestrator::new(
        orchestrator_config,
        Arc::new(client),
        Arc::new(DiskSink::new(output_dir)),
    )?;

    let (shutdown_tx, _) = create_shutdown_channel();
    let signal_task = SignalHandler::new(shutdown_tx).setup(Arc::clone(&orchestrator));

    let mut updates = orchestrator.subscribe();

    let keys = request_all(&orchestrator, &keys);
    if keys.is_empty() {
        signal_task.abort();
        return Err(AppError::generic("Interrupted before any download started"));
    }
    let mut display = ProgressDisplay::new(DisplayMode::detect(args.json, quiet), &keys);

    let settle = orchestrator.wait_until_settled(&keys);
    tokio::pin!(settle);

    let final_snapshot = loop {
        tokio::select! {
            snapshot = &mut settle => break snapshot,
            update = updates.recv() => match update {
                Ok(snapshot) => display.render(&snapshot),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Progress display skipped {} snapshots", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break (&mut settle).await,
            },
        }
    };

    display.finish(&final_snapshot);
    signal_task.abort();

    let summary = DownloadSummary::from_snapshot(&final_snapshot, &keys, start_time.elapsed());
    if !quiet {
        summary.print();
    }

    if summary.has_failures() {
        return Err(AppError::generic(format!(
            "{} of {} downloads failed",
            summary.failed.len(),
            summary.requested
        )));
    }
    Ok(())
}

/// Request every key and return the ones that will eventually settle
///
/// Keys refused because the orchestrator is already shutting down never get
/// a state, so waiting on them would never finish.
fn request_all(orchestrator: &Arc<Orchestrator>, keys: &[String]) -> Vec<String> {
    keys.iter()
        .filter(|key| match orchestrator.request_download(key) {
            RequestOutcome::ShuttingDown => {
                warn!("Request for {} refused: shutting down", key);
                false
            }
            RequestOutcome::AlreadyInProgress => {
                debug!("{} is already downloading", key);
                true
            }
            RequestOutcome::Started | RequestOutcome::Queued => true,
        })
        .cloned()
        .collect()
}

/// Positional keys followed by keys from `--input`, duplicates dropped
async fn collect_keys(args: &DownloadArgs) -> Result<Vec<String>> {
    let mut keys = args.keys.clone();

    if let Some(path) = &args.input {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::generic(format!("Failed to read key file {}: {}", path.display(), e))
        })?;
        keys.extend(parse_key_list(&content));
    }

    let mut seen = std::collections::HashSet::new();
    keys.retain(|key| seen.insert(key.clone()));
    Ok(keys)
}

/// Handle the inspect command
pub async fn handle_inspect(args: InspectArgs) -> Result<()> {
    let descriptor = ResourceDescriptor::parse(&args.key)?;

    println!("Variant:   {}", descriptor.variant_name());
    println!("URL:       {}", descriptor.url());
    println!("File name: {}", descriptor.file_name());
    println!("MIME type: {}", descriptor.mime_type());
    match descriptor.total_size() {
        Some(size) => println!("Size:      {} bytes", size),
        None => println!("Size:      learned from the first response"),
    }
    println!("Referer:   {}", descriptor.referer());
    Ok(())
}

/// Handle the config command
pub async fn handle_config(args: ConfigArgs, config_path: Option<PathBuf>) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let written = AppConfig::initialize(path, force).await?;
            println!("Created configuration file: {}", written.display());
        }
        ConfigAction::Show => {
            let config = AppConfig::load(config_path).await?;
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}
