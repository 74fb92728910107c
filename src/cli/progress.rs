//! Progress display driven by state snapshots
//!
//! The orchestrator broadcasts the whole state collection after every
//! mutation; this module turns those snapshots into terminal output.
//!
//! # Modes
//!
//! - **Bars**: one indicatif bar per resource when stderr is a terminal
//! - **Text**: one line per status change when it is not
//! - **Json**: every snapshot as one JSON line on stdout
//!
//! # Examples
//!
//! ```rust,no_run
//! use chat_media_fetcher::cli::{DisplayMode, ProgressDisplay};
//! use chat_media_fetcher::app::StateSnapshot;
//!
//! let keys = vec!["https://web.telegram.org/a/progressive/document1".to_string()];
//! let mut display = ProgressDisplay::new(DisplayMode::detect(false, false), &keys);
//! display.render(&StateSnapshot::default());
//! ```

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use tracing::debug;

use crate::app::{DownloadState, DownloadStatus, StateSnapshot};

const BAR_TEMPLATE: &str =
    "{prefix:<30} [{bar:30.cyan/blue}] {bytes:>10}/{total_bytes:<10} {msg}";
const LABEL_WIDTH: usize = 30;

/// How progress is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Bars,
    Text,
    Json,
    /// Nothing but the summary
    Silent,
}

impl DisplayMode {
    /// Pick a mode from flags and whether stderr is a terminal
    pub fn detect(json: bool, quiet: bool) -> Self {
        if json {
            DisplayMode::Json
        } else if quiet {
            DisplayMode::Silent
        } else if atty::is(atty::Stream::Stderr) {
            DisplayMode::Bars
        } else {
            DisplayMode::Text
        }
    }
}

/// Outcome of a download session for the listed keys
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DownloadSummary {
    pub requested: usize,
    pub completed: usize,
    /// `(key, error message)` of every failed key
    pub failed: Vec<(String, String)>,
    pub total_bytes: u64,
    #[serde(skip)]
    pub duration: Duration,
}

impl DownloadSummary {
    /// Tally the final state of `keys`
    pub fn from_snapshot(snapshot: &StateSnapshot, keys: &[String], duration: Duration) -> Self {
        let mut summary = Self {
            requested: keys.len(),
            duration,
            ..Default::default()
        };

        for key in keys {
            match snapshot.get(key) {
                Some(state) if state.status == DownloadStatus::Completed => {
                    summary.completed += 1;
                    summary.total_bytes += state.total_size;
                }
                Some(state) => summary.failed.push((
                    key.clone(),
                    state
                        .error_message
                        .clone()
                        .unwrap_or_else(|| format!("ended in state {}", state.status)),
                )),
                None => summary
                    .failed
                    .push((key.clone(), "never started".to_string())),
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Print the human-readable summary to stderr
    pub fn print(&self) {
        eprintln!("\nDownload Summary:");
        eprintln!("  Requested: {}", self.requested);
        eprintln!("  Completed: {}", self.completed);
        eprintln!("  Failed: {}", self.failed.len());
        eprintln!("  Total bytes: {}", self.total_bytes);
        eprintln!("  Duration: {:.1?}", self.duration);

        for (key, message) in &self.failed {
            eprintln!("  ✗ {}: {}", shorten(key, 60), message);
        }
    }
}

/// Renders snapshots for a fixed list of keys
pub struct ProgressDisplay {
    mode: DisplayMode,
    keys: Vec<String>,
    multi: Option<MultiProgress>,
    bars: HashMap<String, ProgressBar>,
    last_status: HashMap<String, DownloadStatus>,
}

impl ProgressDisplay {
    /// Create a display for `keys`
    pub fn new(mode: DisplayMode, keys: &[String]) -> Self {
        let multi = (mode == DisplayMode::Bars)
            .then(|| MultiProgress::with_draw_target(ProgressDrawTarget::stderr()));

        let mut display = Self {
            mode,
            keys: keys.to_vec(),
            multi,
            bars: HashMap::new(),
            last_status: HashMap::new(),
        };

        if let Some(multi) = &display.multi {
            let style = bar_style();
            for key in keys {
                let bar = multi.add(ProgressBar::new(0));
                bar.set_style(style.clone());
                bar.set_prefix(shorten(key, LABEL_WIDTH));
                bar.set_message("waiting");
                display.bars.insert(key.clone(), bar);
            }
        }

        debug!("Progress display started for {} keys ({:?})", keys.len(), mode);
        display
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Reflect one snapshot
    pub fn render(&mut self, snapshot: &StateSnapshot) {
        match self.mode {
            DisplayMode::Json => match serde_json::to_string(snapshot) {
                Ok(line) => println!("{}", line),
                Err(e) => debug!("Could not serialize snapshot: {}", e),
            },
            DisplayMode::Bars => {
                for key in &self.keys {
                    if let (Some(state), Some(bar)) = (snapshot.get(key), self.bars.get(key)) {
                        update_bar(bar, state);
                    }
                }
            }
            DisplayMode::Text => {
                for key in &self.keys {
                    let Some(state) = snapshot.get(key) else {
                        continue;
                    };
                    if self.last_status.get(key) != Some(&state.status) {
                        eprintln!("{}", status_line(key, state));
                        self.last_status.insert(key.clone(), state.status);
                    }
                }
            }
            DisplayMode::Silent => {}
        }
    }

    /// Render the final snapshot and stop every bar where it is
    pub fn finish(&mut self, snapshot: &StateSnapshot) {
        self.render(snapshot);
        for bar in self.bars.values() {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

fn update_bar(bar: &ProgressBar, state: &DownloadState) {
    if let Some(name) = &state.file_name {
        bar.set_prefix(shorten(name, LABEL_WIDTH));
    }
    if state.total_size > 0 {
        bar.set_length(state.total_size);
    }

    match state.status {
        DownloadStatus::Completed => {
            bar.set_position(state.total_size);
            bar.finish_with_message("done");
        }
        DownloadStatus::Error => {
            let message = state.error_message.as_deref().unwrap_or("failed");
            bar.abandon_with_message(format!("error: {}", message));
        }
        DownloadStatus::Queued => {
            bar.set_position(0);
            bar.set_message("queued");
        }
        _ => {
            bar.set_position(state.downloaded_size);
            bar.set_message(format!("{} {}", state.status, state.time_remaining));
        }
    }
}

/// One-line description of a state for text mode
pub fn status_line(key: &str, state: &DownloadState) -> String {
    let label = state
        .file_name
        .as_deref()
        .map(|name| shorten(name, LABEL_WIDTH))
        .unwrap_or_else(|| shorten(key, LABEL_WIDTH));

    match state.status {
        DownloadStatus::Error => format!(
            "[error] {}: {}",
            label,
            state.error_message.as_deref().unwrap_or("failed")
        ),
        DownloadStatus::Completed => match &state.saved_path {
            Some(path) => format!("[completed] {} -> {}", label, path.display()),
            None => format!("[completed] {}", label),
        },
        status => format!("[{}] {}", status, label),
    }
}

/// Keep the last `width` characters, marking the cut with `...`
fn shorten(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count <= width {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - width.saturating_sub(3)).collect();
    format!("...{}", tail)
}
