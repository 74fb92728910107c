//! Sequential chunk retrieval for one admitted run
//!
//! A run parses its key, then requests consecutive byte ranges until the
//! whole resource is buffered, publishing progress after every chunk. The
//! run's cancellation token is checked before each request and again after
//! each response; a cancelled run discards whatever it fetched.
//!
//! Progress is only published while the run still holds the slot for its
//! key, under the scheduler lock, so an evicted run can never overwrite the
//! state of the run that replaced it.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info};

use super::Orchestrator;
use crate::app::client::RangeRequest;
use crate::app::models::ResourceDescriptor;
use crate::app::queue::ActiveRun;
use crate::app::sink::AssembledFile;
use crate::app::speed::SpeedEstimator;
use crate::app::state::{DownloadStatus, StateUpdate};
use crate::errors::DownloadError;

/// How a run ended
#[derive(Debug)]
pub(super) enum RunOutcome {
    /// File assembled and handed to the sink
    Completed { path: PathBuf, total: u64 },
    /// Evicted or shut down; fetched bytes were discarded
    Cancelled,
    Failed(DownloadError),
}

/// Offsets of the next range to request
///
/// With a known total the range is `[downloaded, min(downloaded + chunk - 1,
/// total - 1)]`; without one the rest of the file is requested.
pub fn next_range(downloaded: u64, chunk_size: u64, total: Option<u64>) -> (u64, Option<u64>) {
    match total {
        Some(total) => {
            let end = downloaded
                .saturating_add(chunk_size.saturating_sub(1))
                .min(total.saturating_sub(1));
            (downloaded, Some(end))
        }
        None => (downloaded, None),
    }
}

/// Percentage of `total` covered by `downloaded`
pub fn progress_percent(downloaded: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (downloaded as f64 / total as f64 * 100.0).min(100.0)
}

impl Orchestrator {
    /// Fetch, assemble and save one resource
    pub(super) async fn run_chunks(&self, key: &str, run: &ActiveRun) -> RunOutcome {
        let descriptor = match ResourceDescriptor::parse(key) {
            Ok(descriptor) => descriptor,
            Err(e) => return RunOutcome::Failed(e),
        };

        let mut known_total = descriptor.total_size();
        let initial = StateUpdate {
            status: Some(DownloadStatus::Downloading),
            total_size: known_total,
            ..Default::default()
        }
        .with_file_name(descriptor.file_name());
        if !self.publish(key, run.generation, initial) {
            return RunOutcome::Cancelled;
        }

        info!(
            "Downloading {} ({}, {})",
            descriptor.file_name(),
            descriptor.variant_name(),
            known_total.map_or_else(|| "size unknown".to_string(), |t| format!("{} bytes", t))
        );

        let mut buffer: Vec<u8> = Vec::new();
        let mut downloaded: u64 = 0;
        let mut content_type: Option<String> = None;
        let mut estimator = SpeedEstimator::new(Instant::now());

        loop {
            if run.token.is_cancelled() {
                return RunOutcome::Cancelled;
            }
            if let Some(total) = known_total {
                if downloaded >= total {
                    break;
                }
            }

            let (start, end) = next_range(downloaded, self.config.chunk_size, known_total);
            let request = RangeRequest {
                url: descriptor.url().clone(),
                start,
                end,
                known_total,
                referer: descriptor.referer().to_string(),
                require_video: descriptor.requires_video_content(),
            };
            debug!("Requesting {} for {}", request.header_value(), key);

            let chunk = match self.fetcher.fetch_range(&request).await {
                Ok(chunk) => chunk,
                Err(_) if run.token.is_cancelled() => return RunOutcome::Cancelled,
                Err(e) => return RunOutcome::Failed(e),
            };

            // The request always completes; an evicted run drops the result
            if run.token.is_cancelled() {
                return RunOutcome::Cancelled;
            }

            if chunk.bytes.is_empty() {
                return RunOutcome::Failed(DownloadError::EmptyChunk { offset: downloaded });
            }

            let total = *known_total.get_or_insert(chunk.total_size);
            if content_type.is_none() {
                content_type = chunk.content_type.clone();
            }

            let size = chunk.size();
            downloaded += size;
            if downloaded > total {
                return RunOutcome::Failed(DownloadError::SizeMismatch {
                    expected: total,
                    actual: downloaded,
                });
            }
            buffer.extend_from_slice(&chunk.bytes);
            estimator.record(size, Instant::now());

            let update = StateUpdate::downloading(
                progress_percent(downloaded, total),
                downloaded,
                total,
                estimator.time_remaining(total, downloaded),
            );
            if !self.publish(key, run.generation, update) {
                return RunOutcome::Cancelled;
            }
        }

        if run.token.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let file = AssembledFile {
            file_name: descriptor.file_name_for(content_type.as_deref()),
            mime_type: content_type.unwrap_or_else(|| descriptor.mime_type().to_string()),
            bytes: buffer,
        };

        match self.sink.save(file).await {
            Ok(path) => RunOutcome::Completed {
                path,
                total: downloaded,
            },
            Err(e) => RunOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_next_range_known_total() {
        let total = Some(12 * MIB);
        assert_eq!(next_range(0, 5 * MIB, total), (0, Some(5_242_879)));
        assert_eq!(
            next_range(5_242_880, 5 * MIB, total),
            (5_242_880, Some(10_485_759))
        );
        assert_eq!(
            next_range(10_485_760, 5 * MIB, total),
            (10_485_760, Some(12_582_911))
        );
    }

    #[test]
    fn test_next_range_small_resource() {
        assert_eq!(next_range(0, 5 * MIB, Some(10)), (0, Some(9)));
        assert_eq!(next_range(0, 1, Some(10)), (0, Some(0)));
    }

    #[test]
    fn test_next_range_unknown_total() {
        assert_eq!(next_range(0, 5 * MIB, None), (0, None));
        assert_eq!(next_range(42, 5 * MIB, None), (42, None));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 0), 0.0);
        assert_eq!(progress_percent(5, 10), 50.0);
        assert_eq!(progress_percent(10, 10), 100.0);
        assert_eq!(progress_percent(11, 10), 100.0);
    }
}
