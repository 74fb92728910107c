//! Shared fixtures for orchestrator integration tests
//!
//! `ScriptedFetcher` stands in for the media server: it serves registered
//! byte buffers for ranged requests, records every request it sees and can
//! be told to misbehave at a given offset.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use url::Url;

use chat_media_fetcher::app::client::range::{validate_chunk, ResponseParts};
use chat_media_fetcher::app::{
    ChunkResponse, MemorySink, Orchestrator, OrchestratorConfig, RangeFetcher, RangeRequest,
    StateSnapshot,
};
use chat_media_fetcher::errors::DownloadResult;

pub const MIB: u64 = 1024 * 1024;

/// Upper bound for any wait in these tests
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One request as seen by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub url: String,
    pub start: u64,
    pub end: Option<u64>,
}

#[derive(Debug, Clone)]
struct Resource {
    bytes: Arc<Vec<u8>>,
    content_type: String,
    /// Answer the request at this offset as if the range were ignored
    gap_at: Option<u64>,
    /// Report `(offset, total)`: a different total for the request at offset
    total_change_at: Option<(u64, u64)>,
    /// Answer every request with this status
    status: u16,
    /// Longest body returned for an open-ended range
    open_range_limit: u64,
}

/// In-memory media server driven through the `RangeFetcher` seam
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    resources: Mutex<HashMap<String, Resource>>,
    requests: Mutex<Vec<SeenRequest>>,
    delay: Duration,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Serve `bytes` for `key`
    pub fn serve(self, key: &str, bytes: Vec<u8>, content_type: &str) -> Self {
        let total = bytes.len() as u64;
        self.resources.lock().unwrap().insert(
            normalize(key),
            Resource {
                bytes: Arc::new(bytes),
                content_type: content_type.to_string(),
                gap_at: None,
                total_change_at: None,
                status: 206,
                open_range_limit: total,
            },
        );
        self
    }

    /// Restart from offset 0 when asked for `offset`
    pub fn gap_at(self, key: &str, offset: u64) -> Self {
        self.update(key, |resource| resource.gap_at = Some(offset));
        self
    }

    /// Report `total` instead of the real size when asked for `offset`
    pub fn total_changes_at(self, key: &str, offset: u64, total: u64) -> Self {
        self.update(key, |resource| resource.total_change_at = Some((offset, total)));
        self
    }

    /// Answer every request for `key` with `status`
    pub fn fail_with(self, key: &str, status: u16) -> Self {
        self.update(key, |resource| resource.status = status);
        self
    }

    /// Cap bodies returned for `bytes=<start>-` requests
    pub fn limit_open_ranges(self, key: &str, limit: u64) -> Self {
        self.update(key, |resource| resource.open_range_limit = limit);
        self
    }

    fn update(&self, key: &str, f: impl FnOnce(&mut Resource)) {
        let mut resources = self.resources.lock().unwrap();
        let resource = resources
            .get_mut(&normalize(key))
            .expect("resource registered before configuring it");
        f(resource);
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests received for one key
    pub fn requests_for(&self, key: &str) -> Vec<SeenRequest> {
        let url = normalize(key);
        self.requests()
            .into_iter()
            .filter(|request| request.url == url)
            .collect()
    }
}

#[async_trait]
impl RangeFetcher for ScriptedFetcher {
    async fn fetch_range(&self, request: &RangeRequest) -> DownloadResult<ChunkResponse> {
        let url = request.url.to_string();
        self.requests.lock().unwrap().push(SeenRequest {
            url: url.clone(),
            start: request.start,
            end: request.end,
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let resource = self.resources.lock().unwrap().get(&url).cloned();
        let Some(resource) = resource else {
            let parts = ResponseParts {
                status: 404,
                ..Default::default()
            };
            return validate_chunk(request, &parts, Vec::new());
        };

        let total = resource.bytes.len() as u64;
        let start = if resource.gap_at == Some(request.start) {
            0
        } else {
            request.start
        };
        let end = match request.end {
            Some(end) => end.min(total - 1),
            None => (start + resource.open_range_limit).min(total) - 1,
        };

        let reported_total = match resource.total_change_at {
            Some((offset, changed)) if offset == request.start => changed,
            _ => total,
        };

        let body = resource.bytes[start as usize..=end as usize].to_vec();
        let parts = ResponseParts {
            status: resource.status,
            content_range: Some(format!("bytes {}-{}/{}", start, end, reported_total)),
            content_type: Some(resource.content_type.clone()),
        };
        validate_chunk(request, &parts, body)
    }
}

/// Canonical URL string, as the orchestrator will send it
pub fn normalize(key: &str) -> String {
    Url::parse(key)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| key.to_string())
}

/// A `stream/` key advertising `size` bytes
pub fn stream_key(name: &str, size: u64) -> String {
    let json = serde_json::json!({
        "dcId": 2,
        "size": size,
        "mimeType": "video/mp4",
        "fileName": name,
    });
    format!(
        "https://web.telegram.org/k/stream/{}",
        urlencoding::encode(&json.to_string())
    )
}

/// A `progressive/` key for document `id`
pub fn progressive_key(id: u64) -> String {
    format!("https://web.telegram.org/a/progressive/document{}", id)
}

/// Deterministic test payload
pub fn payload(len: u64) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Orchestrator wired to a scripted fetcher and an in-memory sink
pub fn orchestrator(
    config: OrchestratorConfig,
    fetcher: ScriptedFetcher,
) -> (Arc<Orchestrator>, Arc<ScriptedFetcher>, Arc<MemorySink>) {
    let fetcher = Arc::new(fetcher);
    let sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::new(config, fetcher.clone(), sink.clone()).unwrap();
    (orchestrator, fetcher, sink)
}

/// Wait for `keys` to settle, failing the test after `TEST_TIMEOUT`
pub async fn settle(orchestrator: &Orchestrator, keys: &[String]) -> StateSnapshot {
    tokio::time::timeout(TEST_TIMEOUT, orchestrator.wait_until_settled(keys))
        .await
        .expect("downloads did not settle in time")
}

/// Collect every snapshot broadcast until `done` returns true for one
pub async fn collect_until(
    mut receiver: broadcast::Receiver<StateSnapshot>,
    done: impl Fn(&StateSnapshot) -> bool,
) -> Vec<StateSnapshot> {
    let mut seen = Vec::new();
    let collect = async {
        loop {
            match receiver.recv().await {
                Ok(snapshot) => {
                    let finished = done(&snapshot);
                    seen.push(snapshot);
                    if finished {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    tokio::time::timeout(TEST_TIMEOUT, collect)
        .await
        .expect("expected snapshot never arrived");
    seen
}
