//! Byte-range fetching for media resources
//!
//! The download core only depends on the [`RangeFetcher`] trait: one ranged GET
//! in, one validated chunk out. [`MediaClient`] is the reqwest-backed
//! implementation used by the CLI; tests plug in scripted fetchers.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `http`: rate-limited ranged GET with browser-like headers
//! - `range`: request/response types and validation rules

use async_trait::async_trait;

use crate::errors::{DownloadResult, Result};

pub mod config;
pub mod http;
pub mod range;

pub use config::ClientConfig;
pub use range::{ChunkResponse, ContentRange, RangeRequest};

use http::HttpHandler;

/// Performs a single validated ranged GET
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Fetch `request.start..=request.end` (or the rest of the file)
    ///
    /// # Errors
    ///
    /// - `Transport` for any status other than 200/206
    /// - `Gap` when the server's range does not start at `request.start`
    /// - `SizeMismatch` when the total differs from `request.known_total`
    async fn fetch_range(&self, request: &RangeRequest) -> DownloadResult<ChunkResponse>;
}

/// HTTP client for media range requests
#[derive(Debug)]
pub struct MediaClient {
    http_handler: HttpHandler,
}

impl MediaClient {
    /// Creates a new MediaClient with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a new MediaClient with custom configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the reqwest client cannot be built or the rate
    /// limit is zero
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, config.rate_limit_rps, config.cookie.clone())?;

        tracing::info!(
            "Created media client ({} req/s, timeout {:?})",
            config.rate_limit_rps,
            config.request_timeout
        );

        Ok(Self { http_handler })
    }
}

#[async_trait]
impl RangeFetcher for MediaClient {
    async fn fetch_range(&self, request: &RangeRequest) -> DownloadResult<ChunkResponse> {
        self.http_handler.get_range(request).await
    }
}
