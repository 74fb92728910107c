//! Core HTTP operations with rate limiting
//!
//! This module sends the ranged GET requests. Every request waits on a shared
//! token-bucket rate limiter and carries the headers the web client itself
//! sends for media playback. Failed requests are not retried here: a failed
//! chunk ends the download in `error` and retry is a user decision.

use std::num::NonZeroU32;

use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_RANGE, CONTENT_TYPE, COOKIE,
    ORIGIN, PRAGMA, RANGE, REFERER,
};
use reqwest::Client;
use tracing::debug;

use super::range::{check_status, validate_chunk, ChunkResponse, RangeRequest, ResponseParts};
use crate::constants::{http, telegram};
use crate::errors::{ConfigError, ConfigResult, DownloadResult};

/// HTTP operations handler with rate limiting
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>,
    cookie: Option<String>,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limiting
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the rate limit is zero
    pub fn new(client: Client, rate_limit_rps: u32, cookie: Option<String>) -> ConfigResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            cookie,
        })
    }

    /// Builds the rate limiter with the specified rate limit
    fn build_rate_limiter(
        rate_limit_rps: u32,
    ) -> ConfigResult<RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>> {
        let per_second =
            NonZeroU32::new(rate_limit_rps).ok_or_else(|| ConfigError::InvalidValue {
                field: "client.rate_limit_rps".to_string(),
                value: rate_limit_rps.to_string(),
                reason: "Rate limit must be non-zero".to_string(),
            })?;
        Ok(RateLimiter::direct(Quota::per_second(per_second)))
    }

    /// Performs one ranged GET and validates the response
    ///
    /// The status is checked before the body is read; the `Content-Range`,
    /// size and content-type checks run once the chunk has arrived.
    pub async fn get_range(&self, request: &RangeRequest) -> DownloadResult<ChunkResponse> {
        self.rate_limiter.until_ready().await;

        let mut builder = self
            .client
            .get(request.url.as_str())
            .header(RANGE, request.header_value())
            .header(ACCEPT, http::MEDIA_ACCEPT)
            .header(ACCEPT_ENCODING, "identity")
            .header(ACCEPT_LANGUAGE, http::ACCEPT_LANGUAGE)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .header(REFERER, request.referer.as_str())
            .header(ORIGIN, telegram::ORIGIN)
            .header("Sec-Fetch-Dest", "video")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-origin");

        if let Some(cookie) = &self.cookie {
            builder = builder.header(COOKIE, cookie.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        check_status(status)?;

        let parts = ResponseParts {
            status,
            content_range: header_string(&response, CONTENT_RANGE),
            content_type: header_string(&response, CONTENT_TYPE),
        };

        debug!(
            "Range {} answered {} ({})",
            request.header_value(),
            status,
            parts.content_range.as_deref().unwrap_or("no Content-Range")
        );

        let bytes = response.bytes().await?.to_vec();
        validate_chunk(request, &parts, bytes)
    }
}

fn header_string(
    response: &reqwest::Response,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
