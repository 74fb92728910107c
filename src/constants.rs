//! Application constants for chat_media_fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/117.0";

    /// Accept header sent with media range requests
    pub const MEDIA_ACCEPT: &str =
        "video/webm,video/ogg,video/*;q=0.9,application/ogg;q=0.7,audio/*;q=0.6,*/*;q=0.5";

    /// Accept-Language header sent with media range requests
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

    /// Default HTTP request timeout (covers a whole chunk body)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;
}

/// Rate limiting configuration
pub mod limits {
    /// Default rate limit for range requests (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 20;
}

/// Chunked retrieval constants
pub mod chunks {
    /// Default chunk size: 5 MiB
    pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

    /// Smallest chunk size accepted from configuration
    pub const MIN_CHUNK_SIZE: u64 = 64 * 1024;

    /// MIME type used when the server does not send one
    pub const DEFAULT_MIME_TYPE: &str = "video/mp4";
}

/// Speed estimation constants
pub mod speed {
    /// Number of throughput samples kept in the sliding window
    pub const WINDOW_SAMPLES: usize = 10;

    /// Milliseconds per second
    pub const MS_PER_SECOND: f64 = 1_000.0;

    /// Milliseconds per minute
    pub const MS_PER_MINUTE: f64 = 60_000.0;
}

/// Scheduler constants
pub mod scheduler {
    /// Capacity of the state broadcast channel
    pub const BROADCAST_CAPACITY: usize = 256;
}

/// File persistence constants
pub mod files {
    /// Suffix for files still being written
    pub const TEMP_FILE_SUFFIX: &str = ".part";

    /// Default output directory for saved media
    pub const DEFAULT_OUTPUT_DIR: &str = "downloads";

    /// Fallback file name when none can be derived
    pub const FALLBACK_FILE_NAME: &str = "video.mp4";

    /// Upper bound on " (n)" suffixes tried before giving up
    pub const MAX_NAME_COLLISIONS: u32 = 10_000;
}

/// Web chat client specifics
pub mod telegram {
    /// Origin sent with every media request
    pub const ORIGIN: &str = "https://web.telegram.org";

    /// Referer for the `stream/` (K client) URL shape
    pub const STREAM_REFERER: &str = "https://web.telegram.org/k/";

    /// Referer for the `progressive/` (A client) URL shape
    pub const PROGRESSIVE_REFERER: &str = "https://web.telegram.org/a/";

    /// Path marker of the stream URL shape
    pub const STREAM_MARKER: &str = "stream/";
}

/// Configuration file locations
pub mod config {
    /// Directory name under the user config dir
    pub const APP_DIR: &str = "chat-media-fetcher";

    /// Project-local config file name
    pub const LOCAL_FILE: &str = "chat-media-fetcher.toml";

    /// Config file name under the user config dir
    pub const FILE_NAME: &str = "config.toml";
}
