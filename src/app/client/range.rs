//! Byte-range request/response bookkeeping
//!
//! Everything here is independent of the HTTP stack so the validation rules
//! can be exercised without a server: the status check, the `Content-Range`
//! continuity check (gap detection), the total-size consistency check and the
//! content-type check for progressive media.

use url::Url;

use crate::app::models::video_subtype;
use crate::errors::{DownloadError, DownloadResult};

/// One ranged GET to perform
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRequest {
    /// Resource URL
    pub url: Url,
    /// First byte requested
    pub start: u64,
    /// Last byte requested (inclusive); `None` asks for the rest of the file
    pub end: Option<u64>,
    /// Total size established by metadata or an earlier response
    pub known_total: Option<u64>,
    /// Referer header for the request
    pub referer: String,
    /// Reject responses whose content type is not `video/*`
    pub require_video: bool,
}

impl RangeRequest {
    /// Value of the `Range` header
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// Validated payload of one ranged response
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResponse {
    /// Raw chunk bytes
    pub bytes: Vec<u8>,
    /// Offset confirmed by the server
    pub start: u64,
    /// Total size of the resource confirmed by the server
    pub total_size: u64,
    /// Content type of the response, without parameters
    pub content_type: Option<String>,
}

impl ChunkResponse {
    /// Size of this chunk in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ContentRange {
    /// Parse a `Content-Range` header value
    pub fn parse(value: &str) -> DownloadResult<Self> {
        let invalid = || DownloadError::InvalidContentRange {
            value: value.to_string(),
        };

        let range = value.trim().strip_prefix("bytes ").ok_or_else(invalid)?;
        let (span, total) = range.split_once('/').ok_or_else(invalid)?;
        let (start, end) = span.split_once('-').ok_or_else(invalid)?;

        let start: u64 = start.trim().parse().map_err(|_| invalid())?;
        let end: u64 = end.trim().parse().map_err(|_| invalid())?;
        let total: u64 = total.trim().parse().map_err(|_| invalid())?;

        if end < start || end >= total {
            return Err(invalid());
        }

        Ok(Self { start, end, total })
    }
}

/// Response metadata needed for validation
#[derive(Debug, Clone, Default)]
pub struct ResponseParts {
    pub status: u16,
    pub content_range: Option<String>,
    pub content_type: Option<String>,
}

/// Reject any status other than 200 or 206
pub fn check_status(status: u16) -> DownloadResult<()> {
    if status == 200 || status == 206 {
        Ok(())
    } else {
        Err(DownloadError::Transport { status })
    }
}

/// Reject non-video bodies when the request demands video
pub fn check_content_type(request: &RangeRequest, content_type: Option<&str>) -> DownloadResult<()> {
    if !request.require_video {
        return Ok(());
    }
    match content_type {
        Some(mime) if video_subtype(mime).is_some() => Ok(()),
        other => Err(DownloadError::NotVideo {
            mime: other.unwrap_or_default().to_string(),
        }),
    }
}

/// Validate a complete response against the request and build the chunk
///
/// Returns the confirmed chunk. A missing `Content-Range` is only acceptable
/// for a full 200 answer to a request starting at offset 0; the body is then
/// the whole resource.
pub fn validate_chunk(
    request: &RangeRequest,
    parts: &ResponseParts,
    bytes: Vec<u8>,
) -> DownloadResult<ChunkResponse> {
    check_status(parts.status)?;
    check_content_type(request, parts.content_type.as_deref())?;

    let (start, total) = match parts.content_range.as_deref() {
        Some(value) => {
            let range = ContentRange::parse(value)?;
            (range.start, range.total)
        }
        None if parts.status == 200 && request.start == 0 => (0, bytes.len() as u64),
        None => {
            return Err(DownloadError::Gap {
                expected: request.start,
                actual: 0,
            })
        }
    };

    if start != request.start {
        return Err(DownloadError::Gap {
            expected: request.start,
            actual: start,
        });
    }

    if let Some(expected) = request.known_total {
        if expected != total {
            return Err(DownloadError::SizeMismatch {
                expected,
                actual: total,
            });
        }
    }

    let content_type = parts
        .content_type
        .as_deref()
        .and_then(|value| value.split(';').next())
        .map(|mime| mime.trim().to_string())
        .filter(|mime| !mime.is_empty());

    Ok(ChunkResponse {
        bytes,
        start,
        total_size: total,
        content_type,
    })
}
