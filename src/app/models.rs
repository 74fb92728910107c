//! Resource descriptors parsed from resource keys
//!
//! A resource key is the media URL the chat client hands to its `<video>`
//! element. Two URL shapes exist and they carry different metadata, so each key
//! is parsed exactly once, at request time, into a [`ResourceDescriptor`] that
//! holds everything the chunk loop needs.
//!
//! - `.../stream/<percent-encoded JSON>`: the JSON document carries `size`,
//!   `mimeType` and `fileName`, so the total size is known before any fetch.
//! - `.../progressive/document<id>`: only a document id is available; the total
//!   size is learned from the first `Content-Range` response.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{chunks, files, telegram};
use crate::errors::{DownloadError, DownloadResult};

/// Metadata embedded in a `stream/` resource key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetadata {
    /// Data centre id of the media location
    pub dc_id: Option<u32>,
    /// Total size of the media in bytes
    pub size: Option<u64>,
    /// MIME type advertised by the client
    pub mime_type: Option<String>,
    /// Original file name, when the sender supplied one
    pub file_name: Option<String>,
    /// Opaque location document, kept for diagnostics only
    pub location: Option<serde_json::Value>,
}

/// A parsed resource key
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDescriptor {
    /// Stream URL with embedded JSON metadata (size known up front)
    Stream {
        url: Url,
        metadata: StreamMetadata,
        total_size: u64,
    },
    /// Progressive document URL (size learned from the first response)
    Progressive { url: Url, document_id: String },
}

fn progressive_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"progressive/document(\d+)").expect("progressive pattern is a valid regex")
    })
}

fn malformed(key: &str, reason: impl Into<String>) -> DownloadError {
    DownloadError::MalformedResource {
        key: key.to_string(),
        reason: reason.into(),
    }
}

impl ResourceDescriptor {
    /// Parse a resource key into a descriptor
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::MalformedResource` if the key is not an absolute
    /// URL, matches neither URL shape, carries undecodable JSON, or a stream key
    /// lacks a non-zero `size`.
    pub fn parse(key: &str) -> DownloadResult<Self> {
        let url = Url::parse(key).map_err(|e| malformed(key, format!("not a valid URL ({})", e)))?;

        if let Some(index) = key.find(telegram::STREAM_MARKER) {
            let encoded = &key[index + telegram::STREAM_MARKER.len()..];
            let decoded = urlencoding::decode(encoded)
                .map_err(|e| malformed(key, format!("metadata is not valid UTF-8 ({})", e)))?;
            let metadata: StreamMetadata = serde_json::from_str(&decoded)
                .map_err(|e| malformed(key, format!("metadata is not valid JSON ({})", e)))?;

            let total_size = match metadata.size {
                Some(size) if size > 0 => size,
                _ => return Err(malformed(key, "stream metadata missing size information")),
            };

            return Ok(Self::Stream {
                url,
                metadata,
                total_size,
            });
        }

        if let Some(captures) = progressive_pattern().captures(key) {
            let document_id = captures[1].to_string();
            return Ok(Self::Progressive { url, document_id });
        }

        Err(malformed(key, "Invalid video URL format"))
    }

    /// URL to fetch
    pub fn url(&self) -> &Url {
        match self {
            Self::Stream { url, .. } | Self::Progressive { url, .. } => url,
        }
    }

    /// Total size when known before fetching
    pub fn total_size(&self) -> Option<u64> {
        match self {
            Self::Stream { total_size, .. } => Some(*total_size),
            Self::Progressive { .. } => None,
        }
    }

    /// Suggested file name before any response has been seen
    pub fn file_name(&self) -> String {
        match self {
            Self::Stream { metadata, .. } => metadata
                .file_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| files::FALLBACK_FILE_NAME.to_string()),
            Self::Progressive { document_id, .. } => format!("video_{}.mp4", document_id),
        }
    }

    /// File name once the response content type is known
    ///
    /// Progressive media takes its extension from the MIME subtype; stream
    /// media keeps the name the sender chose.
    pub fn file_name_for(&self, content_type: Option<&str>) -> String {
        let name = self.file_name();
        match (self, content_type.and_then(video_subtype)) {
            (Self::Progressive { .. }, Some(ext)) => match name.find('.') {
                Some(dot) => format!("{}{}", &name[..=dot], ext),
                None => format!("{}.{}", name, ext),
            },
            _ => name,
        }
    }

    /// MIME type advertised by the key, if any
    pub fn mime_type(&self) -> &str {
        match self {
            Self::Stream { metadata, .. } => metadata
                .mime_type
                .as_deref()
                .unwrap_or(chunks::DEFAULT_MIME_TYPE),
            Self::Progressive { .. } => chunks::DEFAULT_MIME_TYPE,
        }
    }

    /// Referer header the chat client sends for this URL shape
    pub fn referer(&self) -> &'static str {
        match self {
            Self::Stream { .. } => telegram::STREAM_REFERER,
            Self::Progressive { .. } => telegram::PROGRESSIVE_REFERER,
        }
    }

    /// Whether responses must carry a `video/*` content type
    pub fn requires_video_content(&self) -> bool {
        matches!(self, Self::Progressive { .. })
    }

    /// Short name of the URL shape
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Stream { .. } => "stream",
            Self::Progressive { .. } => "progressive",
        }
    }
}

/// Extract the subtype of a `video/*` MIME type, ignoring parameters
pub fn video_subtype(content_type: &str) -> Option<&str> {
    let mime = content_type.split(';').next()?.trim();
    let subtype = mime.strip_prefix("video/")?;
    if subtype.is_empty() {
        None
    } else {
        Some(subtype)
    }
}
