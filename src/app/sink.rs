//! File persistence for assembled downloads
//!
//! The orchestrator hands every finished resource to a [`FileSink`] as one
//! buffer. [`DiskSink`] writes it under an output directory using a temporary
//! `.part` file followed by an atomic rename, and never overwrites an existing
//! file. [`MemorySink`] keeps the files in memory.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::constants::files;
use crate::errors::{DownloadError, DownloadResult};

/// A fully downloaded resource ready to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledFile {
    /// Suggested file name (not yet sanitized)
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl AssembledFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Collaborator that persists assembled files
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Persist `file`, returning where it ended up
    ///
    /// # Errors
    ///
    /// Any failure is reported as a download error and ends the run in `error`
    async fn save(&self, file: AssembledFile) -> DownloadResult<PathBuf>;
}

/// Writes files into a directory on disk
#[derive(Debug)]
pub struct DiskSink {
    output_dir: PathBuf,
    /// Serializes name selection and rename so two saves never pick one name
    naming: Mutex<()>,
}

impl DiskSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            naming: Mutex::new(()),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn ensure_output_dir(&self) -> DownloadResult<()> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| DownloadError::Sink {
                path: self.output_dir.clone(),
                reason: format!("cannot create output directory: {}", e),
            })
    }

    /// First free path for `file_name`, adding ` (n)` before the extension
    async fn available_path(&self, file_name: &str) -> DownloadResult<PathBuf> {
        let candidate = self.output_dir.join(file_name);
        if !fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }

        let (stem, extension) = split_extension(file_name);
        for n in 1..=files::MAX_NAME_COLLISIONS {
            let name = match extension {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            let candidate = self.output_dir.join(name);
            if !fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(DownloadError::Sink {
            path: self.output_dir.join(file_name),
            reason: "too many files with the same name".to_string(),
        })
    }
}

#[async_trait]
impl FileSink for DiskSink {
    async fn save(&self, file: AssembledFile) -> DownloadResult<PathBuf> {
        self.ensure_output_dir().await?;

        let file_name = sanitize_file_name(&file.file_name);
        let _guard = self.naming.lock().await;
        let final_path = self.available_path(&file_name).await?;

        let mut temp_name = final_path.as_os_str().to_owned();
        temp_name.push(files::TEMP_FILE_SUFFIX);
        let temp_path = PathBuf::from(temp_name);

        if let Err(e) = fs::write(&temp_path, &file.bytes).await {
            error!("Failed to write temporary file {}: {}", temp_path.display(), e);
            let _ = fs::remove_file(&temp_path).await;
            return Err(DownloadError::Sink {
                path: temp_path,
                reason: e.to_string(),
            });
        }

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            error!("Failed to rename temporary file: {}", e);
            let _ = fs::remove_file(&temp_path).await;
            return Err(DownloadError::Sink {
                path: final_path,
                reason: format!("atomic rename failed: {}", e),
            });
        }

        info!(
            "Saved {} ({} bytes, {})",
            final_path.display(),
            file.size(),
            file.mime_type
        );
        Ok(final_path)
    }
}

/// Keeps saved files in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    files: StdMutex<Vec<AssembledFile>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files saved so far, in save order
    pub fn files(&self) -> Vec<AssembledFile> {
        self.files
            .lock()
            .map(|files| files.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FileSink for MemorySink {
    async fn save(&self, file: AssembledFile) -> DownloadResult<PathBuf> {
        let path = PathBuf::from(sanitize_file_name(&file.file_name));
        debug!("Keeping {} in memory ({} bytes)", path.display(), file.size());
        match self.files.lock() {
            Ok(mut files) => {
                files.push(file);
                Ok(path)
            }
            Err(_) => Err(DownloadError::Sink {
                path,
                reason: "memory sink lock poisoned".to_string(),
            }),
        }
    }
}

/// Make a suggested name safe to use as a single path component
///
/// Path separators, characters reserved on common filesystems and control
/// characters become `_`; leading/trailing dots and whitespace are trimmed.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        files::FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(index) if index > 0 && index + 1 < file_name.len() => {
            (&file_name[..index], Some(&file_name[index + 1..]))
        }
        _ => (file_name, None),
    }
}
