//! Local persistence for uploaded files.
//!
//! Uploads are written under a UUID key so client-supplied names never reach the filesystem.
//! The original extension is kept (sanitized) because parser routing keys off it. Stored files
//! are never removed while the process runs.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 16;

/// Errors raised while persisting uploads.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Storage directory could not be created.
    #[error("Failed to create storage directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Upload bytes could not be written.
    #[error("Failed to write upload {file_name}: {source}")]
    Write {
        /// Client-supplied file name.
        file_name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A file received from a client, before persistence.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name.
    pub file_name: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

/// Record of an upload written to disk.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Client-supplied file name, kept only as metadata.
    pub original_name: String,
    /// Location of the stored bytes.
    pub path: PathBuf,
    /// SHA-256 of the content, hex encoded.
    pub checksum: String,
    /// Content length in bytes.
    pub size_bytes: usize,
    /// Time the upload was written, RFC 3339.
    pub uploaded_at: String,
}

/// Directory-backed upload store.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    /// Create a store rooted at `root`. The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory receiving uploads.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `file` under a fresh key and return its storage record.
    pub async fn persist(&self, file: &UploadedFile) -> Result<StoredUpload, StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: self.root.display().to_string(),
                source,
            })?;

        let key = match sanitized_extension(&file.file_name) {
            Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
            None => Uuid::new_v4().to_string(),
        };
        let path = self.root.join(key);

        tokio::fs::write(&path, &file.bytes)
            .await
            .map_err(|source| StorageError::Write {
                file_name: file.file_name.clone(),
                source,
            })?;

        let stored = StoredUpload {
            original_name: file.file_name.clone(),
            path,
            checksum: compute_checksum(&file.bytes),
            size_bytes: file.bytes.len(),
            uploaded_at: current_timestamp_rfc3339(),
        };
        tracing::debug!(
            file = %stored.original_name,
            path = %stored.path.display(),
            size_bytes = stored.size_bytes,
            checksum = %stored.checksum,
            uploaded_at = %stored.uploaded_at,
            "Upload stored"
        );
        Ok(stored)
    }
}

/// Compute a SHA-256 digest of upload content.
pub fn compute_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn sanitized_extension(file_name: &str) -> Option<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
