//! Blob storage seam used by the upload workflow.

use crate::models::file_meta::UploadedFileMeta;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object path `{0}`")]
    InvalidObjectPath(String),
    #[error("upload of `{name}` failed: {reason}")]
    UploadFailed { name: String, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Stores binary blobs keyed by path.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` at `{folder}/{filename}` and describe the stored blob.
    async fn upload(
        &self,
        folder: &str,
        filename: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<UploadedFileMeta>;

    /// Remove the blob at `full_path`.
    async fn delete(&self, full_path: &str) -> StorageResult<()>;
}
