//! Upload inputs and the descriptors that replace them once stored.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A blob that has not been uploaded yet.
#[derive(Clone, Debug)]
pub struct FileInput {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FileInput {
    pub fn new(
        name: impl Into<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type,
            data: data.into(),
        }
    }

    /// Declared MIME type, falling back to `application/octet-stream`.
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// Resolved metadata of a stored blob.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadedFileMeta {
    /// Original file name.
    pub name: String,

    /// Stored path (`{folder}/{name}`).
    pub full_path: String,

    /// Public URL the blob can be fetched from.
    pub download_url: String,

    pub content_type: String,

    /// Payload size in bytes.
    pub size: u64,

    /// MD5 of the payload, hex encoded.
    pub etag: String,

    pub time_created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}
