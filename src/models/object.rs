//! Represents a blob stored by the local object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for a single stored blob.
///
/// The payload itself lives on disk; this struct only mirrors the `objects`
/// table.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Full object path, e.g. `uploads/howtosV1/{id}/cover.jpg`.
    pub path: String,

    /// Original filename of the uploaded file.
    pub filename: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload.
    pub etag: Option<String>,

    /// When the path was first written.
    pub created_at: DateTime<Utc>,

    /// When the payload was last overwritten.
    pub last_modified: DateTime<Utc>,
}
