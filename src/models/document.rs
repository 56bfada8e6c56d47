//! Metadata stamped on every stored document.

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

/// Bookkeeping fields merged into a document before it is written.
///
/// Timestamps serialize as epoch milliseconds so that ordering by them in the
/// document store is numeric.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DocMeta {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_created", with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,

    #[serde(rename = "_modified", with = "chrono::serde::ts_milliseconds")]
    pub modified: DateTime<Utc>,

    #[serde(rename = "_deleted")]
    pub deleted: bool,

    /// Owner reference.
    #[serde(rename = "_createdBy")]
    pub created_by: String,
}

impl DocMeta {
    pub fn new(id: impl Into<String>, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        let now = now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now);
        Self {
            id: id.into(),
            created: now,
            modified: now,
            deleted: false,
            created_by: created_by.into(),
        }
    }
}
