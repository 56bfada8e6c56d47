//! Document database seam used by the how-to store.

use crate::models::document::DocMeta;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid field name `{0}`")]
    InvalidField(String),
    #[error("slug `{slug}` already exists in `{collection}`")]
    SlugTaken { collection: String, slug: String },
    #[error("malformed document `{id}`: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type DocumentResult<T> = Result<T, DocumentError>;

/// A collection-oriented JSON document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every document in `collection`, ordered by `field`.
    async fn list_ordered(
        &self,
        collection: &str,
        field: &str,
        descending: bool,
    ) -> DocumentResult<Vec<Value>>;

    /// Documents whose `field` equals `value`, at most `limit` of them.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        limit: u32,
    ) -> DocumentResult<Vec<Value>>;

    /// Create or replace the document at `collection/id`.
    async fn set_doc(&self, collection: &str, id: &str, doc: &Value) -> DocumentResult<()>;

    /// A fresh identifier for a document in `collection`.
    fn generate_id(&self, collection: &str) -> String;

    /// Metadata for a new document owned by `owner`.
    fn generate_doc_meta(&self, _collection: &str, id: &str, owner: &str) -> DocMeta {
        DocMeta::new(id, owner)
    }

    /// True when no document in `collection` carries `slug`.
    async fn check_slug_unique(&self, collection: &str, slug: &str) -> DocumentResult<bool> {
        Ok(self.query_eq(collection, "slug", slug, 1).await?.is_empty())
    }
}

/// Field names end up inside a JSON path, so only plain identifiers pass.
pub fn ensure_field_name(field: &str) -> DocumentResult<()> {
    if !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(DocumentError::InvalidField(field.to_string()))
    }
}
