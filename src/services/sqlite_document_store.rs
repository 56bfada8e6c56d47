//! SqliteDocumentStore: JSON documents in the `documents` table.
//!
//! Field access goes through `json_extract(data, '$.field')`. The
//! `(collection, slug)` expression index turns a duplicate slug into a unique
//! violation at write time.

use crate::services::document_store::{
    DocumentError, DocumentResult, DocumentStore, ensure_field_name,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct SqliteDocumentStore {
    pub db: Arc<SqlitePool>,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: String,
}

impl SqliteDocumentStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    fn parse_rows(rows: Vec<DocumentRow>) -> DocumentResult<Vec<Value>> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_str(&row.data)
                    .map_err(|source| DocumentError::Malformed { id: row.id, source })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn list_ordered(
        &self,
        collection: &str,
        field: &str,
        descending: bool,
    ) -> DocumentResult<Vec<Value>> {
        ensure_field_name(field)?;

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id, data FROM documents WHERE collection = ");
        builder.push_bind(collection);
        builder.push(" ORDER BY json_extract(data, ");
        builder.push_bind(format!("$.{field}"));
        builder.push(if descending { ") DESC" } else { ") ASC" });
        builder.push(", id ASC");

        let rows: Vec<DocumentRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        Self::parse_rows(rows)
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        limit: u32,
    ) -> DocumentResult<Vec<Value>> {
        ensure_field_name(field)?;

        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT id, data FROM documents
             WHERE collection = ? AND json_extract(data, ?) = ?
             ORDER BY id ASC LIMIT ?",
        )
        .bind(collection)
        .bind(format!("$.{field}"))
        .bind(value)
        .bind(i64::from(limit))
        .fetch_all(&*self.db)
        .await?;
        Self::parse_rows(rows)
    }

    async fn set_doc(&self, collection: &str, id: &str, doc: &Value) -> DocumentResult<()> {
        let data = serde_json::to_string(doc)?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, created_at, modified_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                data = excluded.data,
                modified_at = excluded.modified_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&data)
        .bind(now)
        .bind(now)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(DocumentError::SlugTaken {
                collection: collection.to_string(),
                slug: doc
                    .get("slug")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            Err(err) => Err(DocumentError::Sqlx(err)),
        }
    }

    fn generate_id(&self, _collection: &str) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
