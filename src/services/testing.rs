//! In-memory stores for workflow tests.

use crate::{
    models::file_meta::UploadedFileMeta,
    services::{
        document_store::{DocumentError, DocumentResult, DocumentStore},
        object_store::{ObjectStore, StorageError, StorageResult},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<BTreeMap<(String, String), Value>>,
    pub fail_writes: bool,
    pub writes: AtomicUsize,
    next_id: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, collection: &str, id: &str, doc: Value) {
        self.docs
            .lock()
            .unwrap()
            .insert((collection.to_string(), id.to_string()), doc);
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        self.docs
            .lock()
            .unwrap()
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    fn collection(&self, collection: &str) -> Vec<Value> {
        self.docs
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|(_, doc)| doc.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_ordered(
        &self,
        collection: &str,
        field: &str,
        descending: bool,
    ) -> DocumentResult<Vec<Value>> {
        let mut docs = self.collection(collection);
        docs.sort_by_key(|doc| doc.get(field).and_then(Value::as_i64).unwrap_or_default());
        if descending {
            docs.reverse();
        }
        Ok(docs)
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        limit: u32,
    ) -> DocumentResult<Vec<Value>> {
        Ok(self
            .collection(collection)
            .into_iter()
            .filter(|doc| doc.get(field).and_then(Value::as_str) == Some(value))
            .take(limit as usize)
            .collect())
    }

    async fn set_doc(&self, collection: &str, id: &str, doc: &Value) -> DocumentResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(DocumentError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        self.insert(collection, id, doc.clone());
        Ok(())
    }

    fn generate_id(&self, collection: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{collection}-{n}")
    }
}

/// Object store that records calls, can fail on a given file name and can
/// delay individual uploads to shuffle completion order.
#[derive(Default)]
pub struct FakeObjectStore {
    pub fail_on: Option<String>,
    pub delays_ms: HashMap<String, u64>,
    uploaded: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
}

impl FakeObjectStore {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_delays(delays: &[(&str, u64)]) -> Self {
        Self {
            delays_ms: delays
                .iter()
                .map(|(name, ms)| (name.to_string(), *ms))
                .collect(),
            ..Self::default()
        }
    }

    /// Full paths of successful uploads, in call order.
    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }

    /// File names in the order their uploads finished.
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn upload(
        &self,
        folder: &str,
        filename: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<UploadedFileMeta> {
        if let Some(ms) = self.delays_ms.get(filename) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        if self.fail_on.as_deref() == Some(filename) {
            return Err(StorageError::UploadFailed {
                name: filename.to_string(),
                reason: "connection reset".into(),
            });
        }

        let full_path = format!("{folder}/{filename}");
        self.uploaded.lock().unwrap().push(full_path.clone());
        self.completed.lock().unwrap().push(filename.to_string());
        let now = Utc::now();
        Ok(UploadedFileMeta {
            name: filename.to_string(),
            download_url: format!("https://cdn.test/{full_path}"),
            full_path,
            content_type: content_type.to_string(),
            size: data.len() as u64,
            etag: format!("{:x}", md5::compute(&data)),
            time_created: now,
            updated: now,
        })
    }

    async fn delete(&self, full_path: &str) -> StorageResult<()> {
        self.deleted.lock().unwrap().push(full_path.to_string());
        Ok(())
    }
}
