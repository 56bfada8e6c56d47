use crate::services::{
    howto_store::HowtoStore, local_object_store::LocalObjectStore,
    sqlite_document_store::SqliteDocumentStore,
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub objects: LocalObjectStore,
    pub howtos: HowtoStore,
}

impl AppState {
    /// Wire the SQLite document store and the local object store into a
    /// `HowtoStore`.
    pub fn new(db: Arc<SqlitePool>, objects: LocalObjectStore, status_ttl: Duration) -> Self {
        let docs = Arc::new(SqliteDocumentStore::new(db.clone()));
        let howtos = HowtoStore::with_status_ttl(docs, Arc::new(objects.clone()), status_ttl);
        Self {
            db,
            objects,
            howtos,
        }
    }
}
