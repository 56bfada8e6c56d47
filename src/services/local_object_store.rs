//! LocalObjectStore: blob payloads on local disk, metadata in SQLite.
//!
//! Payloads are sharded beneath `base_path/{shard}/{shard}/{path}` where the
//! shards are the first two bytes of `md5(path)`. Writes go through a temp
//! file that is fsynced and renamed into place, so a reader never observes a
//! half-written payload.

use crate::{
    models::{
        file_meta::{DEFAULT_CONTENT_TYPE, UploadedFileMeta},
        object::StoredObject,
    },
    services::object_store::{ObjectStore, StorageError, StorageResult},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_PATH_LEN: usize = 1024;

#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,

    /// Prefix for download URLs, e.g. `http://localhost:3000`.
    pub public_url: String,
}

impl LocalObjectStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
    ) -> Self {
        let public_url: String = public_url.into();
        Self {
            db,
            base_path: base_path.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Reject paths that could escape `base_path` once joined.
    ///
    /// Empty segments, `.` and `..` are refused as well as leading `/`,
    /// backslashes and control characters.
    fn ensure_path_safe(&self, path: &str) -> StorageResult<()> {
        let invalid = || StorageError::InvalidObjectPath(path.to_string());
        if path.is_empty() || path.len() > MAX_OBJECT_PATH_LEN {
            return Err(invalid());
        }
        if path.starts_with('/') {
            return Err(invalid());
        }
        if path
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(invalid());
        }
        if path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid());
        }
        Ok(())
    }

    fn object_shards(path: &str) -> (String, String) {
        let digest = md5::compute(path);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Physical location of a payload. Parent directories may not exist yet.
    fn object_file(&self, path: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(path);
        let mut file = self.base_path.clone();
        file.push(shard_a);
        file.push(shard_b);
        file.push(path);
        file
    }

    fn download_url(&self, path: &str) -> String {
        format!("{}/files/{}", self.public_url, path)
    }

    async fn fetch_object(&self, path: &str) -> StorageResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT id, path, filename, content_type, size_bytes, etag, created_at, last_modified
             FROM objects WHERE path = ?",
        )
        .bind(path)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound(path.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    /// Write `data` to disk and upsert its metadata row.
    pub async fn put_object(
        &self,
        path: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> StorageResult<StoredObject> {
        self.ensure_path_safe(path)?;

        let file_path = self.object_file(path);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = write_synced(&tmp_path, data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let filename = path.rsplit('/').next().unwrap_or(path).to_string();
        let now = Utc::now();
        let etag = format!("{:x}", md5::compute(data));

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                id, path, filename, content_type, size_bytes, etag, created_at, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, path, filename, content_type, size_bytes, etag, created_at, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(path)
        .bind(&filename)
        .bind(content_type)
        .bind(data.len() as i64)
        .bind(&etag)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => Ok(obj),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Metadata plus an open handle ready for streaming out.
    pub async fn get_object_reader(&self, path: &str) -> StorageResult<(StoredObject, File)> {
        self.ensure_path_safe(path)?;
        let object = self.fetch_object(path).await?;

        let file = File::open(self.object_file(path)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound(path.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    pub async fn get_object_metadata(&self, path: &str) -> StorageResult<StoredObject> {
        self.ensure_path_safe(path)?;
        self.fetch_object(path).await
    }

    /// Delete the metadata row and payload, then prune empty shard folders.
    pub async fn delete_object(&self, path: &str) -> StorageResult<StoredObject> {
        self.ensure_path_safe(path)?;
        let object = self.fetch_object(path).await?;

        let result = sqlx::query("DELETE FROM objects WHERE path = ?")
            .bind(path)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::ObjectNotFound(path.to_string()));
        }

        let file_path = self.object_file(path);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }

        Ok(object)
    }

    /// Remove empty directories from `start` up to (not including) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(
        &self,
        folder: &str,
        filename: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<UploadedFileMeta> {
        if filename.is_empty() || filename.contains('/') {
            return Err(StorageError::InvalidObjectPath(filename.to_string()));
        }
        let path = format!("{}/{}", folder.trim_end_matches('/'), filename);
        let object = self.put_object(&path, &data, Some(content_type)).await?;
        debug!(path = %object.path, size = object.size_bytes, "stored object");

        Ok(UploadedFileMeta {
            name: object.filename,
            download_url: self.download_url(&object.path),
            full_path: object.path,
            content_type: object
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            size: object.size_bytes.max(0) as u64,
            etag: object.etag.unwrap_or_default(),
            time_created: object.created_at,
            updated: object.last_modified,
        })
    }

    async fn delete(&self, full_path: &str) -> StorageResult<()> {
        self.delete_object(full_path).await.map(|_| ())
    }
}
