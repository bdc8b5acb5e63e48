//! src/services/storage_service.rs
//!
//! StorageService: the object store behind capability URLs. Metadata lives
//! in SQLite, payloads on local disk sharded beneath
//! `base_path/{container}/{shard}/{shard}/{key}`. Authorization is not checked
//! here; handlers verify signatures before calling in.

use crate::models::{container::Container, object::Object};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("container `{0}` not found")]
    ContainerNotFound(String),
    #[error("container `{name}` invalid: {reason}")]
    InvalidContainerName { name: String, reason: String },
    #[error("object `{key}` not found in container `{container}`")]
    ObjectNotFound { container: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("payload exceeds the {limit}-byte object limit")]
    PayloadTooLarge { limit: u64 },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Container-scoped object storage:
/// - write an object from a byte stream (overwrites)
/// - read an object as a file handle
/// - enumerate a container in key order
/// - create containers on demand
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Largest payload accepted by a single write.
    pub max_object_bytes: u64,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const CONTAINER_NAME_MIN_LEN: usize = 3;
const CONTAINER_NAME_MAX_LEN: usize = 63;

impl StorageService {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>, max_object_bytes: u64) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            max_object_bytes,
        }
    }

    fn container_root(&self, container: &str) -> PathBuf {
        self.base_path.join(container)
    }

    /// Two-level shard from MD5(container/key), first two bytes as hex.
    fn object_shards(container: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", container, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, container: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(container, key);
        let mut path = self.container_root(container);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_container(&self, name: &str) -> StorageResult<Container> {
        ensure_container_name_safe(name)?;
        sqlx::query_as::<_, Container>(
            "SELECT id, name, created_at FROM containers WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ContainerNotFound(name.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    async fn fetch_object(&self, container: &Container, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, container_id, key, filename, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE key = ? AND container_id = ?",
        )
        .bind(key)
        .bind(container.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                container: container.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Return the named container, creating it (row and directory) if needed.
    pub async fn ensure_container(&self, name: &str) -> StorageResult<Container> {
        ensure_container_name_safe(name)?;
        fs::create_dir_all(self.container_root(name)).await?;

        sqlx::query(
            "INSERT INTO containers (id, name, created_at) VALUES (?, ?, ?)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        self.fetch_container(name).await
    }

    /// Stream-upload an object to disk and upsert its metadata.
    ///
    /// Bytes go to a temp file (size and MD5 computed on the way), are
    /// fsynced, then renamed into place. Temp files are removed on any error,
    /// including when the stream exceeds `max_object_bytes`; the placed
    /// payload is removed again if the metadata upsert fails.
    pub async fn upload_object_stream<S>(
        &self,
        container: &str,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        ensure_key_safe(key)?;
        let container_rec = self.fetch_container(container).await?;

        let file_path = self.object_path(&container_rec.name, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as u64;
            if size_bytes > self.max_object_bytes {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::PayloadTooLarge {
                    limit: self.max_object_bytes,
                });
            }
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let filename = key.rsplit('/').next().unwrap_or(key).to_string();
        let etag = format!("{:x}", digest.compute());

        let object = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, container_id, key, filename, content_type, size_bytes, etag, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(container_id, key) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, container_id, key, filename, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(container_rec.id)
        .bind(key)
        .bind(&filename)
        .bind(content_type)
        .bind(size_bytes as i64)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;
        let object = match object {
            Ok(object) => object,
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                return Err(StorageError::Sqlx(err));
            }
        };

        debug!(
            container = %container_rec.name,
            key,
            size_bytes,
            "stored object"
        );
        Ok(object)
    }

    /// Metadata plus an open file handle ready for streaming out.
    pub async fn get_object_reader(
        &self,
        container: &str,
        key: &str,
    ) -> StorageResult<(Object, File)> {
        ensure_key_safe(key)?;
        let container_rec = self.fetch_container(container).await?;
        let object = self.fetch_object(&container_rec, key).await?;

        let file_path = self.object_path(&container_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    container: container.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// Every object in the container, in key order. No paging.
    pub async fn list_objects(&self, container: &str) -> StorageResult<Vec<Object>> {
        let container_rec = self.fetch_container(container).await?;
        let objects = sqlx::query_as::<_, Object>(
            "SELECT id, container_id, key, filename, content_type, size_bytes, etag, last_modified
             FROM objects WHERE container_id = ? ORDER BY key ASC",
        )
        .bind(container_rec.id)
        .fetch_all(&*self.db)
        .await?;
        Ok(objects)
    }
}

/// Reject keys that could escape the container directory.
pub fn ensure_key_safe(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StorageError::InvalidObjectKey);
    }
    if key.starts_with('/') || key.ends_with('/') || key.split('/').any(|s| s == ".." || s == ".")
    {
        return Err(StorageError::InvalidObjectKey);
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(StorageError::InvalidObjectKey);
    }
    Ok(())
}

/// Container naming rules:
/// - 3–63 characters
/// - lowercase letters, digits and hyphens only
/// - starts and ends with a letter or digit
/// - no consecutive hyphens
pub fn ensure_container_name_safe(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidContainerName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if !(CONTAINER_NAME_MIN_LEN..=CONTAINER_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, and hyphens",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }
    if name.contains("--") {
        return Err(invalid("cannot contain consecutive hyphens"));
    }
    Ok(())
}
