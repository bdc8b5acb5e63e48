//! Represents an object (blob) stored in a container.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single stored object.
///
/// The payload itself lives on disk; this row only describes it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent container.
    pub container_id: Uuid,

    /// Object key (path-like identifier within the container).
    pub key: String,

    /// Last path segment of the key.
    pub filename: String,

    /// Content type (MIME type) as sent by the writer.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: Option<String>,

    /// Timestamp of the last write.
    pub last_modified: DateTime<Utc>,
}
