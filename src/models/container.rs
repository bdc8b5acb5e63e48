//! A container: a named namespace that groups objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage container.
///
/// Containers are created on first token issuance and never removed by this
/// service. The name doubles as the first path segment of every object
/// address.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Container {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Container name (lowercase letters, digits and single hyphens).
    pub name: String,

    /// When this container was created.
    pub created_at: DateTime<Utc>,
}
