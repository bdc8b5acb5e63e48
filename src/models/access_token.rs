//! Capability tokens: a signed URL granting a fixed permission set on one
//! object until an absolute expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};
use thiserror::Error;

/// A single operation a token may authorize.
///
/// Declaration order is the canonical wire order (`rwdl`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Delete,
    List,
}

impl Permission {
    pub fn as_char(self) -> char {
        match self {
            Permission::Read => 'r',
            Permission::Write => 'w',
            Permission::Delete => 'd',
            Permission::List => 'l',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'r' => Some(Permission::Read),
            'w' => Some(Permission::Write),
            'd' => Some(Permission::Delete),
            'l' => Some(Permission::List),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionParseError {
    #[error("permission set is empty")]
    Empty,
    #[error("unknown permission `{0}`")]
    Unknown(char),
}

/// A set of permissions rendered as canonical letters, e.g. `rw`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn write_only() -> Self {
        Self::from_iter([Permission::Write])
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for permission in &self.0 {
            write!(f, "{}", permission.as_char())?;
        }
        Ok(())
    }
}

impl FromStr for PermissionSet {
    type Err = PermissionParseError;

    /// Accepts letters in any order; duplicates collapse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let set = s
            .chars()
            .map(|c| Permission::from_char(c).ok_or(PermissionParseError::Unknown(c)))
            .collect::<Result<PermissionSet, _>>()?;
        if set.is_empty() {
            return Err(PermissionParseError::Empty);
        }
        Ok(set)
    }
}

/// A time-boxed credential for exactly one object.
///
/// Never persisted and never renewed: once `expiry` passes a fresh token has
/// to be issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub target_object_key: String,
    pub container: String,
    pub permissions: PermissionSet,
    pub expiry: DateTime<Utc>,
    /// Capability URL with the credential embedded in its query string.
    pub endpoint: String,
}

impl AccessToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
