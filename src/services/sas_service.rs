//! Shared-access signatures for the store.
//!
//! A capability URL looks like
//! `{public_url}/{container}/{key}?sp=w&se=1767225600&sig=...` where `sig` is
//! base64url(HMAC-SHA256(secret, "{container}\n{key}\n{sp}\n{se}")).
//! Whoever holds the URL may perform the operations in `sp` on that single
//! object until `se` (unix seconds).

use crate::models::access_token::{Permission, PermissionSet};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Upper bound for `timerange`; one week.
pub const MAX_TTL_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SasError {
    #[error("missing `{0}` parameter")]
    MissingParameter(&'static str),
    #[error("invalid permissions `{0}`")]
    InvalidPermissions(String),
    #[error("timerange must be between 1 and {max} minutes, got {0}", max = MAX_TTL_MINUTES)]
    InvalidTimeRange(i64),
    #[error("object key must not be empty")]
    EmptyKey,
    #[error("signing key rejected")]
    InvalidSigningKey,
    #[error("signature does not match")]
    BadSignature,
    #[error("access token expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("token does not grant `{0}` permission")]
    PermissionDenied(char),
}

pub type SasResult<T> = Result<T, SasError>;

/// Signature parameters carried in a capability URL's query string.
#[derive(Debug, Default, Deserialize)]
pub struct SasParams {
    pub sp: Option<String>,
    pub se: Option<i64>,
    pub sig: Option<String>,
}

/// Result of a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedSas {
    pub url: String,
    pub expiry: DateTime<Utc>,
}

/// Mints and verifies capability URLs for objects in this store.
#[derive(Clone)]
pub struct SasService {
    mac: HmacSha256,
    public_url: String,
}

impl SasService {
    /// `public_url` is the externally reachable base of the store routes.
    pub fn new(secret: &[u8], public_url: impl Into<String>) -> SasResult<Self> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SasError::InvalidSigningKey)?;
        Ok(Self {
            mac,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Plain address of an object, as handed out by listings.
    pub fn object_url(&self, container: &str, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, container, encode_key(key))
    }

    pub fn issue(
        &self,
        container: &str,
        key: &str,
        permissions: &PermissionSet,
        ttl_minutes: i64,
    ) -> SasResult<IssuedSas> {
        self.issue_at(container, key, permissions, ttl_minutes, Utc::now())
    }

    pub fn issue_at(
        &self,
        container: &str,
        key: &str,
        permissions: &PermissionSet,
        ttl_minutes: i64,
        now: DateTime<Utc>,
    ) -> SasResult<IssuedSas> {
        if key.is_empty() {
            return Err(SasError::EmptyKey);
        }
        if !(1..=MAX_TTL_MINUTES).contains(&ttl_minutes) {
            return Err(SasError::InvalidTimeRange(ttl_minutes));
        }
        if permissions.is_empty() {
            return Err(SasError::InvalidPermissions(String::new()));
        }

        let expiry = now + Duration::minutes(ttl_minutes);
        let sp = permissions.to_string();
        let se = expiry.timestamp();
        let sig = self.sign(container, key, &sp, se);
        let url = format!(
            "{}?sp={}&se={}&sig={}",
            self.object_url(container, key),
            sp,
            se,
            sig
        );

        Ok(IssuedSas { url, expiry })
    }

    pub fn verify(
        &self,
        container: &str,
        key: &str,
        params: &SasParams,
        required: Permission,
    ) -> SasResult<()> {
        self.verify_at(container, key, params, required, Utc::now())
    }

    /// Checks signature first, then expiry, then the permission set.
    pub fn verify_at(
        &self,
        container: &str,
        key: &str,
        params: &SasParams,
        required: Permission,
        now: DateTime<Utc>,
    ) -> SasResult<()> {
        let sp = params.sp.as_deref().ok_or(SasError::MissingParameter("sp"))?;
        let se = params.se.ok_or(SasError::MissingParameter("se"))?;
        let sig = params.sig.as_deref().ok_or(SasError::MissingParameter("sig"))?;

        let tag = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| SasError::BadSignature)?;
        let mut mac = self.mac.clone();
        mac.update(string_to_sign(container, key, sp, se).as_bytes());
        mac.verify_slice(&tag).map_err(|_| SasError::BadSignature)?;

        let expiry =
            DateTime::<Utc>::from_timestamp(se, 0).ok_or(SasError::MissingParameter("se"))?;
        if now >= expiry {
            return Err(SasError::Expired(expiry));
        }

        let permissions: PermissionSet = sp
            .parse()
            .map_err(|_| SasError::InvalidPermissions(sp.to_string()))?;
        if !permissions.contains(required) {
            return Err(SasError::PermissionDenied(required.as_char()));
        }
        Ok(())
    }

    fn sign(&self, container: &str, key: &str, sp: &str, se: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(string_to_sign(container, key, sp, se).as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

fn string_to_sign(container: &str, key: &str, sp: &str, se: i64) -> String {
    format!("{}\n{}\n{}\n{}", container, key, sp, se)
}

/// Percent-encode each `/`-separated segment of a key.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
