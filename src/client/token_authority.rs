//! Token acquisition from the API server's credential endpoint.

use super::{error::UploadError, failure_message};
use crate::models::{
    access_token::{AccessToken, PermissionSet},
    listing::SasResponse,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Url};

#[async_trait]
pub trait TokenAuthority: Send + Sync {
    /// Issue a token for `object_key` in `container`. Failures are reported,
    /// never retried.
    async fn issue_token(
        &self,
        object_key: &str,
        permissions: &PermissionSet,
        ttl_minutes: i64,
        container: &str,
    ) -> Result<AccessToken, UploadError>;
}

/// Input checks shared by every authority; run before any network call.
pub fn validate_token_request(
    object_key: &str,
    permissions: &PermissionSet,
    ttl_minutes: i64,
) -> Result<(), UploadError> {
    if object_key.is_empty() {
        return Err(UploadError::token_issuance("object key must not be empty"));
    }
    if ttl_minutes <= 0 {
        return Err(UploadError::token_issuance(format!(
            "token lifetime must be positive, got {} minutes",
            ttl_minutes
        )));
    }
    if permissions.is_empty() {
        return Err(UploadError::token_issuance("no permissions requested"));
    }
    Ok(())
}

/// `POST {api_url}/api/sas?file=&permission=&container=&timerange=`
#[derive(Clone)]
pub struct HttpTokenAuthority {
    client: Client,
    api_url: String,
}

impl HttpTokenAuthority {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TokenAuthority for HttpTokenAuthority {
    async fn issue_token(
        &self,
        object_key: &str,
        permissions: &PermissionSet,
        ttl_minutes: i64,
        container: &str,
    ) -> Result<AccessToken, UploadError> {
        validate_token_request(object_key, permissions, ttl_minutes)?;

        let requested_at = Utc::now();
        let response = self
            .client
            .post(format!("{}/api/sas", self.api_url))
            .query(&[
                ("file", object_key.to_string()),
                ("permission", permissions.to_string()),
                ("container", container.to_string()),
                ("timerange", ttl_minutes.to_string()),
            ])
            .send()
            .await
            .map_err(|err| UploadError::token_issuance_from(&err))?;

        if !response.status().is_success() {
            return Err(UploadError::token_issuance(
                failure_message(response).await,
            ));
        }

        let body: SasResponse = response
            .json()
            .await
            .map_err(|err| UploadError::token_issuance_from(&err))?;

        let expiry = match expiry_from_url(&body.url) {
            Some(expiry) => expiry,
            None => fallback_expiry(requested_at, ttl_minutes).ok_or_else(|| {
                UploadError::token_issuance(format!(
                    "token lifetime of {} minutes is out of range",
                    ttl_minutes
                ))
            })?,
        };

        tracing::debug!(object_key, container, %expiry, "access token issued");
        Ok(AccessToken {
            target_object_key: object_key.to_string(),
            container: container.to_string(),
            permissions: permissions.clone(),
            expiry,
            endpoint: body.url,
        })
    }
}

/// The `se` query parameter of a capability URL, if it carries one.
fn expiry_from_url(url: &str) -> Option<DateTime<Utc>> {
    let url = Url::parse(url).ok()?;
    let se = url
        .query_pairs()
        .find(|(k, _)| k == "se")
        .and_then(|(_, v)| v.parse::<i64>().ok())?;
    DateTime::<Utc>::from_timestamp(se, 0)
}

/// `requested_at + ttl_minutes`, or `None` when that overflows.
fn fallback_expiry(requested_at: DateTime<Utc>, ttl_minutes: i64) -> Option<DateTime<Utc>> {
    requested_at.checked_add_signed(Duration::try_minutes(ttl_minutes)?)
}
