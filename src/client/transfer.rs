//! The two interchangeable ways of getting bytes into the store.

use super::{error::UploadError, failure_message};
use crate::{
    config::DEFAULT_MAX_DIRECT_BYTES,
    models::{
        access_token::AccessToken,
        upload::{SourceFile, TransferPath},
    },
};
use async_trait::async_trait;
use reqwest::{Client, header, multipart};

/// One write of one file under one token. Implementations run their local
/// checks before touching the network and never retry.
#[async_trait]
pub trait TransferStrategy: Send + Sync {
    fn path(&self) -> TransferPath;

    /// Local preconditions; no I/O.
    fn preflight(&self, _file: &SourceFile) -> Result<(), UploadError> {
        Ok(())
    }

    async fn transfer(&self, file: &SourceFile, token: &AccessToken) -> Result<(), UploadError>;
}

fn ensure_unexpired(token: &AccessToken) -> Result<(), UploadError> {
    if token.is_expired() {
        return Err(UploadError::TokenExpired(token.target_object_key.clone()));
    }
    Ok(())
}

/// Client → store: a single PUT of the whole buffer to the capability URL.
#[derive(Clone)]
pub struct DirectTransfer {
    client: Client,
    max_bytes: usize,
}

impl DirectTransfer {
    /// `max_bytes` is capped at `DEFAULT_MAX_DIRECT_BYTES`.
    pub fn new(client: Client, max_bytes: usize) -> Self {
        Self {
            client,
            max_bytes: max_bytes.min(DEFAULT_MAX_DIRECT_BYTES),
        }
    }
}

#[async_trait]
impl TransferStrategy for DirectTransfer {
    fn path(&self) -> TransferPath {
        TransferPath::Direct
    }

    fn preflight(&self, file: &SourceFile) -> Result<(), UploadError> {
        if file.is_empty() {
            return Err(UploadError::EmptyPayload);
        }
        if file.len() > self.max_bytes {
            return Err(UploadError::PayloadTooLarge {
                size: file.len(),
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    async fn transfer(&self, file: &SourceFile, token: &AccessToken) -> Result<(), UploadError> {
        ensure_unexpired(token)?;
        self.preflight(file)?;

        let response = self
            .client
            .put(&token.endpoint)
            .header(header::CONTENT_TYPE, file.content_type.as_str())
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|err| UploadError::transfer_from(TransferPath::Direct, &err))?;

        if !response.status().is_success() {
            return Err(UploadError::transfer(
                TransferPath::Direct,
                failure_message(response).await,
            ));
        }
        tracing::debug!(file = %file.name, size = file.len(), "direct transfer accepted");
        Ok(())
    }
}

/// Client → intermediary → store: multipart POST of the file and the
/// capability URL to `{proxy_url}/api/files`. Size is the server's concern.
#[derive(Clone)]
pub struct ProxiedTransfer {
    client: Client,
    proxy_url: String,
}

impl ProxiedTransfer {
    pub fn new(client: Client, proxy_url: impl Into<String>) -> Self {
        Self {
            client,
            proxy_url: proxy_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TransferStrategy for ProxiedTransfer {
    fn path(&self) -> TransferPath {
        TransferPath::Proxied
    }

    fn preflight(&self, file: &SourceFile) -> Result<(), UploadError> {
        if file.name.trim().is_empty() {
            return Err(UploadError::MissingFileName);
        }
        Ok(())
    }

    async fn transfer(&self, file: &SourceFile, token: &AccessToken) -> Result<(), UploadError> {
        ensure_unexpired(token)?;
        self.preflight(file)?;

        let part = multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.content_type)
            .map_err(|err| UploadError::transfer_from(TransferPath::Proxied, &err))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("sasTokenUrl", token.endpoint.clone());

        let response = self
            .client
            .post(format!("{}/api/files", self.proxy_url))
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::transfer_from(TransferPath::Proxied, &err))?;

        if !response.status().is_success() {
            return Err(UploadError::transfer(
                TransferPath::Proxied,
                failure_message(response).await,
            ));
        }
        tracing::debug!(file = %file.name, size = file.len(), "proxied transfer accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::access_token::PermissionSet;
    use chrono::{Duration, Utc};

    fn token(expiry_offset_minutes: i64) -> AccessToken {
        AccessToken {
            target_object_key: "file.bin".into(),
            container: "uploads".into(),
            permissions: PermissionSet::write_only(),
            expiry: Utc::now() + Duration::minutes(expiry_offset_minutes),
            // Nothing listens here; reaching the network shows up as a Transfer error.
            endpoint: "http://127.0.0.1:9/uploads/file.bin?sp=w&se=0&sig=x".into(),
        }
    }

    fn file_of(len: usize) -> SourceFile {
        SourceFile::new("file.bin", vec![0u8; len])
    }

    #[test]
    fn direct_preflight_accepts_exactly_one_to_limit() {
        let direct = DirectTransfer::new(Client::new(), 256_000);
        assert!(matches!(
            direct.preflight(&file_of(0)),
            Err(UploadError::EmptyPayload)
        ));
        assert!(direct.preflight(&file_of(1)).is_ok());
        assert!(direct.preflight(&file_of(256_000)).is_ok());
        assert!(matches!(
            direct.preflight(&file_of(256_001)),
            Err(UploadError::PayloadTooLarge {
                size: 256_001,
                limit: 256_000
            })
        ));
    }

    #[test]
    fn direct_limit_can_be_lowered_but_not_raised() {
        let tighter = DirectTransfer::new(Client::new(), 1_000);
        assert!(tighter.preflight(&file_of(1_000)).is_ok());
        assert!(tighter.preflight(&file_of(1_001)).is_err());

        let looser = DirectTransfer::new(Client::new(), 10_000_000);
        assert!(matches!(
            looser.preflight(&file_of(256_001)),
            Err(UploadError::PayloadTooLarge {
                size: 256_001,
                limit: 256_000
            })
        ));
    }

    #[tokio::test]
    async fn oversized_direct_transfer_never_reaches_network() {
        let direct = DirectTransfer::new(Client::new(), 256_000);
        let err = direct
            .transfer(&file_of(300_000), &token(5))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn in_range_direct_transfer_does_reach_network() {
        let direct = DirectTransfer::new(Client::new(), 256_000);
        let err = direct.transfer(&file_of(10), &token(5)).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Transfer {
                path: TransferPath::Direct,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn expired_token_is_refused_locally() {
        let direct = DirectTransfer::new(Client::new(), 256_000);
        let err = direct.transfer(&file_of(10), &token(-1)).await.unwrap_err();
        assert!(matches!(err, UploadError::TokenExpired(key) if key == "file.bin"));
    }

    #[tokio::test]
    async fn proxied_requires_a_file_name_but_no_size_cap() {
        let proxied = ProxiedTransfer::new(Client::new(), "http://127.0.0.1:9");
        let nameless = SourceFile::new("", vec![1u8; 4]);
        assert!(matches!(
            proxied.transfer(&nameless, &token(5)).await,
            Err(UploadError::MissingFileName)
        ));
        assert!(proxied.preflight(&file_of(300_000)).is_ok());
    }
}
