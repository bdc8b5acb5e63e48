//! Server-side half of the proxied transfer: the intermediary receives the
//! payload and a capability URL, then performs the store write itself.

use bytes::Bytes;
use reqwest::{Client, Url, header};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid capability url: {0}")]
    InvalidUrl(String),
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Forwards writes only to capability URLs on this store's own origin.
#[derive(Clone)]
pub struct ProxyService {
    client: Client,
    store_url: Url,
}

impl ProxyService {
    /// `store_url` is the public base of the store routes; its scheme, host
    /// and port bound where writes may be forwarded.
    pub fn new(store_url: &str) -> Result<Self, ProxyError> {
        let store_url = Url::parse(store_url)
            .map_err(|err| ProxyError::InvalidUrl(format!("store url: {}", err)))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            store_url,
        })
    }

    /// Single PUT of `bytes` to `sas_url`. Not retried.
    pub async fn forward(
        &self,
        sas_url: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<(), ProxyError> {
        let url = parse_capability_url(sas_url)?;
        if url.origin() != self.store_url.origin() {
            warn!(
                target_origin = %url.origin().ascii_serialization(),
                "refusing capability url outside this store"
            );
            return Err(ProxyError::InvalidUrl(format!(
                "`{}` is not served by this store",
                url.origin().ascii_serialization()
            )));
        }
        let size = bytes.len();

        let response = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "store rejected proxied write");
            return Err(ProxyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(size, "proxied write accepted by store");
        Ok(())
    }
}

/// Only absolute http(s) URLs carrying a signature are forwarded to.
fn parse_capability_url(raw: &str) -> Result<Url, ProxyError> {
    let url = Url::parse(raw).map_err(|err| ProxyError::InvalidUrl(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProxyError::InvalidUrl(format!(
            "unsupported scheme `{}`",
            url.scheme()
        )));
    }
    if !url.query_pairs().any(|(k, v)| k == "sig" && !v.is_empty()) {
        return Err(ProxyError::InvalidUrl("missing signature".into()));
    }
    Ok(url)
}
