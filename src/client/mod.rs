//! Upload client: token acquisition, the two transfer strategies, listing
//! refresh and the orchestrator that sequences them.

pub mod error;
pub mod listing;
pub mod orchestrator;
pub mod token_authority;
pub mod transfer;

use crate::{config::ClientConfig, models::upload::TransferPath};
use anyhow::{Context, Result};
use reqwest::{Client, Response};
use std::{sync::Arc, time::Duration};

use self::{
    listing::HttpListingService,
    orchestrator::UploadOrchestrator,
    token_authority::HttpTokenAuthority,
    transfer::{DirectTransfer, ProxiedTransfer, TransferStrategy},
};

/// HTTP client shared by every remote call. Only connecting is bounded;
/// transfers run until the store answers or the token expires.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to create HTTP client")
}

/// `"{status}: {body}"` for a non-success response, preferring the `error`
/// field of a JSON error body.
pub(crate) async fn failure_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(text);
    if detail.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, detail)
    }
}

/// Orchestrator wired to the HTTP services, plus both strategies.
#[derive(Clone)]
pub struct UploadClient {
    pub orchestrator: UploadOrchestrator,
    pub direct: DirectTransfer,
    pub proxied: ProxiedTransfer,
}

impl UploadClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = http_client()?;
        let direct = DirectTransfer::new(client.clone(), config.max_direct_bytes);
        let proxied = ProxiedTransfer::new(client.clone(), config.proxy_url.clone());
        let authority = HttpTokenAuthority::new(client.clone(), config.api_url.clone());
        let listing = HttpListingService::new(client, config.api_url.clone());
        let orchestrator = UploadOrchestrator::new(config, Arc::new(authority), Arc::new(listing));
        Ok(Self {
            orchestrator,
            direct,
            proxied,
        })
    }

    pub fn strategy(&self, path: TransferPath) -> &dyn TransferStrategy {
        match path {
            TransferPath::Direct => &self.direct,
            TransferPath::Proxied => &self.proxied,
        }
    }
}
