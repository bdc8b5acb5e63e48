//! Container enumeration from the API server.

use super::{error::UploadError, failure_message};
use crate::models::listing::{ContainerListing, ListResponse};
use async_trait::async_trait;
use reqwest::Client;

#[async_trait]
pub trait ListingService: Send + Sync {
    /// Full current enumeration of `container`; no paging, no filtering.
    async fn list(&self, container: &str) -> Result<ContainerListing, UploadError>;
}

/// `GET {api_url}/api/list?container=`
#[derive(Clone)]
pub struct HttpListingService {
    client: Client,
    api_url: String,
}

impl HttpListingService {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ListingService for HttpListingService {
    async fn list(&self, container: &str) -> Result<ContainerListing, UploadError> {
        let response = self
            .client
            .get(format!("{}/api/list", self.api_url))
            .query(&[("container", container)])
            .send()
            .await
            .map_err(|err| UploadError::listing_from(&err))?;

        if !response.status().is_success() {
            return Err(UploadError::listing(failure_message(response).await));
        }

        let body: ListResponse = response
            .json()
            .await
            .map_err(|err| UploadError::listing_from(&err))?;

        Ok(ContainerListing {
            container_name: container.to_string(),
            entries: body.list,
        })
    }
}
