//! Fetch images from the remote archive over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{errors::FetchError, identifier::Identifier, prelude::*};

use super::{DownloadedImage, Fetcher};

/// Fetches `{base_url}{identifier}` with a single GET and no retries.
#[derive(Debug)]
pub struct ArchiveFetcher {
    /// Shared HTTP client, with our timeout baked in.
    client: reqwest::Client,

    /// Prefix for every image URL. Identifiers are appended verbatim.
    base_url: String,
}

impl ArchiveFetcher {
    /// Create a new fetcher. Each request gives up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Fetcher for ArchiveFetcher {
    fn source_url(&self, id: &Identifier) -> String {
        format!("{}{}", self.base_url, id)
    }

    #[instrument(level = "debug", skip_all, fields(id = %id))]
    async fn fetch(&self, id: &Identifier) -> Result<DownloadedImage, FetchError> {
        let url = self.source_url(id);
        let request_failed = |source| FetchError::Request {
            id: id.clone(),
            source,
        };

        let response = self.client.get(&url).send().await.map_err(request_failed)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                id: id.clone(),
                status,
            });
        }
        let data = response.bytes().await.map_err(request_failed)?;
        debug!(bytes = data.len(), "Downloaded image");
        Ok(DownloadedImage::new(id.clone(), url, data.to_vec()))
    }
}
