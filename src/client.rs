//! Classeur API client implementing [`RemoteClient`] over `reqwest`.
//!
//! Authenticates every request with HTTP basic auth (user id / API key) and
//! applies the configured retry budget to per-file downloads. Listing pages
//! are fetched without retry: a failed page aborts the run.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::config::{RetryConfig, SyncConfig};
use crate::contract::{ContentRevision, FileDescriptor, ItemRange, RemoteClient};
use crate::error::ClientError;
use crate::retry::with_retry;

const USER_AGENT: &str = concat!("classeur-sync/", env!("CARGO_PKG_VERSION"));

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ClasseurClient {
    http: Client,
    host: String,
    user_id: String,
    api_key: String,
    download_retry: RetryConfig,
    offline: bool,
}

impl ClasseurClient {
    pub fn new(config: &SyncConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        tracing::debug!(
            host = %config.host,
            offline = config.offline,
            api_key_set = !config.api_key.is_empty(),
            "Initialized Classeur client"
        );
        Ok(Self {
            http,
            host: config.host.clone(),
            user_id: config.user_id.clone(),
            api_key: config.api_key.clone(),
            download_retry: config.download_retry.clone(),
            offline: config.offline,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        range: Option<ItemRange>,
    ) -> Result<T, ClientError> {
        if self.offline {
            return Err(ClientError::Offline);
        }

        let mut request = self
            .http
            .get(url)
            .basic_auth(&self.user_id, Some(&self.api_key))
            .query(query);
        if let Some(range) = range {
            request = request.header(RANGE, range.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%status, url, "Classeur API returned error");
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| ClientError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl RemoteClient for ClasseurClient {
    async fn list_files(
        &self,
        folder_id: &str,
        range: ItemRange,
    ) -> Result<Vec<FileDescriptor>, ClientError> {
        let url = format!("{}/api/v2/folders/{}/files", self.host, folder_id);
        tracing::debug!(folder_id, %range, "Requesting listing page");
        self.get_json(
            &url,
            &[("sort", "updated"), ("direction", "desc")],
            Some(range),
        )
        .await
    }

    async fn last_content_rev(&self, file_id: &str) -> Result<ContentRevision, ClientError> {
        let url = format!("{}/api/v2/files/{}/contentRevs/last", self.host, file_id);
        with_retry(&self.download_retry, || self.get_json(&url, &[], None)).await
    }
}
