//! HTTP implementation of the remote data service.
//!
//! Endpoints, relative to the base URL:
//! - `GET /health` - liveness probe
//! - `GET /sync/{category}` - JSON array of records (404 means no records)
//! - `PUT /sync/{category}` - replace records with the JSON array body

use super::{RemoteError, RemoteService};
use async_trait::async_trait;
use offsync_engine::Document;
use reqwest::{StatusCode, Url};

/// Remote service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/sync/{category}`, with the category percent-encoded as one
    /// path segment.
    fn category_url(&self, category: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RemoteError::Transport(format!("invalid base url {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::Transport(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .push("sync")
            .push(category);
        Ok(url)
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn fetch_latest(&self, category: &str) -> Result<Vec<Document>, RemoteError> {
        let response = self
            .client
            .get(self.category_url(category)?)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = check_status(response).await?;

        response
            .json::<Vec<Document>>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn save(&self, category: &str, records: &[Document]) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.category_url(category)?)
            .json(records)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await?;
        Ok(())
    }

    async fn check_health(&self) -> Result<(), RemoteError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_connect() || e.is_timeout() {
        RemoteError::Unreachable(e.to_string())
    } else {
        RemoteError::Transport(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}
