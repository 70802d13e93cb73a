// src/services/source.rs

//! Marketplace source client.
//!
//! Fetches listing documents and classifies transport failures. No retries
//! happen here; a failed listing is simply attempted again next cycle.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{FetchError, Result};
use crate::models::SourceConfig;
use crate::services::Document;
use crate::utils::{get_domain, http};

/// Fetches listing documents by URL.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch the document behind `url`.
    async fn fetch(&self, url: &str) -> std::result::Result<Document, FetchError>;
}

/// [`SourceClient`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpSourceClient {
    client: Client,
}

impl HttpSourceClient {
    /// Wrap an existing HTTP client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from source settings.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Ok(Self::new(http::create_async_client(config)?))
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch(&self, url: &str) -> std::result::Result<Document, FetchError> {
        log::debug!(
            "Fetching listing from {}",
            get_domain(url).unwrap_or_else(|| url.to_string())
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(url, status.as_u16()));
        }

        // Canonical URL is wherever redirects ended up
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        Ok(Document::new(final_url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        assert!(HttpSourceClient::from_config(&SourceConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = HttpSourceClient::from_config(&SourceConfig {
            timeout_secs: 2,
            ..SourceConfig::default()
        })
        .unwrap();

        let result = client.fetch("http://127.0.0.1:1/itm/1").await;
        assert!(matches!(result, Err(FetchError::Transport { .. })));
    }
}
