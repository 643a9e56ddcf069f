//! HTTP access to catalogs and score assets

use crate::ChartError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Downloads a remote resource as raw bytes
///
/// A non-success HTTP status is a `ChartError::Fetch`, never an empty body.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ChartError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ChartError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sekai-chart-render/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChartError::Configuration(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ChartError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChartError::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChartError::Fetch(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ChartError::Fetch(format!("{url}: {e}")))?;

        Ok(body.to_vec())
    }
}
