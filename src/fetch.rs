//! # HTTP Fetch Capability
//!
//! Every network read the pipeline does (revision lookup, hosted asset lists,
//! market-data batches) goes through [`HttpFetch`], so the whole sync can be
//! driven by a scripted fetcher in tests.

use async_trait::async_trait;
use std::time::Duration;

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Plain GET. Non-2xx statuses are returned, not turned into errors.
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;

    /// GET that only accepts 2xx responses.
    async fn get_ok(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }
}

/// [`HttpFetch`] over a shared `reqwest::Client`.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    headers: Vec<(String, String)>,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            // GitHub's API rejects requests without a user agent
            .user_agent(concat!("token-catalog-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            headers: Vec::new(),
        })
    }

    /// Extra header sent with every request (e.g. a pricing-service API key).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header("accept", "application/json");
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status().as_u16();
        if status == 429 {
            log::warn!("⚠️ Rate limited (429) by {}", url);
        }

        let body = response.text().await.map_err(|e| FetchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(FetchResponse { status, body })
    }
}
