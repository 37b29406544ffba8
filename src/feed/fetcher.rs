use std::future::Future;
use thiserror::Error;

/// Errors that can occur while retrieving a feed body.
///
/// Any fetch error is fatal to the refresh run that issued it; there is no
/// automatic retry; the next scheduled tick is an independent attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, body read).
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP response with non-2xx status code.
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
}

/// Abstract fetch collaborator: URL in, raw body out.
///
/// Retry, proxying, and CORS-style concerns belong to implementations, not
/// to the engine.
pub trait FeedFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// reqwest-backed fetcher used by the binary.
///
/// Deliberately minimal: one GET per call, no retries and no per-request
/// timeout, so a hung remote stalls the whole run. Callers wanting bounded
/// runs should configure a timeout on the client they pass in.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!(url, "Fetching feed");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}
