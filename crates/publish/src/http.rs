//! HTTP client with retry logic for CDN purge requests

use reqwest::{Client, Method, Response, StatusCode};
use shipwright_config::NetworkConfig;
use shipwright_errors::{Error, PublishError};
use std::time::Duration;

/// Header that asks Fastly to mark objects stale instead of evicting them
const SOFT_PURGE_HEADER: &str = "Fastly-Soft-Purge";

/// HTTP client wrapper with retry logic
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retries: u32,
    retry_delay: Duration,
}

impl HttpClient {
    /// Create a client from the network configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client fails to initialize.
    pub fn new(network: &NetworkConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(network.timeout))
            .connect_timeout(Duration::from_secs(30))
            .user_agent(format!("shipwright/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::internal(format!("http client: {e}")))?;

        Ok(Self {
            client,
            retries: network.retries,
            retry_delay: Duration::from_secs(network.retry_delay),
        })
    }

    /// Issue one soft-purge request and return the response status
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retry attempts.
    pub async fn purge(&self, url: &str) -> Result<StatusCode, Error> {
        let method = Method::from_bytes(b"PURGE")
            .map_err(|e| Error::internal(format!("PURGE method: {e}")))?;
        let response = self
            .retry_request(url, || {
                self.client
                    .request(method.clone(), url)
                    .header(SOFT_PURGE_HEADER, "1")
                    .send()
            })
            .await?;
        Ok(response.status())
    }

    /// Execute a request with retries on transient failures
    async fn retry_request<F, Fut>(&self, url: &str, mut f: F) -> Result<Response, Error>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match f().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    let transient = should_retry(&e);
                    last_error = Some(e);
                    if !transient {
                        break;
                    }
                }
            }
        }

        let message = match &last_error {
            Some(e) if e.is_timeout() => "request timed out".to_string(),
            Some(e) => e.to_string(),
            None => "unknown error".to_string(),
        };
        Err(PublishError::PurgeRequestFailed {
            url: url.to_string(),
            message,
        }
        .into())
    }
}

/// Retry on timeouts, connection errors, and server errors
fn should_retry(error: &reqwest::Error) -> bool {
    error.is_timeout()
        || error.is_connect()
        || error.status().is_none_or(|s| s.is_server_error())
}
