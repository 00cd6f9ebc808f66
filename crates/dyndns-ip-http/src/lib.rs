// # HTTP Provider Source
//
// This crate provides the HTTP transport behind the consensus resolver.
//
// ## Purpose
//
// Fetches the raw body of a "what is my IP" page with a single GET. The
// body is handed back untouched: extracting and voting on addresses is the
// resolver's job, so a provider that wraps its answer in HTML works just as
// well as one returning plain text.
//
// ## Trust
//
// Nothing returned here is trusted. Non-2xx statuses, timeouts and
// transport failures all surface as `Error::Source` and merely cost the
// resolver one attempt.

use dyndns_core::traits::ProviderSource;
use dyndns_core::{Error, Result};

use std::time::Duration;

/// User agent sent with every provider request
const USER_AGENT: &str = concat!("dyndns/", env!("CARGO_PKG_VERSION"));

/// HTTP(S) provider source backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpProviderSource {
    /// HTTP client (connection pool shared across providers)
    client: reqwest::Client,
}

impl HttpProviderSource {
    /// Create a new HTTP provider source
    ///
    /// # Errors
    ///
    /// Returns `Error::Source` if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::source(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ProviderSource for HttpProviderSource {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String> {
        tracing::debug!("Querying provider {}", url);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::source(format!("Request to {} timed out after {:?}", url, timeout))
                } else {
                    Error::source(format!("Request to {} failed: {}", url, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::source(format!("{} returned HTTP {}", url, status)));
        }

        response
            .text()
            .await
            .map_err(|e| Error::source(format!("Failed to read response from {}: {}", url, e)))
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}
