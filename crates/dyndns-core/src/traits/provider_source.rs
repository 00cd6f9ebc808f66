// # Provider Source Trait
//
// Defines the interface used by the consensus resolver to query a single
// "what is my IP" provider.
//
// ## Implementations
//
// - HTTP(S): `dyndns-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::ProviderSource;
// use std::time::Duration;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* ProviderSource implementation */;
//
//     let body = source
//         .fetch("https://api.ipify.org", Duration::from_secs(10))
//         .await?;
//     println!("provider said: {}", body);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::time::Duration;

/// Trait for provider source implementations
///
/// A provider source turns a provider URL into the raw text of its response.
/// It does no parsing: candidate extraction and agreement checks belong to
/// the [`ConsensusResolver`](crate::consensus::ConsensusResolver).
///
/// # Trust Level: Untrusted
///
/// Responses are untrusted input. A source may return garbage, several
/// address-looking strings or a deliberately wrong address; the resolver
/// copes with all of these through multi-provider agreement.
///
/// ## Allowed Capabilities
/// - ✅ Perform one request to the given URL per call
/// - ✅ Return success or failure (the resolver handles backoff)
///
/// ## Forbidden Capabilities
/// - ❌ Retry or sleep (owned by `ConsensusResolver`)
/// - ❌ Cache responses between calls
/// - ❌ Interpret the response body
#[async_trait]
pub trait ProviderSource: Send + Sync {
    /// Fetch the raw response body from a provider
    ///
    /// # Parameters
    ///
    /// - `url`: The provider URL
    /// - `timeout`: Upper bound for the whole request
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The response body
    /// - `Err(Error)`: On timeout, connection failure, non-success status or
    ///   an unreadable body
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
