//! Error types for the dynamic DNS updater
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for updater operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the updater
#[derive(Error, Debug)]
pub enum Error {
    /// Provider source errors (a single "what is my IP" fetch failed)
    #[error("Provider source error: {0}")]
    Source(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider set is empty after normalisation
    ///
    /// Kept apart from [`Error::Config`] so callers can tell a setup defect
    /// from a resolver that simply found no agreement.
    #[error("No IP providers configured")]
    NoProviders,

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Record or zone not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a provider source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error comes from configuration rather than the network
    ///
    /// The CLI maps these to the "cannot run" exit code.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::NoProviders | Self::Json(_))
    }
}
