//! Core traits for the updater
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ProviderSource`]: Fetch raw responses from "what is my IP" providers
//! - [`ZoneProvider`]: Read and rewrite records in versioned DNS zones

pub mod provider_source;
pub mod zone_provider;

pub use provider_source::ProviderSource;
pub use zone_provider::{ACTIVE_VERSION, ZoneId, ZoneProvider, ZoneRecord, ZoneVersion};
