// # Gandi Zone Provider
//
// This crate provides a Gandi zone provider for the dynamic DNS updater.
//
// ## Implementation Status
//
// - ✅ One XML-RPC call per trait method
// - ✅ Full error propagation to the engine (the engine owns retries)
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Specific error handling for HTTP status codes (401, 403, 404, 429, 5xx)
// - ✅ XML-RPC faults surfaced as provider errors
// - ✅ Production and OT&E (sandbox) endpoints
// - ❌ NO retry logic (owned by UpdateEngine)
// - ❌ NO decision making: comparing values and choosing what to write is
//   the engine's job
//
// ## Security Requirements
//
// - API key NEVER appears in logs
// - Provider MUST fail fast if the key is empty
//
// ## API Reference
//
// Gandi XML-RPC API v3, hosted at `https://rpc.gandi.net/xmlrpc/`:
// - `domain.info(key, domain)`
// - `domain.zone.record.list(key, zone_id, version)`
// - `domain.zone.version.new(key, zone_id)`
// - `domain.zone.record.update(key, zone_id, version, {id}, {name, type, value})`
// - `domain.zone.version.set(key, zone_id, version)`

mod client;
pub mod xmlrpc;

pub use client::{DomainInfo, GandiClient, PRODUCTION_ENDPOINT, SANDBOX_ENDPOINT};

use async_trait::async_trait;
use dyndns_core::traits::{ZoneId, ZoneProvider, ZoneRecord, ZoneVersion};
use dyndns_core::{DyndnsConfig, Error, Result};

/// Gandi zone provider
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot: each trait method is exactly one XML-RPC call.
#[derive(Debug)]
pub struct GandiProvider {
    client: GandiClient,
}

impl GandiProvider {
    /// Create a provider over an existing client
    pub fn new(client: GandiClient) -> Self {
        Self { client }
    }

    /// Create a provider from the updater configuration
    pub fn from_config(config: &DyndnsConfig) -> Result<Self> {
        if config.sandbox {
            tracing::warn!("Using the Gandi OT&E sandbox, changes will not reach the live DNS");
        }
        Ok(Self::new(GandiClient::new(config.api_key.clone(), config.sandbox)?))
    }

    /// Underlying client
    pub fn client(&self) -> &GandiClient {
        &self.client
    }
}

#[async_trait]
impl ZoneProvider for GandiProvider {
    async fn zone_id(&self, domain: &str) -> Result<ZoneId> {
        let info = self.client.domain_info(domain).await?;
        tracing::debug!("Domain {} uses zone {}", domain, info.zone_id);
        Ok(info.zone_id)
    }

    async fn list_records(&self, zone_id: ZoneId, version: ZoneVersion) -> Result<Vec<ZoneRecord>> {
        self.client.zone_record_list(zone_id, version).await
    }

    async fn new_version(&self, zone_id: ZoneId) -> Result<ZoneVersion> {
        self.client.zone_version_new(zone_id).await
    }

    async fn update_record(
        &self,
        zone_id: ZoneId,
        version: ZoneVersion,
        record: &ZoneRecord,
        value: &str,
    ) -> Result<Vec<ZoneRecord>> {
        tracing::debug!(
            "Rewriting record {} (id {}) in zone {} version {}",
            record.name,
            record.id,
            zone_id,
            version
        );
        self.client
            .zone_record_update(zone_id, version, record, value)
            .await
    }

    async fn activate_version(&self, zone_id: ZoneId, version: ZoneVersion) -> Result<()> {
        if self.client.zone_version_set(zone_id, version).await? {
            Ok(())
        } else {
            Err(Error::provider(
                "gandi",
                format!("Gandi refused to activate zone {} version {}", zone_id, version),
            ))
        }
    }

    fn provider_name(&self) -> &'static str {
        "gandi"
    }
}
