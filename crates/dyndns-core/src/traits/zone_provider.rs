// # Zone Provider Trait
//
// Defines the interface for reading and rewriting DNS records through a
// registrar API with versioned zones.
//
// ## Implementations
//
// - Gandi (XML-RPC): `dyndns-provider-gandi` crate
//
// ## Write Path
//
// Records are never edited in place. The engine clones the active zone
// version, rewrites records in the clone and then activates it:
//
// ```rust,ignore
// let zone_id = provider.zone_id("example.com").await?;
// let version = provider.new_version(zone_id).await?;
// let cloned = provider.list_records(zone_id, version).await?;
// provider.update_record(zone_id, version, &cloned[0], "203.0.113.7").await?;
// provider.activate_version(zone_id, version).await?;
// ```

use async_trait::async_trait;

/// Registrar-side zone identifier
pub type ZoneId = i64;

/// Registrar-side zone version number
pub type ZoneVersion = i64;

/// Version number that addresses the currently active zone version
pub const ACTIVE_VERSION: ZoneVersion = 0;

/// A DNS record as stored in a zone version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    /// Record ID (unique within a zone version)
    pub id: i64,
    /// Record name relative to the zone (e.g. "@" or "home")
    pub name: String,
    /// Record type (e.g. "A", "AAAA", "CNAME")
    pub record_type: String,
    /// Record value (for A records, the IPv4 address)
    pub value: String,
    /// Time-to-live in seconds, if the zone sets one
    pub ttl: Option<u32>,
}

impl ZoneRecord {
    /// Whether this is the dynamic A record called `name`
    ///
    /// Names compare exactly; the type compares case-insensitively.
    pub fn is_dynamic_a_record(&self, name: &str) -> bool {
        self.name == name && self.record_type.eq_ignore_ascii_case("a")
    }
}

/// Trait for zone provider implementations
///
/// # Trust Level: Untrusted
///
/// Like the DNS providers it is modelled on, a zone provider is isolated and
/// single-shot. Each method maps to one remote call.
///
/// ## Forbidden Capabilities
/// - ❌ Retry logic or backoff (owned by `UpdateEngine`)
/// - ❌ Deciding whether an update is needed (owned by `UpdateEngine`)
/// - ❌ Spawning tasks
#[async_trait]
pub trait ZoneProvider: Send + Sync {
    /// Look up the zone attached to a domain
    async fn zone_id(&self, domain: &str) -> Result<ZoneId, crate::Error>;

    /// List the records of a zone version
    ///
    /// Pass [`ACTIVE_VERSION`] to read the live zone.
    async fn list_records(
        &self,
        zone_id: ZoneId,
        version: ZoneVersion,
    ) -> Result<Vec<ZoneRecord>, crate::Error>;

    /// Clone the active zone version into a new, inactive version
    ///
    /// # Returns
    ///
    /// The number of the new version
    async fn new_version(&self, zone_id: ZoneId) -> Result<ZoneVersion, crate::Error>;

    /// Rewrite one record of an inactive zone version
    ///
    /// # Parameters
    ///
    /// - `record`: The record to rewrite, as listed from `version`
    /// - `value`: The new record value
    ///
    /// # Returns
    ///
    /// The records as stored after the update
    async fn update_record(
        &self,
        zone_id: ZoneId,
        version: ZoneVersion,
        record: &ZoneRecord,
        value: &str,
    ) -> Result<Vec<ZoneRecord>, crate::Error>;

    /// Make a zone version the active one
    async fn activate_version(
        &self,
        zone_id: ZoneId,
        version: ZoneVersion,
    ) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
