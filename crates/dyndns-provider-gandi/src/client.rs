//! Typed Gandi XML-RPC client
//!
//! Every Gandi method takes the API key as its first argument. The client
//! prepends it, so callers only pass the method's own parameters.

use crate::xmlrpc::{self, Value, XmlRpcError};
use dyndns_core::traits::{ZoneId, ZoneRecord, ZoneVersion};
use dyndns_core::{Error, Result};
use std::time::Duration;

/// Production XML-RPC endpoint
pub const PRODUCTION_ENDPOINT: &str = "https://rpc.gandi.net/xmlrpc/";

/// OT&E (sandbox) XML-RPC endpoint
pub const SANDBOX_ENDPOINT: &str = "https://rpc.ote.gandi.net/xmlrpc/";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER: &str = "gandi";

/// Subset of `domain.info` the updater needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    pub fqdn: Option<String>,
    pub zone_id: ZoneId,
}

/// Gandi XML-RPC client
///
/// # Security
///
/// The API key travels inside the request body and is never logged. The
/// Debug implementation does not expose it.
pub struct GandiClient {
    /// Gandi API key
    /// ⚠️ NEVER log this value
    api_key: String,

    /// XML-RPC endpoint URL
    endpoint: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

impl std::fmt::Debug for GandiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GandiClient")
            .field("api_key", &"<REDACTED>")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GandiClient {
    /// Create a client for the production or OT&E endpoint
    ///
    /// # Errors
    ///
    /// Fails with `Error::Config` on an empty API key.
    pub fn new(api_key: impl Into<String>, sandbox: bool) -> Result<Self> {
        let endpoint = if sandbox {
            SANDBOX_ENDPOINT
        } else {
            PRODUCTION_ENDPOINT
        };
        Self::with_endpoint(api_key, endpoint)
    }

    /// Create a client for an arbitrary endpoint
    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("Gandi API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            endpoint: endpoint.into(),
            client,
        })
    }

    /// Endpoint this client talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `domain.info`
    pub async fn domain_info(&self, domain: &str) -> Result<DomainInfo> {
        let info = self.call(&["domain", "info"], vec![domain.into()]).await?;

        let zone_id = info
            .get("zone_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                Error::not_found(format!("Domain {} has no zone attached", domain))
            })?;

        Ok(DomainInfo {
            fqdn: info.get("fqdn").and_then(Value::as_str).map(str::to_string),
            zone_id,
        })
    }

    /// `domain.zone.record.list`
    pub async fn zone_record_list(
        &self,
        zone_id: ZoneId,
        version: ZoneVersion,
    ) -> Result<Vec<ZoneRecord>> {
        let records = self
            .call(
                &["domain", "zone", "record", "list"],
                vec![zone_id.into(), version.into()],
            )
            .await?;
        parse_records(&records)
    }

    /// `domain.zone.version.new`
    ///
    /// Clones the active version and returns the new version number.
    pub async fn zone_version_new(&self, zone_id: ZoneId) -> Result<ZoneVersion> {
        let version = self
            .call(&["domain", "zone", "version", "new"], vec![zone_id.into()])
            .await?;
        version
            .as_i64()
            .ok_or_else(|| malformed("domain.zone.version.new did not return an integer"))
    }

    /// `domain.zone.record.update`
    ///
    /// Rewrites the record identified by `record.id` in `version` with
    /// `value`, keeping its name, type and TTL.
    pub async fn zone_record_update(
        &self,
        zone_id: ZoneId,
        version: ZoneVersion,
        record: &ZoneRecord,
        value: &str,
    ) -> Result<Vec<ZoneRecord>> {
        let selector = Value::structure([("id", Value::Int(record.id))]);

        let mut params = vec![
            ("name", Value::from(record.name.as_str())),
            ("type", Value::from(record.record_type.as_str())),
            ("value", Value::from(value)),
        ];
        if let Some(ttl) = record.ttl {
            params.push(("ttl", Value::Int(i64::from(ttl))));
        }

        let updated = self
            .call(
                &["domain", "zone", "record", "update"],
                vec![
                    zone_id.into(),
                    version.into(),
                    selector,
                    Value::structure(params),
                ],
            )
            .await?;
        parse_records(&updated)
    }

    /// `domain.zone.version.set`
    pub async fn zone_version_set(&self, zone_id: ZoneId, version: ZoneVersion) -> Result<bool> {
        let result = self
            .call(
                &["domain", "zone", "version", "set"],
                vec![zone_id.into(), version.into()],
            )
            .await?;
        result
            .as_bool()
            .ok_or_else(|| malformed("domain.zone.version.set did not return a boolean"))
    }

    /// Invoke a dotted method with the API key prepended
    async fn call(&self, path: &[&str], params: Vec<Value>) -> Result<Value> {
        let method = path.join(".");

        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(Value::Str(self.api_key.clone()));
        args.extend(params);

        tracing::debug!("Calling {} on {}", method, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "text/xml")
            .body(xmlrpc::encode_call(&method, &args))
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(match status.as_u16() {
                401 | 403 => Error::auth(format!(
                    "Gandi rejected the API key or its permissions. Status: {}",
                    status
                )),
                404 => Error::not_found(format!("XML-RPC endpoint not found: {}", self.endpoint)),
                429 => Error::rate_limited(format!(
                    "Rate limit exceeded. Please retry later. Status: {}",
                    status
                )),
                500..=599 => Error::provider(
                    PROVIDER,
                    format!("Gandi server error (transient): {} - {}", status, error_text),
                ),
                _ => Error::provider(
                    PROVIDER,
                    format!("{} failed: {} - {}", method, status, error_text),
                ),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to read response: {}", e)))?;

        xmlrpc::decode_response(&body).map_err(|e| match e {
            XmlRpcError::Fault { code, message } => {
                Error::provider(PROVIDER, format!("{} fault {}: {}", method, code, message))
            }
            other => Error::provider(PROVIDER, format!("{}: {}", method, other)),
        })
    }
}

fn malformed(message: &str) -> Error {
    Error::provider(PROVIDER, format!("Invalid response format: {}", message))
}

fn parse_records(value: &Value) -> Result<Vec<ZoneRecord>> {
    let items = value
        .as_array()
        .ok_or_else(|| malformed("record list is not an array"))?;

    items.iter().map(parse_record).collect()
}

fn parse_record(value: &Value) -> Result<ZoneRecord> {
    let id = value
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| malformed("record.id is not an integer"))?;
    let text = |field: &str| {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed(&format!("record.{} is not a string", field)))
    };

    Ok(ZoneRecord {
        id,
        name: text("name")?,
        record_type: text("type")?,
        value: text("value")?,
        ttl: value
            .get("ttl")
            .and_then(Value::as_i64)
            .and_then(|ttl| u32::try_from(ttl).ok()),
    })
}
