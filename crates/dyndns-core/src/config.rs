//! Configuration types for the dynamic DNS updater
//!
//! Two JSON files drive a run:
//!
//! - the main config (`config.json`): API key, domain, record names and
//!   optional resolver/engine tuning
//! - the providers file (`providers.json`): `{"providers": [...]}`, the list
//!   of "what is my IP" endpoints polled by the consensus resolver

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Config keys that were renamed in a backward-incompatible way.
///
/// Each entry is `(old key, new key, hint)`.
const RENAMED_KEYS: &[(&str, &str, &str)] = &[(
    "name",
    "names",
    "it now takes a list of record names, e.g. \"names\": [\"@\", \"www\"]",
)];

/// Main updater configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DyndnsConfig {
    /// Registrar API key
    pub api_key: String,

    /// Domain whose zone holds the records (e.g. "example.com")
    pub domain: String,

    /// Record names to keep pointed at the external IP (e.g. "@", "home")
    pub names: Vec<String>,

    /// Use the registrar's test environment instead of production
    #[serde(default)]
    pub sandbox: bool,

    /// Path of the providers file, relative to the working directory
    #[serde(default = "default_providers_file")]
    pub providers_file: String,

    /// Consensus resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Update engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for DyndnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DyndnsConfig")
            .field("api_key", &"<REDACTED>")
            .field("domain", &self.domain)
            .field("names", &self.names)
            .field("sandbox", &self.sandbox)
            .field("providers_file", &self.providers_file)
            .field("resolver", &self.resolver)
            .field("engine", &self.engine)
            .finish()
    }
}

impl DyndnsConfig {
    /// Parse a configuration from JSON text
    ///
    /// Renamed keys are rejected before deserialization so that an old
    /// config file fails loudly instead of silently managing no records.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(text)?;

        if let Some(map) = raw.as_object() {
            for (old, new, hint) in RENAMED_KEYS {
                if map.contains_key(*old) {
                    return Err(Error::config(format!(
                        "config key '{}' is no longer supported and was renamed to '{}': {}",
                        old, new, hint
                    )));
                }
            }
        }

        let mut config: Self = serde_json::from_value(raw)?;
        config.names = normalize_names(&config.names);
        Ok(config)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::config("api_key cannot be empty"));
        }

        let key_lower = self.api_key.to_lowercase();
        if key_lower.contains("your_api_key")
            || key_lower.contains("replace_me")
            || key_lower == "api_key"
        {
            return Err(Error::config(
                "api_key appears to be a placeholder. Use the API key from your registrar account.",
            ));
        }

        validate_domain_name(&self.domain)?;

        if self.names.is_empty() {
            return Err(Error::config(
                "names must contain at least one record name, e.g. \"names\": [\"@\"]",
            ));
        }

        for name in &self.names {
            validate_record_name(name)?;
        }

        if self.providers_file.trim().is_empty() {
            return Err(Error::config("providers_file cannot be empty"));
        }

        self.resolver.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Consensus resolver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Total provider queries allowed across all rounds
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Sightings within one round needed before an address is trusted
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Per-request timeout (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Lower bound of the randomized sleep after a failed fetch (in milliseconds)
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,

    /// Upper bound of the randomized sleep after a failed fetch (in milliseconds)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl ResolverConfig {
    /// Validate the resolver settings
    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(Error::config("resolver.threshold must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config("resolver.request_timeout_secs must be > 0"));
        }
        if self.backoff_min_ms > self.backoff_max_ms {
            return Err(Error::config(format!(
                "resolver.backoff_min_ms ({}) cannot exceed resolver.backoff_max_ms ({})",
                self.backoff_min_ms, self.backoff_max_ms
            )));
        }
        Ok(())
    }

    /// Per-request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            threshold: default_threshold(),
            request_timeout_secs: default_request_timeout_secs(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

/// Update engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of retry attempts for a failed record update
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay between retry attempts (in seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped with a warning log.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine settings
    pub fn validate(&self) -> Result<()> {
        if self.max_retries > 10 {
            return Err(Error::config(format!(
                "engine.max_retries must be between 0 and 10. Got: {}",
                self.max_retries
            )));
        }
        if self.retry_delay_secs > 300 {
            return Err(Error::config(format!(
                "engine.retry_delay_secs must be at most 300 seconds. Got: {}",
                self.retry_delay_secs
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("engine.event_channel_capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// The set of "what is my IP" endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderList {
    /// Provider URLs
    pub providers: Vec<String>,
}

impl ProviderList {
    /// Build a normalised provider list
    ///
    /// Entries are trimmed, blanks are dropped and duplicates are removed
    /// while keeping first-seen order.
    pub fn new<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            providers: normalize_providers(providers),
        }
    }

    /// Parse a providers file from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(text).map_err(|e| {
            if text.trim_start().starts_with("http") {
                Error::config(
                    "providers file looks like the old one-URL-per-line format; \
                     it must now be JSON: {\"providers\": [\"https://...\"]}",
                )
            } else {
                Error::Json(e)
            }
        })?;
        Ok(Self::new(parsed.providers))
    }

    /// Load a providers file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "cannot read providers file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&text)
    }

    /// Number of distinct providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no providers are configured
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Trim, drop blanks and de-duplicate a provider list, keeping first-seen order
pub fn normalize_providers<I, S>(providers: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    providers
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

/// Trim and de-duplicate record names, keeping first-seen order
///
/// Blank names are kept so that `validate()` still reports them.
pub fn normalize_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .map(|n| n.as_ref().trim().to_string())
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

/// Validate that a string is a plausible domain name
///
/// Basic RFC 1035 checks; catches common typos, not every invalid name.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(Error::config("domain cannot be empty"));
    }

    if domain.len() > 253 {
        return Err(Error::config(format!(
            "domain too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.split('.') {
        validate_label(label, domain)?;
    }

    Ok(())
}

/// Validate a record name relative to the zone
///
/// `@` addresses the zone apex.
fn validate_record_name(name: &str) -> Result<()> {
    if name == "@" {
        return Ok(());
    }

    if name.is_empty() {
        return Err(Error::config("record name cannot be empty"));
    }

    for (i, label) in name.split('.').enumerate() {
        // Wildcard allowed as the leftmost label only
        if i == 0 && label == "*" {
            continue;
        }
        validate_label(label, name)?;
    }

    Ok(())
}

fn validate_label(label: &str, whole: &str) -> Result<()> {
    if label.is_empty() {
        return Err(Error::config(format!("name has empty label: '{}'", whole)));
    }

    if label.len() > 63 {
        return Err(Error::config(format!(
            "label too long: {} chars (max 63). Label: '{}'",
            label.len(),
            label
        )));
    }

    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::config(format!(
            "label contains invalid characters. Label: '{}'. \
             Valid: alphanumeric, hyphen and underscore only.",
            label
        )));
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(Error::config(format!(
            "label cannot start or end with hyphen. Label: '{}'",
            label
        )));
    }

    Ok(())
}

fn default_providers_file() -> String {
    "providers.json".to_string()
}

fn default_max_attempts() -> usize {
    100
}

fn default_threshold() -> usize {
    3
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_backoff_min_ms() -> u64 {
    100
}

fn default_backoff_max_ms() -> u64 {
    2100
}

fn default_max_retries() -> usize {
    2
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_event_channel_capacity() -> usize {
    256
}
