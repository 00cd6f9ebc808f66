//! Test doubles and common utilities for contract tests
//!
//! This module provides scripted provider sources and an in-memory zone
//! provider. None of them touch the network.

#![allow(dead_code)]

use dyndns_core::config::{DyndnsConfig, EngineConfig, ResolverConfig};
use dyndns_core::error::{Error, Result};
use dyndns_core::traits::{ProviderSource, ZoneId, ZoneProvider, ZoneRecord, ZoneVersion};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A provider source answering from a fixed per-URL table
///
/// URLs missing from the table fail like an unreachable host.
pub struct FixedSource {
    replies: HashMap<String, std::result::Result<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl FixedSource {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make `url` answer with `body`
    pub fn answering(mut self, url: &str, body: &str) -> Self {
        self.replies.insert(url.to_string(), Ok(body.to_string()));
        self
    }

    /// Make `url` fail with `error`
    pub fn failing(mut self, url: &str, error: &str) -> Self {
        self.replies.insert(url.to_string(), Err(error.to_string()));
        self
    }

    /// Number of fetches made so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// URLs fetched, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProviderSource for FixedSource {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<String> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.replies.get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(error)) => Err(Error::source(error.clone())),
            None => Err(Error::source(format!("connection refused: {}", url))),
        }
    }

    fn source_name(&self) -> &'static str {
        "fixed"
    }
}

/// A provider source answering by global call order, whatever the URL
///
/// Lets a test control exactly what the n-th request sees, independent of
/// how the resolver shuffled its providers. Fails once the script runs out.
pub struct SequenceSource {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    calls: AtomicUsize,
}

impl SequenceSource {
    pub fn new<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = std::result::Result<S, S>>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(
                bodies
                    .into_iter()
                    .map(|r| r.map(Into::into).map_err(Into::into))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ProviderSource for SequenceSource {
    async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(body)) => Ok(body),
            Some(Err(error)) => Err(Error::source(error)),
            None => Err(Error::source("script exhausted")),
        }
    }

    fn source_name(&self) -> &'static str {
        "sequence"
    }
}

/// Shared state behind [`MockZoneProvider`]
#[derive(Default)]
pub struct ZoneState {
    /// Records per version; version 0 is never stored, it aliases `active`
    pub versions: HashMap<ZoneVersion, Vec<ZoneRecord>>,
    pub active: ZoneVersion,
    pub next_version: ZoneVersion,
    pub zone_lookups: usize,
    pub new_version_calls: usize,
    pub update_calls: usize,
    pub activate_calls: usize,
    /// Record names whose updates always fail
    pub failing_updates: HashSet<String>,
    /// Remaining failures before updates start succeeding
    pub transient_failures: usize,
}

/// An in-memory versioned zone
#[derive(Clone)]
pub struct MockZoneProvider {
    pub zone_id: ZoneId,
    pub state: Arc<Mutex<ZoneState>>,
}

impl MockZoneProvider {
    /// Create a zone whose active version holds `records`
    pub fn new(records: Vec<ZoneRecord>) -> Self {
        let mut state = ZoneState {
            active: 1,
            next_version: 2,
            ..ZoneState::default()
        };
        state.versions.insert(1, records);

        Self {
            zone_id: 4242,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Make every update of `name` fail
    pub fn fail_updates_for(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_updates
            .insert(name.to_string());
        self
    }

    /// Fail the next `n` updates, whatever the record
    pub fn fail_next_updates(self, n: usize) -> Self {
        self.state.lock().unwrap().transient_failures = n;
        self
    }

    pub fn active_records(&self) -> Vec<ZoneRecord> {
        let state = self.state.lock().unwrap();
        state.versions[&state.active].clone()
    }

    pub fn active_version(&self) -> ZoneVersion {
        self.state.lock().unwrap().active
    }

    pub fn new_version_calls(&self) -> usize {
        self.state.lock().unwrap().new_version_calls
    }

    pub fn update_calls(&self) -> usize {
        self.state.lock().unwrap().update_calls
    }

    pub fn activate_calls(&self) -> usize {
        self.state.lock().unwrap().activate_calls
    }
}

#[async_trait::async_trait]
impl ZoneProvider for MockZoneProvider {
    async fn zone_id(&self, _domain: &str) -> Result<ZoneId> {
        self.state.lock().unwrap().zone_lookups += 1;
        Ok(self.zone_id)
    }

    async fn list_records(&self, zone_id: ZoneId, version: ZoneVersion) -> Result<Vec<ZoneRecord>> {
        assert_eq!(zone_id, self.zone_id);
        let state = self.state.lock().unwrap();
        let version = if version == 0 { state.active } else { version };
        state
            .versions
            .get(&version)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("zone version {}", version)))
    }

    async fn new_version(&self, zone_id: ZoneId) -> Result<ZoneVersion> {
        assert_eq!(zone_id, self.zone_id);
        let mut state = self.state.lock().unwrap();
        state.new_version_calls += 1;

        let version = state.next_version;
        state.next_version += 1;

        // Clones get fresh record IDs, as real registrars do
        let cloned = state.versions[&state.active]
            .iter()
            .map(|r| ZoneRecord {
                id: r.id + version * 1000,
                ..r.clone()
            })
            .collect();
        state.versions.insert(version, cloned);
        Ok(version)
    }

    async fn update_record(
        &self,
        zone_id: ZoneId,
        version: ZoneVersion,
        record: &ZoneRecord,
        value: &str,
    ) -> Result<Vec<ZoneRecord>> {
        assert_eq!(zone_id, self.zone_id);
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;

        assert_ne!(version, state.active, "the active version must never be written");

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(Error::provider("mock", "transient failure"));
        }
        if state.failing_updates.contains(&record.name) {
            return Err(Error::provider("mock", format!("cannot update {}", record.name)));
        }

        let records = state
            .versions
            .get_mut(&version)
            .ok_or_else(|| Error::not_found(format!("zone version {}", version)))?;
        let stored = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| Error::not_found(format!("record id {}", record.id)))?;
        stored.value = value.to_string();

        Ok(vec![stored.clone()])
    }

    async fn activate_version(&self, zone_id: ZoneId, version: ZoneVersion) -> Result<()> {
        assert_eq!(zone_id, self.zone_id);
        let mut state = self.state.lock().unwrap();
        state.activate_calls += 1;
        state.active = version;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Build an A record
pub fn a_record(id: i64, name: &str, value: &str) -> ZoneRecord {
    ZoneRecord {
        id,
        name: name.to_string(),
        record_type: "A".to_string(),
        value: value.to_string(),
        ttl: Some(300),
    }
}

/// Resolver settings with no backoff sleeps
pub fn resolver_config(threshold: usize, max_attempts: usize) -> ResolverConfig {
    ResolverConfig {
        max_attempts,
        threshold,
        request_timeout_secs: 1,
        backoff_min_ms: 0,
        backoff_max_ms: 0,
    }
}

/// Helper to create a minimal valid DyndnsConfig for testing
pub fn minimal_config(names: &[&str]) -> DyndnsConfig {
    DyndnsConfig {
        api_key: "test-api-key".to_string(),
        domain: "example.com".to_string(),
        names: names.iter().map(|n| n.to_string()).collect(),
        sandbox: true,
        providers_file: "providers.json".to_string(),
        resolver: resolver_config(2, 20),
        engine: EngineConfig {
            max_retries: 0,
            retry_delay_secs: 0,
            event_channel_capacity: 100,
        },
    }
}

/// Provider URLs `https://p0.test/` .. `https://p{n-1}.test/`
pub fn provider_urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://p{}.test/", i)).collect()
}

/// Drain every event currently queued on a receiver
pub fn drain<T>(rx: &mut tokio::sync::mpsc::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
