//! Update engine
//!
//! The UpdateEngine is responsible for:
//! - Resolving the external IP via the ConsensusResolver
//! - Comparing it with the configured A records of the live zone
//! - Rewriting stale records in a cloned zone version
//! - Activating the clone once at least one record was rewritten
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │ ConsensusResolver │─── Option<Ipv4Addr> ───┐
//! └───────────────────┘                        │
//!                                              ▼
//!                                     ┌──────────────┐
//!                                     │ UpdateEngine │
//!                                     └──────────────┘
//!                                              │
//!                     ┌────────────────────────┼────────────────────────┐
//!                     │                        │                        │
//!                     ▼                        ▼                        ▼
//!            ┌──────────────┐         ┌──────────────┐         ┌─────────────┐
//!            │ ZoneProvider │         │ ZoneProvider │         │   Events    │
//!            │ (read live)  │         │ (clone/write)│         │  (notify)   │
//!            └──────────────┘         └──────────────┘         └─────────────┘
//! ```
//!
//! ## Flow
//!
//! 1. Resolve the external IP (no consensus → `UpdateOutcome::Unresolved`)
//! 2. Read the live zone and sort names into unchanged / stale / missing
//! 3. If anything is stale, clone the zone, rewrite each stale record
//! 4. Activate the clone if at least one rewrite succeeded

use crate::config::{DyndnsConfig, ProviderList, normalize_names};
use crate::consensus::ConsensusResolver;
use crate::error::{Error, Result};
use crate::traits::{ACTIVE_VERSION, ZoneId, ZoneProvider, ZoneRecord, ZoneVersion};
use rand::Rng;
use std::net::Ipv4Addr;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the UpdateEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// External IP agreed on by the providers
    ExternalIpResolved {
        ip: Ipv4Addr,
    },

    /// Record already points at the external IP
    RecordUnchanged {
        record_name: String,
    },

    /// Record points somewhere else and needs rewriting
    RecordStale {
        record_name: String,
        current_value: String,
    },

    /// No A record with this name exists in the zone
    RecordMissing {
        record_name: String,
    },

    /// Active zone version cloned
    ZoneVersionCreated {
        zone_id: ZoneId,
        version: ZoneVersion,
    },

    /// Record rewritten in the cloned version
    RecordUpdated {
        record_name: String,
        new_ip: Ipv4Addr,
    },

    /// Record rewrite failed after all retries
    RecordUpdateFailed {
        record_name: String,
        error: String,
        retry_count: usize,
    },

    /// Cloned version made active
    ZoneVersionActivated {
        zone_id: ZoneId,
        version: ZoneVersion,
    },
}

/// A record that could not be brought up to date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Record name
    pub name: String,
    /// Why it failed
    pub reason: String,
}

/// Per-record results of a reconciliation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// The agreed external IP
    pub external_ip: Ipv4Addr,
    /// Records that already pointed at the external IP
    pub unchanged: Vec<String>,
    /// Records rewritten in the activated version
    pub updated: Vec<String>,
    /// Records that would have been rewritten (dry-run only)
    pub would_update: Vec<String>,
    /// Records that are missing or failed to update
    pub failed: Vec<RecordFailure>,
    /// Zone version made active, if any
    pub activated_version: Option<ZoneVersion>,
}

impl UpdateReport {
    fn new(external_ip: Ipv4Addr) -> Self {
        Self {
            external_ip,
            unchanged: Vec::new(),
            updated: Vec::new(),
            would_update: Vec::new(),
            failed: Vec::new(),
            activated_version: None,
        }
    }

    /// Whether any record could not be brought up to date
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    fn fail(&mut self, name: &str, reason: impl Into<String>) {
        self.failed.push(RecordFailure {
            name: name.to_string(),
            reason: reason.into(),
        });
    }
}

/// Outcome of a single engine run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Providers did not agree on an external IP within the attempt budget
    Unresolved {
        attempts: usize,
    },

    /// The zone was checked against the external IP
    Reconciled(UpdateReport),
}

/// Update engine
///
/// Runs a single resolve-and-reconcile pass. There is no loop or schedule:
/// the CLI runs once per invocation (from cron or a systemd timer).
pub struct UpdateEngine {
    /// Resolver for the external IP
    resolver: ConsensusResolver,

    /// Providers polled by the resolver
    providers: Vec<String>,

    /// Zone provider for reading and rewriting records
    zone_provider: Box<dyn ZoneProvider>,

    /// Domain whose zone holds the records
    domain: String,

    /// Record names to manage
    names: Vec<String>,

    /// Maximum retry attempts per record update
    max_retries: usize,

    /// Delay between retries (in seconds)
    retry_delay_secs: u64,

    /// Log intended writes instead of performing them
    dry_run: bool,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl UpdateEngine {
    /// Create a new update engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        resolver: ConsensusResolver,
        providers: ProviderList,
        zone_provider: Box<dyn ZoneProvider>,
        config: &DyndnsConfig,
        dry_run: bool,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            resolver,
            providers: providers.providers,
            zone_provider,
            domain: config.domain.clone(),
            names: normalize_names(&config.names),
            max_retries: config.engine.max_retries,
            retry_delay_secs: config.engine.retry_delay_secs,
            dry_run,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one resolve-and-reconcile pass
    ///
    /// # Returns
    ///
    /// - `Ok(UpdateOutcome)`: The run finished; per-record failures are in the report
    /// - `Err(Error)`: Configuration problem or a zone-level RPC failure
    pub async fn run<R: Rng>(&self, rng: &mut R) -> Result<UpdateOutcome> {
        let external_ip = match self.resolver.resolve(&self.providers, rng).await? {
            Some(ip) => ip,
            None => {
                return Ok(UpdateOutcome::Unresolved {
                    attempts: self.resolver.config().max_attempts,
                });
            }
        };

        info!("External IP is: {}", external_ip);
        self.emit_event(EngineEvent::ExternalIpResolved { ip: external_ip });

        let ip_text = external_ip.to_string();
        let mut report = UpdateReport::new(external_ip);

        debug!("Getting zone for domain '{}'", self.domain);
        let zone_id = self.zone_provider.zone_id(&self.domain).await?;

        let live = self
            .zone_provider
            .list_records(zone_id, ACTIVE_VERSION)
            .await?;
        debug!("Live zone {} has {} record(s)", zone_id, live.len());

        let mut stale = Vec::new();
        for name in &self.names {
            match live.iter().find(|r| r.is_dynamic_a_record(name)) {
                None => {
                    warn!("No A record named '{}' in zone {}", name, zone_id);
                    self.emit_event(EngineEvent::RecordMissing {
                        record_name: name.clone(),
                    });
                    report.fail(name, format!("no A record named '{}'", name));
                }
                Some(record) if record.value.trim() == ip_text => {
                    debug!("Record {} already points at {}", name, external_ip);
                    self.emit_event(EngineEvent::RecordUnchanged {
                        record_name: name.clone(),
                    });
                    report.unchanged.push(name.clone());
                }
                Some(record) => {
                    info!(
                        "Record {} points at {}, external IP is {}",
                        name,
                        record.value.trim(),
                        external_ip
                    );
                    self.emit_event(EngineEvent::RecordStale {
                        record_name: name.clone(),
                        current_value: record.value.trim().to_string(),
                    });
                    stale.push(name.clone());
                }
            }
        }

        if stale.is_empty() {
            info!("All records match the external IP, no update necessary");
            return Ok(UpdateOutcome::Reconciled(report));
        }

        if self.dry_run {
            for name in &stale {
                info!("[DRY-RUN] Would update record {} -> {}", name, external_ip);
            }
            report.would_update = stale;
            return Ok(UpdateOutcome::Reconciled(report));
        }

        let version = self.zone_provider.new_version(zone_id).await?;
        info!("Cloned zone {} into version {}", zone_id, version);
        self.emit_event(EngineEvent::ZoneVersionCreated { zone_id, version });

        let cloned = self.zone_provider.list_records(zone_id, version).await?;

        for name in &stale {
            let Some(record) = cloned.iter().find(|r| r.is_dynamic_a_record(name)) else {
                error!(
                    "Record {} disappeared from cloned zone version {}",
                    name, version
                );
                report.fail(name, format!("not found in cloned zone version {}", version));
                continue;
            };

            match self
                .update_record_with_retry(zone_id, version, record, external_ip)
                .await
            {
                Ok(()) => {
                    info!("Updated {} -> {} in version {}", name, external_ip, version);
                    report.updated.push(name.clone());
                }
                Err(e) => {
                    error!("Failed to update record {}: {}", name, e);
                    report.fail(name, e.to_string());
                }
            }
        }

        if report.updated.is_empty() {
            warn!(
                "No record was updated, leaving zone version {} inactive",
                version
            );
            return Ok(UpdateOutcome::Reconciled(report));
        }

        self.zone_provider.activate_version(zone_id, version).await?;
        info!("Set zone version {} as the active version", version);
        self.emit_event(EngineEvent::ZoneVersionActivated { zone_id, version });
        report.activated_version = Some(version);

        Ok(UpdateOutcome::Reconciled(report))
    }

    /// Rewrite a record with retry logic
    async fn update_record_with_retry(
        &self,
        zone_id: ZoneId,
        version: ZoneVersion,
        record: &ZoneRecord,
        new_ip: Ipv4Addr,
    ) -> Result<()> {
        let ip_text = new_ip.to_string();
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.do_update(zone_id, version, record, &ip_text).await {
                Ok(()) => {
                    self.emit_event(EngineEvent::RecordUpdated {
                        record_name: record.name.clone(),
                        new_ip,
                    });
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Update attempt {} failed for {}: {}",
                        attempt, record.name, e
                    );
                    last_error = Some(e);

                    // Wait before retry (unless this was the last attempt)
                    if attempt < self.max_retries {
                        tokio::time::sleep(tokio::time::Duration::from_secs(
                            self.retry_delay_secs,
                        ))
                        .await;
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| Error::Other("Unknown error".to_string()));
        self.emit_event(EngineEvent::RecordUpdateFailed {
            record_name: record.name.clone(),
            error: error.to_string(),
            retry_count: self.max_retries,
        });
        Err(error)
    }

    /// Perform a single record rewrite and check that it took
    async fn do_update(
        &self,
        zone_id: ZoneId,
        version: ZoneVersion,
        record: &ZoneRecord,
        ip_text: &str,
    ) -> Result<()> {
        let stored = self
            .zone_provider
            .update_record(zone_id, version, record, ip_text)
            .await?;

        match stored.first() {
            Some(updated) if updated.value.trim() == ip_text => Ok(()),
            Some(updated) => Err(Error::provider(
                self.zone_provider.provider_name(),
                format!(
                    "record {} stored value {} instead of {}",
                    record.name, updated.value, ip_text
                ),
            )),
            None => Err(Error::provider(
                self.zone_provider.provider_name(),
                format!("update of record {} returned no records", record.name),
            )),
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            // Full or closed; either way the run itself must not stall
            debug!("Engine event dropped (channel full or closed)");
        }
    }
}
