//! External IP consensus resolver
//!
//! Works out the caller's public IPv4 address by polling untrusted
//! "what is my IP" providers until enough of them agree.
//!
//! ## Algorithm
//!
//! ```text
//! while budget > 0:
//!     budget -= 1
//!     if pool is empty:            # new round
//!         pool  = shuffle(providers)
//!         tally = {}
//!     provider = pool.pop()
//!     body = fetch(provider)       # on error: log, random backoff, next
//!     vote for ONE random dotted quad found in body
//!     if max(tally) >= threshold:
//!         return that address
//! return None
//! ```
//!
//! - Each provider gets at most one vote per round, no matter how many
//!   address-looking strings its page contains.
//! - The tally is cleared whenever the pool is refilled. Agreement has to be
//!   reached among distinct providers inside a single round.
//! - Failures cost budget but never abort resolution. Running out of budget
//!   is a normal outcome (`Ok(None)`), not an error.

pub mod tally;

pub use tally::{AgreementTally, extract_candidates, normalize_candidate};

use crate::config::{ResolverConfig, normalize_providers};
use crate::error::{Error, Result};
use crate::traits::ProviderSource;

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Events emitted by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverEvent {
    /// Pool refilled and tally cleared
    RoundStarted {
        round: usize,
        providers: usize,
    },

    /// A provider could not be queried
    ProviderFailed {
        provider: String,
        error: String,
    },

    /// A provider answered without any address-looking string
    NoCandidates {
        provider: String,
    },

    /// One candidate from a provider's answer was counted
    CandidateSampled {
        provider: String,
        candidate: String,
        candidates_found: usize,
        count: usize,
    },

    /// A candidate reached the threshold but is not a valid IPv4 address
    InvalidConsensus {
        candidate: String,
        count: usize,
    },

    /// An address reached the threshold
    ConsensusReached {
        address: Ipv4Addr,
        count: usize,
        attempts_used: usize,
    },

    /// The attempt budget ran out without agreement
    BudgetExhausted {
        attempts: usize,
    },
}

/// Result of querying one provider in survey mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSurvey {
    /// Provider URL
    pub provider: String,
    /// Every candidate found, or the error text
    pub outcome: std::result::Result<Vec<String>, String>,
}

/// Consensus resolver over a [`ProviderSource`]
///
/// The resolver holds no per-run state: every [`resolve`](Self::resolve)
/// call owns its own pool, tally and budget, so one resolver can be reused
/// for any number of runs.
pub struct ConsensusResolver {
    /// Source used to query providers
    source: Arc<dyn ProviderSource>,

    /// Budget, threshold, timeout and backoff settings
    config: ResolverConfig,

    /// Optional event sink
    events: Option<mpsc::Sender<ResolverEvent>>,
}

impl ConsensusResolver {
    /// Create a new resolver
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation (for example
    /// a zero threshold).
    pub fn new(source: Arc<dyn ProviderSource>, config: ResolverConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            source,
            config,
            events: None,
        })
    }

    /// Attach a sink that receives a [`ResolverEvent`] for every step
    pub fn with_event_sink(mut self, events: mpsc::Sender<ResolverEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Resolver settings
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the external IPv4 address
    ///
    /// # Parameters
    ///
    /// - `providers`: Provider URLs (normalised before use)
    /// - `rng`: Randomness for shuffling, vote sampling and backoff
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ip))`: `threshold` providers agreed on `ip` within one round
    /// - `Ok(None)`: The attempt budget ran out first
    /// - `Err(Error::NoProviders)`: Nothing to query; no request was made
    pub async fn resolve<R: Rng>(
        &self,
        providers: &[String],
        rng: &mut R,
    ) -> Result<Option<Ipv4Addr>> {
        let providers = normalize_providers(providers);
        if providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let timeout = self.config.request_timeout();
        let threshold = self.config.threshold;

        let mut pool: Vec<String> = Vec::with_capacity(providers.len());
        let mut tally = AgreementTally::new();
        let mut rejected: HashSet<String> = HashSet::new();
        let mut attempts_left = self.config.max_attempts;
        let mut round = 0;

        debug!(
            "Resolving external IP from {} provider(s) (threshold={}, budget={})",
            providers.len(),
            threshold,
            attempts_left
        );

        while attempts_left > 0 {
            attempts_left -= 1;

            if pool.is_empty() {
                pool.extend(providers.iter().cloned());
                pool.shuffle(rng);
                tally.clear();
                round += 1;

                debug!("Starting round {} over {} provider(s)", round, pool.len());
                self.emit(ResolverEvent::RoundStarted {
                    round,
                    providers: pool.len(),
                });
            }

            let Some(provider) = pool.pop() else {
                continue;
            };

            let body = match self.source.fetch(&provider, timeout).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Error getting external IP address from {}: {}", provider, e);
                    self.emit(ResolverEvent::ProviderFailed {
                        provider,
                        error: e.to_string(),
                    });
                    self.backoff(rng).await;
                    continue;
                }
            };

            let candidates = extract_candidates(&body);
            match candidates.choose(rng) {
                Some(candidate) => {
                    let candidate = normalize_candidate(candidate);
                    let count = tally.record(&candidate);
                    debug!(
                        "{} voted for {} ({} candidate(s) found, count now {})",
                        provider,
                        candidate,
                        candidates.len(),
                        count
                    );
                    self.emit(ResolverEvent::CandidateSampled {
                        provider,
                        candidate,
                        candidates_found: candidates.len(),
                        count,
                    });
                }
                None => {
                    debug!("{} returned no address-looking strings", provider);
                    self.emit(ResolverEvent::NoCandidates { provider });
                }
            }

            if let Some((address, count)) = self.agreed_address(&tally, &mut rejected) {
                let attempts_used = self.config.max_attempts - attempts_left;
                info!(
                    "External IP {} confirmed by {} provider(s) after {} attempt(s)",
                    address, count, attempts_used
                );
                self.emit(ResolverEvent::ConsensusReached {
                    address,
                    count,
                    attempts_used,
                });
                return Ok(Some(address));
            }
        }

        warn!(
            "No provider agreement on the external IP after {} attempt(s)",
            self.config.max_attempts
        );
        self.emit(ResolverEvent::BudgetExhausted {
            attempts: self.config.max_attempts,
        });
        Ok(None)
    }

    /// Query every provider once and report what each one returned
    ///
    /// Diagnostic counterpart of [`resolve`](Self::resolve): no tally, no
    /// backoff, and providers are visited in configured order.
    pub async fn survey(&self, providers: &[String]) -> Result<Vec<ProviderSurvey>> {
        let providers = normalize_providers(providers);
        if providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let timeout = self.config.request_timeout();
        let mut results = Vec::with_capacity(providers.len());

        for provider in providers {
            let outcome = match self.source.fetch(&provider, timeout).await {
                Ok(body) => Ok(extract_candidates(&body)
                    .into_iter()
                    .map(normalize_candidate)
                    .collect()),
                Err(e) => Err(e.to_string()),
            };
            results.push(ProviderSurvey { provider, outcome });
        }

        Ok(results)
    }

    /// Scan the tally in descending count order for a trusted address
    ///
    /// Candidates that agree but do not parse as IPv4 are remembered in
    /// `rejected` and skipped from then on.
    fn agreed_address(
        &self,
        tally: &AgreementTally,
        rejected: &mut HashSet<String>,
    ) -> Option<(Ipv4Addr, usize)> {
        for (candidate, count) in tally.most_common() {
            if count < self.config.threshold {
                break;
            }
            if rejected.contains(candidate) {
                continue;
            }

            match candidate.parse::<Ipv4Addr>() {
                Ok(address) => return Some((address, count)),
                Err(_) => {
                    warn!(
                        "Providers agree on {} ({} sightings) but it is not a valid IPv4 address, ignoring",
                        candidate, count
                    );
                    rejected.insert(candidate.to_string());
                    self.emit(ResolverEvent::InvalidConsensus {
                        candidate: candidate.to_string(),
                        count,
                    });
                }
            }
        }

        None
    }

    /// Randomized sleep after a failed fetch
    async fn backoff<R: Rng>(&self, rng: &mut R) {
        let (min, max) = (self.config.backoff_min_ms, self.config.backoff_max_ms);
        if max == 0 {
            return;
        }

        let delay = Duration::from_millis(rng.gen_range(min..=max));
        debug!("Backing off for {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    /// Emit a resolver event
    fn emit(&self, event: ResolverEvent) {
        let Some(tx) = &self.events else {
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Resolver event channel full, dropping event");
            }
            // Nobody is listening any more
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
