// # Agreement Tally
//
// Candidate extraction and per-round sighting counts for the consensus
// resolver.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Matches every dotted quad, including invalid ones like `999.1.1.1`.
///
/// Validity is not checked here: several providers have to agree on a
/// string before it is trusted, which filters out page noise far better
/// than range checks would.
static IP_ADDRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9]{1,3}(?:\.[0-9]{1,3}){3}").expect("IPv4 candidate pattern is valid")
});

/// Extract all IPv4-looking substrings from a provider response
///
/// Matches are returned in order of appearance, duplicates included.
pub fn extract_candidates(body: &str) -> Vec<&str> {
    IP_ADDRESS_REGEX.find_iter(body).map(|m| m.as_str()).collect()
}

/// Canonical spelling of a candidate so that `203.000.113.007` and
/// `203.0.113.7` count as the same vote
///
/// Candidates with a group above 255 are returned unchanged and later
/// rejected when consensus is checked.
pub fn normalize_candidate(candidate: &str) -> String {
    let groups: Option<Vec<u8>> = candidate.split('.').map(|g| g.parse().ok()).collect();
    match groups {
        Some(groups) if groups.len() == 4 => groups
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join("."),
        _ => candidate.to_string(),
    }
}

/// Per-round sighting counts keyed by candidate address
#[derive(Debug, Clone, Default)]
pub struct AgreementTally {
    counts: HashMap<String, usize>,
}

impl AgreementTally {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sighting of `candidate`, returning its new count
    pub fn record(&mut self, candidate: &str) -> usize {
        let count = self.counts.entry(candidate.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Current count for `candidate`
    pub fn count(&self, candidate: &str) -> usize {
        self.counts.get(candidate).copied().unwrap_or(0)
    }

    /// Forget all sightings (start of a new round)
    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Number of distinct candidates seen
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether nothing has been seen this round
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all sightings
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Candidates in descending count order
    ///
    /// Equal counts are ordered by address string so that the scan is
    /// deterministic for a given tally.
    pub fn most_common(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self
            .counts
            .iter()
            .map(|(candidate, count)| (candidate.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}
