// # dyndns-core
//
// Core library for the consensus-based dynamic DNS updater.
//
// ## Architecture Overview
//
// This library provides the core functionality for dynamic DNS updates:
// - **ProviderSource**: Trait for fetching raw "what is my IP" responses
// - **ConsensusResolver**: Polls untrusted providers until enough of them
//   agree on the external IPv4 address
// - **ZoneProvider**: Trait for reading and rewriting versioned DNS zones
// - **UpdateEngine**: Orchestrates resolve → compare → clone → write → activate
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from implementations
// 2. **Untrusted Inputs**: No single provider is believed on its own
// 3. **Injected Dependencies**: Sources, zone providers and randomness are
//    passed in, so every run can be driven by test doubles and a seeded RNG
// 4. **Library-First**: All core functionality can be used as a library

pub mod traits;
pub mod consensus;
pub mod engine;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{ProviderSource, ZoneProvider, ZoneRecord};
pub use consensus::{ConsensusResolver, ProviderSurvey, ResolverEvent};
pub use engine::{EngineEvent, UpdateEngine, UpdateOutcome, UpdateReport};
pub use config::{DyndnsConfig, EngineConfig, ProviderList, ResolverConfig};
pub use error::{Error, Result};
