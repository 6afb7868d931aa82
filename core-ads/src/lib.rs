//! # Ad Delivery Core
//!
//! Decides whether, when and which ad to show for a given surface type and
//! placement, drives the provider through its load/show lifecycle and records
//! per-configuration counters and performance.
//!
//! ## Components
//!
//! - [`ConfigStore`]: current configuration snapshot, manager policy and
//!   feature flags, with fallbacks when the remote source is unavailable
//! - [`frequency`]: the pure "should this attempt show an ad" decision
//! - [`CounterLedger`]: per-configuration attempt counters
//! - [`ImpressionTracker`]: impression/click/CTR bookkeeping
//! - [`AdLifecycleOrchestrator`]: one session per surface type at a time
//! - [`AdDeliveryEngine`]: the façade hosts talk to
//!
//! Collaborators (configuration source, performance store, ad SDK) are
//! injected through `bridge_traits`; default implementations live in
//! [`adapters`].

pub mod adapters;
pub mod callbacks;
pub mod config_store;
pub mod engine;
pub mod error;
pub mod frequency;
pub mod ledger;
pub mod orchestrator;
pub mod tracker;

pub use callbacks::{AdCallbacks, AdCompletion, AdTicket, NoopCallbacks};
pub use config_store::{
    fallback_configurations, ConfigOrigin, ConfigSnapshot, ConfigStore, FeatureFlagsHandle,
};
pub use engine::AdDeliveryEngine;
pub use error::{AdError, AdErrorKind, Result};
pub use frequency::{DeclineReason, PolicyDecision};
pub use ledger::CounterLedger;
pub use orchestrator::{AdLifecycleOrchestrator, OrchestratorParts, SessionState};
pub use tracker::{ImpressionTracker, TrackedEvent};
