//! # Host Bridge Traits
//!
//! Contract between the ad delivery core and the host application.
//!
//! ## Overview
//!
//! The core decides *whether* and *which* ad to show; everything that touches
//! the outside world is supplied by the host through the traits in this crate.
//! Each trait represents a capability the core requires but that must be
//! implemented per platform (Android, iOS, desktop test harness).
//!
//! ## Traits
//!
//! ### Configuration & Persistence
//! - [`AdConfigSource`](ads::AdConfigSource) - Remote ad configuration, manager policy, feature flags
//! - [`PerformanceStore`](ads::PerformanceStore) - Impression/click records
//!
//! ### Ad Network
//! - [`AdProvider`](provider::AdProvider) - Loads creatives from the ad SDK
//! - [`LoadedAd`](provider::LoadedAd) - Shows a loaded creative, reports lifecycle events
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Ad SDK failures
//! should be reported as `BridgeError::Provider` so the SDK message reaches the
//! UI unchanged.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so the core can share a single
//! engine across every UI call site.

pub mod ads;
pub mod error;
pub mod provider;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use ads::{
    AdConfigSource, AdConfiguration, FeatureFlags, ManagerPolicy, PerformanceRecord,
    PerformanceStore, Placement, SourceBundle, SurfaceType,
};
pub use provider::{
    show_channel, AdProvider, LoadRequest, LoadedAd, Reward, ShowEvent, ShowEventSender,
    ShowEvents,
};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
