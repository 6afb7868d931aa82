//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (currently `core-ads`). Host applications can depend on
//! `adcore-workspace` and enable the documented features without needing to
//! wire each crate individually.
//!
//! - `engine` - the ad delivery engine without the SQLite performance store
//! - `sqlite-store` (default) - the engine plus `SqlitePerformanceStore`

#[cfg(any(feature = "engine", feature = "sqlite-store"))]
pub use core_ads;
