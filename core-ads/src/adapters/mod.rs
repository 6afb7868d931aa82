//! Default collaborator implementations.
//!
//! Hosts are free to provide their own; these cover the common cases of a
//! JSON remote-config document and a local performance store.

pub mod json_source;
pub mod memory;
#[cfg(feature = "sqlite-store")]
pub mod sqlite_native;

pub use json_source::{JsonConfigSource, RemoteConfigDocument};
pub use memory::MemoryPerformanceStore;
#[cfg(feature = "sqlite-store")]
pub use sqlite_native::{SqlitePerformanceStore, StoreConfig};
