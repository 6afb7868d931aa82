//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the ad delivery core:
//! - Logging and tracing infrastructure
//! - Configuration management and collaborator injection
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the engine crates depend on.
//! It establishes the dependency-injection contract ([`config::CoreConfig`]),
//! the logging conventions, and the event broadcasting mechanism used to
//! observe ad lifecycles from the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
