use crate::frequency::DeclineReason;
use bridge_traits::{BridgeError, Placement, SurfaceType};
use thiserror::Error;

/// Why an ad request did not end in a dismissed ad.
#[derive(Error, Debug)]
pub enum AdError {
    #[error("No configuration for placement {placement} on {surface}")]
    ConfigurationMissing {
        surface: SurfaceType,
        placement: Placement,
    },

    #[error("Ad {config_id} suppressed by frequency policy: {reason}")]
    PolicySuppressed {
        config_id: String,
        reason: DeclineReason,
    },

    #[error("An ad is already showing on {surface}")]
    AlreadyShowing { surface: SurfaceType },

    #[error("Ad {config_id} failed to load: {message}")]
    ProviderLoadFailed { config_id: String, message: String },

    #[error("Ad {config_id} failed to show: {message}")]
    ProviderShowFailed { config_id: String, message: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Ad session ended without reporting an outcome")]
    Interrupted,

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

/// Stable discriminant of [`AdError`] for UI branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdErrorKind {
    ConfigurationMissing,
    PolicySuppressed,
    AlreadyShowing,
    ProviderLoadFailed,
    ProviderShowFailed,
    StoreUnavailable,
    Interrupted,
    Runtime,
}

impl AdError {
    pub fn kind(&self) -> AdErrorKind {
        match self {
            AdError::ConfigurationMissing { .. } => AdErrorKind::ConfigurationMissing,
            AdError::PolicySuppressed { .. } => AdErrorKind::PolicySuppressed,
            AdError::AlreadyShowing { .. } => AdErrorKind::AlreadyShowing,
            AdError::ProviderLoadFailed { .. } => AdErrorKind::ProviderLoadFailed,
            AdError::ProviderShowFailed { .. } => AdErrorKind::ProviderShowFailed,
            AdError::StoreUnavailable(_) => AdErrorKind::StoreUnavailable,
            AdError::Interrupted => AdErrorKind::Interrupted,
            AdError::Runtime(_) => AdErrorKind::Runtime,
        }
    }

    /// Provider message for load/show failures.
    pub fn provider_message(&self) -> Option<&str> {
        match self {
            AdError::ProviderLoadFailed { message, .. }
            | AdError::ProviderShowFailed { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<BridgeError> for AdError {
    fn from(err: BridgeError) -> Self {
        AdError::StoreUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdError>;
