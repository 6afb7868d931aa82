//! Engine wiring.
//!
//! [`CoreConfig`] carries the host's collaborators and tunables into
//! `AdDeliveryEngine::initialize`. It is validated when built, so a wiring
//! mistake fails at startup rather than on the first `show`.
//!
//! Required: an `AdConfigSource` and an `AdProvider`. Optional: a
//! `PerformanceStore` (tracking is off without one) and a `Clock`
//! (`SystemClock` by default).
//!
//! ```ignore
//! let config = CoreConfig::builder()
//!     .config_source(Arc::new(MyRemoteConfig::new()))
//!     .ad_provider(Arc::new(MyAdMobBridge::new()))
//!     .performance_store(Arc::new(MyPerformanceTable::new()))
//!     .preload_on_initialize(true)
//!     .build()?;
//! ```
//!
//! A missing collaborator is reported as [`Error::CapabilityMissing`] naming
//! the builder method to call:
//!
//! ```
//! use core_runtime::config::CoreConfig;
//! use core_runtime::Error;
//!
//! let err = CoreConfig::builder().event_buffer_size(32).build().unwrap_err();
//! assert!(matches!(err, Error::CapabilityMissing { .. }));
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{
    AdConfigSource, AdProvider, Clock, PerformanceStore, Placement, SurfaceType, SystemClock,
};
use std::sync::Arc;
use std::time::Duration;

/// How long a preloaded creative stays eligible for reuse.
pub const DEFAULT_PRELOAD_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Core configuration for the ad delivery engine.
///
/// This struct holds all collaborators and settings required to initialize
/// the engine. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Remote configuration source (required)
    pub config_source: Arc<dyn AdConfigSource>,

    /// Ad network SDK wrapper (required)
    pub ad_provider: Arc<dyn AdProvider>,

    /// Performance record persistence (optional)
    pub performance_store: Option<Arc<dyn PerformanceStore>>,

    /// Time source for date windows and record timestamps
    pub clock: Arc<dyn Clock>,

    /// Engine behaviour switches
    pub features: EngineFeatures,

    /// Surfaces warmed by `preload()`
    pub preload_targets: Vec<PreloadTarget>,

    /// Event bus capacity per subscriber
    pub event_buffer_size: usize,

    /// Lifetime of a preloaded creative
    pub preload_ttl: Duration,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("config_source", &"AdConfigSource { ... }")
            .field("ad_provider", &"AdProvider { ... }")
            .field(
                "performance_store",
                &self
                    .performance_store
                    .as_ref()
                    .map(|_| "PerformanceStore { ... }"),
            )
            .field("clock", &"Clock { ... }")
            .field("features", &self.features)
            .field("preload_targets", &self.preload_targets)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("preload_ttl", &self.preload_ttl)
            .finish()
    }
}

/// Switches for optional engine behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineFeatures {
    /// Bound each provider load by the policy's `ad_loading_timeout_ms`
    pub enforce_load_timeout: bool,

    /// Retry failed loads up to the policy's `retry_attempts`
    pub retry_failed_loads: bool,

    /// Run `preload()` as part of engine initialization
    pub preload_on_initialize: bool,
}

impl Default for EngineFeatures {
    fn default() -> Self {
        Self {
            enforce_load_timeout: true,
            retry_failed_loads: true,
            preload_on_initialize: false,
        }
    }
}

/// A surface/placement pair warmed ahead of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreloadTarget {
    pub surface_type: SurfaceType,
    pub placement: Placement,
}

impl PreloadTarget {
    pub fn new(surface_type: SurfaceType, placement: Placement) -> Self {
        Self {
            surface_type,
            placement,
        }
    }
}

/// Default warm-start target: the app-open ad shown at launch.
pub fn default_preload_targets() -> Vec<PreloadTarget> {
    vec![PreloadTarget::new(SurfaceType::AppOpen, Placement::AppLaunch)]
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Whether impressions and clicks are persisted.
    pub fn tracking_enabled(&self) -> bool {
        self.performance_store.is_some()
    }

    /// Validates the configuration.
    ///
    /// Checks that sizes are non-zero and that the feature switches are
    /// consistent with the rest of the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.preload_ttl.is_zero() {
            return Err(Error::Config(
                "Preload TTL must be greater than 0".to_string(),
            ));
        }

        if self.features.preload_on_initialize && self.preload_targets.is_empty() {
            return Err(Error::Config(
                "Preload on initialize is enabled but no preload targets are configured. \
                 Use .preload_targets() or disable .preload_on_initialize()."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    config_source: Option<Arc<dyn AdConfigSource>>,
    ad_provider: Option<Arc<dyn AdProvider>>,
    performance_store: Option<Arc<dyn PerformanceStore>>,
    clock: Option<Arc<dyn Clock>>,
    features: EngineFeatures,
    preload_targets: Option<Vec<PreloadTarget>>,
    event_buffer_size: Option<usize>,
    preload_ttl: Option<Duration>,
}

impl CoreConfigBuilder {
    /// Sets the remote configuration source.
    ///
    /// **Required.**
    pub fn config_source(mut self, source: Arc<dyn AdConfigSource>) -> Self {
        self.config_source = Some(source);
        self
    }

    /// Sets the ad network SDK wrapper.
    ///
    /// **Required.**
    pub fn ad_provider(mut self, provider: Arc<dyn AdProvider>) -> Self {
        self.ad_provider = Some(provider);
        self
    }

    /// Sets the performance record store.
    ///
    /// When omitted, impression and click tracking is disabled.
    pub fn performance_store(mut self, store: Arc<dyn PerformanceStore>) -> Self {
        self.performance_store = Some(store);
        self
    }

    /// Sets the time source.
    ///
    /// Default: [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Enables or disables the load timeout.
    ///
    /// Default: true
    pub fn enforce_load_timeout(mut self, enabled: bool) -> Self {
        self.features.enforce_load_timeout = enabled;
        self
    }

    /// Enables or disables load retries.
    ///
    /// Default: true
    pub fn retry_failed_loads(mut self, enabled: bool) -> Self {
        self.features.retry_failed_loads = enabled;
        self
    }

    /// Enables or disables preloading during initialization.
    ///
    /// Requires at least one preload target.
    ///
    /// Default: false
    pub fn preload_on_initialize(mut self, enabled: bool) -> Self {
        self.features.preload_on_initialize = enabled;
        self
    }

    /// Sets all engine switches at once.
    pub fn features(mut self, features: EngineFeatures) -> Self {
        self.features = features;
        self
    }

    /// Sets the surfaces warmed by `preload()`.
    ///
    /// Default: `[(APP_OPEN, APP_LAUNCH)]`
    pub fn preload_targets(mut self, targets: Vec<PreloadTarget>) -> Self {
        self.preload_targets = Some(targets);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: [`DEFAULT_EVENT_BUFFER_SIZE`]
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets how long a preloaded creative may be reused.
    ///
    /// Default: 4 hours
    pub fn preload_ttl(mut self, ttl: Duration) -> Self {
        self.preload_ttl = Some(ttl);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - Required collaborators are missing (AdConfigSource, AdProvider)
    /// - Configuration values are invalid
    /// - Feature switches are inconsistent with the rest of the configuration
    pub fn build(self) -> Result<CoreConfig> {
        let config_source = self.config_source.ok_or_else(|| {
            Error::missing(
                "AdConfigSource",
                "An ad configuration source is required. Use .config_source() to set it.",
            )
        })?;

        let ad_provider = self.ad_provider.ok_or_else(|| {
            Error::missing(
                "AdProvider",
                "An ad provider is required. Use .ad_provider() to set it.",
            )
        })?;

        let config = CoreConfig {
            config_source,
            ad_provider,
            performance_store: self.performance_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            features: self.features,
            preload_targets: self.preload_targets.unwrap_or_else(default_preload_targets),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            preload_ttl: self.preload_ttl.unwrap_or(DEFAULT_PRELOAD_TTL),
        };

        config.validate()?;

        Ok(config)
    }
}
