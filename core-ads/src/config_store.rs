//! # Configuration Store
//!
//! Holds the active ad configurations, the manager policy and the published
//! feature flags.
//!
//! The store always has a usable snapshot: before the first load and whenever
//! the remote source yields nothing valid, the fixed fallback set (one
//! configuration per surface type) is installed. A refresh replaces the whole
//! snapshot at once, so readers see either the old list or the new one.

use bridge_traits::{
    ads::fallback_creative, AdConfigSource, AdConfiguration, FeatureFlags, ManagerPolicy,
    Placement, SurfaceType,
};
use core_runtime::events::{ConfigEvent, CoreEvent, EventBus};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Where the current configuration list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Remote,
    Fallback,
}

impl ConfigOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigOrigin::Remote => "remote",
            ConfigOrigin::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable view of the configuration at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub configurations: Vec<AdConfiguration>,
    pub policy: ManagerPolicy,
    pub origin: ConfigOrigin,
}

impl ConfigSnapshot {
    pub fn fallback() -> Self {
        Self {
            configurations: fallback_configurations(),
            policy: ManagerPolicy::fallback(),
            origin: ConfigOrigin::Fallback,
        }
    }

    /// Lowest-priority active configuration for the pair. Ties go to the
    /// entry listed first.
    pub fn config_for(
        &self,
        surface_type: SurfaceType,
        placement: Placement,
    ) -> Option<&AdConfiguration> {
        self.configurations
            .iter()
            .filter(|config| {
                config.active
                    && config.surface_type == surface_type
                    && config.placement == placement
            })
            .min_by_key(|config| config.priority)
    }
}

/// The configurations installed when the remote source has none.
pub fn fallback_configurations() -> Vec<AdConfiguration> {
    [
        ("fallback-banner", "Fallback Banner", SurfaceType::Banner, Placement::HomeScreen),
        (
            "fallback-interstitial",
            "Fallback Interstitial",
            SurfaceType::Interstitial,
            Placement::AfterVideo,
        ),
        (
            "fallback-rewarded",
            "Fallback Rewarded",
            SurfaceType::Rewarded,
            Placement::BeforeVideo,
        ),
        ("fallback-app-open", "Fallback App Open", SurfaceType::AppOpen, Placement::AppLaunch),
        ("fallback-native", "Fallback Native", SurfaceType::Native, Placement::InFeed),
    ]
    .into_iter()
    .map(|(id, name, surface, placement)| {
        AdConfiguration::new(id, surface, placement, fallback_creative(surface)).with_name(name)
    })
    .collect()
}

/// Read side of the published feature flags.
///
/// Cheap to clone; UI collaborators read it synchronously or wait for changes.
#[derive(Debug, Clone)]
pub struct FeatureFlagsHandle {
    receiver: watch::Receiver<FeatureFlags>,
}

impl FeatureFlagsHandle {
    pub fn get(&self) -> FeatureFlags {
        self.receiver.borrow().clone()
    }

    /// A receiver notified on every refresh.
    pub fn subscribe(&self) -> watch::Receiver<FeatureFlags> {
        self.receiver.clone()
    }
}

pub struct ConfigStore {
    source: Arc<dyn AdConfigSource>,
    snapshot: RwLock<Arc<ConfigSnapshot>>,
    flags: watch::Sender<FeatureFlags>,
    event_bus: EventBus,
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("snapshot", &self.snapshot())
            .field("flags", &*self.flags.borrow())
            .finish()
    }
}

impl ConfigStore {
    /// Create a store holding the fallback snapshot. Call
    /// [`initialize`](Self::initialize) to load from the source.
    pub fn new(source: Arc<dyn AdConfigSource>, event_bus: EventBus) -> Self {
        let (flags, _) = watch::channel(FeatureFlags::fallback());
        Self {
            source,
            snapshot: RwLock::new(Arc::new(ConfigSnapshot::fallback())),
            flags,
            event_bus,
        }
    }

    /// First load from the source. Never fails; falls back to defaults.
    pub async fn initialize(&self) -> ConfigOrigin {
        self.load().await
    }

    /// Reload from the source and replace the snapshot wholesale.
    pub async fn refresh_configurations(&self) -> ConfigOrigin {
        self.load().await
    }

    #[instrument(skip(self))]
    async fn load(&self) -> ConfigOrigin {
        let bundle = self.source.fetch_all().await;

        let remote = match bundle.ads {
            Ok(configurations) => configurations,
            Err(e) => {
                self.source_unavailable("ads", &e.to_string());
                Vec::new()
            }
        };

        let received = remote.len();
        let valid: Vec<AdConfiguration> = remote
            .into_iter()
            .filter(|config| match config.validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(config_id = %config.id, %reason, "Dropping invalid ad configuration");
                    false
                }
            })
            .collect();

        let policy = match bundle.manager {
            Ok(Some(policy)) => match policy.validate() {
                Ok(()) => policy,
                Err(reason) => {
                    warn!(%reason, "Rejecting manager policy, using fallback");
                    ManagerPolicy::fallback()
                }
            },
            Ok(None) => {
                debug!("No manager policy from source, using fallback");
                ManagerPolicy::fallback()
            }
            Err(e) => {
                self.source_unavailable("manager", &e.to_string());
                ManagerPolicy::fallback()
            }
        };

        let flags = match bundle.flags {
            Ok(Some(flags)) => flags,
            Ok(None) => FeatureFlags::fallback(),
            Err(e) => {
                self.source_unavailable("flags", &e.to_string());
                FeatureFlags::fallback()
            }
        };

        let (configurations, origin) = if valid.is_empty() {
            (fallback_configurations(), ConfigOrigin::Fallback)
        } else {
            (valid, ConfigOrigin::Remote)
        };

        let count = configurations.len();
        *self.snapshot.write() = Arc::new(ConfigSnapshot {
            configurations,
            policy,
            origin,
        });
        self.flags.send_replace(flags);

        info!(received, installed = count, %origin, "Ad configurations loaded");
        self.event_bus.emit(CoreEvent::Config(ConfigEvent::Refreshed {
            configurations: count,
            origin: origin.to_string(),
        }));

        origin
    }

    fn source_unavailable(&self, component: &str, message: &str) {
        warn!(component, error = %message, "Ad configuration source unavailable");
        self.event_bus
            .emit(CoreEvent::Config(ConfigEvent::SourceUnavailable {
                component: component.to_string(),
                message: message.to_string(),
            }));
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn configs(&self) -> Vec<AdConfiguration> {
        self.snapshot().configurations.clone()
    }

    pub fn policy(&self) -> ManagerPolicy {
        self.snapshot().policy.clone()
    }

    pub fn origin(&self) -> ConfigOrigin {
        self.snapshot().origin
    }

    pub fn config_for(
        &self,
        surface_type: SurfaceType,
        placement: Placement,
    ) -> Option<AdConfiguration> {
        self.snapshot().config_for(surface_type, placement).cloned()
    }

    pub fn banner_config_for(&self, placement: Placement) -> Option<AdConfiguration> {
        self.config_for(SurfaceType::Banner, placement)
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags.borrow().clone()
    }

    pub fn flags_handle(&self) -> FeatureFlagsHandle {
        FeatureFlagsHandle {
            receiver: self.flags.subscribe(),
        }
    }
}
