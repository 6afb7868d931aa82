//! Ad Configuration Contract
//!
//! Data types shared between the core and the host for ad placement
//! configuration, manager policy, feature flags and performance records,
//! plus the two persistence-side collaborators:
//!
//! - [`AdConfigSource`] - remote configuration (Remote Config, Supabase, a JSON
//!   document bundled with the app, ...)
//! - [`PerformanceStore`] - persistent impression/click counters
//!
//! Both collaborators are best-effort. The core treats any error as "nothing
//! available" and falls back to defaults or drops the write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

// =============================================================================
// Enumerations
// =============================================================================

/// Ad format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurfaceType {
    Banner,
    Interstitial,
    Rewarded,
    AppOpen,
    Native,
}

impl SurfaceType {
    pub const ALL: [SurfaceType; 5] = [
        SurfaceType::Banner,
        SurfaceType::Interstitial,
        SurfaceType::Rewarded,
        SurfaceType::AppOpen,
        SurfaceType::Native,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceType::Banner => "BANNER",
            SurfaceType::Interstitial => "INTERSTITIAL",
            SurfaceType::Rewarded => "REWARDED",
            SurfaceType::AppOpen => "APP_OPEN",
            SurfaceType::Native => "NATIVE",
        }
    }
}

impl fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-app location or event that may trigger an ad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Placement {
    HomeScreen,
    BeforeVideo,
    AfterVideo,
    InFeed,
    AppExit,
    AppLaunch,
    TabChange,
}

impl Placement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Placement::HomeScreen => "HOME_SCREEN",
            Placement::BeforeVideo => "BEFORE_VIDEO",
            Placement::AfterVideo => "AFTER_VIDEO",
            Placement::InFeed => "IN_FEED",
            Placement::AppExit => "APP_EXIT",
            Placement::AppLaunch => "APP_LAUNCH",
            Placement::TabChange => "TAB_CHANGE",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ad Configuration
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    1
}

fn default_frequency() -> u32 {
    1
}

/// A single placement configuration.
///
/// Configurations are immutable once loaded: the core replaces the whole list
/// on refresh and never edits an entry in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdConfiguration {
    /// Opaque unique identifier
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    pub surface_type: SurfaceType,
    pub placement: Placement,
    /// Provider creative (ad unit) identifier. Blank means "use the manager
    /// fallback for this surface type".
    #[serde(default)]
    pub creative_id: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Lower is preferred
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Show on every Nth eligible attempt. Must be at least 1.
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl AdConfiguration {
    /// Create an active configuration with priority 1 and frequency 1.
    pub fn new(
        id: impl Into<String>,
        surface_type: SurfaceType,
        placement: Placement,
        creative_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            surface_type,
            placement,
            creative_id: creative_id.into(),
            active: true,
            priority: default_priority(),
            frequency: default_frequency(),
            start_date: None,
            end_date: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_window(
        mut self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    /// Check the structural invariants of a configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("configuration id cannot be empty".to_string());
        }
        if self.frequency == 0 {
            return Err(format!(
                "configuration {} has frequency 0 (must be at least 1)",
                self.id
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Manager Policy
// =============================================================================

/// Public test ad units. Used when neither the configuration nor the remote
/// manager policy supplies a creative.
pub const FALLBACK_BANNER_CREATIVE: &str = "ca-app-pub-3940256099942544/6300978111";
pub const FALLBACK_INTERSTITIAL_CREATIVE: &str = "ca-app-pub-3940256099942544/1033173712";
pub const FALLBACK_REWARDED_CREATIVE: &str = "ca-app-pub-3940256099942544/5224354917";
pub const FALLBACK_APP_OPEN_CREATIVE: &str = "ca-app-pub-3940256099942544/9257395921";
pub const FALLBACK_NATIVE_CREATIVE: &str = "ca-app-pub-3940256099942544/2247696110";

/// Fallback creative id for a surface type.
pub fn fallback_creative(surface_type: SurfaceType) -> &'static str {
    match surface_type {
        SurfaceType::Banner => FALLBACK_BANNER_CREATIVE,
        SurfaceType::Interstitial => FALLBACK_INTERSTITIAL_CREATIVE,
        SurfaceType::Rewarded => FALLBACK_REWARDED_CREATIVE,
        SurfaceType::AppOpen => FALLBACK_APP_OPEN_CREATIVE,
        SurfaceType::Native => FALLBACK_NATIVE_CREATIVE,
    }
}

/// Manager-wide ad policy.
///
/// Missing fields in a remote document take the fallback values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerPolicy {
    /// Kill switch for every surface
    pub enabled: bool,
    /// Ask the provider for test creatives
    pub test_mode: bool,
    /// Hard ceiling on the per-configuration counter
    pub max_ad_frequency: Option<u64>,
    /// Upper bound for a single load attempt
    pub ad_loading_timeout_ms: u64,
    /// Extra load attempts after a failure
    pub retry_attempts: u32,
    /// Creative used when a configuration leaves `creative_id` blank
    pub fallback_creative_ids: HashMap<SurfaceType, String>,
}

impl ManagerPolicy {
    pub const DEFAULT_MAX_AD_FREQUENCY: u64 = 3;
    pub const DEFAULT_LOADING_TIMEOUT_MS: u64 = 8_000;
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
    /// Largest accepted `retry_attempts`.
    pub const MAX_RETRY_ATTEMPTS: u32 = 5;

    /// Policy installed when the remote source has none.
    pub fn fallback() -> Self {
        Self {
            enabled: true,
            test_mode: false,
            max_ad_frequency: Some(Self::DEFAULT_MAX_AD_FREQUENCY),
            ad_loading_timeout_ms: Self::DEFAULT_LOADING_TIMEOUT_MS,
            retry_attempts: Self::DEFAULT_RETRY_ATTEMPTS,
            fallback_creative_ids: SurfaceType::ALL
                .iter()
                .map(|surface| (*surface, fallback_creative(*surface).to_string()))
                .collect(),
        }
    }

    /// Reject policies the orchestrator cannot run with.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.ad_loading_timeout_ms == 0 {
            return Err("ad_loading_timeout_ms must be positive".to_string());
        }
        if self.retry_attempts > Self::MAX_RETRY_ATTEMPTS {
            return Err(format!(
                "retry_attempts {} exceeds {}",
                self.retry_attempts,
                Self::MAX_RETRY_ATTEMPTS
            ));
        }
        Ok(())
    }

    /// Creative id to request for `config`.
    pub fn creative_for(&self, config: &AdConfiguration) -> String {
        if !config.creative_id.trim().is_empty() {
            return config.creative_id.clone();
        }

        self.fallback_creative_ids
            .get(&config.surface_type)
            .cloned()
            .unwrap_or_else(|| fallback_creative(config.surface_type).to_string())
    }
}

impl Default for ManagerPolicy {
    fn default() -> Self {
        Self::fallback()
    }
}

// =============================================================================
// Feature Flags
// =============================================================================

/// Remote switches read synchronously by UI collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Show the floating ad bubble on the player screen
    pub floating_ad_enabled: bool,
    /// Number of clips watched between two in-feed ads
    pub clips_per_ad: u32,
    /// Show an ad in the exit confirmation popup
    pub exit_popup_enabled: bool,
    /// Attempt an interstitial when switching tabs
    pub tab_change_ad_enabled: bool,
}

impl FeatureFlags {
    pub fn fallback() -> Self {
        Self {
            floating_ad_enabled: false,
            clips_per_ad: 3,
            exit_popup_enabled: true,
            tab_change_ad_enabled: false,
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::fallback()
    }
}

// =============================================================================
// Performance Record
// =============================================================================

/// Persistent impression/click statistics for one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub config_id: String,
    pub impressions: u64,
    pub clicks: u64,
    pub click_through_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceRecord {
    /// A zeroed record.
    pub fn empty(config_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            config_id: config_id.into(),
            impressions: 0,
            clicks: 0,
            click_through_rate: 0.0,
            last_updated: now,
        }
    }

    /// Recompute `click_through_rate` from the counters.
    pub fn recompute_ctr(&mut self) {
        self.click_through_rate = if self.impressions == 0 {
            0.0
        } else {
            self.clicks as f64 / self.impressions as f64
        };
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Remote configuration source.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::ads::AdConfigSource;
///
/// async fn count_ads(source: &dyn AdConfigSource) -> usize {
///     source.get_active_ads().await.map(|ads| ads.len()).unwrap_or(0)
/// }
/// ```
#[async_trait]
pub trait AdConfigSource: Send + Sync {
    /// Active placement configurations. An empty list is a valid answer.
    async fn get_active_ads(&self) -> Result<Vec<AdConfiguration>>;

    /// Manager policy, if the source carries one.
    async fn get_ad_manager_config(&self) -> Result<Option<ManagerPolicy>>;

    /// UI feature flags, if the source carries them.
    async fn get_feature_flags(&self) -> Result<Option<FeatureFlags>> {
        Ok(None)
    }

    /// All three sections for one refresh.
    ///
    /// The default asks each getter in turn. Sources backed by a single
    /// document override it to read that document once.
    async fn fetch_all(&self) -> SourceBundle {
        SourceBundle {
            ads: self.get_active_ads().await,
            manager: self.get_ad_manager_config().await,
            flags: self.get_feature_flags().await,
        }
    }
}

/// One refresh worth of source answers. Each section fails independently.
#[derive(Debug)]
pub struct SourceBundle {
    pub ads: Result<Vec<AdConfiguration>>,
    pub manager: Result<Option<ManagerPolicy>>,
    pub flags: Result<Option<FeatureFlags>>,
}

/// Persistent performance record storage.
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    async fn get_performance(&self, config_id: &str) -> Result<Option<PerformanceRecord>>;

    /// Insert or replace the record for `record.config_id`.
    async fn update_performance(&self, record: PerformanceRecord) -> Result<()>;
}
