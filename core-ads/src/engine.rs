//! # Ad Delivery Engine
//!
//! Façade over the configuration store, frequency policy, ledger, tracker and
//! lifecycle orchestrator. One instance is shared by every call site; it is
//! cheap to clone.
//!
//! ```rust,ignore
//! let config = CoreConfig::builder()
//!     .config_source(Arc::new(JsonConfigSource::from_file("ads.json")))
//!     .ad_provider(Arc::new(MyAdMobProvider::new()))
//!     .performance_store(Arc::new(MemoryPerformanceStore::new()))
//!     .build()?;
//!
//! let engine = AdDeliveryEngine::initialize(config).await?;
//!
//! if engine.should_show_interstitial(Placement::AfterVideo) {
//!     let (ticket, callbacks) = AdTicket::channel();
//!     engine.show_interstitial(Placement::AfterVideo, callbacks);
//!     match ticket.wait().await {
//!         Ok(completion) => println!("shown {}", completion.config_id),
//!         Err(e) => println!("no ad: {}", e),
//!     }
//! }
//! ```

use crate::callbacks::AdCallbacks;
use crate::config_store::{ConfigOrigin, ConfigStore, FeatureFlagsHandle};
use crate::error::Result;
use crate::ledger::CounterLedger;
use crate::orchestrator::{AdLifecycleOrchestrator, OrchestratorParts, SessionState};
use crate::tracker::ImpressionTracker;
use bridge_traits::{AdConfiguration, FeatureFlags, ManagerPolicy, Placement, SurfaceType};
use core_runtime::config::{CoreConfig, PreloadTarget};
use core_runtime::events::{EventBus, EventStream};
use core_runtime::Error as RuntimeError;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct AdDeliveryEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config_store: Arc<ConfigStore>,
    ledger: Arc<CounterLedger>,
    tracker: ImpressionTracker,
    orchestrator: AdLifecycleOrchestrator,
    event_bus: EventBus,
    preload_targets: Vec<PreloadTarget>,
}

impl fmt::Debug for AdDeliveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdDeliveryEngine")
            .field("config_store", &self.inner.config_store)
            .field("orchestrator", &self.inner.orchestrator)
            .field("tracker", &self.inner.tracker)
            .finish()
    }
}

impl AdDeliveryEngine {
    /// Build the engine and perform the first configuration load.
    ///
    /// Must be called from within a Tokio runtime; lifecycle tasks started by
    /// `show*` are spawned on that runtime. A failing configuration source is
    /// not an error: the fallback configuration is installed instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate or no runtime
    /// is available.
    #[instrument(skip(config))]
    pub async fn initialize(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let runtime = Handle::try_current().map_err(|e| {
            RuntimeError::Internal(format!("ad engine requires a Tokio runtime: {}", e))
        })?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let config_store = Arc::new(ConfigStore::new(
            Arc::clone(&config.config_source),
            event_bus.clone(),
        ));
        let ledger = Arc::new(CounterLedger::new());
        let tracker = ImpressionTracker::new(
            config.performance_store.clone(),
            Arc::clone(&config.clock),
            runtime.clone(),
        );

        let orchestrator = AdLifecycleOrchestrator::new(OrchestratorParts {
            config_store: Arc::clone(&config_store),
            provider: Arc::clone(&config.ad_provider),
            ledger: Arc::clone(&ledger),
            tracker: tracker.clone(),
            clock: Arc::clone(&config.clock),
            event_bus: event_bus.clone(),
            features: config.features,
            preload_ttl: config.preload_ttl,
            runtime,
        });

        let engine = Self {
            inner: Arc::new(EngineInner {
                config_store,
                ledger,
                tracker,
                orchestrator,
                event_bus,
                preload_targets: config.preload_targets.clone(),
            }),
        };

        let origin = engine.inner.config_store.initialize().await;

        if config.features.preload_on_initialize {
            engine.preload().await;
        }

        info!(
            %origin,
            configurations = engine.inner.config_store.configs().len(),
            tracking = engine.inner.tracker.is_enabled(),
            "Ad delivery engine initialized"
        );

        Ok(engine)
    }

    // =========================================================================
    // Preloading
    // =========================================================================

    /// Warm the configured preload targets. Returns how many targets have a
    /// creative parked afterwards.
    pub async fn preload(&self) -> usize {
        let mut parked = 0;
        for target in &self.inner.preload_targets {
            if self
                .inner
                .orchestrator
                .preload(target.surface_type, target.placement)
                .await
            {
                parked += 1;
            }
        }
        parked
    }

    /// Preload a single surface/placement pair.
    pub async fn preload_for(&self, surface: SurfaceType, placement: Placement) -> bool {
        self.inner.orchestrator.preload(surface, placement).await
    }

    // =========================================================================
    // Eligibility
    // =========================================================================

    pub fn should_show_interstitial(&self, placement: Placement) -> bool {
        self.should_show(SurfaceType::Interstitial, placement)
    }

    pub fn should_show_rewarded(&self, placement: Placement) -> bool {
        self.should_show(SurfaceType::Rewarded, placement)
    }

    pub fn should_show_app_open(&self, placement: Placement) -> bool {
        self.should_show(SurfaceType::AppOpen, placement)
    }

    /// Whether a configuration exists and the frequency policy allows it.
    pub fn should_show(&self, surface: SurfaceType, placement: Placement) -> bool {
        self.inner.orchestrator.should_show(surface, placement)
    }

    /// The configuration a `show` would use, or the reason it would fail.
    pub fn check(&self, surface: SurfaceType, placement: Placement) -> Result<AdConfiguration> {
        self.inner.orchestrator.check(surface, placement)
    }

    // =========================================================================
    // Showing
    // =========================================================================

    pub fn show_interstitial(
        &self,
        placement: Placement,
        callbacks: Arc<dyn AdCallbacks>,
    ) -> Option<JoinHandle<()>> {
        self.show(SurfaceType::Interstitial, placement, callbacks)
    }

    pub fn show_rewarded(
        &self,
        placement: Placement,
        callbacks: Arc<dyn AdCallbacks>,
    ) -> Option<JoinHandle<()>> {
        self.show(SurfaceType::Rewarded, placement, callbacks)
    }

    pub fn show_app_open(
        &self,
        placement: Placement,
        callbacks: Arc<dyn AdCallbacks>,
    ) -> Option<JoinHandle<()>> {
        self.show(SurfaceType::AppOpen, placement, callbacks)
    }

    /// Run one ad session. Never blocks.
    ///
    /// Returns `None` when the request was rejected up front; `callbacks` has
    /// already received `on_failed` in that case.
    pub fn show(
        &self,
        surface: SurfaceType,
        placement: Placement,
        callbacks: Arc<dyn AdCallbacks>,
    ) -> Option<JoinHandle<()>> {
        self.inner.orchestrator.show(surface, placement, callbacks)
    }

    /// Record a click that happened outside a full-screen session (banners,
    /// native ads).
    pub fn track_click(&self, config_id: &str) -> JoinHandle<()> {
        self.inner.tracker.record_click(config_id)
    }

    /// Record an impression that happened outside a full-screen session.
    pub fn track_impression(&self, config_id: &str) -> JoinHandle<()> {
        self.inner.tracker.record_impression(config_id)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub async fn refresh_configurations(&self) -> ConfigOrigin {
        self.inner.config_store.refresh_configurations().await
    }

    pub fn configs(&self) -> Vec<AdConfiguration> {
        self.inner.config_store.configs()
    }

    pub fn policy(&self) -> ManagerPolicy {
        self.inner.config_store.policy()
    }

    pub fn origin(&self) -> ConfigOrigin {
        self.inner.config_store.origin()
    }

    pub fn config_for(&self, surface: SurfaceType, placement: Placement) -> Option<AdConfiguration> {
        self.inner.config_store.config_for(surface, placement)
    }

    pub fn banner_config_for(&self, placement: Placement) -> Option<AdConfiguration> {
        self.inner.config_store.banner_config_for(placement)
    }

    pub fn feature_flags(&self) -> FeatureFlags {
        self.inner.config_store.flags()
    }

    pub fn subscribe_feature_flags(&self) -> watch::Receiver<FeatureFlags> {
        self.inner.config_store.flags_handle().subscribe()
    }

    pub fn feature_flags_handle(&self) -> FeatureFlagsHandle {
        self.inner.config_store.flags_handle()
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Subscribe to lifecycle and configuration events.
    pub fn events(&self) -> EventStream {
        self.inner.event_bus.stream()
    }

    pub fn counter_for(&self, config_id: &str) -> u64 {
        self.inner.ledger.value_for(config_id)
    }

    pub fn session_state(&self, surface: SurfaceType) -> SessionState {
        self.inner.orchestrator.session_state(surface)
    }

    pub fn has_preloaded(&self, surface: SurfaceType) -> bool {
        self.inner.orchestrator.has_preloaded(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{JsonConfigSource, MemoryPerformanceStore};
    use crate::callbacks::AdTicket;
    use crate::error::{AdError, AdErrorKind};
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        show_channel, AdProvider, BridgeError, LoadRequest, LoadedAd, ShowEvent, ShowEvents,
    };
    use core_runtime::config::EngineFeatures;
    use mockall::mock;

    mock! {
        Provider {}

        #[async_trait]
        impl AdProvider for Provider {
            async fn load(&self, request: LoadRequest) -> BridgeResult<Box<dyn LoadedAd>>;
        }
    }

    struct QuickAd;

    impl LoadedAd for QuickAd {
        fn creative_id(&self) -> &str {
            "quick"
        }

        fn show(self: Box<Self>) -> ShowEvents {
            let (tx, rx) = show_channel();
            let _ = tx.unbounded_send(ShowEvent::Showed);
            let _ = tx.unbounded_send(ShowEvent::Dismissed);
            rx
        }
    }

    const DOCUMENT: &str = r#"{
        "ads": [
            { "id": "launch", "surface_type": "APP_OPEN", "placement": "APP_LAUNCH" },
            { "id": "home", "surface_type": "BANNER", "placement": "HOME_SCREEN",
              "creative_id": "banner-unit" }
        ],
        "flags": { "tab_change_ad_enabled": true }
    }"#;

    fn config(provider: MockProvider, features: EngineFeatures) -> CoreConfig {
        CoreConfig::builder()
            .config_source(Arc::new(JsonConfigSource::from_json(DOCUMENT).unwrap()))
            .ad_provider(Arc::new(provider))
            .performance_store(Arc::new(MemoryPerformanceStore::new()))
            .features(features)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_loads_remote_configuration() {
        let engine = AdDeliveryEngine::initialize(config(MockProvider::new(), EngineFeatures::default()))
            .await
            .unwrap();

        assert_eq!(engine.origin(), ConfigOrigin::Remote);
        assert_eq!(engine.configs().len(), 2);
        assert_eq!(
            engine.banner_config_for(Placement::HomeScreen).unwrap().id,
            "home"
        );
        assert!(engine.feature_flags().tab_change_ad_enabled);
        assert!(engine.should_show_app_open(Placement::AppLaunch));
        assert!(!engine.should_show_interstitial(Placement::AfterVideo));
        assert!(!engine.should_show_rewarded(Placement::BeforeVideo));
        assert_eq!(
            engine
                .check(SurfaceType::Interstitial, Placement::AfterVideo)
                .unwrap_err()
                .kind(),
            AdErrorKind::ConfigurationMissing
        );
    }

    #[tokio::test]
    async fn test_initialize_rejects_invalid_config() {
        let mut config = config(MockProvider::new(), EngineFeatures::default());
        config.event_buffer_size = 0;

        let err = AdDeliveryEngine::initialize(config).await.unwrap_err();
        assert!(matches!(err, AdError::Runtime(_)));
    }

    #[tokio::test]
    async fn test_preload_on_initialize_parks_app_open() {
        let mut provider = MockProvider::new();
        provider
            .expect_load()
            .withf(|request| request.surface_type == SurfaceType::AppOpen)
            .times(1)
            .returning(|_| Ok(Box::new(QuickAd) as Box<dyn LoadedAd>));

        let features = EngineFeatures {
            preload_on_initialize: true,
            ..EngineFeatures::default()
        };
        let engine = AdDeliveryEngine::initialize(config(provider, features))
            .await
            .unwrap();
        assert!(engine.has_preloaded(SurfaceType::AppOpen));

        let (ticket, callbacks) = AdTicket::channel();
        engine
            .show_app_open(Placement::AppLaunch, callbacks)
            .unwrap()
            .await
            .unwrap();

        let completion = ticket.wait().await.unwrap();
        assert!(completion.preloaded);
        assert_eq!(engine.counter_for("launch"), 1);
        assert_eq!(engine.session_state(SurfaceType::AppOpen), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_show_without_retry_feature_loads_once() {
        let mut provider = MockProvider::new();
        provider
            .expect_load()
            .times(1)
            .returning(|_| Err(BridgeError::provider("no fill")));

        let features = EngineFeatures {
            retry_failed_loads: false,
            ..EngineFeatures::default()
        };
        let engine = AdDeliveryEngine::initialize(config(provider, features))
            .await
            .unwrap();

        let (ticket, callbacks) = AdTicket::channel();
        engine
            .show_app_open(Placement::AppLaunch, callbacks)
            .unwrap()
            .await
            .unwrap();

        let err = ticket.wait().await.unwrap_err();
        assert_eq!(err.kind(), AdErrorKind::ProviderLoadFailed);
        assert_eq!(engine.counter_for("launch"), 0);
    }
}
