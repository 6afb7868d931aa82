//! Shared fixtures for the engine integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    show_channel, AdConfigSource, AdConfiguration, AdProvider, BridgeError, Clock, FeatureFlags,
    FixedClock, LoadRequest, LoadedAd, ManagerPolicy, PerformanceRecord, PerformanceStore,
    Placement, Reward, ShowEvent, ShowEventSender, ShowEvents, SurfaceType,
};
use chrono::{TimeZone, Utc};
use core_ads::adapters::MemoryPerformanceStore;
use core_ads::{AdCallbacks, AdCompletion, AdDeliveryEngine, AdError};
use core_runtime::config::{CoreConfig, EngineFeatures};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Provider
// =============================================================================

/// What the provider does for one `load` call.
#[derive(Debug, Clone)]
pub enum LoadStep {
    /// Load succeeds; `show` replays the events then closes the stream
    Show(Vec<ShowEvent>),
    /// Load succeeds; `show` hands the sender to the test
    Manual,
    /// Load fails with the given SDK message
    Fail(String),
    /// Load never completes
    Hang,
}

impl LoadStep {
    pub fn dismissed() -> Self {
        LoadStep::Show(vec![ShowEvent::Showed, ShowEvent::Dismissed])
    }

    pub fn rewarded(kind: &str, amount: i64) -> Self {
        LoadStep::Show(vec![
            ShowEvent::Showed,
            ShowEvent::RewardEarned(Reward {
                kind: kind.to_string(),
                amount,
            }),
            ShowEvent::Dismissed,
        ])
    }

    pub fn fail(message: &str) -> Self {
        LoadStep::Fail(message.to_string())
    }
}

/// Provider that follows a script, then repeats the default step.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<LoadStep>>,
    default: LoadStep,
    calls: AtomicUsize,
    requests: Mutex<Vec<LoadRequest>>,
    senders: Arc<Mutex<Vec<ShowEventSender>>>,
}

impl ScriptedProvider {
    pub fn new(default: LoadStep) -> Arc<Self> {
        Self::with_script(Vec::new(), default)
    }

    pub fn with_script(script: Vec<LoadStep>, default: LoadStep) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            default,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            senders: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LoadRequest> {
        self.requests.lock().clone()
    }

    /// Wait until a `Manual` ad has been shown.
    pub async fn wait_for_sender(&self) -> ShowEventSender {
        self.wait_for_senders(1).await;
        self.senders.lock()[0].clone()
    }

    /// Wait until `count` `Manual` ads have been shown.
    pub async fn wait_for_senders(&self, count: usize) {
        for _ in 0..200 {
            if self.senders.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} ads to be shown", count);
    }
}

#[async_trait]
impl AdProvider for ScriptedProvider {
    async fn load(&self, request: LoadRequest) -> BridgeResult<Box<dyn LoadedAd>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let creative_id = request.creative_id.clone();
        self.requests.lock().push(request);

        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        match step {
            LoadStep::Show(events) => Ok(Box::new(ScriptedAd {
                creative_id,
                events,
            })),
            LoadStep::Manual => Ok(Box::new(ManualAd {
                creative_id,
                senders: Arc::clone(&self.senders),
            })),
            LoadStep::Fail(message) => Err(BridgeError::provider(message)),
            LoadStep::Hang => {
                futures::future::pending::<()>().await;
                Err(BridgeError::provider("unreachable"))
            }
        }
    }
}

struct ScriptedAd {
    creative_id: String,
    events: Vec<ShowEvent>,
}

impl LoadedAd for ScriptedAd {
    fn creative_id(&self) -> &str {
        &self.creative_id
    }

    fn show(self: Box<Self>) -> ShowEvents {
        let (tx, rx) = show_channel();
        for event in self.events {
            let _ = tx.unbounded_send(event);
        }
        rx
    }
}

struct ManualAd {
    creative_id: String,
    senders: Arc<Mutex<Vec<ShowEventSender>>>,
}

impl LoadedAd for ManualAd {
    fn creative_id(&self) -> &str {
        &self.creative_id
    }

    fn show(self: Box<Self>) -> ShowEvents {
        let (tx, rx) = show_channel();
        self.senders.lock().push(tx);
        rx
    }
}

// =============================================================================
// Configuration source
// =============================================================================

pub struct StaticConfigSource {
    ads: Mutex<Vec<AdConfiguration>>,
    policy: Mutex<Option<ManagerPolicy>>,
    flags: Mutex<Option<FeatureFlags>>,
    failing: Mutex<bool>,
}

impl StaticConfigSource {
    pub fn new(ads: Vec<AdConfiguration>, policy: Option<ManagerPolicy>) -> Arc<Self> {
        Arc::new(Self {
            ads: Mutex::new(ads),
            policy: Mutex::new(policy),
            flags: Mutex::new(None),
            failing: Mutex::new(false),
        })
    }

    pub fn set_ads(&self, ads: Vec<AdConfiguration>) {
        *self.ads.lock() = ads;
    }

    pub fn set_flags(&self, flags: FeatureFlags) {
        *self.flags.lock() = Some(flags);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    fn check(&self) -> BridgeResult<()> {
        if *self.failing.lock() {
            return Err(BridgeError::OperationFailed("remote config offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AdConfigSource for StaticConfigSource {
    async fn get_active_ads(&self) -> BridgeResult<Vec<AdConfiguration>> {
        self.check()?;
        Ok(self.ads.lock().clone())
    }

    async fn get_ad_manager_config(&self) -> BridgeResult<Option<ManagerPolicy>> {
        self.check()?;
        Ok(self.policy.lock().clone())
    }

    async fn get_feature_flags(&self) -> BridgeResult<Option<FeatureFlags>> {
        self.check()?;
        Ok(self.flags.lock().clone())
    }
}

// =============================================================================
// Callbacks
// =============================================================================

/// Records every callback invocation.
#[derive(Default)]
pub struct RecordingCallbacks {
    pub shown: Mutex<Vec<String>>,
    pub rewards: Mutex<Vec<Reward>>,
    pub dismissed: Mutex<Vec<AdCompletion>>,
    pub failed: Mutex<Vec<AdError>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn outcomes(&self) -> usize {
        self.dismissed.lock().len() + self.failed.lock().len()
    }
}

impl AdCallbacks for RecordingCallbacks {
    fn on_shown(&self, config_id: &str) {
        self.shown.lock().push(config_id.to_string());
    }

    fn on_reward(&self, reward: &Reward) {
        self.rewards.lock().push(reward.clone());
    }

    fn on_dismissed(&self, completion: AdCompletion) {
        self.dismissed.lock().push(completion);
    }

    fn on_failed(&self, error: AdError) {
        self.failed.lock().push(error);
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

/// Policy without a ceiling, no retries and a short timeout.
pub fn policy() -> ManagerPolicy {
    ManagerPolicy {
        max_ad_frequency: None,
        ad_loading_timeout_ms: 1_000,
        retry_attempts: 0,
        ..ManagerPolicy::fallback()
    }
}

pub fn interstitial(id: &str) -> AdConfiguration {
    AdConfiguration::new(id, SurfaceType::Interstitial, Placement::AfterVideo, "inter-unit")
}

pub fn rewarded(id: &str) -> AdConfiguration {
    AdConfiguration::new(id, SurfaceType::Rewarded, Placement::BeforeVideo, "rewarded-unit")
}

pub struct Harness {
    pub engine: AdDeliveryEngine,
    pub provider: Arc<ScriptedProvider>,
    pub source: Arc<StaticConfigSource>,
    pub store: Arc<MemoryPerformanceStore>,
    pub clock: Arc<FixedClock>,
}

pub async fn harness(
    ads: Vec<AdConfiguration>,
    policy: ManagerPolicy,
    provider: Arc<ScriptedProvider>,
) -> Harness {
    harness_with(ads, policy, provider, EngineFeatures::default()).await
}

pub async fn harness_with(
    ads: Vec<AdConfiguration>,
    policy: ManagerPolicy,
    provider: Arc<ScriptedProvider>,
    features: EngineFeatures,
) -> Harness {
    let clock = clock();
    harness_on(ads, policy, provider, features, clock.clone(), clock).await
}

/// Harness whose engine reads time from `engine_clock`; `clock` is kept in
/// the harness for tests that wrap it.
pub async fn harness_on(
    ads: Vec<AdConfiguration>,
    policy: ManagerPolicy,
    provider: Arc<ScriptedProvider>,
    features: EngineFeatures,
    clock: Arc<FixedClock>,
    engine_clock: Arc<dyn Clock>,
) -> Harness {
    let source = StaticConfigSource::new(ads, Some(policy));
    let store = Arc::new(MemoryPerformanceStore::new());

    let config = CoreConfig::builder()
        .config_source(source.clone())
        .ad_provider(provider.clone())
        .performance_store(store.clone())
        .clock(engine_clock)
        .features(features)
        .build()
        .expect("valid config");

    let engine = AdDeliveryEngine::initialize(config)
        .await
        .expect("engine initializes");

    Harness {
        engine,
        provider,
        source,
        store,
        clock,
    }
}

/// Poll the store until `predicate` holds for the record of `config_id`.
pub async fn wait_for_record<F>(
    store: &MemoryPerformanceStore,
    config_id: &str,
    predicate: F,
) -> PerformanceRecord
where
    F: Fn(&PerformanceRecord) -> bool,
{
    for _ in 0..200 {
        if let Some(record) = store.get_performance(config_id).await.unwrap() {
            if predicate(&record) {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("performance record for {} never matched", config_id);
}
