//! # Ad Lifecycle Orchestrator
//!
//! Drives one ad at a time per surface type through
//! `Idle -> Loading -> Loaded -> Showing -> Idle`.
//!
//! ## Flow of a `show` call
//!
//! 1. Resolve the configuration for the surface/placement pair. None means
//!    [`AdError::ConfigurationMissing`], reported immediately.
//! 2. Evaluate the frequency policy against the ledger. A decline means
//!    [`AdError::PolicySuppressed`] and the provider is never contacted. A
//!    declined frequency step still consumes the attempt so that the modulo
//!    gate advances.
//! 3. Claim the surface slot. A busy slot means [`AdError::AlreadyShowing`];
//!    the call is not queued.
//! 4. On the runtime: take a fresh preloaded creative or load one (bounded by
//!    the policy timeout, retried up to `retry_attempts` extra times), show it
//!    and consume its events until it is dismissed or fails.
//!
//! Dismissed and failed-to-show sessions increment the ledger; only dismissed
//! ones record an impression. Load failures leave the ledger untouched.
//!
//! The slot is held by a [`SessionGuard`]; dropping the guard (normal end,
//! early return or a panicking task) returns the surface to `Idle`.

use crate::callbacks::{AdCallbacks, AdCompletion};
use crate::config_store::ConfigStore;
use crate::error::{AdError, Result};
use crate::frequency::{self, DeclineReason, PolicyDecision};
use crate::ledger::CounterLedger;
use crate::tracker::ImpressionTracker;
use bridge_traits::{
    AdConfiguration, AdProvider, Clock, LoadRequest, LoadedAd, ManagerPolicy, Placement,
    ShowEvent, SurfaceType,
};
use core_runtime::config::EngineFeatures;
use core_runtime::events::{AdEvent, CoreEvent, EventBus};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Reported when the provider closes the event stream before `Showed`.
const CLOSED_BEFORE_SHOWN: &str = "Ad closed before it was shown";

/// Lifecycle state of a surface slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Loaded,
    Showing,
}

struct SessionSlot {
    session_id: String,
    config_id: String,
    state: SessionState,
}

struct PreloadedAd {
    config_id: String,
    ad: Box<dyn LoadedAd>,
    loaded_at: Instant,
}

/// Collaborators and settings the orchestrator is built from.
pub struct OrchestratorParts {
    pub config_store: Arc<ConfigStore>,
    pub provider: Arc<dyn AdProvider>,
    pub ledger: Arc<CounterLedger>,
    pub tracker: ImpressionTracker,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
    pub features: EngineFeatures,
    pub preload_ttl: Duration,
    /// Runtime lifecycle tasks are spawned on
    pub runtime: Handle,
}

#[derive(Clone)]
pub struct AdLifecycleOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config_store: Arc<ConfigStore>,
    provider: Arc<dyn AdProvider>,
    ledger: Arc<CounterLedger>,
    tracker: ImpressionTracker,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    features: EngineFeatures,
    preload_ttl: Duration,
    runtime: Handle,
    sessions: Mutex<HashMap<SurfaceType, SessionSlot>>,
    preloaded: Mutex<HashMap<SurfaceType, PreloadedAd>>,
}

impl fmt::Debug for AdLifecycleOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sessions: Vec<(SurfaceType, SessionState)> = self
            .inner
            .sessions
            .lock()
            .iter()
            .map(|(surface, slot)| (*surface, slot.state))
            .collect();
        f.debug_struct("AdLifecycleOrchestrator")
            .field("sessions", &sessions)
            .field("features", &self.inner.features)
            .finish()
    }
}

/// Holds a surface slot; releases it on drop.
struct SessionGuard {
    inner: Arc<Inner>,
    surface: SurfaceType,
    session_id: String,
}

impl SessionGuard {
    fn set_state(&self, state: SessionState) {
        if let Some(slot) = self.inner.sessions.lock().get_mut(&self.surface) {
            if slot.session_id == self.session_id {
                slot.state = state;
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut sessions = self.inner.sessions.lock();
        if matches!(sessions.get(&self.surface), Some(slot) if slot.session_id == self.session_id)
        {
            sessions.remove(&self.surface);
        }
    }
}

impl AdLifecycleOrchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        Self {
            inner: Arc::new(Inner {
                config_store: parts.config_store,
                provider: parts.provider,
                ledger: parts.ledger,
                tracker: parts.tracker,
                clock: parts.clock,
                event_bus: parts.event_bus,
                features: parts.features,
                preload_ttl: parts.preload_ttl,
                runtime: parts.runtime,
                sessions: Mutex::new(HashMap::new()),
                preloaded: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start a show session.
    ///
    /// Returns `None` when the call was rejected synchronously (the failure
    /// has already been delivered to `callbacks`), otherwise the handle of the
    /// spawned lifecycle task.
    #[instrument(skip_all, fields(surface = %surface, placement = %placement))]
    pub fn show(
        &self,
        surface: SurfaceType,
        placement: Placement,
        callbacks: Arc<dyn AdCallbacks>,
    ) -> Option<JoinHandle<()>> {
        let inner = &self.inner;

        let (config, policy) = match inner.resolve_consuming(surface, placement) {
            Ok(ready) => ready,
            Err(err) => {
                inner.reject(surface, placement, None, err, callbacks.as_ref());
                return None;
            }
        };

        let guard = match inner.claim(surface, &config.id) {
            Ok(guard) => guard,
            Err(err) => {
                inner.reject(surface, placement, Some(&config.id), err, callbacks.as_ref());
                return None;
            }
        };

        info!(session_id = %guard.session_id, config_id = %config.id, "Ad session started");
        let span = info_span!("ad_session", session_id = %guard.session_id, surface = %surface);
        let task = Arc::clone(inner).run_session(guard, config, placement, policy, callbacks);
        Some(inner.runtime.spawn(task.instrument(span)))
    }

    /// Load a creative ahead of time and park it for the next `show`.
    ///
    /// Returns whether a fresh creative is parked for the surface afterwards.
    /// A declined preload publishes [`AdEvent::Suppressed`]; nothing else is
    /// reported on failure.
    #[instrument(skip_all, fields(surface = %surface, placement = %placement))]
    pub async fn preload(&self, surface: SurfaceType, placement: Placement) -> bool {
        let inner = &self.inner;

        let (config, policy) = match inner.resolve(surface, placement) {
            Ok(ready) => ready,
            Err(err) => {
                debug!(error = %err, "Preload skipped");
                inner.declined(surface, placement, None, &err);
                return false;
            }
        };

        if inner.has_fresh_preload(&config) {
            debug!(config_id = %config.id, "Fresh preload already parked");
            return true;
        }

        let guard = match inner.claim(surface, &config.id) {
            Ok(guard) => guard,
            Err(err) => {
                debug!(error = %err, "Preload skipped");
                inner.declined(surface, placement, Some(&config.id), &err);
                return false;
            }
        };

        match inner
            .load_with_retry(&guard.session_id, &config, placement, &policy)
            .await
        {
            Ok(ad) => {
                inner.preloaded.lock().insert(
                    surface,
                    PreloadedAd {
                        config_id: config.id.clone(),
                        ad,
                        loaded_at: Instant::now(),
                    },
                );
                info!(config_id = %config.id, "Ad preloaded");
                inner.emit(AdEvent::Preloaded {
                    config_id: config.id,
                    surface,
                });
                true
            }
            Err(message) => {
                warn!(config_id = %config.id, error = %message, "Preload failed");
                false
            }
        }
    }

    /// Whether a `show` for the pair would pass the configuration and policy
    /// gates right now. No side effects.
    pub fn should_show(&self, surface: SurfaceType, placement: Placement) -> bool {
        self.inner.resolve(surface, placement).is_ok()
    }

    /// The configuration a `show` would use, or the error it would report.
    /// No side effects.
    pub fn check(&self, surface: SurfaceType, placement: Placement) -> Result<AdConfiguration> {
        let (config, _) = self.inner.resolve(surface, placement)?;
        if self.inner.sessions.lock().contains_key(&surface) {
            return Err(AdError::AlreadyShowing { surface });
        }
        Ok(config)
    }

    pub fn session_state(&self, surface: SurfaceType) -> SessionState {
        self.inner
            .sessions
            .lock()
            .get(&surface)
            .map(|slot| slot.state)
            .unwrap_or(SessionState::Idle)
    }

    /// Configuration id of the session occupying the surface, if any.
    pub fn active_config(&self, surface: SurfaceType) -> Option<String> {
        self.inner
            .sessions
            .lock()
            .get(&surface)
            .map(|slot| slot.config_id.clone())
    }

    /// Whether an unexpired creative is parked for the surface.
    pub fn has_preloaded(&self, surface: SurfaceType) -> bool {
        self.inner
            .preloaded
            .lock()
            .get(&surface)
            .map(|entry| entry.loaded_at.elapsed() < self.inner.preload_ttl)
            .unwrap_or(false)
    }
}

impl Inner {
    /// Configuration and policy for the pair, without touching the ledger.
    fn resolve(
        &self,
        surface: SurfaceType,
        placement: Placement,
    ) -> Result<(AdConfiguration, ManagerPolicy)> {
        self.resolve_with(surface, placement, false)
    }

    /// Like [`Inner::resolve`], but a frequency step decline consumes the
    /// attempt atomically with the evaluation.
    fn resolve_consuming(
        &self,
        surface: SurfaceType,
        placement: Placement,
    ) -> Result<(AdConfiguration, ManagerPolicy)> {
        self.resolve_with(surface, placement, true)
    }

    fn resolve_with(
        &self,
        surface: SurfaceType,
        placement: Placement,
        consume_step: bool,
    ) -> Result<(AdConfiguration, ManagerPolicy)> {
        let snapshot = self.config_store.snapshot();
        let config = snapshot
            .config_for(surface, placement)
            .cloned()
            .ok_or(AdError::ConfigurationMissing { surface, placement })?;

        // read outside the ledger lock: a host clock may block
        let now = self.clock.now();
        let decision = if consume_step {
            self.ledger.evaluate_and_consume(&config.id, |counter| {
                frequency::evaluate(&config, counter, now, &snapshot.policy)
            })
        } else {
            let counter = self.ledger.value_for(&config.id);
            frequency::evaluate(&config, counter, now, &snapshot.policy)
        };

        if consume_step && decision == PolicyDecision::Suppress(DeclineReason::FrequencyStep) {
            debug!(config_id = %config.id, "Frequency step consumed");
        }

        match decision {
            PolicyDecision::Allow => Ok((config, snapshot.policy.clone())),
            PolicyDecision::Suppress(reason) => Err(AdError::PolicySuppressed {
                config_id: config.id,
                reason,
            }),
        }
    }

    fn claim(self: &Arc<Self>, surface: SurfaceType, config_id: &str) -> Result<SessionGuard> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&surface) {
            return Err(AdError::AlreadyShowing { surface });
        }

        let session_id = Uuid::new_v4().to_string();
        sessions.insert(
            surface,
            SessionSlot {
                session_id: session_id.clone(),
                config_id: config_id.to_string(),
                state: SessionState::Loading,
            },
        );

        Ok(SessionGuard {
            inner: Arc::clone(self),
            surface,
            session_id,
        })
    }

    fn reject(
        &self,
        surface: SurfaceType,
        placement: Placement,
        config_id: Option<&str>,
        err: AdError,
        callbacks: &dyn AdCallbacks,
    ) {
        self.declined(surface, placement, config_id, &err);
        callbacks.on_failed(err);
    }

    /// Publish why a request stopped before reaching the provider.
    fn declined(
        &self,
        surface: SurfaceType,
        placement: Placement,
        config_id: Option<&str>,
        err: &AdError,
    ) {
        let (config_id, reason) = match err {
            AdError::ConfigurationMissing { .. } => (None, "configuration_missing"),
            AdError::PolicySuppressed { config_id, reason } => {
                (Some(config_id.clone()), reason.as_str())
            }
            AdError::AlreadyShowing { .. } => (config_id.map(str::to_string), "already_showing"),
            _ => (config_id.map(str::to_string), "rejected"),
        };

        debug!(reason, "Ad request declined");
        self.emit(AdEvent::Suppressed {
            surface,
            placement,
            config_id,
            reason: reason.to_string(),
        });
    }

    fn emit(&self, event: AdEvent) {
        self.event_bus.emit(CoreEvent::Ad(event));
    }

    fn has_fresh_preload(&self, config: &AdConfiguration) -> bool {
        matches!(
            self.preloaded.lock().get(&config.surface_type),
            Some(entry) if entry.config_id == config.id && entry.loaded_at.elapsed() < self.preload_ttl
        )
    }

    fn take_preloaded(&self, config: &AdConfiguration) -> Option<Box<dyn LoadedAd>> {
        let entry = self.preloaded.lock().remove(&config.surface_type)?;

        if entry.config_id != config.id {
            debug!(
                parked = %entry.config_id,
                wanted = %config.id,
                "Discarding preload for a different configuration"
            );
            return None;
        }

        if entry.loaded_at.elapsed() >= self.preload_ttl {
            debug!(config_id = %config.id, "Discarding expired preload");
            return None;
        }

        Some(entry.ad)
    }

    async fn load_with_retry(
        &self,
        session_id: &str,
        config: &AdConfiguration,
        placement: Placement,
        policy: &ManagerPolicy,
    ) -> std::result::Result<Box<dyn LoadedAd>, String> {
        let request = LoadRequest {
            creative_id: policy.creative_for(config),
            surface_type: config.surface_type,
            placement,
            test_mode: policy.test_mode,
        };

        let retries = if self.features.retry_failed_loads {
            policy.retry_attempts
        } else {
            0
        };
        let attempts = retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!(attempt, creative_id = %request.creative_id, "Loading ad");
            self.emit(AdEvent::LoadStarted {
                session_id: session_id.to_string(),
                config_id: config.id.clone(),
                surface: config.surface_type,
                attempt,
            });

            match self.load_once(request.clone(), policy).await {
                Ok(ad) => return Ok(ad),
                Err(message) => {
                    let will_retry = attempt < attempts;
                    warn!(attempt, will_retry, error = %message, "Ad load failed");
                    self.emit(AdEvent::LoadFailed {
                        session_id: session_id.to_string(),
                        config_id: config.id.clone(),
                        surface: config.surface_type,
                        message: message.clone(),
                        will_retry,
                    });
                    last_error = message;
                }
            }
        }

        Err(last_error)
    }

    async fn load_once(
        &self,
        request: LoadRequest,
        policy: &ManagerPolicy,
    ) -> std::result::Result<Box<dyn LoadedAd>, String> {
        let load = self.provider.load(request);

        if !self.features.enforce_load_timeout {
            return load.await.map_err(|e| e.provider_message());
        }

        let limit = Duration::from_millis(policy.ad_loading_timeout_ms);
        match timeout(limit, load).await {
            Ok(result) => result.map_err(|e| e.provider_message()),
            Err(_) => Err(format!(
                "Ad load timed out after {} ms",
                policy.ad_loading_timeout_ms
            )),
        }
    }

    async fn run_session(
        self: Arc<Self>,
        guard: SessionGuard,
        config: AdConfiguration,
        placement: Placement,
        policy: ManagerPolicy,
        callbacks: Arc<dyn AdCallbacks>,
    ) {
        let surface = config.surface_type;
        let session_id = guard.session_id.clone();

        let (ad, preloaded) = match self.take_preloaded(&config) {
            Some(ad) => (ad, true),
            None => match self
                .load_with_retry(&session_id, &config, placement, &policy)
                .await
            {
                Ok(ad) => (ad, false),
                Err(message) => {
                    drop(guard);
                    warn!(config_id = %config.id, error = %message, "Giving up on ad load");
                    callbacks.on_failed(AdError::ProviderLoadFailed {
                        config_id: config.id,
                        message,
                    });
                    return;
                }
            },
        };

        guard.set_state(SessionState::Loaded);
        self.emit(AdEvent::Loaded {
            session_id: session_id.clone(),
            config_id: config.id.clone(),
            surface,
            from_cache: preloaded,
        });

        guard.set_state(SessionState::Showing);
        let mut events = ad.show();
        let mut shown = false;
        let mut clicked = false;
        let mut reward = None;

        let failure = loop {
            match events.next().await {
                Some(ShowEvent::Showed) => {
                    if shown {
                        continue;
                    }
                    shown = true;
                    self.emit(AdEvent::Shown {
                        session_id: session_id.clone(),
                        config_id: config.id.clone(),
                        surface,
                    });
                    callbacks.on_shown(&config.id);
                }
                Some(ShowEvent::Clicked) => {
                    clicked = true;
                    let _ = self.tracker.record_click(&config.id);
                    self.emit(AdEvent::Clicked {
                        session_id: session_id.clone(),
                        config_id: config.id.clone(),
                        surface,
                    });
                }
                Some(ShowEvent::RewardEarned(earned)) => {
                    info!(kind = %earned.kind, amount = earned.amount, "Reward earned");
                    self.emit(AdEvent::RewardEarned {
                        session_id: session_id.clone(),
                        config_id: config.id.clone(),
                        surface,
                        kind: earned.kind.clone(),
                        amount: earned.amount,
                    });
                    callbacks.on_reward(&earned);
                    reward = Some(earned);
                }
                Some(ShowEvent::Dismissed) => break None,
                Some(ShowEvent::FailedToShow(message)) => break Some(message),
                None if shown => break None,
                None => break Some(CLOSED_BEFORE_SHOWN.to_string()),
            }
        };

        let counter = self.ledger.increment(&config.id);
        drop(guard);

        match failure {
            None => {
                let _ = self.tracker.record_impression(&config.id);
                info!(config_id = %config.id, counter, "Ad dismissed");
                self.emit(AdEvent::Dismissed {
                    session_id: session_id.clone(),
                    config_id: config.id.clone(),
                    surface,
                });
                callbacks.on_dismissed(AdCompletion {
                    session_id,
                    config_id: config.id,
                    surface_type: surface,
                    placement,
                    preloaded,
                    clicked,
                    reward,
                });
            }
            Some(message) => {
                warn!(config_id = %config.id, counter, error = %message, "Ad failed to show");
                self.emit(AdEvent::ShowFailed {
                    session_id,
                    config_id: config.id.clone(),
                    surface,
                    message: message.clone(),
                });
                callbacks.on_failed(AdError::ProviderShowFailed {
                    config_id: config.id,
                    message,
                });
            }
        }
    }
}
