//! # Ad Event Bus
//!
//! Provides an event-driven view of the ad delivery core using `tokio::sync::broadcast`.
//! Hosts subscribe to observe ad lifecycles (analytics, debug overlays, QA
//! tooling) without registering per-call callbacks.
//!
//! ## Pieces
//!
//! - **Events**: [`AdEvent`] for sessions, [`ConfigEvent`] for the configuration store
//! - **EventBus**: one broadcast channel shared by every publisher
//! - **EventStream**: a subscription with composable filters
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐
//! │ Orchestrator ├────────────>│           │     subscribe    ┌────────────┐
//! └──────────────┘             │ EventBus  ├─────────────────>│ Subscriber │
//!                              │ (broadcast│                  └────────────┘
//! ┌──────────────┐    emit     │  channel) │     subscribe    ┌────────────┐
//! │ ConfigStore  ├────────────>│           ├─────────────────>│ Subscriber │
//! └──────────────┘             └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use bridge_traits::SurfaceType;
//! use core_runtime::events::{AdEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = bus.stream();
//!
//! bus.emit(CoreEvent::Ad(AdEvent::Shown {
//!     session_id: "session-1".to_string(),
//!     config_id: "interstitial-after-video".to_string(),
//!     surface: SurfaceType::Interstitial,
//! }));
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Ad(AdEvent::Shown { .. })));
//! # }
//! ```
//!
//! A slow subscriber loses the oldest events and receives
//! `RecvError::Lagged(n)` once; it keeps receiving afterwards.

use bridge_traits::{Placement, SurfaceType};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, TryRecvError};
pub use tokio::sync::broadcast::Receiver;

/// Ring size used when the host does not configure one.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Everything published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Ad session lifecycle events
    Ad(AdEvent),
    /// Configuration store events
    Config(ConfigEvent),
}

impl CoreEvent {
    /// Short text suitable for a log line.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Ad(e) => e.description(),
            CoreEvent::Config(e) => e.description(),
        }
    }

    /// Severity used by [`EventStream::min_severity`].
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Ad(AdEvent::ShowFailed { .. }) => EventSeverity::Error,
            CoreEvent::Ad(AdEvent::LoadFailed { will_retry, .. }) => {
                if *will_retry {
                    EventSeverity::Warning
                } else {
                    EventSeverity::Error
                }
            }
            CoreEvent::Config(ConfigEvent::SourceUnavailable { .. }) => EventSeverity::Warning,
            CoreEvent::Ad(AdEvent::Shown { .. })
            | CoreEvent::Ad(AdEvent::Dismissed { .. })
            | CoreEvent::Ad(AdEvent::RewardEarned { .. })
            | CoreEvent::Config(ConfigEvent::Refreshed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    /// Degraded but recovering, e.g. a load that will be retried.
    Warning,
    /// A session ended without an ad on screen.
    Error,
}

// ============================================================================
// Ad Events
// ============================================================================

/// Events emitted while an ad session moves through its lifecycle.
///
/// `session_id` correlates every event of one `show` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AdEvent {
    /// A `show` or `preload` was declined before reaching the provider.
    Suppressed {
        surface: SurfaceType,
        placement: Placement,
        /// The resolved configuration, if one exists.
        config_id: Option<String>,
        /// Machine-readable decline reason.
        reason: String,
    },
    /// A provider load request was issued.
    LoadStarted {
        session_id: String,
        config_id: String,
        surface: SurfaceType,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// The provider returned a creative.
    Loaded {
        session_id: String,
        config_id: String,
        surface: SurfaceType,
        /// Whether the creative came from the preload cache.
        from_cache: bool,
    },
    /// A load attempt failed or timed out.
    LoadFailed {
        session_id: String,
        config_id: String,
        surface: SurfaceType,
        message: String,
        /// Whether another attempt follows.
        will_retry: bool,
    },
    /// The creative is on screen.
    Shown {
        session_id: String,
        config_id: String,
        surface: SurfaceType,
    },
    /// The user clicked the creative.
    Clicked {
        session_id: String,
        config_id: String,
        surface: SurfaceType,
    },
    /// A rewarded creative granted its reward.
    RewardEarned {
        session_id: String,
        config_id: String,
        surface: SurfaceType,
        kind: String,
        amount: i64,
    },
    /// The creative was dismissed.
    Dismissed {
        session_id: String,
        config_id: String,
        surface: SurfaceType,
    },
    /// The provider could not present a loaded creative.
    ShowFailed {
        session_id: String,
        config_id: String,
        surface: SurfaceType,
        message: String,
    },
    /// A creative was parked in the preload cache.
    Preloaded {
        config_id: String,
        surface: SurfaceType,
    },
}

impl AdEvent {
    fn description(&self) -> &str {
        match self {
            AdEvent::Suppressed { .. } => "Ad suppressed",
            AdEvent::LoadStarted { .. } => "Ad load started",
            AdEvent::Loaded { .. } => "Ad loaded",
            AdEvent::LoadFailed { .. } => "Ad load failed",
            AdEvent::Shown { .. } => "Ad shown",
            AdEvent::Clicked { .. } => "Ad clicked",
            AdEvent::RewardEarned { .. } => "Reward earned",
            AdEvent::Dismissed { .. } => "Ad dismissed",
            AdEvent::ShowFailed { .. } => "Ad failed to show",
            AdEvent::Preloaded { .. } => "Ad preloaded",
        }
    }

    /// Surface the event belongs to, when it carries one.
    pub fn surface(&self) -> Option<SurfaceType> {
        match self {
            AdEvent::Suppressed { surface, .. }
            | AdEvent::LoadStarted { surface, .. }
            | AdEvent::Loaded { surface, .. }
            | AdEvent::LoadFailed { surface, .. }
            | AdEvent::Shown { surface, .. }
            | AdEvent::Clicked { surface, .. }
            | AdEvent::Dismissed { surface, .. }
            | AdEvent::ShowFailed { surface, .. }
            | AdEvent::RewardEarned { surface, .. }
            | AdEvent::Preloaded { surface, .. } => Some(*surface),
        }
    }
}

// ============================================================================
// Configuration Events
// ============================================================================

/// Events related to the configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConfigEvent {
    /// A new snapshot was installed.
    Refreshed {
        /// Number of configurations in the snapshot.
        configurations: usize,
        /// `"remote"` or `"fallback"`.
        origin: String,
    },
    /// A collaborator failed and defaults were used instead.
    SourceUnavailable {
        /// Which part of the load failed (e.g., "ads", "manager", "flags").
        component: String,
        message: String,
    },
}

impl ConfigEvent {
    fn description(&self) -> &str {
        match self {
            ConfigEvent::Refreshed { .. } => "Ad configuration refreshed",
            ConfigEvent::SourceUnavailable { .. } => "Ad configuration source unavailable",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Fan-out channel shared by every publisher in the core.
///
/// Publishing never fails: with nobody listening the event is dropped. Each
/// subscriber buffers up to `capacity` events; one that falls further behind
/// loses the oldest and sees `RecvError::Lagged` once.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish `event`; returns how many subscribers will see it.
    pub fn emit(&self, event: CoreEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Raw receiver for future events. Nothing is replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Filterable stream of future events.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream
// ============================================================================

type Predicate = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Subscriber side of the bus with composable filters.
///
/// Every added filter must accept an event for it to be delivered.
///
/// # Example
///
/// ```rust
/// use bridge_traits::SurfaceType;
/// use core_runtime::events::{EventBus, EventSeverity};
///
/// let bus = EventBus::new(100);
/// let rewarded_problems = bus
///     .stream()
///     .surface(SurfaceType::Rewarded)
///     .min_severity(EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    predicates: Vec<Predicate>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            predicates: Vec::new(),
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Box::new(predicate));
        self
    }

    pub fn min_severity(self, min: EventSeverity) -> Self {
        self.filter(move |event| event.severity() >= min)
    }

    /// Only ad events for `surface`.
    pub fn surface(self, surface: SurfaceType) -> Self {
        self.filter(move |event| {
            matches!(event, CoreEvent::Ad(ad) if ad.surface() == Some(surface))
        })
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.predicates.iter().all(|predicate| predicate(event))
    }

    /// Wait for the next accepted event.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` when `n` events were lost to a full buffer,
    /// `RecvError::Closed` once every publisher is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Next accepted event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.accepts(&event) {
                return Some(Ok(event));
            }
        }
    }

    /// Every accepted event currently buffered. Lost events are skipped.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(next) = self.try_recv() {
            match next {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("filters", &self.predicates.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
