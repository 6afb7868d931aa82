//! # Impression Tracker
//!
//! Records impressions and clicks against the persistent performance record.
//!
//! Every update is a read-modify-write on the store: fetch (or start from an
//! empty record), bump the counter, recompute CTR, write back. Updates for the
//! same configuration are not serialized, so concurrent events may overwrite
//! each other (last writer wins). The numbers are advisory analytics, not a
//! ledger of record.

use crate::error::Result;
use bridge_traits::{Clock, PerformanceRecord, PerformanceStore};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedEvent {
    Impression,
    Click,
}

impl TrackedEvent {
    fn as_str(&self) -> &'static str {
        match self {
            TrackedEvent::Impression => "impression",
            TrackedEvent::Click => "click",
        }
    }
}

#[derive(Clone)]
pub struct ImpressionTracker {
    store: Option<Arc<dyn PerformanceStore>>,
    clock: Arc<dyn Clock>,
    runtime: Handle,
}

impl fmt::Debug for ImpressionTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpressionTracker")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl ImpressionTracker {
    /// Without a store the tracker is disabled and every record call is a no-op.
    pub fn new(
        store: Option<Arc<dyn PerformanceStore>>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            clock,
            runtime,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Record an impression in the background.
    pub fn record_impression(&self, config_id: &str) -> JoinHandle<()> {
        self.spawn(config_id, TrackedEvent::Impression)
    }

    /// Record a click in the background.
    pub fn record_click(&self, config_id: &str) -> JoinHandle<()> {
        self.spawn(config_id, TrackedEvent::Click)
    }

    fn spawn(&self, config_id: &str, event: TrackedEvent) -> JoinHandle<()> {
        let tracker = self.clone();
        let config_id = config_id.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = tracker.apply(&config_id, event).await {
                warn!(config_id = %config_id, event = event.as_str(), error = %e, "Failed to record ad performance");
            }
        })
    }

    /// Apply one event and return the stored record, or `None` when disabled.
    #[instrument(skip(self, event), fields(event = event.as_str()))]
    pub async fn apply(
        &self,
        config_id: &str,
        event: TrackedEvent,
    ) -> Result<Option<PerformanceRecord>> {
        let Some(store) = self.store.as_ref() else {
            debug!("Performance tracking disabled");
            return Ok(None);
        };

        let now = self.clock.now();
        let mut record = store
            .get_performance(config_id)
            .await?
            .unwrap_or_else(|| PerformanceRecord::empty(config_id, now));

        match event {
            TrackedEvent::Impression => record.impressions = record.impressions.saturating_add(1),
            TrackedEvent::Click => record.clicks = record.clicks.saturating_add(1),
        }
        record.recompute_ctr();
        record.last_updated = now;

        store.update_performance(record.clone()).await?;
        debug!(
            impressions = record.impressions,
            clicks = record.clicks,
            ctr = record.click_through_rate,
            "Performance record updated"
        );

        Ok(Some(record))
    }
}
