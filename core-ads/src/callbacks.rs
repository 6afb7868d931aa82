//! Outcome reporting for `show` calls.
//!
//! UI call sites implement [`AdCallbacks`]; async callers use
//! [`AdTicket::channel`] and await the ticket instead.

use crate::error::AdError;
use bridge_traits::{Placement, Reward, SurfaceType};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Summary of a session that ended with a dismissed ad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdCompletion {
    pub session_id: String,
    pub config_id: String,
    pub surface_type: SurfaceType,
    pub placement: Placement,
    /// Whether the creative came from the preload cache
    pub preloaded: bool,
    pub clicked: bool,
    /// Last reward granted, rewarded surfaces only
    pub reward: Option<Reward>,
}

/// Receives the outcome of one `show` call.
///
/// Exactly one of `on_dismissed` / `on_failed` is invoked per call.
pub trait AdCallbacks: Send + Sync {
    fn on_shown(&self, _config_id: &str) {}

    fn on_reward(&self, _reward: &Reward) {}

    fn on_dismissed(&self, _completion: AdCompletion) {}

    fn on_failed(&self, _error: AdError) {}
}

/// Callbacks that ignore every outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

impl AdCallbacks for NoopCallbacks {}

/// Future-style handle resolving to the outcome of a `show` call.
#[derive(Debug)]
pub struct AdTicket {
    receiver: oneshot::Receiver<Result<AdCompletion, AdError>>,
}

impl AdTicket {
    /// Create a ticket and the callbacks that resolve it.
    pub fn channel() -> (AdTicket, Arc<dyn AdCallbacks>) {
        let (sender, receiver) = oneshot::channel();
        let callbacks = TicketCallbacks {
            sender: Mutex::new(Some(sender)),
        };
        (AdTicket { receiver }, Arc::new(callbacks))
    }

    /// Wait for the outcome. A session that ends without reporting yields
    /// [`AdError::Interrupted`].
    pub async fn wait(self) -> Result<AdCompletion, AdError> {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AdError::Interrupted),
        }
    }
}

struct TicketCallbacks {
    sender: Mutex<Option<oneshot::Sender<Result<AdCompletion, AdError>>>>,
}

impl TicketCallbacks {
    fn resolve(&self, outcome: Result<AdCompletion, AdError>) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(outcome);
        }
    }
}

impl AdCallbacks for TicketCallbacks {
    fn on_dismissed(&self, completion: AdCompletion) {
        self.resolve(Ok(completion));
    }

    fn on_failed(&self, error: AdError) {
        self.resolve(Err(error));
    }
}
