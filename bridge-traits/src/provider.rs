//! Ad Provider SDK Abstraction
//!
//! The ad network SDK (AdMob, AppLovin, ...) is opaque to the core. Hosts wrap
//! it behind [`AdProvider`], which loads a creative, and [`LoadedAd`], which
//! shows it and reports the outcome as a stream of [`ShowEvent`]s.
//!
//! SDK callbacks map onto the event stream as follows:
//!
//! | SDK callback                | Event                        |
//! |-----------------------------|------------------------------|
//! | `onAdShowedFullScreenContent` | [`ShowEvent::Showed`]      |
//! | `onAdClicked`               | [`ShowEvent::Clicked`]       |
//! | `onUserEarnedReward`        | [`ShowEvent::RewardEarned`]  |
//! | `onAdDismissedFullScreenContent` | [`ShowEvent::Dismissed`] |
//! | `onAdFailedToShowFullScreenContent` | [`ShowEvent::FailedToShow`] |
//!
//! Closing the sender ends the session. The core treats a stream that closes
//! after `Showed` as a dismissal and one that closes before as a show failure.
//!
//! # Example
//!
//! ```ignore
//! use bridge_traits::provider::{show_channel, LoadedAd, ShowEvent, ShowEvents};
//!
//! struct SdkInterstitial { unit: String }
//!
//! impl LoadedAd for SdkInterstitial {
//!     fn creative_id(&self) -> &str { &self.unit }
//!
//!     fn show(self: Box<Self>) -> ShowEvents {
//!         let (tx, rx) = show_channel();
//!         // hand `tx` to the SDK callback adapter
//!         let _ = tx.unbounded_send(ShowEvent::Showed);
//!         rx
//!     }
//! }
//! ```

use async_trait::async_trait;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};

use crate::ads::{Placement, SurfaceType};
use crate::error::Result;

/// Parameters for a single load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub creative_id: String,
    pub surface_type: SurfaceType,
    pub placement: Placement,
    /// Request SDK test creatives
    pub test_mode: bool,
}

/// Reward granted by a rewarded ad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub kind: String,
    pub amount: i64,
}

/// Lifecycle event emitted by a showing ad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowEvent {
    Showed,
    Clicked,
    RewardEarned(Reward),
    Dismissed,
    FailedToShow(String),
}

/// Sending half handed to the SDK callback adapter.
pub type ShowEventSender = mpsc::UnboundedSender<ShowEvent>;

/// Receiving half consumed by the core.
pub type ShowEvents = mpsc::UnboundedReceiver<ShowEvent>;

/// Create the channel a [`LoadedAd`] reports through.
pub fn show_channel() -> (ShowEventSender, ShowEvents) {
    mpsc::unbounded()
}

/// Ad network SDK entry point.
#[async_trait]
pub trait AdProvider: Send + Sync {
    /// Load a creative. Resolves once the SDK reports loaded or failed.
    ///
    /// Failures should be reported as [`BridgeError::Provider`](crate::error::BridgeError::Provider)
    /// carrying the SDK message.
    async fn load(&self, request: LoadRequest) -> Result<Box<dyn LoadedAd>>;
}

/// A loaded creative, ready to be shown exactly once.
pub trait LoadedAd: Send {
    fn creative_id(&self) -> &str;

    /// Present the creative and return its event stream.
    fn show(self: Box<Self>) -> ShowEvents;
}
