//! # Frequency Policy
//!
//! Pure decision function deciding whether a configuration may show an ad
//! given its live counter.
//!
//! Checks run in order and the first failing one wins:
//!
//! 1. manager kill switch (`policy.enabled`)
//! 2. `config.active`
//! 3. start of the date window
//! 4. end of the date window
//! 5. modulo gate: `counter % frequency == 0`, so every Nth attempt passes and
//!    the very first attempt (counter 0) always does
//! 6. hard ceiling: `counter >= max_ad_frequency` suppresses regardless of 5

use bridge_traits::{AdConfiguration, ManagerPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the policy declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    AdsDisabled,
    Inactive,
    NotStarted,
    Expired,
    FrequencyStep,
    CeilingReached,
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::AdsDisabled => "ads_disabled",
            DeclineReason::Inactive => "inactive",
            DeclineReason::NotStarted => "not_started",
            DeclineReason::Expired => "expired",
            DeclineReason::FrequencyStep => "frequency_step",
            DeclineReason::CeilingReached => "ceiling_reached",
        }
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Suppress(DeclineReason),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }
}

/// Evaluate every rule and report the first one that declines.
pub fn evaluate(
    config: &AdConfiguration,
    counter: u64,
    now: DateTime<Utc>,
    policy: &ManagerPolicy,
) -> PolicyDecision {
    if !policy.enabled {
        return PolicyDecision::Suppress(DeclineReason::AdsDisabled);
    }

    if !config.active {
        return PolicyDecision::Suppress(DeclineReason::Inactive);
    }

    if matches!(config.start_date, Some(start) if now < start) {
        return PolicyDecision::Suppress(DeclineReason::NotStarted);
    }

    if matches!(config.end_date, Some(end) if now > end) {
        return PolicyDecision::Suppress(DeclineReason::Expired);
    }

    // frequency 0 is rejected at load time; treat it as 1 here
    let step = u64::from(config.frequency.max(1));
    if counter % step != 0 {
        return PolicyDecision::Suppress(DeclineReason::FrequencyStep);
    }

    if matches!(policy.max_ad_frequency, Some(max) if counter >= max) {
        return PolicyDecision::Suppress(DeclineReason::CeilingReached);
    }

    PolicyDecision::Allow
}

/// Boolean form of [`evaluate`].
pub fn should_show(
    config: &AdConfiguration,
    counter: u64,
    now: DateTime<Utc>,
    policy: &ManagerPolicy,
) -> bool {
    evaluate(config, counter, now, policy).is_allowed()
}
