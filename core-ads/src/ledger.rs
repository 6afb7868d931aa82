//! Per-configuration attempt counters.
//!
//! Counters live for the process lifetime only and never decrease.

use crate::frequency::{DeclineReason, PolicyDecision};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CounterLedger {
    counters: Mutex<HashMap<String, u64>>,
}

impl CounterLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter for `config_id` and return the new value.
    pub fn increment(&self, config_id: &str) -> u64 {
        let mut counters = self.counters.lock();
        let value = counters.entry(config_id.to_string()).or_insert(0);
        *value = value.saturating_add(1);
        *value
    }

    /// Current value, 0 for unseen ids.
    pub fn value_for(&self, config_id: &str) -> u64 {
        self.counters.lock().get(config_id).copied().unwrap_or(0)
    }

    /// Run `evaluate` against the current counter and, when it declines on the
    /// frequency step, consume the attempt. Read, decision and increment happen
    /// under one lock so concurrent callers see each other's consumption.
    ///
    /// `evaluate` runs with the ledger locked and must not call back into it.
    pub fn evaluate_and_consume<F>(&self, config_id: &str, evaluate: F) -> PolicyDecision
    where
        F: FnOnce(u64) -> PolicyDecision,
    {
        let mut counters = self.counters.lock();
        let counter = counters.get(config_id).copied().unwrap_or(0);
        let decision = evaluate(counter);

        if decision == PolicyDecision::Suppress(DeclineReason::FrequencyStep) {
            counters.insert(config_id.to_string(), counter.saturating_add(1));
        }
        decision
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.lock().clone()
    }
}
