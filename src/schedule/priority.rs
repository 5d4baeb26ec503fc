//! Urgency tiers for coalesced UI recomputation.

use std::time::Duration;

use serde::Deserialize;

use super::debounce::{DebounceScheduler, ScheduleHandle};

/// How urgently a recomputation should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePriority {
    /// Next scheduler turn.
    Immediate,
    /// After a short quiet period.
    #[default]
    Normal,
    /// After a longer quiet period.
    Low,
}

/// Quiet period per [`UpdatePriority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityDelays {
    /// Delay for [`UpdatePriority::Immediate`].
    pub immediate: Duration,
    /// Delay for [`UpdatePriority::Normal`].
    pub normal: Duration,
    /// Delay for [`UpdatePriority::Low`].
    pub low: Duration,
}

impl Default for PriorityDelays {
    fn default() -> Self {
        Self {
            immediate: Duration::ZERO,
            normal: Duration::from_millis(100),
            low: Duration::from_millis(300),
        }
    }
}

impl PriorityDelays {
    /// Delay for `priority`.
    pub fn delay(&self, priority: UpdatePriority) -> Duration {
        match priority {
            UpdatePriority::Immediate => self.immediate,
            UpdatePriority::Normal => self.normal,
            UpdatePriority::Low => self.low,
        }
    }
}

/// One debounce registration per tier.
///
/// Updates of the same tier coalesce; tiers do not supersede each other.
#[derive(Debug, Default)]
pub struct PriorityScheduler {
    delays: PriorityDelays,
    immediate: DebounceScheduler,
    normal: DebounceScheduler,
    low: DebounceScheduler,
}

impl PriorityScheduler {
    /// Creates a scheduler with the given tier delays.
    pub fn new(delays: PriorityDelays) -> Self {
        Self {
            delays,
            ..Self::default()
        }
    }

    /// Configured delays.
    pub fn delays(&self) -> PriorityDelays {
        self.delays
    }

    /// Schedules `callback` on the tier for `priority`.
    pub fn update<F>(&self, callback: F, priority: UpdatePriority) -> ScheduleHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.tier(priority)
            .schedule(callback, self.delays.delay(priority))
    }

    /// Cancels the pending update of one tier.
    pub fn cancel(&self, priority: UpdatePriority) -> bool {
        self.tier(priority).cancel_pending()
    }

    /// Cancels every tier. Returns true if anything was pending.
    pub fn cancel_all(&self) -> bool {
        let immediate = self.immediate.cancel_pending();
        let normal = self.normal.cancel_pending();
        let low = self.low.cancel_pending();
        immediate || normal || low
    }

    fn tier(&self, priority: UpdatePriority) -> &DebounceScheduler {
        match priority {
            UpdatePriority::Immediate => &self.immediate,
            UpdatePriority::Normal => &self.normal,
            UpdatePriority::Low => &self.low,
        }
    }
}
