//! A periodic ticker that other tasks can fire early.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Fires every `period`, or as soon as its [`ResetHandle`] is notified.
/// An early fire restarts the period.
pub struct ResettableTicker {
    interval: Interval,
    reset: Arc<Notify>,
}

/// Requests an immediate tick. Notifications made while nobody waits are
/// coalesced into a single early tick.
#[derive(Debug, Clone, Default)]
pub struct ResetHandle {
    reset: Arc<Notify>,
}

impl ResetHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.reset.notify_one();
    }

    pub fn ticker(&self, period: Duration) -> ResettableTicker {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately.
        interval.reset();
        ResettableTicker {
            interval,
            reset: Arc::clone(&self.reset),
        }
    }
}

impl ResettableTicker {
    pub async fn tick(&mut self) {
        tokio::select! {
            _ = self.interval.tick() => {}
            _ = self.reset.notified() => {
                self.interval.reset();
            }
        }
    }
}
