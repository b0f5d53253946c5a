//! Fixed-interval polling with a failure budget.

use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

pub struct PollTimer {
    ticker: Interval,
    budget: u32,
    consecutive_failures: u32,
    degraded: bool,
}

impl PollTimer {
    /// The first tick fires immediately.
    pub fn new(period: Duration, budget: u32) -> Self {
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            budget: budget.max(1),
            consecutive_failures: 0,
            degraded: false,
        }
    }

    pub async fn tick(&mut self) {
        self.ticker.tick().await;
    }

    /// Reset the failure streak. Returns true when this ends a degraded spell.
    pub fn record_success(&mut self) -> bool {
        self.consecutive_failures = 0;
        std::mem::replace(&mut self.degraded, false)
    }

    /// Count a failed poll. Returns true exactly once per streak, when the
    /// streak first reaches the budget.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.budget && !self.degraded {
            self.degraded = true;
            return true;
        }
        false
    }

    /// Count a failure that retrying will not fix (the backend answered with a
    /// client error). Degrades at once instead of waiting out the budget.
    pub fn record_rejection(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        !std::mem::replace(&mut self.degraded, true)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
