//! When a broadcast loop fires and how it paces itself afterwards.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use std::time::Duration;

/// How often a loop wakes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fixed tick; every wake is a candidate cycle.
    Every(Duration),
    /// Tick equal to the feature's configured `interval_minutes`, re-read
    /// after every cycle.
    ConfiguredInterval,
    /// Wake every `poll` and fire once per UTC day at the configured
    /// `post_time`.
    DailyAt { poll: Duration },
}

/// Extra waiting a loop does around its sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    None,
    /// Sleep once after a cycle that delivered something.
    AfterCycle,
    /// Sleep between consecutive destinations.
    BetweenSends,
}

/// Self-adjusting delay: the configured interval (never below the feature
/// minimum) minus the safety margin. `None` when that is not positive.
pub fn pacing_delay(interval_minutes: u64, min_minutes: u64, margin: Duration) -> Option<Duration> {
    let interval = Duration::from_secs(interval_minutes.max(min_minutes).saturating_mul(60));
    interval.checked_sub(margin).filter(|d| !d.is_zero())
}

/// Once-per-day guard for wall-clock triggers.
///
/// Fires only in the matching minute and only if it has not fired on the same
/// calendar date. A day whose target minute passes while the process is down
/// is skipped, not caught up.
#[derive(Debug, Clone, Default)]
pub struct DailyTrigger {
    last_fired: Option<NaiveDate>,
}

impl DailyTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_due(&self, now: DateTime<Utc>, at: NaiveTime) -> bool {
        self.last_fired != Some(now.date_naive())
            && now.hour() == at.hour()
            && now.minute() == at.minute()
    }

    pub fn mark_fired(&mut self, date: NaiveDate) {
        self.last_fired = Some(date);
    }
}
