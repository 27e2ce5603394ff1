use super::TestClock;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;

/// A guard that provides safe access to time manipulation in tests
pub struct ClockControl {
    clock: Arc<TestClock>,
}

impl ClockControl {
    pub(crate) fn new(clock: Arc<TestClock>) -> Self {
        Self { clock }
    }

    /// Advance time by the specified duration
    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    /// Advance time by whole days
    pub fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }

    /// Set time to a specific value
    pub fn set(&self, time: DateTime<Utc>) {
        self.clock.set(time);
    }

    /// Set time to midnight UTC of the given date
    pub fn set_date(&self, date: NaiveDate) {
        self.clock.set(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    /// Total duration moved forward since creation
    pub fn total_advanced(&self) -> Duration {
        self.clock.total_advanced()
    }
}

impl std::fmt::Debug for ClockControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockControl")
            .field("total_advanced", &self.total_advanced())
            .finish()
    }
}
