use super::{Clock, ClockControl, SharedClock, SystemClock, TestClock};
use crate::config::ClockSource;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Production-safe clock wrapper that prevents accidental time manipulation
#[derive(Clone)]
pub struct SafeClock {
    inner: SharedClock,
    test_clock: Option<Arc<TestClock>>,
}

impl SafeClock {
    /// Create a new SafeClock from a ClockSource
    pub fn new(source: ClockSource) -> Self {
        match source {
            ClockSource::System => Self {
                inner: Arc::new(SystemClock),
                test_clock: None,
            },
            ClockSource::Test(start) => Self::from_test_clock(Arc::new(TestClock::new(start))),
            ClockSource::TestNow => Self::from_test_clock(Arc::new(TestClock::new_at_now())),
        }
    }

    /// Create from an existing test clock
    pub fn from_test_clock(clock: Arc<TestClock>) -> Self {
        Self {
            inner: clock.clone() as SharedClock,
            test_clock: Some(clock),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.inner.today()
    }

    pub fn is_test_mode(&self) -> bool {
        self.inner.is_test()
    }

    /// Get time control for tests (returns None in production)
    pub fn test_control(&self) -> Option<ClockControl> {
        self.test_clock
            .as_ref()
            .map(|clock| ClockControl::new(clock.clone()))
    }
}

impl std::fmt::Debug for SafeClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeClock")
            .field("now", &self.now())
            .field("test_mode", &self.is_test_mode())
            .finish()
    }
}
