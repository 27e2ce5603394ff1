use super::Clock;
use chrono::{DateTime, Utc};

/// Production clock that reads actual system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn is_test(&self) -> bool {
        false
    }
}
