use super::Clock;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Test clock whose time only moves when told to
pub struct TestClock {
    state: Arc<RwLock<TestState>>,
}

#[derive(Debug)]
struct TestState {
    current_time: DateTime<Utc>,
    total_advanced: Duration,
}

impl TestClock {
    /// Create a new test clock at the specified time
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(RwLock::new(TestState {
                current_time: start,
                total_advanced: Duration::zero(),
            })),
        }
    }

    /// Create a new test clock at the current system time
    pub fn new_at_now() -> Self {
        Self::new(Utc::now())
    }

    /// Advance time by the specified duration
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.write();
        state.current_time = state.current_time + duration;
        state.total_advanced = state.total_advanced + duration;
    }

    /// Set time to a specific value
    pub fn set(&self, time: DateTime<Utc>) {
        self.state.write().current_time = time;
    }

    /// Total duration moved forward through `advance`
    pub fn total_advanced(&self) -> Duration {
        self.state.read().total_advanced
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.read().current_time
    }

    fn is_test(&self) -> bool {
        true
    }
}
