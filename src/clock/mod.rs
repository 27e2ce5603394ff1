//! Time source for payment dates, edit stamps and audit timestamps.
//!
//! Production code reads wall-clock time through [`SystemClock`]; tests pin
//! and move time through a [`TestClock`] so that due dates and rollups are
//! deterministic.

mod control;
mod safe;
mod system;
mod test;

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

pub use control::ClockControl;
pub use safe::SafeClock;
pub use system::SystemClock;
pub use test::TestClock;

/// Type alias for a shared clock
pub type SharedClock = Arc<dyn Clock>;

/// Core trait for clocks
pub trait Clock: Send + Sync {
    /// Get the current instant
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date of the current instant (UTC)
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Check if this is a test clock
    fn is_test(&self) -> bool;
}
