//! Testability ports for injecting time and randomness.
//!
//! Every simulator takes these as `Arc<dyn ...>` so a test can swap the wall
//! clock for a `FakeClock` and thread-local randomness for a seeded source.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

// =============================================================================
// Testability Ports
// =============================================================================

#[async_trait]
pub trait ClockPort: Send + Sync {
    /// Current wall (or virtual) time.
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic time elapsed since the clock was created.
    fn elapsed(&self) -> Duration;

    /// Suspend the caller for `duration` of this clock's time.
    async fn sleep(&self, duration: Duration);
}

#[cfg_attr(test, mockall::automock)]
pub trait RandomPort: Send + Sync {
    /// Uniform sample in `[0, 1)`.
    fn gen_unit(&self) -> f64;
    fn gen_uuid(&self) -> Uuid;
}
