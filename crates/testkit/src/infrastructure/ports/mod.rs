//! Port traits and error types for the simulator boundaries.
//!
//! Ports exist only where a test needs to substitute behavior:
//! - Clock (wall time vs. virtual time)
//! - Random (thread rng vs. seeded/fixed sources)

mod error;
mod testing;

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};

#[cfg(test)]
pub use testing::MockRandomPort;

// =============================================================================
// Error Types
// =============================================================================
pub use error::{
    BrokerError, Cancelled, ConfigurationError, HttpError, LifecycleError, MockServerError,
    ProviderError, StoreError,
};
