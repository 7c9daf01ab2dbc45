//! Tavern Testkit library.
//!
//! In-process test doubles for everything the TRPG app talks to, composed
//! by one orchestrator.
//!
//! ## Structure
//!
//! - `providers/` - Simulated AI providers with scenario injection
//! - `broker/` - In-process session broker (rooms, clients, server)
//! - `store/` - In-memory data store with foreign-key enforcement
//! - `http/` - HTTP boundary answering with canned REST envelopes
//! - `orchestrator/` - Lifecycle, configuration and the service bundle
//! - `infrastructure/` - Clock and random ports, error taxonomy

pub mod broker;
pub mod http;
pub mod infrastructure;
pub mod logging;
pub mod orchestrator;
pub mod providers;
pub mod store;

/// Contract and lifecycle tests driving the whole mock server.
#[cfg(test)]
mod e2e_tests;

pub use infrastructure::clock::{FakeClock, SeededRandom, SystemClock, SystemRandom};
pub use infrastructure::ports::{ClockPort, MockServerError, RandomPort};
pub use orchestrator::{MockServer, MockServerConfig, ServiceBundle};
