//! Shared setup for the end-to-end tests.

use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::clock::{FakeClock, SeededRandom};
use crate::orchestrator::{MockServer, MockServerConfig, ServiceBundle};

/// A started server on a fake clock.
pub struct TestServer {
    pub server: MockServer,
    pub services: ServiceBundle,
    pub clock: Arc<FakeClock>,
}

impl TestServer {
    pub fn start(config: MockServerConfig) -> Self {
        let clock = FakeClock::shared();
        let mut server = MockServer::new(config)
            .with_clock(clock.clone())
            .with_random(Arc::new(SeededRandom::new(42)));
        let services = server.start().expect("mock server starts");
        Self {
            server,
            services,
            clock,
        }
    }

    /// Seeded database, everything else quiet.
    pub fn seeded() -> Self {
        Self::start(MockServerConfig::default())
    }

    /// Session broker delivering every message after `latency_ms`.
    pub fn with_broker_latency(latency_ms: u64) -> Self {
        let mut config = MockServerConfig::minimal();
        config.websocket.simulate_latency = true;
        config.websocket.latency_ms = latency_ms;
        Self::start(config)
    }

    /// Advance virtual time and let woken tasks run.
    pub async fn advance(&self, by: Duration) {
        self.clock.advance(by);
        settle().await;
    }
}

/// Yield until spawned tasks have caught up.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Yield until every sleeper on `clock` is gone.
pub async fn wait_until_idle(clock: &FakeClock) {
    for _ in 0..256 {
        if clock.pending_timers() == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
}
