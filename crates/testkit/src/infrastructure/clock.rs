//! Clock and random implementations.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::infrastructure::ports::{Cancelled, ClockPort, RandomPort};
use crate::infrastructure::sync::lock;

/// System clock - uses real time.
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// =============================================================================
// Fake Clock
// =============================================================================

/// Virtual clock advanced explicitly by the test.
///
/// `sleep` parks the caller until `advance` moves virtual time past its
/// deadline. Sleepers wake in deadline order; equal deadlines wake in the
/// order they were registered.
pub struct FakeClock {
    start: DateTime<Utc>,
    state: Mutex<FakeClockState>,
}

struct FakeClockState {
    elapsed: Duration,
    next_seq: u64,
    sleepers: Vec<Sleeper>,
}

impl FakeClockState {
    /// Forget sleepers whose futures were dropped.
    fn prune_dropped(&mut self) {
        self.sleepers.retain(|sleeper| !sleeper.wake.is_closed());
    }
}

struct Sleeper {
    deadline: Duration,
    seq: u64,
    wake: oneshot::Sender<()>,
}

impl FakeClock {
    /// Create a fake clock whose virtual time starts at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            state: Mutex::new(FakeClockState {
                elapsed: Duration::ZERO,
                next_seq: 0,
                sleepers: Vec::new(),
            }),
        }
    }

    /// Fake clock starting at 2024-01-01T00:00:00Z.
    pub fn at_epoch() -> Self {
        let start = Utc
            .timestamp_opt(1_704_067_200, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }

    /// Creates an Arc-wrapped clock for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::at_epoch())
    }

    /// Move virtual time forward and wake every sleeper that became due.
    pub fn advance(&self, by: Duration) {
        let due = {
            let mut state = lock(&self.state);
            state.elapsed += by;
            let now = state.elapsed;
            let (mut due, pending): (Vec<_>, Vec<_>) = state
                .sleepers
                .drain(..)
                .partition(|sleeper| sleeper.deadline <= now);
            state.sleepers = pending;
            due.sort_by_key(|sleeper| (sleeper.deadline, sleeper.seq));
            due
        };

        for sleeper in due {
            // A closed receiver means the sleeping future was dropped.
            let _ = sleeper.wake.send(());
        }
    }

    /// Number of sleepers still waiting on this clock.
    pub fn pending_timers(&self) -> usize {
        let mut state = lock(&self.state);
        state.prune_dropped();
        state.sleepers.len()
    }

    /// Yield to the scheduler until at least `count` sleepers are parked.
    pub async fn wait_for_timers(&self, count: usize) {
        while self.pending_timers() < count {
            tokio::task::yield_now().await;
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::at_epoch()
    }
}

#[async_trait]
impl ClockPort for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = lock(&self.state).elapsed;
        let offset =
            chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        self.start + offset
    }

    fn elapsed(&self) -> Duration {
        lock(&self.state).elapsed
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let wake = {
            let mut state = lock(&self.state);
            state.prune_dropped();
            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            let deadline = state.elapsed + duration;
            state.sleepers.push(Sleeper {
                deadline,
                seq,
                wake: tx,
            });
            rx
        };
        let _ = wake.await;
    }
}

// =============================================================================
// Randomness
// =============================================================================

/// System random - uses real randomness.
pub struct SystemRandom;

impl SystemRandom {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomPort for SystemRandom {
    fn gen_unit(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }

    fn gen_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Seeded random - reproducible fault injection across runs.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomPort for SeededRandom {
    fn gen_unit(&self) -> f64 {
        lock(&self.rng).gen::<f64>()
    }

    fn gen_uuid(&self) -> Uuid {
        let bytes: [u8; 16] = lock(&self.rng).gen();
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}

/// Fixed random for testing.
pub struct FixedRandom(pub f64);

impl RandomPort for FixedRandom {
    fn gen_unit(&self) -> f64 {
        self.0
    }

    fn gen_uuid(&self) -> Uuid {
        Uuid::nil()
    }
}

// =============================================================================
// Suspension points
// =============================================================================

/// A cancellable delay on an injected clock.
///
/// Every simulated latency goes through `pause`, so cancelling the shutdown
/// token releases every waiter at once.
#[derive(Clone)]
pub struct Suspension {
    clock: Arc<dyn ClockPort>,
    shutdown: CancellationToken,
}

impl Suspension {
    pub fn new(clock: Arc<dyn ClockPort>, shutdown: CancellationToken) -> Self {
        Self { clock, shutdown }
    }

    pub fn clock(&self) -> &Arc<dyn ClockPort> {
        &self.clock
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait `duration` on the clock, or fail once shutdown is requested.
    pub async fn pause(&self, duration: Duration) -> Result<(), Cancelled> {
        if self.shutdown.is_cancelled() {
            return Err(Cancelled);
        }
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Cancelled),
            _ = self.clock.sleep(duration) => Ok(()),
        }
    }
}
