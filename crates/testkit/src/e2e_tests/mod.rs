//! End-to-end tests driving the whole mock server.
//!
//! Every test builds its own `MockServer` on a `FakeClock`, so nothing is
//! shared between tests and no test sleeps on wall time.
//!
//! ```bash
//! cargo test -p tavern-testkit --lib e2e_tests
//! ```

mod contract_tests;
mod e2e_helpers;
mod lifecycle_tests;

pub use e2e_helpers::*;
