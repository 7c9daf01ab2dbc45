//! Infrastructure shared by every simulator.
//!
//! Contains the testability ports, their clock/random implementations and the
//! error taxonomy.

pub mod clock;
pub mod ports;
pub(crate) mod sync;
