//! Time source abstraction.
//!
//! The routing core never reads a clock. Every operation that needs the time
//! takes an `Instant` argument, and drivers obtain that instant from an
//! [`Environment`]. This keeps timeout and provisioning logic deterministic:
//! the simulation harness advances a manual clock, production uses the
//! system's monotonic clock, and the tree cannot tell the difference.
//!
//! # Invariants
//!
//! - Monotonicity: `now()` must never go backwards
//! - Isolation: implementations must not share global state

use std::time::Instant;

/// Monotonic time source.
///
/// # Implementations
///
/// - [`SystemEnv`]: `std::time::Instant::now()`
/// - `arbor_harness::SimEnv`: manually advanced virtual clock
pub trait Environment: Clone {
    /// Returns the current time.
    ///
    /// # Invariants
    ///
    /// Subsequent calls must return times `>=` previous calls.
    fn now(&self) -> Instant;
}

/// Production environment backed by the system's monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
