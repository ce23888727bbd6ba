//! Manually advanced clock for deterministic testing.

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use arbor_core::env::Environment;

/// Simulation environment with virtual time.
///
/// `now()` returns a fixed epoch plus the total of every [`SimEnv::advance`]
/// call, so a scenario observes exactly the timeline it scripts. Clones share
/// the same clock.
#[derive(Clone, Debug)]
pub struct SimEnv {
    epoch: Instant,
    elapsed: Rc<Cell<Duration>>,
}

impl SimEnv {
    /// Create a clock at its epoch
    pub fn new() -> Self {
        Self { epoch: Instant::now(), elapsed: Rc::default() }
    }

    /// Move time forward by `duration`
    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }

    /// Virtual time since the epoch
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    /// The instant time started at
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        self.epoch + self.elapsed.get()
    }
}
