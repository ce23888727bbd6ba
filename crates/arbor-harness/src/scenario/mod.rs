//! Scenario testing framework for deterministic simulation tests.
//!
//! A scenario builds a [`World`], applies a scripted list of [`Step`]s and
//! then hands the final state to a mandatory oracle. Time only moves when a
//! step says so, so a scenario with a fixed seed replays identically.

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario, Step};
pub use oracle::OracleFn;
pub use world::{Reply, Side, World, WorldConfig};
