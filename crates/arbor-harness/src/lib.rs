//! Deterministic simulation harness for arbor topologies.
//!
//! This crate provides a manually advanced [`SimEnv`] clock and in-memory
//! [`SimTransport`] pipes with seeded fault injection, plus a scenario
//! framework that wires a hub tree and a device tree together and drives
//! them tick by tick.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scenario;
pub mod sim_env;
pub mod sim_transport;

pub use sim_env::SimEnv;
pub use sim_transport::{SimTransport, WireStats};
