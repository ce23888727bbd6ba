//! Scenario builder API.

use std::time::Duration;

use arbor_core::{bridge::BridgeConfig, link::LinkConfig, rpc::NodeConfig};
use arbor_proto::Frame;

use crate::scenario::{OracleFn, Side, World, WorldConfig};

/// One scripted action.
#[derive(Debug, Clone)]
pub enum Step {
    /// Tick both trees until no bytes are in flight
    Settle,
    /// Move the clock forward, then settle
    Advance(Duration),
    /// Issue a request; see [`World::request`]
    Request {
        /// Issuing tree
        side: Side,
        /// Method to call
        method: &'static str,
        /// Destination path
        path: &'static str,
        /// Single string param, or empty for none
        arg: &'static str,
    },
    /// Publish a notification from the device's `sensor` node
    Notify {
        /// Notification name
        name: &'static str,
        /// Payload
        data: &'static [u8],
    },
    /// Write a frame from the bridge client
    ClientSend(Frame),
    /// Deliver a frame to the device as if the hub sent it
    InjectToDevice(Frame),
    /// Drop this fraction of writes made by `side`
    DropRate(Side, f64),
    /// Corrupt this fraction of writes made by `side`
    CorruptRate(Side, f64),
    /// Take message slots from the device pool
    HoldDeviceMessages(usize),
    /// Return every held slot
    ReleaseHeld,
}

impl Step {
    fn apply(self, world: &mut World) -> Result<(), String> {
        match self {
            Self::Settle => world.settle(),
            Self::Advance(duration) => world.advance(duration),
            Self::Request { side, method, path, arg } => {
                world.request(side, method, path, arg);
                Ok(())
            },
            Self::Notify { name, data } => world.notify(name, data),
            Self::ClientSend(frame) => world.client_send(&frame),
            Self::InjectToDevice(frame) => world.inject_to_device(&frame),
            Self::DropRate(side, rate) => {
                world.wire(side).set_drop_rate(rate);
                Ok(())
            },
            Self::CorruptRate(side, rate) => {
                world.wire(side).set_corrupt_rate(rate);
                Ok(())
            },
            Self::HoldDeviceMessages(count) => {
                world.hold_device_messages(count);
                Ok(())
            },
            Self::ReleaseHeld => {
                world.release_held();
                Ok(())
            },
        }
    }
}

/// Scenario builder.
///
/// Configure the world, script the steps, then attach an oracle to get
/// something runnable.
pub struct Scenario {
    config: WorldConfig,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario with default configuration.
    pub fn new() -> Self {
        Self { config: WorldConfig::default(), steps: Vec::new() }
    }

    /// Seed every fault RNG in the world.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Name the device asks to be provisioned as.
    pub fn with_local_root(mut self, name: &str) -> Self {
        self.config.local_root = name.to_string();
        self
    }

    /// Slots in each tree's message pool.
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool_capacity = capacity;
        self
    }

    /// Node settings for both trees.
    pub fn with_node_config(mut self, config: NodeConfig) -> Self {
        self.config.node = config;
        self
    }

    /// Link settings for both ends.
    pub fn with_link_config(mut self, config: LinkConfig) -> Self {
        self.config.link = config;
        self
    }

    /// Attach a bridge named `mqtt` under the hub root.
    ///
    /// Its authenticator accepts every client and counts calls.
    pub fn with_bridge(mut self, config: BridgeConfig) -> Self {
        self.config.bridge = Some(config);
        self
    }

    /// Append a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append several steps.
    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Builds the world, applies every step in order and runs the oracle on
    /// the final state.
    ///
    /// # Errors
    ///
    /// The first failing step or the oracle's verdict.
    pub fn run(self) -> Result<(), String> {
        let Self { scenario, oracle } = self;
        let mut world = World::new(&scenario.config)?;
        for (index, step) in scenario.steps.into_iter().enumerate() {
            step.apply(&mut world).map_err(|err| format!("step {index}: {err}"))?;
        }
        oracle(&world)
    }
}
