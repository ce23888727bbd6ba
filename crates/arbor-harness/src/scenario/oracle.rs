//! Oracle functions for scenario verification.
//!
//! Oracle functions run at the end of scenarios to verify global consistency.
//! They receive the final world state and check invariants.

use arbor_core::ReturnCode;

use crate::scenario::World;

/// Oracle function type.
///
/// Receives immutable reference to world state and returns:
/// - `Ok(())` if all invariants hold
/// - `Err(message)` if verification fails
pub type OracleFn = Box<dyn FnOnce(&World) -> Result<(), String>>;

/// Both ends of the link agree it is provisioned, each listener ran once.
pub fn link_provisioned() -> OracleFn {
    Box::new(|world| {
        if !world.device().is_provisioned(world.downlink()) {
            return Err("device link is not provisioned".to_string());
        }
        if world.hub().name(world.uplink()).is_none() {
            return Err("hub link has no name".to_string());
        }
        match (world.device_link_events(), world.hub_link_events()) {
            (1, 1) => Ok(()),
            (device, hub) => {
                Err(format!("listeners fired device={device} hub={hub}, expected once each"))
            },
        }
    })
}

/// No node in either tree is waiting on a response.
pub fn no_outstanding_requests() -> OracleFn {
    Box::new(|world| {
        let waiting = world.hub().outstanding_requests(world.service())
            + world.device().outstanding_requests(world.sensor());
        if waiting == 0 {
            Ok(())
        } else {
            Err(format!("{waiting} requests still outstanding"))
        }
    })
}

/// Every pool slot not held by the scenario is free.
pub fn pools_drained() -> OracleFn {
    Box::new(|world| {
        let hub = world.hub().pool();
        if hub.available() != hub.capacity() {
            return Err(format!("hub pool leaked: {} of {} free", hub.available(), hub.capacity()));
        }
        let device = world.device().pool();
        if device.available() + world.held_messages() != device.capacity() {
            return Err(format!(
                "device pool leaked: {} of {} free with {} held",
                device.available(),
                device.capacity(),
                world.held_messages()
            ));
        }
        Ok(())
    })
}

/// Device requests completed with exactly these codes, in order.
pub fn device_reply_codes(expected: Vec<ReturnCode>) -> OracleFn {
    Box::new(move |world| {
        let codes: Vec<ReturnCode> = world.device_replies().iter().map(|reply| reply.code).collect();
        if codes == expected {
            Ok(())
        } else {
            Err(format!("device reply codes {codes:?}, expected {expected:?}"))
        }
    })
}

/// Hub requests completed with exactly these codes, in order.
pub fn hub_reply_codes(expected: Vec<ReturnCode>) -> OracleFn {
    Box::new(move |world| {
        let codes: Vec<ReturnCode> = world.hub_replies().iter().map(|reply| reply.code).collect();
        if codes == expected {
            Ok(())
        } else {
            Err(format!("hub reply codes {codes:?}, expected {expected:?}"))
        }
    })
}

/// Combine multiple oracles into one.
pub fn all_of(oracles: Vec<OracleFn>) -> OracleFn {
    Box::new(move |world| {
        for oracle in oracles {
            oracle(world)?;
        }
        Ok(())
    })
}
