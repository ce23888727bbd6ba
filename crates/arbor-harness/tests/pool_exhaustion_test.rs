//! Behavior when the device runs out of message slots.

use std::time::Duration;

use arbor_core::ReturnCode;
use arbor_harness::scenario::{
    Scenario, Side, Step,
    oracle::{self, all_of},
};

fn read() -> Step {
    Step::Request { side: Side::Hub, method: "read", path: "leafA/sensor", arg: "" }
}

#[test]
fn exhausted_device_drops_frames_and_recovers() {
    let result = Scenario::new()
        .with_pool_capacity(4)
        .step(Step::Settle)
        .step(Step::HoldDeviceMessages(4))
        .step(read())
        .step(Step::Settle)
        .step(Step::Advance(Duration::from_secs(2)))
        .step(Step::ReleaseHeld)
        .step(read())
        .step(Step::Settle)
        .oracle(all_of(vec![
            oracle::hub_reply_codes(vec![ReturnCode::FailTimeout, ReturnCode::Success]),
            Box::new(|world| {
                let stats = world.device().parser_stats(world.downlink()).unwrap_or_default();
                // Provisioning response, the dropped request, the served request.
                if stats.frames_received == 3 {
                    Ok(())
                } else {
                    Err(format!("device parsed {} frames", stats.frames_received))
                }
            }),
            oracle::no_outstanding_requests(),
            oracle::pools_drained(),
        ]))
        .run();

    assert!(result.is_ok(), "Scenario failed: {:?}", result.err());
}

#[test]
fn holding_more_than_capacity_takes_only_what_exists() {
    let result = Scenario::new()
        .with_pool_capacity(2)
        .step(Step::HoldDeviceMessages(5))
        .oracle(Box::new(|world| {
            let pool = world.device().pool();
            if world.held_messages() == 2 && pool.available() == 0 {
                Ok(())
            } else {
                Err(format!("held {} with {} free", world.held_messages(), pool.available()))
            }
        }))
        .run();

    assert!(result.is_ok(), "Scenario failed: {:?}", result.err());
}
