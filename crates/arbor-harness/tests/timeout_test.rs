//! Request deadlines.

use std::time::Duration;

use arbor_core::{ReturnCode, rpc::NodeConfig};
use arbor_harness::scenario::{
    Scenario, Side, Step,
    oracle::{self, all_of},
};

fn echo() -> Step {
    Step::Request { side: Side::Device, method: "echo", path: "~/../svc", arg: "" }
}

#[test]
fn lost_request_fails_after_two_seconds() {
    let result = Scenario::new()
        .step(Step::Settle)
        .step(Step::DropRate(Side::Device, 1.0))
        .step(echo())
        .step(Step::Advance(Duration::from_millis(1999)))
        .step(Step::Advance(Duration::from_millis(1)))
        .oracle(all_of(vec![
            oracle::device_reply_codes(vec![ReturnCode::FailTimeout]),
            Box::new(|world| {
                let at = world.device_replies()[0].at;
                if at == Duration::from_secs(2) { Ok(()) } else { Err(format!("timed out at {at:?}")) }
            }),
            oracle::no_outstanding_requests(),
            oracle::pools_drained(),
        ]))
        .run();

    assert!(result.is_ok(), "Scenario failed: {:?}", result.err());
}

#[test]
fn timeout_follows_node_config() {
    let result = Scenario::new()
        .with_node_config(NodeConfig { request_timeout: Duration::from_millis(500) })
        .step(Step::Settle)
        .step(Step::DropRate(Side::Hub, 1.0))
        .step(Step::Request { side: Side::Hub, method: "read", path: "leafA/sensor", arg: "" })
        .step(Step::Advance(Duration::from_millis(499)))
        .step(Step::Advance(Duration::from_millis(1)))
        .oracle(all_of(vec![
            oracle::hub_reply_codes(vec![ReturnCode::FailTimeout]),
            Box::new(|world| {
                let at = world.hub_replies()[0].at;
                if at == Duration::from_millis(500) {
                    Ok(())
                } else {
                    Err(format!("timed out at {at:?}"))
                }
            }),
        ]))
        .run();

    assert!(result.is_ok(), "Scenario failed: {:?}", result.err());
}

#[test]
fn expired_requests_free_their_slots() {
    let result = Scenario::new()
        .step(Step::Settle)
        .step(Step::DropRate(Side::Device, 1.0))
        .steps([echo(), echo(), echo()])
        .step(Step::Advance(Duration::from_secs(2)))
        .step(Step::DropRate(Side::Device, 0.0))
        .step(echo())
        .step(Step::Settle)
        .oracle(all_of(vec![
            oracle::device_reply_codes(vec![
                ReturnCode::FailTimeout,
                ReturnCode::FailTimeout,
                ReturnCode::Success,
            ]),
            Box::new(|world| match world.rejected_requests() {
                1 => Ok(()),
                n => Err(format!("{n} requests rejected, expected the third")),
            }),
            oracle::no_outstanding_requests(),
        ]))
        .run();

    assert!(result.is_ok(), "Scenario failed: {:?}", result.err());
}
