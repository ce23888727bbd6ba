//! Snapshot tests for wire format stability.
//!
//! Every control packet arbor emits is pinned to its exact bytes. If the
//! encoding changes these fail, so an accidental break in MQTT compatibility
//! is caught before it reaches a broker.

use arbor_proto::{
    Frame, QoS,
    packets::{
        ConnAck, Connect, ConnectReturnCode, Disconnect, PingReq, PingResp, Publish, SubAck,
        SubAckReturn, Subscribe,
    },
};
use insta::assert_snapshot;

/// Helper to encode frame to hex string for snapshot
fn frame_to_hex(frame: &Frame) -> String {
    let mut buf = Vec::new();
    frame.write_to(&mut buf).expect("encoding should succeed");
    hex::encode(&buf)
}

// =============================================================================
// Session Management Frames
// =============================================================================

#[test]
fn snapshot_connect_minimal() {
    let frame = Connect::new("dev1").to_frame().expect("frame creation should succeed");
    assert_snapshot!(frame_to_hex(&frame), @"101000044d5154540402003c000464657631");
}

#[test]
fn snapshot_connect_with_credentials() {
    let frame = Connect::new("dev1")
        .with_credentials("u", Some(b"p".as_slice()))
        .to_frame()
        .expect("frame creation should succeed");
    assert_snapshot!(frame_to_hex(&frame), @"101600044d51545404c2003c000464657631000175000170");
}

#[test]
fn snapshot_connack_accepted() {
    let frame = ConnAck::new(ConnectReturnCode::Accepted).to_frame().unwrap();
    assert_snapshot!(frame_to_hex(&frame), @"20020000");
}

#[test]
fn snapshot_connack_identifier_rejected() {
    let frame = ConnAck::new(ConnectReturnCode::RefusedIdentifierRejected).to_frame().unwrap();
    assert_snapshot!(frame_to_hex(&frame), @"20020002");
}

#[test]
fn snapshot_connack_bad_credentials() {
    let frame = ConnAck::new(ConnectReturnCode::RefusedBadUsernamePassword).to_frame().unwrap();
    assert_snapshot!(frame_to_hex(&frame), @"20020004");
}

#[test]
fn snapshot_keepalive_and_disconnect() {
    assert_snapshot!(frame_to_hex(&PingReq.to_frame().unwrap()), @"c000");
    assert_snapshot!(frame_to_hex(&PingResp.to_frame().unwrap()), @"d000");
    assert_snapshot!(frame_to_hex(&Disconnect.to_frame().unwrap()), @"e000");
}

// =============================================================================
// Publish / Subscribe Frames
// =============================================================================

#[test]
fn snapshot_publish_qos0() {
    let frame = Publish::new("a/b", b"hi").to_frame().unwrap();
    assert_snapshot!(frame_to_hex(&frame), @"30070003612f626869");
}

#[test]
fn snapshot_subscribe_wildcard() {
    let packet = Subscribe {
        packet_id: 1,
        filters: heapless::Vec::from_slice(&[("#", QoS::AtMostOnce)]).unwrap(),
    };
    assert_snapshot!(frame_to_hex(&packet.to_frame().unwrap()), @"8206000100012300");
}

#[test]
fn snapshot_suback_granted() {
    let ack = SubAck {
        packet_id: 1,
        returns: heapless::Vec::from_slice(&[SubAckReturn::Granted(QoS::AtMostOnce)]).unwrap(),
    };
    assert_snapshot!(frame_to_hex(&ack.to_frame().unwrap()), @"9003000100");
}
