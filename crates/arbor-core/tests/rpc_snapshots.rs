//! Snapshot tests for the RPC envelope inside PUBLISH frames.
//!
//! Devices and hubs built from different revisions must keep talking, so any
//! change to these bytes is a breaking change.

use std::{cell::RefCell, rc::Rc, time::Instant};

use arbor_core::{
    ByteTransport, LinkConfig, MessagePool, NodeConfig, NodeTree, Params, ReturnCode,
    TransportError,
    rpc::{RpcMessage, TopicPath},
};
use arbor_proto::{Frame, QoS};
use insta::assert_snapshot;

fn frame_to_hex(frame: &Frame) -> String {
    let mut buf = Vec::new();
    frame.write_to(&mut buf).expect("encoding should succeed");
    hex::encode(&buf)
}

fn message_to_hex(message: &RpcMessage) -> String {
    frame_to_hex(&message.to_frame().expect("message should fit a frame"))
}

/// Records writes, never has data to read
#[derive(Clone, Default)]
struct Capture(Rc<RefCell<Vec<u8>>>);

impl ByteTransport for Capture {
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        Ok(None)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.0.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
}

#[test]
fn snapshot_request() {
    let dest = TopicPath::parse("~/dev1").unwrap();
    let request = RpcMessage::request(dest, "ping", 7, Params::new()).unwrap();

    assert_snapshot!(message_to_hex(&request), @"301200082d3e7e2f6465763100070470696e6700");
}

#[test]
fn snapshot_success_response() {
    let mut request =
        RpcMessage::request(TopicPath::parse("dev1").unwrap(), "ping", 7, Params::new()).unwrap();
    request.source = TopicPath::parse("dev2").unwrap();
    let response = request.response(ReturnCode::Success, Params::from_str_field("pong").unwrap());

    assert_snapshot!(
        message_to_hex(&response),
        @"301600063c2d6465763200070470696e67000004706f6e67"
    );
}

#[test]
fn snapshot_failed_response_with_remote_source() {
    let mut request =
        RpcMessage::request(TopicPath::parse("svc").unwrap(), "m", 9, Params::new()).unwrap();
    request.source = TopicPath::parse("~/x").unwrap();
    let mut response =
        request.response(ReturnCode::MethodDne, Params::from_str_field("dropped").unwrap());
    response.source = TopicPath::parse("~/../svc").unwrap();

    assert_snapshot!(message_to_hex(&response), @"301500053c2d7e2f780009016d087e2f2e2e2f73766303");
}

#[test]
fn snapshot_notification_qos1() {
    let mut notification =
        RpcMessage::notification("temp", 3, QoS::AtLeastOnce, Params::from_bytes(b"21").unwrap())
            .unwrap();
    notification.source = TopicPath::parse("dev1").unwrap();

    assert_snapshot!(message_to_hex(&notification), @"321400025e5e000300030474656d7004646576313231");
}

#[test]
fn snapshot_provisioning_request() {
    let capture = Capture::default();
    let mut tree = NodeTree::new(MessagePool::default(), NodeConfig::default());
    tree.add_downstream_link(capture.clone(), "leafA", LinkConfig::default()).unwrap();

    tree.tick(Instant::now());

    assert_snapshot!(
        hex::encode(capture.0.borrow().as_slice()),
        @"3026000a2d3e5f6c696e6b4d616e04d2085f6765744e616d65085f6c696e6b4d616e056c65616641"
    );
}
