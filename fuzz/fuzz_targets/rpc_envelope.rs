//! RPC envelope fuzzer
//!
//! Wraps arbitrary bytes in a PUBLISH frame and decodes them as an RPC
//! message. Anything that decodes must survive an encode/decode cycle
//! unchanged.

#![no_main]

use arbor_core::rpc::RpcMessage;
use arbor_proto::{Frame, PacketType};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&flags, payload)) = data.split_first() else {
        return;
    };
    let header = PacketType::Publish.header_byte() | (flags & 0x0F);
    let Ok(frame) = Frame::new(header, payload) else {
        return;
    };
    let Ok(message) = RpcMessage::from_frame(&frame) else {
        return;
    };

    let encoded = message.to_frame().expect("decoded message must re-encode");
    let again = RpcMessage::from_frame(&encoded).expect("re-encoded message must decode");
    assert_eq!(again, message);
});
