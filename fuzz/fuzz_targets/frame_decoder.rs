//! Streaming decoder fuzzer
//!
//! Feeds arbitrary bytes through `FrameDecoder` one at a time. Every frame
//! that comes out must fit the frame buffer, re-encode, and decode back to
//! itself through the one-shot `Frame::decode` path.

#![no_main]

use arbor_proto::{FRAME_CAPACITY, Frame, FrameDecoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::default();
    for &byte in data {
        let Ok(Some(frame)) = decoder.push_byte(byte) else {
            continue;
        };
        assert!(frame.payload().len() <= FRAME_CAPACITY);

        let mut encoded = Vec::new();
        frame.write_to(&mut encoded).expect("decoded frame must re-encode");
        assert_eq!(encoded.len(), frame.encoded_len());

        let (again, used) = Frame::decode(&encoded)
            .expect("re-encoded frame must decode")
            .expect("re-encoded frame must be complete");
        assert_eq!(used, encoded.len());
        assert_eq!(again, frame);
    }
});
