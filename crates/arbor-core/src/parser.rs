//! Frame parser bound to a byte transport.
//!
//! [`FrameParser`] pairs a [`FrameDecoder`] with a [`ByteTransport`]. Links
//! and bridges call [`FrameParser::poll`] once per tick; it drains available
//! bytes until one frame completes or the transport runs dry.
//!
//! Parse errors never escape `poll`. They are logged, counted in
//! [`ParserStats`], and the decoder is already back in `Idle` for the next
//! frame.

use arbor_proto::{Frame, FrameDecoder, MAX_ENCODED_LEN};

use crate::{error::SendError, transport::ByteTransport};

/// Counters kept by a [`FrameParser`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Complete frames dispatched
    pub frames_received: u64,
    /// Frames written
    pub frames_sent: u64,
    /// Frames discarded by the decoder
    pub parse_errors: u64,
    /// Failed transport reads or writes
    pub transport_errors: u64,
}

/// Streaming parser and encoder over one transport.
#[derive(Debug)]
pub struct FrameParser<T> {
    transport: T,
    decoder: FrameDecoder,
    stats: ParserStats,
}

impl<T: ByteTransport> FrameParser<T> {
    /// Create a parser reading from and writing to `transport`
    pub fn new(transport: T) -> Self {
        Self { transport, decoder: FrameDecoder::new(), stats: ParserStats::default() }
    }

    /// Consume available bytes and return at most one complete frame.
    ///
    /// Returns `None` when the transport has no more data before a frame
    /// completes; the partial frame is kept for the next call.
    pub fn poll(&mut self) -> Option<Frame> {
        loop {
            let byte = match self.transport.read_byte() {
                Ok(Some(byte)) => byte,
                Ok(None) => return None,
                Err(err) => {
                    self.stats.transport_errors += 1;
                    tracing::warn!(error = %err, "transport read failed");
                    return None;
                },
            };

            match self.decoder.push_byte(byte) {
                Ok(Some(frame)) => {
                    self.stats.frames_received += 1;
                    tracing::trace!(header = frame.header(), len = frame.payload().len(), "frame received");
                    return Some(frame);
                },
                Ok(None) => {},
                Err(err) => {
                    self.stats.parse_errors += 1;
                    tracing::warn!(error = %err, "discarding malformed frame");
                },
            }
        }
    }

    /// Encode `frame` and write it to the transport.
    ///
    /// # Errors
    ///
    /// [`SendError::Transport`] if the write fails. The frame is not retried.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), SendError> {
        let mut out = [0u8; MAX_ENCODED_LEN];
        let len = frame.encoded_len();
        let mut cursor = &mut out[..];
        frame.write_to(&mut cursor)?;

        if let Err(err) = self.transport.write_all(&out[..len]) {
            self.stats.transport_errors += 1;
            return Err(err.into());
        }
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Counters since creation
    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use arbor_proto::{PacketType, packets::PingReq};

    use super::*;
    use crate::error::TransportError;

    #[derive(Default)]
    struct Loopback {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        fail_writes: bool,
    }

    impl ByteTransport for Loopback {
        fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
            Ok(self.rx.pop_front())
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            if self.fail_writes {
                return Err(TransportError::Closed);
            }
            self.tx.extend_from_slice(bytes);
            Ok(())
        }
    }

    fn parser_with(bytes: &[u8]) -> FrameParser<Loopback> {
        FrameParser::new(Loopback { rx: bytes.iter().copied().collect(), ..Loopback::default() })
    }

    #[test]
    fn poll_yields_one_frame_per_call() {
        let mut parser = parser_with(&[0xC0, 0x00, 0xD0, 0x00]);

        let first = parser.poll().expect("first frame");
        assert_eq!(first.packet_type(), Ok(PacketType::PingReq));
        assert_eq!(parser.transport().rx.len(), 2);

        let second = parser.poll().expect("second frame");
        assert_eq!(second.packet_type(), Ok(PacketType::PingResp));
        assert_eq!(parser.poll(), None);
        assert_eq!(parser.stats().frames_received, 2);
    }

    #[test]
    fn partial_frame_survives_between_polls() {
        let mut parser = parser_with(&[0x30, 0x02, 0xAA]);
        assert_eq!(parser.poll(), None);

        parser.transport_mut().rx.push_back(0xBB);
        let frame = parser.poll().expect("frame completes");
        assert_eq!(frame.payload(), &[0xAA, 0xBB]);
    }

    #[test]
    fn malformed_frame_is_counted_and_skipped() {
        let mut parser = parser_with(&[0x30, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0xC0, 0x00]);

        let frame = parser.poll().expect("recovers to next frame");
        assert_eq!(frame.header(), 0xC0);
        assert_eq!(parser.stats().parse_errors, 1);
    }

    #[test]
    fn write_frame_encodes_header_length_payload() {
        let mut parser = parser_with(&[]);
        parser.write_frame(&PingReq.to_frame().unwrap()).unwrap();
        parser.write_frame(&Frame::new(0x30, &[1, 2, 3]).unwrap()).unwrap();

        assert_eq!(parser.transport().tx, vec![0xC0, 0x00, 0x30, 0x03, 1, 2, 3]);
        assert_eq!(parser.stats().frames_sent, 2);
    }

    #[test]
    fn write_failure_is_reported_and_counted() {
        let mut parser = parser_with(&[]);
        parser.transport_mut().fail_writes = true;

        let result = parser.write_frame(&PingReq.to_frame().unwrap());

        assert!(matches!(result, Err(SendError::Transport(TransportError::Closed))));
        assert_eq!(parser.stats().transport_errors, 1);
    }
}
