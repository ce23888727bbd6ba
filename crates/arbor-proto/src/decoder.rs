//! Streaming frame decoder.
//!
//! [`FrameDecoder`] is a pure state machine: it is handed one byte at a time
//! and yields a [`Frame`] when the last payload byte arrives. It never reads
//! from a transport itself, so it can be driven from a socket, a UART ring
//! buffer, or a test vector alike.
//!
//! ```text
//!  Idle --header--> HeaderByteReceived --len(final)--> PayloadAccumulating
//!                        |                                   |
//!                   len(cont.)                          last byte
//!                        v                                   v
//!                 LengthAccumulating --len(final)-->   Dispatch -> Idle
//! ```
//!
//! Every error returns the decoder to `Idle`. The bytes consumed for the
//! broken frame are discarded and the next byte is treated as a new header;
//! there is no byte-by-byte resynchronisation beyond that.

use crate::{
    Frame,
    errors::{ProtocolError, Result},
    frame::FRAME_CAPACITY,
    remaining_length::Accumulator,
};

/// Externally visible decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for the type/flags byte of the next frame
    Idle,
    /// Header byte stored, no length byte seen yet
    HeaderByteReceived,
    /// At least one length byte with the continuation bit seen
    LengthAccumulating,
    /// Length known, collecting payload bytes
    PayloadAccumulating,
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    HeaderByteReceived,
    LengthAccumulating(Accumulator),
    PayloadAccumulating { remaining: usize },
}

/// Incremental decoder holding at most one partial frame.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: State,
    frame: Frame,
}

impl FrameDecoder {
    /// Create a decoder in the `Idle` state
    #[must_use]
    pub const fn new() -> Self {
        Self { state: State::Idle, frame: Frame::empty(0) }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> DecoderState {
        match self.state {
            State::Idle => DecoderState::Idle,
            State::HeaderByteReceived => DecoderState::HeaderByteReceived,
            State::LengthAccumulating(_) => DecoderState::LengthAccumulating,
            State::PayloadAccumulating { .. } => DecoderState::PayloadAccumulating,
        }
    }

    /// Drop any partial frame and return to `Idle`
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.frame.clear();
    }

    /// Feed one byte.
    ///
    /// Returns `Ok(Some(frame))` when `byte` completes a frame. The decoder is
    /// back in `Idle` afterwards.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::RemainingLengthOverflow`] when a fifth length byte
    ///   arrives
    /// - [`ProtocolError::FrameTooLarge`] when the declared length exceeds
    ///   [`FRAME_CAPACITY`]
    ///
    /// In both cases the partial frame is discarded and the decoder is `Idle`.
    pub fn push_byte(&mut self, byte: u8) -> Result<Option<Frame>> {
        match &mut self.state {
            State::Idle => {
                self.frame.clear();
                self.frame.set_header(byte);
                self.state = State::HeaderByteReceived;
                Ok(None)
            },
            State::HeaderByteReceived => {
                let mut length = Accumulator::default();
                self.accumulate(&mut length, byte)
            },
            State::LengthAccumulating(length) => {
                let mut length = *length;
                self.accumulate(&mut length, byte)
            },
            State::PayloadAccumulating { remaining } => {
                *remaining -= 1;
                let done = *remaining == 0;
                if self.frame.payload_mut().push(byte).is_err() {
                    // Capacity was checked when the length completed.
                    self.reset();
                    return Err(ProtocolError::FrameTooLarge {
                        size: FRAME_CAPACITY + 1,
                        max: FRAME_CAPACITY,
                    });
                }
                if done { Ok(Some(self.dispatch())) } else { Ok(None) }
            },
        }
    }

    fn accumulate(&mut self, length: &mut Accumulator, byte: u8) -> Result<Option<Frame>> {
        match length.push(byte) {
            Err(err) => {
                self.reset();
                Err(err)
            },
            Ok(None) => {
                self.state = State::LengthAccumulating(*length);
                Ok(None)
            },
            Ok(Some(len)) => self.begin_payload(len),
        }
    }

    fn begin_payload(&mut self, len: usize) -> Result<Option<Frame>> {
        if len > FRAME_CAPACITY {
            self.reset();
            return Err(ProtocolError::FrameTooLarge { size: len, max: FRAME_CAPACITY });
        }
        if len == 0 {
            return Ok(Some(self.dispatch()));
        }
        self.state = State::PayloadAccumulating { remaining: len };
        Ok(None)
    }

    fn dispatch(&mut self) -> Frame {
        self.state = State::Idle;
        std::mem::take(&mut self.frame)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
