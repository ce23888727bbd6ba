//! Byte transport abstraction.
//!
//! Links and bridges talk to their peer through a [`ByteTransport`]: a
//! non-blocking byte source and sink. The trait is deliberately tiny so that a
//! UART driver, a TCP socket or an in-memory simulation pipe can all implement
//! it in a few lines.
//!
//! # Implementations
//!
//! - [`IoTransport`]: adapts any non-blocking `std::io::Read + Write` stream
//! - `arbor_harness::SimTransport`: in-memory pipe with fault injection

use std::io::{self, Read, Write};

use crate::error::TransportError;

/// Non-blocking byte source and sink.
///
/// # Contract
///
/// - `read_byte` returns `Ok(None)` when no byte is available right now. It
///   must not block waiting for one.
/// - `write_all` either writes every byte or reports an error. Partial writes
///   are the implementation's problem, not the caller's.
pub trait ByteTransport {
    /// Read one byte if available.
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError>;

    /// Write all of `bytes`.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: ByteTransport + ?Sized> ByteTransport for Box<T> {
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        (**self).read_byte()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_all(bytes)
    }
}

/// [`ByteTransport`] over a `std::io` stream.
///
/// The stream should be in non-blocking mode. `WouldBlock` and `Interrupted`
/// read as "no data"; a zero-length read means the peer closed the stream.
#[derive(Debug)]
pub struct IoTransport<S> {
    stream: S,
}

impl<S: Read + Write> IoTransport<S> {
    /// Wrap `stream`
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Borrow the wrapped stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwrap the stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read + Write> ByteTransport for IoTransport<S> {
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Ok(0) => Err(TransportError::Closed),
            Ok(_) => Ok(Some(byte[0])),
            Err(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Ok(None)
            },
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn reads_bytes_then_reports_close() {
        let mut transport = IoTransport::new(Cursor::new(vec![0xC0, 0x00]));
        assert_eq!(transport.read_byte().unwrap(), Some(0xC0));
        assert_eq!(transport.read_byte().unwrap(), Some(0x00));
        assert!(matches!(transport.read_byte(), Err(TransportError::Closed)));
    }

    #[test]
    fn would_block_reads_as_no_data() {
        struct Blocked;
        impl Read for Blocked {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::ErrorKind::WouldBlock.into())
            }
        }
        impl Write for Blocked {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut transport = IoTransport::new(Blocked);
        assert_eq!(transport.read_byte().unwrap(), None);
    }

    #[test]
    fn writes_reach_the_stream() {
        let mut transport = IoTransport::new(Cursor::new(Vec::new()));
        transport.write_all(&[0xD0, 0x00]).unwrap();
        assert_eq!(transport.into_inner().into_inner(), vec![0xD0, 0x00]);
    }
}
