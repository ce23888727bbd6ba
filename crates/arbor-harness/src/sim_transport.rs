//! In-memory byte transport with seeded fault injection.

use std::{cell::RefCell, collections::VecDeque, io, rc::Rc};

use arbor_core::{ByteTransport, TransportError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

type Queue = Rc<RefCell<VecDeque<u8>>>;

/// Counters for writes made through one end of a pipe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireStats {
    /// Writes delivered to the peer, corrupted or not
    pub written: u64,
    /// Writes silently discarded
    pub dropped: u64,
    /// Writes delivered with one byte flipped
    pub corrupted: u64,
    /// Writes rejected with an I/O error
    pub failed: u64,
}

struct WriteFaults {
    rng: ChaCha20Rng,
    drop_rate: f64,
    corrupt_rate: f64,
    fail_writes: bool,
    stats: WireStats,
}

/// One end of a simulated byte pipe.
///
/// Each `write_all` call is treated as one unit for fault injection: it is
/// delivered whole, dropped whole, or delivered with a single corrupted byte.
/// Decisions come from a ChaCha20 RNG seeded at construction, so a given
/// seed always produces the same faults.
///
/// Cloning yields another handle to the same end, which lets a test keep
/// control of faults after the transport is moved into a tree.
#[derive(Clone)]
pub struct SimTransport {
    rx: Queue,
    tx: Queue,
    faults: Rc<RefCell<WriteFaults>>,
}

impl SimTransport {
    /// Create both ends of a pipe, each with its own RNG stream
    pub fn pair(seed: u64) -> (Self, Self) {
        let (a_to_b, b_to_a) = (Queue::default(), Queue::default());
        let a = Self::end(Rc::clone(&b_to_a), Rc::clone(&a_to_b), seed);
        let b = Self::end(a_to_b, b_to_a, seed.wrapping_add(1));
        (a, b)
    }

    fn end(rx: Queue, tx: Queue, seed: u64) -> Self {
        let faults = WriteFaults {
            rng: ChaCha20Rng::seed_from_u64(seed),
            drop_rate: 0.0,
            corrupt_rate: 0.0,
            fail_writes: false,
            stats: WireStats::default(),
        };
        Self { rx, tx, faults: Rc::new(RefCell::new(faults)) }
    }

    /// Probability in `[0, 1]` that a write is dropped
    pub fn set_drop_rate(&self, rate: f64) {
        self.faults.borrow_mut().drop_rate = rate.clamp(0.0, 1.0);
    }

    /// Probability in `[0, 1]` that a delivered write has one byte flipped
    pub fn set_corrupt_rate(&self, rate: f64) {
        self.faults.borrow_mut().corrupt_rate = rate.clamp(0.0, 1.0);
    }

    /// Make every write fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.borrow_mut().fail_writes = fail;
    }

    /// Write counters for this end
    pub fn stats(&self) -> WireStats {
        self.faults.borrow().stats
    }

    /// Bytes waiting to be read by this end
    pub fn pending(&self) -> usize {
        self.rx.borrow().len()
    }

    /// Bytes written by this end that the peer has not read yet
    pub fn outbound(&self) -> usize {
        self.tx.borrow().len()
    }

    /// Take every byte waiting to be read by this end
    pub fn drain(&self) -> Vec<u8> {
        self.rx.borrow_mut().drain(..).collect()
    }

    /// Deliver `bytes` to the peer, bypassing fault injection
    pub fn inject(&self, bytes: &[u8]) {
        self.tx.borrow_mut().extend(bytes);
    }
}

impl ByteTransport for SimTransport {
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        Ok(self.rx.borrow_mut().pop_front())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut faults = self.faults.borrow_mut();
        if faults.fail_writes {
            faults.stats.failed += 1;
            return Err(io::Error::other("injected write failure").into());
        }

        let drop_rate = faults.drop_rate;
        if faults.rng.gen_bool(drop_rate) {
            faults.stats.dropped += 1;
            tracing::trace!(len = bytes.len(), "sim: dropped write");
            return Ok(());
        }

        let mut tx = self.tx.borrow_mut();
        let start = tx.len();
        tx.extend(bytes);

        let corrupt_rate = faults.corrupt_rate;
        if !bytes.is_empty() && faults.rng.gen_bool(corrupt_rate) {
            let index = start + faults.rng.gen_range(0..bytes.len());
            let flip = faults.rng.gen_range(1..=u8::MAX);
            tx[index] ^= flip;
            faults.stats.corrupted += 1;
            tracing::trace!(len = bytes.len(), "sim: corrupted write");
        }
        faults.stats.written += 1;
        Ok(())
    }
}
