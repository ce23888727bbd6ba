//! Pooled, reference-counted messages.
//!
//! A [`MessagePool`] owns a fixed number of frame slots, allocated once at
//! construction. A [`Message`] is a handle to one occupied slot:
//!
//! - `acquire()` / `bind()` claim a free slot with a reference count of 1
//! - `clone()` increments the count (another consumer holds the message)
//! - drop or [`Message::release`] decrements it; at zero the frame is cleared
//!   and the slot is immediately free again
//!
//! There is no growth and no waiting. When every slot is live, acquisition
//! fails with [`PoolExhausted`] and the caller decides what to drop.
//!
//! # Single Context
//!
//! The pool is shared through `Rc` and slots use `Cell`/`RefCell`, so neither
//! `MessagePool` nor `Message` is `Send`. Routing state stays on the one
//! thread that polls the tree.

use std::{
    cell::{Cell, Ref, RefCell, RefMut},
    fmt,
    rc::Rc,
};

use arbor_proto::{Frame, HeaderFlags, PacketType, ProtocolError, QoS};
use thiserror::Error;

use crate::limits::DEFAULT_POOL_CAPACITY;

/// Every slot of the pool is in use
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("message pool exhausted: all {capacity} slots in use")]
pub struct PoolExhausted {
    /// Capacity of the exhausted pool
    pub capacity: usize,
}

struct Slot {
    refs: Cell<u16>,
    frame: RefCell<Frame>,
}

struct PoolInner {
    slots: Box<[Slot]>,
    in_use: Cell<usize>,
}

/// Fixed-capacity message pool.
///
/// Cloning the pool clones the handle; all clones share the same slots.
#[derive(Clone)]
pub struct MessagePool {
    inner: Rc<PoolInner>,
}

impl MessagePool {
    /// Create a pool with `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot { refs: Cell::new(0), frame: RefCell::new(Frame::default()) })
            .collect();
        Self { inner: Rc::new(PoolInner { slots, in_use: Cell::new(0) }) }
    }

    /// Claim a free slot holding a cleared frame.
    ///
    /// # Errors
    ///
    /// [`PoolExhausted`] if every slot is live.
    pub fn acquire(&self) -> Result<Message, PoolExhausted> {
        let capacity = self.capacity();
        let slot = self
            .inner
            .slots
            .iter()
            .position(|slot| slot.refs.get() == 0)
            .ok_or(PoolExhausted { capacity })?;

        self.inner.slots[slot].refs.set(1);
        self.inner.in_use.set(self.inner.in_use.get() + 1);
        Ok(Message { pool: Rc::clone(&self.inner), slot })
    }

    /// Claim a free slot and move `frame` into it.
    ///
    /// Used on the receive path, where the parser has already filled a frame.
    pub fn bind(&self, frame: Frame) -> Result<Message, PoolExhausted> {
        let message = self.acquire()?;
        *message.frame_mut() = frame;
        Ok(message)
    }

    /// Total number of slots
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.slots.len()
    }

    /// Number of free slots
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity() - self.inner.in_use.get()
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl fmt::Debug for MessagePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// Reference-counted handle to one pooled frame.
///
/// # Invariants
///
/// - The slot's count equals the number of live `Message` handles to it.
/// - A slot with count zero holds a cleared frame and is free.
pub struct Message {
    pool: Rc<PoolInner>,
    slot: usize,
}

impl Message {
    fn slot_ref(&self) -> &Slot {
        &self.pool.slots[self.slot]
    }

    /// Index of the backing slot
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of live handles to this message
    #[must_use]
    pub fn ref_count(&self) -> u16 {
        self.slot_ref().refs.get()
    }

    /// Borrow the frame.
    ///
    /// # Panics
    ///
    /// If another handle to the same slot currently holds [`Message::frame_mut`].
    pub fn frame(&self) -> Ref<'_, Frame> {
        self.slot_ref().frame.borrow()
    }

    /// Mutably borrow the frame.
    ///
    /// Shared messages should not be rewritten in place: other holders observe
    /// the change. Check [`Message::ref_count`] first.
    ///
    /// # Panics
    ///
    /// If any handle to the same slot currently borrows the frame.
    pub fn frame_mut(&self) -> RefMut<'_, Frame> {
        self.slot_ref().frame.borrow_mut()
    }

    /// Packet type tag of the bound frame
    pub fn packet_type(&self) -> Result<PacketType, ProtocolError> {
        self.frame().packet_type()
    }

    /// Delivery class of the bound frame
    ///
    /// Only PUBLISH frames carry QoS bits; every other type reads as
    /// [`QoS::AtMostOnce`].
    pub fn qos(&self) -> Result<QoS, ProtocolError> {
        let frame = self.frame();
        match frame.packet_type()? {
            PacketType::Publish => frame.flags().qos(),
            _ => Ok(QoS::AtMostOnce),
        }
    }

    /// Whether the bound frame is a retained PUBLISH
    #[must_use]
    pub fn is_retained(&self) -> bool {
        let frame = self.frame();
        matches!(frame.packet_type(), Ok(PacketType::Publish))
            && frame.flags().contains(HeaderFlags::RETAIN)
    }

    /// Drop this handle, returning the slot to the pool if it was the last.
    pub fn release(self) {
        drop(self);
    }
}

impl Clone for Message {
    fn clone(&self) -> Self {
        let refs = &self.slot_ref().refs;
        refs.set(refs.get() + 1);
        Self { pool: Rc::clone(&self.pool), slot: self.slot }
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        let slot = &self.pool.slots[self.slot];
        let remaining = slot.refs.get().saturating_sub(1);
        slot.refs.set(remaining);
        if remaining == 0 {
            // No handle is left, so nothing can hold a borrow of the frame.
            if let Ok(mut frame) = slot.frame.try_borrow_mut() {
                frame.clear();
            }
            self.pool.in_use.set(self.pool.in_use.get() - 1);
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("slot", &self.slot)
            .field("refs", &self.ref_count())
            .field("header", &self.frame().header())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn acquire_beyond_capacity_fails_then_recovers() {
        let pool = MessagePool::new(3);
        let held: Vec<Message> = (0..3).map(|_| pool.acquire().unwrap()).collect();

        assert_eq!(pool.acquire().unwrap_err(), PoolExhausted { capacity: 3 });
        assert_eq!(pool.available(), 0);

        let mut held = held;
        held.pop().unwrap().release();
        let again = pool.acquire().expect("one slot freed");
        assert!(pool.acquire().is_err(), "exactly one slot was freed");
        drop(again);
    }

    #[test]
    fn clone_keeps_slot_alive_until_last_release() {
        let pool = MessagePool::new(1);
        let first = pool.bind(Frame::new(0x30, b"x").unwrap()).unwrap();
        let second = first.clone();
        assert_eq!(first.ref_count(), 2);

        first.release();
        assert_eq!(second.ref_count(), 1);
        assert_eq!(second.frame().payload(), b"x");
        assert_eq!(pool.available(), 0);

        second.release();
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn released_slot_is_cleared() {
        let pool = MessagePool::new(1);
        let message = pool.bind(Frame::new(0x31, b"payload").unwrap()).unwrap();
        let slot = message.slot();
        drop(message);

        let reused = pool.acquire().unwrap();
        assert_eq!(reused.slot(), slot);
        assert_eq!(*reused.frame(), Frame::default());
    }

    #[test]
    fn header_accessors_read_bound_frame() {
        let pool = MessagePool::new(2);
        let retained = pool.bind(Frame::new(0x33, &[0, 1, b'a', 0, 9]).unwrap()).unwrap();
        assert_eq!(retained.packet_type(), Ok(PacketType::Publish));
        assert_eq!(retained.qos(), Ok(QoS::AtLeastOnce));
        assert!(retained.is_retained());

        let ping = pool.bind(Frame::empty(0xC1)).unwrap();
        assert_eq!(ping.qos(), Ok(QoS::AtMostOnce));
        assert!(!ping.is_retained());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Acquire,
        AddRef(usize),
        Release(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Acquire),
            any::<usize>().prop_map(Op::AddRef),
            any::<usize>().prop_map(Op::Release),
        ]
    }

    proptest! {
        #[test]
        fn live_slots_never_exceed_capacity(ops in proptest::collection::vec(op(), 0..64)) {
            let pool = MessagePool::new(4);
            let mut live: Vec<Message> = Vec::new();

            for op in ops {
                match op {
                    Op::Acquire => match pool.acquire() {
                        Ok(message) => live.push(message),
                        Err(_) => {
                            prop_assert_eq!(pool.available(), 0);
                        },
                    },
                    Op::AddRef(i) if !live.is_empty() => {
                        let message = live[i % live.len()].clone();
                        live.push(message);
                    },
                    Op::Release(i) if !live.is_empty() => {
                        let index = i % live.len();
                        live.swap_remove(index).release();
                    },
                    _ => {},
                }

                let mut slots: Vec<usize> = live.iter().map(Message::slot).collect();
                slots.sort_unstable();
                slots.dedup();
                prop_assert_eq!(pool.available(), pool.capacity() - slots.len());
                for message in &live {
                    let holders = live.iter().filter(|m| m.slot() == message.slot()).count();
                    prop_assert_eq!(usize::from(message.ref_count()), holders);
                }
            }
        }
    }
}
