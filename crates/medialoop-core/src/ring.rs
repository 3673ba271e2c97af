//! Fixed-capacity application message queue.
//!
//! Only the reactor thread touches the ring, so there is no lock; worker
//! threads marshal their events through the `ThreadChannel` instead.
//!
//! Overflow policy is drop-newest: `put` on a full ring reports failure
//! and the message is discarded, nothing already queued is overwritten.

use crate::geom::Rect;
use crate::message::{Message, MessageBody};
use crate::mwarn;

/// FIFO ring of application messages with fixed capacity.
pub struct MessageRing {
    buf: Box<[Option<Message>]>,
    read: usize,
    write: usize,
    count: usize,
}

impl MessageRing {
    /// Create a ring holding at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "message ring capacity must be at least 1");
        Self {
            buf: (0..capacity).map(|_| None).collect(),
            read: 0,
            write: 0,
            count: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Enqueue a message. Returns false (and drops the message) when full.
    pub fn put(&mut self, msg: Message) -> bool {
        if self.count == self.buf.len() {
            mwarn!("message ring full ({} entries), dropping kind {}", self.count, msg.kind.0);
            return false;
        }
        self.buf[self.write] = Some(msg);
        self.write = (self.write + 1) % self.buf.len();
        self.count += 1;
        true
    }

    /// Dequeue the oldest message.
    pub fn get(&mut self) -> Option<Message> {
        if self.count == 0 {
            return None;
        }
        let msg = self.buf[self.read].take();
        debug_assert!(msg.is_some(), "occupied ring slot was empty");
        self.read = (self.read + 1) % self.buf.len();
        self.count -= 1;
        msg
    }

    /// Drop everything queued.
    pub fn clear(&mut self) {
        for slot in self.buf.iter_mut() {
            *slot = None;
        }
        self.read = 0;
        self.write = 0;
        self.count = 0;
    }

    /// Remove every message matching `pred`, preserving the order of the
    /// rest. Returns the number removed. O(capacity), in place.
    pub fn clear_matching<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&Message) -> bool,
    {
        let cap = self.buf.len();
        let mut kept = 0;
        let mut removed = 0;
        for i in 0..self.count {
            let idx = (self.read + i) % cap;
            let msg = self.buf[idx].take().expect("occupied ring slot was empty");
            if pred(&msg) {
                removed += 1;
            } else {
                self.buf[(self.read + kept) % cap] = Some(msg);
                kept += 1;
            }
        }
        self.count = kept;
        self.write = (self.read + kept) % cap;
        removed
    }

    /// Drop pending redraw messages whose rectangle lies fully inside
    /// `bound`, returning the union of what was dropped. A full repaint
    /// of `bound` then subsumes all of them.
    pub fn purge_region(&mut self, bound: &Rect) -> Option<Rect> {
        let mut union: Option<Rect> = None;
        self.clear_matching(|msg| match msg.body {
            MessageBody::Redraw(r) if bound.contains(&r) => {
                union = Some(union.map_or(r, |u| u.union(&r)));
                true
            }
            _ => false,
        });
        union
    }

    /// Drop queued pointer press/release messages. Used to suppress a tap
    /// that arrived just before a mode switch.
    pub fn discard_pending_taps(&mut self) -> usize {
        self.clear_matching(|msg| msg.body.is_pointer())
    }
}

impl std::fmt::Debug for MessageRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRing")
            .field("capacity", &self.buf.len())
            .field("len", &self.count)
            .finish()
    }
}
