//! Bounded blocking queue between pipeline stages.
//!
//! Fixed capacity, fixed entry size, strict FIFO. Producers never block:
//! `put` fails when full and the producer retries or drops the frame.
//! Consumers may block with a timeout via `get_wait`, which also wakes
//! promptly when the queue is flushed (pipeline reset on seek).

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct FrameInner {
    buf: Box<[u8]>,
    read: usize,  // entry index
    write: usize, // entry index
    count: usize,
    /// Bumped by flush; a waiter that sees it change gives up early.
    epoch: u64,
    total_puts: u64,
}

/// Counters and occupancy snapshot.
#[derive(Debug, Clone)]
pub struct FrameQueueStats {
    pub capacity: usize,
    pub entry_size: usize,
    pub queued: usize,
    pub total_puts: u64,
}

/// Bounded blocking queue of fixed-size byte entries.
pub struct FrameQueue {
    inner: Mutex<FrameInner>,
    ready: Condvar,
    capacity: usize,
    entry_size: usize,
}

impl FrameQueue {
    /// Create a queue of `capacity` entries, each exactly `entry_size` bytes.
    pub fn new(capacity: usize, entry_size: usize) -> Self {
        assert!(capacity > 0, "frame queue capacity must be at least 1");
        assert!(entry_size > 0, "frame queue entry size must be at least 1");
        Self {
            inner: Mutex::new(FrameInner {
                buf: vec![0u8; capacity * entry_size].into_boxed_slice(),
                read: 0,
                write: 0,
                count: 0,
                epoch: 0,
                total_puts: 0,
            }),
            ready: Condvar::new(),
            capacity,
            entry_size,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> FrameQueueStats {
        let inner = self.inner.lock().unwrap();
        FrameQueueStats {
            capacity: self.capacity,
            entry_size: self.entry_size,
            queued: inner.count,
            total_puts: inner.total_puts,
        }
    }

    /// Enqueue one entry. Returns false when the queue is full.
    ///
    /// `entry` must be exactly `entry_size` bytes; a mismatch is a
    /// caller bug, not a runtime condition.
    pub fn put(&self, entry: &[u8]) -> bool {
        assert_eq!(entry.len(), self.entry_size, "frame entry size mismatch");
        let mut inner = self.inner.lock().unwrap();
        if inner.count == self.capacity {
            return false;
        }
        let off = inner.write * self.entry_size;
        inner.buf[off..off + self.entry_size].copy_from_slice(entry);
        inner.write = (inner.write + 1) % self.capacity;
        inner.count += 1;
        inner.total_puts += 1;
        drop(inner);
        self.ready.notify_one();
        true
    }

    /// Dequeue the oldest entry into `out` without blocking.
    /// Returns false when empty.
    pub fn get(&self, out: &mut [u8]) -> bool {
        assert_eq!(out.len(), self.entry_size, "frame entry size mismatch");
        let mut inner = self.inner.lock().unwrap();
        Self::take(&mut inner, self.capacity, self.entry_size, out)
    }

    /// Dequeue the oldest entry, waiting up to `timeout` for one to
    /// arrive. Returns false on timeout and when the queue is flushed
    /// while waiting.
    pub fn get_wait(&self, out: &mut [u8], timeout: Duration) -> bool {
        assert_eq!(out.len(), self.entry_size, "frame entry size mismatch");
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        let epoch = inner.epoch;
        loop {
            if inner.count > 0 {
                return Self::take(&mut inner, self.capacity, self.entry_size, out);
            }
            if inner.epoch != epoch {
                return false; // flushed while waiting
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _res) = self.ready.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
        }
    }

    /// Atomically empty the queue and wake every blocked consumer.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.read = 0;
        inner.write = 0;
        inner.count = 0;
        inner.epoch += 1;
        drop(inner);
        self.ready.notify_all();
    }

    fn take(inner: &mut FrameInner, capacity: usize, entry_size: usize, out: &mut [u8]) -> bool {
        if inner.count == 0 {
            return false;
        }
        let off = inner.read * entry_size;
        out.copy_from_slice(&inner.buf[off..off + entry_size]);
        inner.read = (inner.read + 1) % capacity;
        inner.count -= 1;
        true
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("capacity", &self.capacity)
            .field("entry_size", &self.entry_size)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_and_bounds() {
        let q = FrameQueue::new(2, 1);
        assert!(q.put(&[b'A']));
        assert!(q.put(&[b'B']));
        assert!(!q.put(&[b'C'])); // full

        let mut out = [0u8];
        assert!(q.get(&mut out));
        assert_eq!(out[0], b'A');

        assert!(q.put(&[b'C'])); // room again
        assert!(q.get(&mut out));
        assert_eq!(out[0], b'B');
        assert!(q.get(&mut out));
        assert_eq!(out[0], b'C');
        assert!(!q.get(&mut out));
    }

    #[test]
    fn test_entry_contents_roundtrip() {
        let q = FrameQueue::new(4, 16);
        let frame: Vec<u8> = (0u8..16).collect();
        assert!(q.put(&frame));
        let mut out = [0u8; 16];
        assert!(q.get(&mut out));
        assert_eq!(&out[..], &frame[..]);
    }

    #[test]
    fn test_get_wait_times_out() {
        let q = FrameQueue::new(2, 4);
        let mut out = [0u8; 4];
        let start = Instant::now();
        assert!(!q.get_wait(&mut out, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_get_wait_wakes_on_put() {
        let q = Arc::new(FrameQueue::new(2, 4));
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                assert!(q.put(&[1, 2, 3, 4]));
            })
        };
        let mut out = [0u8; 4];
        assert!(q.get_wait(&mut out, Duration::from_secs(5)));
        assert_eq!(out, [1, 2, 3, 4]);
        producer.join().unwrap();
    }

    #[test]
    fn test_flush_cuts_off_waiter() {
        let q = Arc::new(FrameQueue::new(2, 4));
        let flusher = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                q.flush();
            })
        };
        let mut out = [0u8; 4];
        let start = Instant::now();
        // Wakes well before the timeout and reports empty.
        assert!(!q.get_wait(&mut out, Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        flusher.join().unwrap();
    }

    #[test]
    fn test_flush_empties() {
        let q = FrameQueue::new(4, 2);
        q.put(&[1, 1]);
        q.put(&[2, 2]);
        q.flush();
        assert!(q.is_empty());
        let mut out = [0u8; 2];
        assert!(!q.get(&mut out));
        // Still usable after flush.
        assert!(q.put(&[3, 3]));
        assert!(q.get(&mut out));
        assert_eq!(out, [3, 3]);
    }

    #[test]
    fn test_stats() {
        let q = FrameQueue::new(2, 1);
        q.put(&[1]);
        q.put(&[2]);
        q.put(&[3]); // dropped
        let stats = q.stats();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.total_puts, 2);
        assert_eq!(stats.capacity, 2);
    }

    #[test]
    fn test_cross_thread_fifo() {
        let q = Arc::new(FrameQueue::new(8, 8));
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0u64..100 {
                    let frame = i.to_le_bytes();
                    while !q.put(&frame) {
                        thread::yield_now();
                    }
                }
            })
        };
        let mut out = [0u8; 8];
        for i in 0u64..100 {
            assert!(q.get_wait(&mut out, Duration::from_secs(5)));
            assert_eq!(u64::from_le_bytes(out), i);
        }
        producer.join().unwrap();
    }
}
