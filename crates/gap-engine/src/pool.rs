//! The shared packet pool: a bounded freelist of fixed-capacity packets.
//!
//! Mirrors the bounded-queue shape of the teacher's `queue::SharedAudio`
//! (`Mutex` + `Condvar`, `close()` wakes every waiter) but hands out owned
//! [`Packet`] values instead of raw samples, matching the pool/freelist
//! contract of the packet bus: a consumer `pop()` blocks until a packet is
//! free or the pool is closed; a `push()` clears the packet and wakes one
//! waiter.

use std::sync::{Condvar, Mutex};

use crate::packet::Packet;

/// Default packet count and per-packet capacity, matching the pipeline's
/// documented defaults.
pub const DEFAULT_POOL_SIZE: usize = 40;
pub const DEFAULT_PACKET_CAPACITY: usize = 8 * 1024;

struct PoolInner {
    free: Vec<Packet>,
    closed: bool,
}

/// A bounded freelist of packets, shared by every stage via `Arc`.
pub struct PacketPool {
    inner: Mutex<PoolInner>,
    cv: Condvar,
    capacity: usize,
}

impl PacketPool {
    pub fn new(count: usize, packet_capacity: usize) -> Self {
        let free = (0..count)
            .map(|_| Packet::with_capacity(packet_capacity))
            .collect();
        PacketPool {
            inner: Mutex::new(PoolInner {
                free,
                closed: false,
            }),
            cv: Condvar::new(),
            capacity: count,
        }
    }

    /// Total number of packets this pool owns.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of packets currently available (best-effort snapshot).
    pub fn available(&self) -> usize {
        self.inner.lock().unwrap().free.len()
    }

    /// Take a packet from the freelist, blocking until one is available or
    /// the pool is closed. Returns `None` only once closed with nothing to
    /// give out — callers in the back-pressure contract are expected to
    /// additionally wait on their own inbound FIFO so they can react to a
    /// flush/quit instead of blocking here forever; see `pop_timeout`.
    pub fn pop(&self) -> Option<Packet> {
        let mut g = self.inner.lock().unwrap();
        loop {
            if let Some(p) = g.free.pop() {
                return Some(p);
            }
            if g.closed {
                return None;
            }
            g = self.cv.wait(g).unwrap();
        }
    }

    /// Like [`Self::pop`], but gives up after `timeout` and returns `None`
    /// so a caller can re-check its own FIFO for a control event before
    /// retrying. This is how the input/decoder stages implement "block on
    /// both the pool handle and the inbound FIFO handle" without a real
    /// multi-wait primitive.
    pub fn pop_timeout(&self, timeout: std::time::Duration) -> Option<Packet> {
        let mut g = self.inner.lock().unwrap();
        loop {
            if let Some(p) = g.free.pop() {
                return Some(p);
            }
            if g.closed {
                return None;
            }
            let (ng, result) = self.cv.wait_timeout(g, timeout).unwrap();
            g = ng;
            if result.timed_out() && g.free.is_empty() {
                return None;
            }
        }
    }

    /// Return a packet to the freelist, clearing it first. Wakes one waiter.
    pub fn push(&self, mut packet: Packet) {
        packet.clear();
        let mut g = self.inner.lock().unwrap();
        g.free.push(packet);
        drop(g);
        self.cv.notify_one();
    }

    /// Wake every waiter without handing out a packet; used on shutdown so
    /// threads parked in `pop`/`pop_timeout` can observe `closed`.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pop_and_push_round_trip() {
        let pool = PacketPool::new(2, 16);
        assert_eq!(pool.available(), 2);
        let p = pool.pop().unwrap();
        assert_eq!(pool.available(), 1);
        pool.push(p);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn pop_blocks_until_capacity_is_conserved() {
        let pool = Arc::new(PacketPool::new(1, 16));
        let held = pool.pop().unwrap();

        let pool2 = pool.clone();
        let handle = thread::spawn(move || {
            let p = pool2.pop().unwrap();
            pool2.push(p);
        });

        thread::sleep(Duration::from_millis(20));
        pool.push(held);
        handle.join().unwrap();
    }

    #[test]
    fn pop_timeout_returns_none_when_starved() {
        let pool = PacketPool::new(1, 16);
        let _held = pool.pop().unwrap();
        let result = pool.pop_timeout(Duration::from_millis(10));
        assert!(result.is_none());
    }

    #[test]
    fn close_wakes_blocked_pop() {
        let pool = Arc::new(PacketPool::new(1, 16));
        let _held = pool.pop().unwrap();

        let pool2 = pool.clone();
        let handle = thread::spawn(move || pool2.pop());

        thread::sleep(Duration::from_millis(20));
        pool.close();
        assert!(handle.join().unwrap().is_none());
    }
}
