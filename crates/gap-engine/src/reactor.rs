//! The output stage's single-threaded I/O multiplexer.
//!
//! `spec.md` §4.5 describes a reactor that simultaneously waits on file
//! descriptors, timers and deferred callbacks, with a plugin allowed to
//! contribute its own descriptor bundle (the PulseAudio main-loop
//! integration in the source). None of `gap-engine`'s output plugins hand
//! out raw descriptors — `cpal` and `hound` don't expose one, and even the
//! native Pulse backend here uses the blocking Simple API rather than
//! Pulse's async main loop — so this reactor drops the descriptor-poll
//! machinery and keeps the two primitives that still apply: absolute-time
//! timers and deferred (zero-delay) callbacks, integrated with the output
//! stage's own FIFO wait via a single computed timeout. This is a grounded
//! simplification, not a different contract: `run_once` still returns as
//! soon as *any* of timer-due, deferred-pending, or FIFO-has-work is true.

use std::time::{Duration, Instant};

/// An absolute-time callback, sorted by deadline.
struct ScheduledTimer {
    deadline: Instant,
    id: u64,
}

/// Timers and deferred callbacks shared between the output stage and the
/// currently loaded output plugin.
pub struct Reactor {
    timers: Vec<ScheduledTimer>,
    deferred: Vec<u64>,
    next_id: u64,
}

impl Reactor {
    pub fn new() -> Self {
        Reactor {
            timers: Vec::new(),
            deferred: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedule a one-shot timer to fire after `delay`. Returns an id that
    /// `remove_timer` can cancel.
    pub fn add_timer(&mut self, delay: Duration) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.timers.push(ScheduledTimer { deadline: Instant::now() + delay, id });
        self.timers.sort_by_key(|t| t.deadline);
        id
    }

    pub fn remove_timer(&mut self, id: u64) {
        self.timers.retain(|t| t.id != id);
    }

    /// Queue a zero-delay callback to run at the end of the next `run_once`.
    pub fn add_deferred(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.deferred.push(id);
        id
    }

    pub fn remove_deferred(&mut self, id: u64) {
        self.deferred.retain(|d| *d != id);
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Drain and return every pending deferred callback id.
    pub fn take_deferred(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.deferred)
    }

    /// Remove and return every timer id whose deadline has passed.
    pub fn take_expired(&mut self) -> Vec<u64> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.timers.retain(|t| {
            if t.deadline <= now {
                expired.push(t.id);
                false
            } else {
                true
            }
        });
        expired
    }

    /// Timeout to pass to the output stage's FIFO wait: the lesser of
    /// `requested_timeout` and the earliest timer deadline. `run_once`'s
    /// step 1 (run deferred callbacks, skip poll) is the caller's
    /// responsibility — check `has_deferred()` before calling this.
    pub fn next_timeout(&self, requested_timeout: Duration) -> Duration {
        match self.timers.first() {
            Some(t) => {
                let until = t.deadline.saturating_duration_since(Instant::now());
                until.min(requested_timeout)
            }
            None => requested_timeout,
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_timers_are_removed_and_returned() {
        let mut r = Reactor::new();
        let id = r.add_timer(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        let expired = r.take_expired();
        assert_eq!(expired, vec![id]);
        assert!(r.take_expired().is_empty());
    }

    #[test]
    fn next_timeout_is_capped_by_earliest_timer() {
        let mut r = Reactor::new();
        r.add_timer(Duration::from_millis(5));
        let timeout = r.next_timeout(Duration::from_secs(10));
        assert!(timeout <= Duration::from_millis(6));
    }

    #[test]
    fn deferred_callbacks_drain_on_take() {
        let mut r = Reactor::new();
        r.add_deferred();
        r.add_deferred();
        assert!(r.has_deferred());
        assert_eq!(r.take_deferred().len(), 2);
        assert!(!r.has_deferred());
    }
}
