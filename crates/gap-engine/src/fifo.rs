//! Per-actor event FIFO.
//!
//! Each pipeline stage owns exactly one of these. It is the second half of
//! the back-pressure contract alongside [`crate::pool::PacketPool`]: a
//! producer that cannot get a packet from the pool blocks on both the
//! pool's handle and its own inbound FIFO's handle so it can still react to
//! a flush or quit.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::event::Event;

struct FifoInner {
    queue: VecDeque<Event>,
    closed: bool,
}

/// Where to insert a posted event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insert {
    Front,
    Back,
}

/// A thread-safe event queue with front/back insertion, a flush operation
/// that discards queued `Buffer` events while preserving control/pipeline
/// events, and predicate-gated pops used to implement the output stage's
/// Pausing mode.
pub struct EventFifo {
    inner: Mutex<FifoInner>,
    cv: Condvar,
}

impl EventFifo {
    pub fn new() -> Self {
        EventFifo {
            inner: Mutex::new(FifoInner {
                queue: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Insert `event` at the front or back and wake one waiter.
    pub fn post(&self, event: Event, where_: Insert) {
        let mut g = self.inner.lock().unwrap();
        match where_ {
            Insert::Front => g.queue.push_front(event),
            Insert::Back => g.queue.push_back(event),
        }
        drop(g);
        self.cv.notify_one();
    }

    /// Discard every queued `Buffer` event (keeping control/pipeline
    /// events in place), then post `event` at the back. This is the
    /// "Flush acts as a barrier" primitive: prior Buffer events are
    /// dropped, later events still execute after the Flush is consumed.
    pub fn flush_then_post(&self, event: Event, where_: Insert) {
        let mut g = self.inner.lock().unwrap();
        g.queue.retain(|e| !e.is_buffer());
        match where_ {
            Insert::Front => g.queue.push_front(event),
            Insert::Back => g.queue.push_back(event),
        }
        drop(g);
        self.cv.notify_all();
    }

    /// Block until an event is available or the FIFO is closed.
    pub fn pop(&self) -> Option<Event> {
        let mut g = self.inner.lock().unwrap();
        loop {
            if let Some(e) = g.queue.pop_front() {
                return Some(e);
            }
            if g.closed {
                return None;
            }
            g = self.cv.wait(g).unwrap();
        }
    }

    /// Block for at most `timeout`, returning `None` on timeout as well as
    /// on close. Used by the output stage while Draining, so it can keep
    /// polling device delay on a cadence even with nothing queued.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Event> {
        let mut g = self.inner.lock().unwrap();
        loop {
            if let Some(e) = g.queue.pop_front() {
                return Some(e);
            }
            if g.closed {
                return None;
            }
            let (ng, result) = self.cv.wait_timeout(g, timeout).unwrap();
            g = ng;
            if result.timed_out() && g.queue.is_empty() {
                return None;
            }
        }
    }

    /// Non-blocking scan of the whole queue for an event that is neither
    /// `Buffer` nor `Configure`, removing and returning it with every
    /// skipped event left queued in place (in order). Returns `None`
    /// immediately — whether or not the FIFO is closed — if no such event
    /// is queued right now; used by the decoder stage to peek for a
    /// pending control event without blocking its decode loop. Callers
    /// that need to block until one arrives (or the FIFO closes) should
    /// use [`Self::wait_for_non_buffer_or_configure`] instead.
    pub fn pop_if_not_buffer_or_configure(&self) -> Option<Event> {
        let mut g = self.inner.lock().unwrap();
        let idx = g.queue.iter().position(|e| !(e.is_buffer() || e.is_configure()))?;
        Some(g.queue.remove(idx).expect("index came from position()"))
    }

    /// Block until the queue holds an event that is neither `Buffer` nor
    /// `Configure`, returning it with every skipped `Buffer`/`Configure`
    /// event left queued in place (in order); used by the output stage's
    /// Pausing mode. `None` is returned only once the FIFO is closed and
    /// no such event is ever going to arrive — a queue that currently
    /// holds nothing but skippable events keeps waiting rather than
    /// reporting `None`, so the caller can't mistake "still paused,
    /// nothing to do yet" for "closed".
    pub fn wait_for_non_buffer_or_configure(&self) -> Option<Event> {
        let mut g = self.inner.lock().unwrap();
        loop {
            if let Some(idx) = g.queue.iter().position(|e| !(e.is_buffer() || e.is_configure())) {
                return Some(g.queue.remove(idx).expect("index came from position()"));
            }
            if g.closed {
                return None;
            }
            g = self.cv.wait(g).unwrap();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }
}

impl Default for EventFifo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ControlEvent;
    use crate::packet::Packet;

    #[test]
    fn pop_returns_in_fifo_order() {
        let fifo = EventFifo::new();
        fifo.post(Event::control(ControlEvent::Pause), Insert::Back);
        fifo.post(Event::control(ControlEvent::Close), Insert::Back);
        assert!(matches!(fifo.pop(), Some(Event::Control(ControlEvent::Pause))));
        assert!(matches!(fifo.pop(), Some(Event::Control(ControlEvent::Close))));
    }

    #[test]
    fn front_insertion_jumps_the_queue() {
        let fifo = EventFifo::new();
        fifo.post(Event::control(ControlEvent::Pause), Insert::Back);
        fifo.post(Event::control(ControlEvent::Quit), Insert::Front);
        assert!(matches!(fifo.pop(), Some(Event::Control(ControlEvent::Quit))));
    }

    #[test]
    fn flush_then_post_discards_only_buffer_events() {
        let fifo = EventFifo::new();
        fifo.post(Event::Buffer(Packet::with_capacity(4)), Insert::Back);
        fifo.post(Event::control(ControlEvent::Pause), Insert::Back);
        fifo.flush_then_post(Event::control(ControlEvent::Close), Insert::Back);

        assert!(matches!(fifo.pop(), Some(Event::Control(ControlEvent::Pause))));
        assert!(matches!(fifo.pop(), Some(Event::Control(ControlEvent::Close))));
        assert!(fifo.is_empty());
    }

    #[test]
    fn pop_if_not_buffer_or_configure_skips_buffers_queued_ahead_of_a_control_event() {
        let fifo = EventFifo::new();
        fifo.post(Event::Buffer(Packet::with_capacity(4)), Insert::Back);
        fifo.post(Event::control(ControlEvent::Pause), Insert::Back);
        // The Buffer event sits ahead of the control event in FIFO order;
        // it must be skipped in place (not discarded, not mistaken for a
        // closed queue) so the control event behind it is still found.
        assert!(matches!(
            fifo.pop_if_not_buffer_or_configure(),
            Some(Event::Control(ControlEvent::Pause))
        ));
        assert!(matches!(fifo.pop(), Some(Event::Buffer(_))));
    }

    #[test]
    fn pop_if_not_buffer_or_configure_returns_none_without_blocking_when_only_skippable_events_are_queued() {
        let fifo = EventFifo::new();
        fifo.post(Event::Buffer(Packet::with_capacity(4)), Insert::Back);
        // Nothing but a Buffer is queued: the decoder's peek must come
        // back immediately so its decode loop can fall through to
        // polling the packet pool, rather than blocking here.
        assert!(fifo.pop_if_not_buffer_or_configure().is_none());
        assert!(matches!(fifo.pop(), Some(Event::Buffer(_))));
    }

    #[test]
    fn wait_for_non_buffer_or_configure_blocks_while_only_skippable_events_are_queued() {
        use std::sync::Arc;
        use std::thread;

        let fifo = Arc::new(EventFifo::new());
        fifo.post(Event::Buffer(Packet::with_capacity(4)), Insert::Back);

        let fifo2 = fifo.clone();
        let handle = thread::spawn(move || fifo2.wait_for_non_buffer_or_configure());
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        fifo.post(Event::control(ControlEvent::Volume { value: 0.5 }), Insert::Back);
        assert!(matches!(
            handle.join().unwrap(),
            Some(Event::Control(ControlEvent::Volume { value })) if value == 0.5
        ));
    }

    #[test]
    fn wait_for_non_buffer_or_configure_returns_none_once_closed_with_only_skippable_events_queued() {
        use std::sync::Arc;
        use std::thread;

        let fifo = Arc::new(EventFifo::new());
        fifo.post(Event::Buffer(Packet::with_capacity(4)), Insert::Back);

        let fifo2 = fifo.clone();
        let handle = thread::spawn(move || fifo2.wait_for_non_buffer_or_configure());
        thread::sleep(Duration::from_millis(20));
        fifo.close();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn close_wakes_blocked_pop() {
        use std::sync::Arc;
        use std::thread;

        let fifo = Arc::new(EventFifo::new());
        let fifo2 = fifo.clone();
        let handle = thread::spawn(move || fifo2.pop());
        thread::sleep(Duration::from_millis(20));
        fifo.close();
        assert!(handle.join().unwrap().is_none());
    }
}
