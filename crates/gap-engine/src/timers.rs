//! Frame timers: scheduled callbacks whose firing time is defined in terms
//! of frames still-to-play rather than wall-clock time.
//!
//! Grounded on `original_source/src/gap/ap_output_thread.cpp`'s
//! `FrameTimer`/`MetaTimer`/`EOSTimer`. The countdown rule is exact: each
//! update subtracts the *absolute change* in observed device delay from the
//! remaining countdown, not the raw delay — this makes a timer robust to a
//! device whose reported delay jumps backward transiently (e.g. after an
//! xrun recovery).

use crate::event::{Notification, StreamId};

/// What a timer does once its countdown reaches zero.
pub enum TimerAction {
    /// Deliver a `Meta` notification once the corresponding audio reaches
    /// the speakers.
    Meta { title: Option<String>, artist: Option<String>, album: Option<String> },
    /// Deliver the end-of-stream notification, scheduled to fire before the
    /// device actually empties so the next track can begin seamlessly.
    Eos,
}

/// A single scheduled callback tied to device delay rather than wall time.
pub struct FrameTimer {
    pub stream_id: StreamId,
    initial_delay: i64,
    remaining: i64,
    last_delay: i64,
    action: TimerAction,
}

impl FrameTimer {
    /// Create a timer that fires once `wait_frames` frames still-to-play
    /// have elapsed, given the device's delay at schedule time.
    pub fn new(stream_id: StreamId, wait_frames: i64, delay_now: i64, action: TimerAction) -> Self {
        FrameTimer {
            stream_id,
            initial_delay: wait_frames,
            remaining: wait_frames,
            last_delay: delay_now,
            action,
        }
    }

    /// Update the countdown given a fresh device delay observation and the
    /// number of frames written since the previous update. Returns `true`
    /// once the timer has fired (remaining <= 0).
    ///
    /// Reproduces `FrameTimer::update` verbatim: `diff = abs(last_delay -
    /// delay); remaining -= diff; last_delay = delay`. The `written_frames`
    /// parameter is accepted for parity with the source signature but,
    /// like the source, only the delay delta drives the countdown.
    pub fn update(&mut self, delay: i64, _written_frames: i64) -> bool {
        let diff = (self.last_delay - delay).abs();
        self.remaining -= diff;
        self.last_delay = delay;
        self.remaining <= 0
    }

    pub fn initial_delay(&self) -> i64 {
        self.initial_delay
    }
}

/// The frame-timer list the output stage drives on every packet update.
/// Timers fire in the order they expire and are removed once fired.
#[derive(Default)]
pub struct TimerList {
    timers: Vec<FrameTimer>,
}

impl TimerList {
    pub fn new() -> Self {
        TimerList { timers: Vec::new() }
    }

    pub fn push(&mut self, timer: FrameTimer) {
        self.timers.push(timer);
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Advance every timer by one delay observation, returning the
    /// (stream-id, notification) pairs produced by any timer that fired
    /// this round. The stream-id is the one the timer was scheduled under,
    /// which may no longer be the output stage's current stream by the
    /// time it fires (e.g. a `MetaTimer` outliving a crossover).
    pub fn advance(&mut self, delay: i64, written_frames: i64) -> Vec<(StreamId, Notification)> {
        let mut fired = Vec::new();
        let mut i = 0;
        while i < self.timers.len() {
            if self.timers[i].update(delay, written_frames) {
                let timer = self.timers.remove(i);
                let notification = match timer.action {
                    TimerAction::Meta { title, artist, album } => {
                        Notification::MetaInfo { title, artist, album }
                    }
                    TimerAction::Eos => Notification::Eos,
                };
                fired.push((timer.stream_id, notification));
            } else {
                i += 1;
            }
        }
        fired
    }

    /// Discard every pending timer without firing it (used on Flush).
    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Cancel (without firing) any pending `Eos` timer scheduled for
    /// `stream_id`, used when a seek arrives while draining that stream so
    /// the in-flight end-of-stream notification doesn't fire for content
    /// the application already moved past.
    pub fn cancel_eos_for_stream(&mut self, stream_id: StreamId) {
        self.timers
            .retain(|t| !(t.stream_id == stream_id && matches!(t.action, TimerAction::Eos)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_fires_once_countdown_is_exhausted() {
        let mut timer = FrameTimer::new(1, 1000, 2000, TimerAction::Eos);
        assert!(!timer.update(1500, 500));
        assert!(!timer.update(1000, 500));
        assert!(timer.update(500, 500));
    }

    #[test]
    fn timer_countdown_uses_absolute_delay_delta() {
        // A backward jump in reported delay still consumes countdown.
        let mut timer = FrameTimer::new(1, 100, 100, TimerAction::Eos);
        assert!(!timer.update(50, 0));
        assert!(timer.update(200, 0));
    }

    #[test]
    fn timer_list_fires_and_removes_expired_timers() {
        let mut list = TimerList::new();
        list.push(FrameTimer::new(1, 100, 100, TimerAction::Eos));
        list.push(FrameTimer::new(1, 1_000_000, 100, TimerAction::Eos));

        let fired = list.advance(0, 0);
        assert_eq!(fired.len(), 1);
        assert!(!list.is_empty());
    }

    #[test]
    fn clear_drops_all_pending_timers() {
        let mut list = TimerList::new();
        list.push(FrameTimer::new(1, 100, 100, TimerAction::Eos));
        list.clear();
        assert!(list.is_empty());
    }
}
