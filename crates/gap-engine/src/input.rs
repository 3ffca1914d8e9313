//! The input stage actor (`spec.md` §4.2).
//!
//! Owns the byte-source/container reader for the currently open stream and
//! drives it against the shared packet pool under the back-pressure
//! contract of §4.1: a producer that cannot get a free packet blocks on
//! *both* the pool's handle and its own inbound FIFO's handle so it can
//! still react to a control event. There is no real multi-wait primitive
//! here, so this is emulated by alternating short, bounded waits on each —
//! see `pool::PacketPool::pop_timeout` and `fifo::EventFifo::pop_timeout`.

use std::sync::Arc;
use std::time::Duration;

use gap_types::ReplayGain;

use crate::error::EngineError;
use crate::event::{ControlEvent, Event, PipelineEvent, StreamId, StreamIdAllocator};
use crate::fifo::{EventFifo, Insert};
use crate::pool::PacketPool;
use crate::reader::{open_reader, BoxedReader, ReadOutcome};

/// How long a blocked acquire/pop waits before re-checking the other half
/// of the back-pressure pair.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

enum State {
    Idle,
    Processing { reader: BoxedReader, stream_id: StreamId },
}

/// Lets the input stage surface an `ErrorMessage` to the application before
/// any stream has reached the output stage (e.g. an Open failure).
pub trait InputNotifier: Send {
    fn error(&self, stream_id: StreamId, text: String);
}

pub struct InputStage {
    fifo: Arc<EventFifo>,
    pool: Arc<PacketPool>,
    decoder_fifo: Arc<EventFifo>,
    stream_ids: Arc<StreamIdAllocator>,
    notifier: Box<dyn InputNotifier>,
    state: State,
    /// Pending redirect targets, set by a reader's `Redirect` outcome.
    redirect_targets: Vec<String>,
}

impl InputStage {
    pub fn new(
        fifo: Arc<EventFifo>,
        pool: Arc<PacketPool>,
        decoder_fifo: Arc<EventFifo>,
        stream_ids: Arc<StreamIdAllocator>,
        notifier: Box<dyn InputNotifier>,
    ) -> Self {
        InputStage {
            fifo,
            pool,
            decoder_fifo,
            stream_ids,
            notifier,
            state: State::Idle,
            redirect_targets: Vec::new(),
        }
    }

    /// Runs until `Quit` is handled or the FIFO closes. Intended to be the
    /// body of the input stage's dedicated OS thread.
    pub fn run(mut self) {
        loop {
            match self.state {
                State::Idle => {
                    let Some(event) = self.fifo.pop() else { return };
                    if self.handle_event(event) {
                        return;
                    }
                }
                State::Processing { .. } => {
                    // Drain any pending control event without blocking;
                    // Flush already acted as a barrier on decoder_fifo when
                    // posted, so servicing it here just updates our own
                    // state (e.g. Close/Seek/Quit).
                    if let Some(event) = self.fifo.pop_timeout(Duration::ZERO) {
                        if self.handle_event(event) {
                            return;
                        }
                        continue;
                    }
                    self.process_one();
                }
            }
        }
    }

    /// Pull exactly one coded packet (or EOS/redirect) while `Processing`.
    fn process_one(&mut self) {
        let stream_id = match &self.state {
            State::Processing { stream_id, .. } => *stream_id,
            State::Idle => return,
        };

        let Some(mut packet) = self.pool.pop_timeout(POLL_INTERVAL) else {
            // Pool starved (or closing); loop back around to re-check the
            // FIFO before trying again.
            return;
        };
        packet.stream_id = stream_id;

        let outcome = match &mut self.state {
            State::Processing { reader, .. } => reader.process(&mut packet),
            State::Idle => unreachable!("checked above"),
        };

        match outcome {
            Ok(ReadOutcome::Ok) => {
                if packet.readable().is_empty() {
                    self.pool.push(packet);
                } else {
                    self.decoder_fifo.post(Event::Buffer(packet), Insert::Back);
                }
            }
            Ok(ReadOutcome::Done) => {
                self.pool.push(packet);
                self.decoder_fifo.post(
                    Event::pipeline(PipelineEvent::End { stream_id }),
                    Insert::Back,
                );
                self.state = State::Idle;
            }
            Ok(ReadOutcome::Redirect) => {
                self.pool.push(packet);
                let mut targets = Vec::new();
                if let State::Processing { reader, .. } = &mut self.state {
                    reader.redirect(&mut targets);
                }
                self.redirect_targets = targets;
                self.follow_redirect(stream_id);
            }
            Err(e) => {
                self.pool.push(packet);
                self.notifier.error(stream_id, e.to_string());
                self.close_current();
            }
        }
    }

    /// Re-open the first redirect target, preserving `stream_id` (the
    /// caller only sees a single BOS/EOS pair for the final target).
    fn follow_redirect(&mut self, stream_id: StreamId) {
        let Some(url) = self.redirect_targets.first().cloned() else {
            self.notifier.error(stream_id, "redirect with no targets".into());
            self.close_current();
            return;
        };
        match self.open_reader_and_configure(&url, stream_id) {
            Ok(reader) => self.state = State::Processing { reader, stream_id },
            Err(e) => {
                self.notifier.error(stream_id, e.to_string());
                self.state = State::Idle;
            }
        }
    }

    /// Returns `true` if the stage should stop running.
    fn handle_event(&mut self, event: Event) -> bool {
        let Event::Control(control) = event else {
            // Stray Buffer/Pipeline events shouldn't reach the input
            // stage's own FIFO; drop them defensively.
            return false;
        };
        match control {
            ControlEvent::Open { url } => self.open(url, false),
            ControlEvent::OpenFlush { url } => self.open(url, true),
            ControlEvent::Close => self.close_current(),
            ControlEvent::Seek { position } => self.seek(position),
            ControlEvent::Quit => {
                self.close_current();
                self.decoder_fifo.post(Event::control(ControlEvent::Quit), Insert::Back);
                self.fifo.close();
                return true;
            }
            // Volume/replay-gain/output-config/pause all belong to the
            // output stage; forward unchanged so a single application
            // queue can address every stage through the input stage's
            // FIFO if a host prefers one entry point.
            other => {
                self.decoder_fifo.post(Event::control(other), Insert::Back);
            }
        }
        false
    }

    fn open(&mut self, url: String, flush: bool) {
        let stream_id = self.stream_ids.next();
        if flush {
            self.decoder_fifo.flush_then_post(
                Event::pipeline(PipelineEvent::Flush { stream_id, close: false }),
                Insert::Back,
            );
        }
        match self.open_reader_and_configure(&url, stream_id) {
            Ok(reader) => self.state = State::Processing { reader, stream_id },
            Err(e) => {
                self.notifier.error(stream_id, e.to_string());
                self.state = State::Idle;
            }
        }
    }

    fn open_reader_and_configure(&self, url: &str, stream_id: StreamId) -> Result<BoxedReader, EngineError> {
        let reader = open_reader(url)?;
        let codec_params = reader
            .codec_params()
            .cloned()
            .ok_or_else(|| EngineError::OpenFailed("no codec parameters available".into()))?;
        let configure = PipelineEvent::Configure {
            stream_id,
            codec_params,
            codec: reader.format_name().to_string(),
            stream_length: reader.total_frames(),
            replay_gain: ReplayGain::default(),
            pre_roll_frames: 0,
        };
        self.decoder_fifo.post(Event::pipeline(configure), Insert::Back);
        Ok(reader)
    }

    fn close_current(&mut self) {
        if let State::Processing { stream_id, .. } = self.state {
            self.decoder_fifo.post(
                Event::pipeline(PipelineEvent::Flush { stream_id, close: true }),
                Insert::Back,
            );
        }
        self.state = State::Idle;
    }

    fn seek(&mut self, position: f64) {
        let State::Processing { reader, stream_id } = &mut self.state else {
            return;
        };
        if !reader.can_seek() {
            return;
        }
        let total = reader.total_frames().unwrap_or(0);
        let target_frame = (position.clamp(0.0, 1.0) * total as f64) as u64;
        if reader.seek(target_frame) {
            let stream_id = *stream_id;
            self.decoder_fifo.flush_then_post(
                Event::pipeline(PipelineEvent::Flush { stream_id, close: false }),
                Insert::Back,
            );
        }
    }
}
