//! Top-level wiring: three actor threads, one packet pool, one stream-id
//! allocator (`spec.md` §5).
//!
//! `Engine` is the only public entry point a host needs: it spawns the
//! input/decoder/output threads once at construction, exposes the
//! application-to-engine control vocabulary as plain methods, and joins the
//! threads in order on `quit`. It never restarts a stage thread — a crashed
//! stage is a programming error, not a recoverable condition, mirroring the
//! teacher's `bridge::runtime` treating its playback thread the same way.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use gap_types::{DeviceKind, GainMode, OutputConfig, ReplayGain};

use crate::decoder::DecoderStage;
use crate::event::{ControlEvent, Event, StreamIdAllocator};
use crate::fifo::{EventFifo, Insert};
use crate::input::{InputNotifier, InputStage};
use crate::output::{OutputNotifier, OutputStage};
use crate::pool::{PacketPool, DEFAULT_PACKET_CAPACITY, DEFAULT_POOL_SIZE};

/// Forwards both the input stage's early errors and the output stage's
/// notifications to a single application-facing channel, tagging the
/// former with stream-id 0 (no stream reached the output side yet).
struct ChannelNotifier(mpsc::Sender<gap_types::Notification>);

impl InputNotifier for ChannelNotifier {
    fn error(&self, stream_id: u64, text: String) {
        let _ = self.0.send(gap_types::Notification {
            stream_id,
            payload: gap_types::NotificationPayload::ErrorMessage { text },
        });
    }
}

impl OutputNotifier for ChannelNotifier {
    fn notify(&self, notification: gap_types::Notification) {
        let _ = self.0.send(notification);
    }
}

/// A running playback engine: three pipeline threads plus the shared state
/// a host drives them through.
pub struct Engine {
    input_fifo: Arc<EventFifo>,
    notifications: mpsc::Receiver<gap_types::Notification>,
    input_thread: Option<JoinHandle<()>>,
    decoder_thread: Option<JoinHandle<()>>,
    output_thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Build the three-stage pipeline and start every stage thread.
    pub fn start() -> Self {
        Self::with_pool(DEFAULT_POOL_SIZE, DEFAULT_PACKET_CAPACITY)
    }

    pub fn with_pool(pool_size: usize, packet_capacity: usize) -> Self {
        let pool = Arc::new(PacketPool::new(pool_size, packet_capacity));
        let input_fifo = Arc::new(EventFifo::new());
        let decoder_fifo = Arc::new(EventFifo::new());
        let output_fifo = Arc::new(EventFifo::new());
        let stream_ids = Arc::new(StreamIdAllocator::new());

        let (tx, rx) = mpsc::channel();

        let input_stage = InputStage::new(
            input_fifo.clone(),
            pool.clone(),
            decoder_fifo.clone(),
            stream_ids.clone(),
            Box::new(ChannelNotifier(tx.clone())),
        );
        let decoder_stage = DecoderStage::new(decoder_fifo.clone(), pool.clone(), output_fifo.clone());
        let output_stage = OutputStage::new(output_fifo, pool, Box::new(ChannelNotifier(tx)));

        let input_thread = std::thread::Builder::new()
            .name("gap-input".into())
            .spawn(move || input_stage.run())
            .expect("spawn input stage thread");
        let decoder_thread = std::thread::Builder::new()
            .name("gap-decoder".into())
            .spawn(move || decoder_stage.run())
            .expect("spawn decoder stage thread");
        let output_thread = std::thread::Builder::new()
            .name("gap-output".into())
            .spawn(move || output_stage.run())
            .expect("spawn output stage thread");

        Engine {
            input_fifo,
            notifications: rx,
            input_thread: Some(input_thread),
            decoder_thread: Some(decoder_thread),
            output_thread: Some(output_thread),
        }
    }

    /// The channel a host polls (or blocks on) for upward notifications.
    /// Borrowing it keeps `Engine` the sole owner of the sender half.
    pub fn notifications(&self) -> &mpsc::Receiver<gap_types::Notification> {
        &self.notifications
    }

    fn post(&self, event: ControlEvent) {
        self.input_fifo.post(Event::control(event), Insert::Back);
    }

    pub fn open(&self, url: impl Into<String>) {
        self.post(ControlEvent::Open { url: url.into() });
    }

    pub fn open_flush(&self, url: impl Into<String>) {
        self.post(ControlEvent::OpenFlush { url: url.into() });
    }

    pub fn close(&self) {
        self.post(ControlEvent::Close);
    }

    pub fn pause(&self) {
        self.post(ControlEvent::Pause);
    }

    /// `position` is a fraction of the stream's total length, in `[0, 1]`.
    pub fn seek(&self, position: f64) {
        self.post(ControlEvent::Seek { position });
    }

    /// `value` is linear volume in `[0, 1]`.
    pub fn set_volume(&self, value: f32) {
        self.post(ControlEvent::Volume { value });
    }

    pub fn set_replay_gain(&self, mode: GainMode, gain: ReplayGain) {
        self.post(ControlEvent::SetReplayGain { mode, gain });
    }

    /// Blocks until the output stage replies with the currently effective
    /// replay-gain mode and value (`spec.md` §3's synchronous "Get").
    pub fn get_replay_gain(&self) -> (GainMode, ReplayGain) {
        let (tx, rx) = mpsc::channel();
        self.post(ControlEvent::GetReplayGain { reply: tx });
        rx.recv().unwrap_or((GainMode::Off, ReplayGain::default()))
    }

    pub fn set_output_config(&self, config: OutputConfig) {
        self.post(ControlEvent::SetOutputConfig { config });
    }

    /// Blocks until the output stage replies with its current config.
    pub fn get_output_config(&self) -> OutputConfig {
        let (tx, rx) = mpsc::channel();
        self.post(ControlEvent::GetOutputConfig { reply: tx });
        rx.recv().unwrap_or(OutputConfig::None)
    }

    /// Device kinds this build can load, for a host's device picker.
    pub fn supported_device_kinds(&self) -> &'static [DeviceKind] {
        crate::host::supported_kinds()
    }

    /// Signal every stage to shut down and join all three threads in order.
    /// Consumes `self`: an `Engine` is never restarted once stopped.
    pub fn quit(mut self) {
        self.post(ControlEvent::Quit);
        if let Some(t) = self.input_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.decoder_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.output_thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Best-effort: a host that drops an `Engine` without calling
        // `quit()` still gets a clean shutdown rather than leaked threads.
        if self.input_thread.is_some() {
            self.input_fifo.post(Event::control(ControlEvent::Quit), Insert::Back);
        }
        if let Some(t) = self.input_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.decoder_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.output_thread.take() {
            let _ = t.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_starts_and_quits_cleanly() {
        let engine = Engine::start();
        engine.quit();
    }

    #[test]
    fn get_output_config_defaults_to_none() {
        let engine = Engine::start();
        assert_eq!(engine.get_output_config(), OutputConfig::None);
        engine.quit();
    }

    #[test]
    fn get_replay_gain_defaults_to_off() {
        let engine = Engine::start();
        let (mode, _gain) = engine.get_replay_gain();
        assert_eq!(mode, GainMode::Off);
        engine.quit();
    }
}
