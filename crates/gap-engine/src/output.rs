//! The output stage actor (`spec.md` §4.4).
//!
//! Owns the loaded `OutputPlugin`, the device-format negotiation, the
//! replay-gain/format/channel/rate conversion chain, and the crossover and
//! frame-timer bookkeeping that together decide when `Bos`/`Eos`/`TimeUpdate`
//! notifications reach the application. Grounded on
//! `original_source/src/gap/ap_output_thread.cpp`; the conversion order and
//! the crossover/drain formulas are reproduced there verbatim (see
//! `convert.rs`, `timers.rs`, `DESIGN.md`).

use std::sync::Arc;
use std::time::Duration;

use gap_types::{AudioFormat, DataType, DeviceKind, GainMode, OutputConfig, ReplayGain};

use crate::convert;
use crate::device::OutputPlugin;
use crate::error::EngineError;
use crate::event::{ControlEvent, Event, Notification, PipelineEvent, StreamId};
use crate::fifo::{EventFifo, Insert};
use crate::host;
use crate::pool::PacketPool;
use crate::resample::StreamResampler;
use crate::timers::{FrameTimer, TimerAction, TimerList};

/// How often the Draining poll re-checks device delay (`spec.md` §12).
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Lets the output stage push notifications up to the application without
/// owning the transport that carries them (mirrors `input::InputNotifier`).
pub trait OutputNotifier: Send {
    fn notify(&self, notification: gap_types::Notification);
}

/// Metadata staged by a `Configure` event, applied once the first `Buffer`
/// for that stream arrives (the point the stage actually starts tracking a
/// new stream-id, per `begin_stream`).
struct StagedStream {
    stream_id: StreamId,
    replay_gain: ReplayGain,
    stream_length: Option<u64>,
}

pub struct OutputStage {
    fifo: Arc<EventFifo>,
    pool: Arc<PacketPool>,
    notifier: Box<dyn OutputNotifier>,

    plugin: Option<Box<dyn OutputPlugin>>,
    output_config: OutputConfig,

    /// `true` once the current stream's final packet has been consumed and
    /// the stage is waiting for the device to empty before issuing `Eos`.
    draining: bool,
    /// A `Flush` that arrived mid-drain; applied once the drain completes.
    deferred_flush: Option<(StreamId, bool)>,
    paused: bool,

    staged: Option<StagedStream>,
    current_stream_id: StreamId,
    stream_replay_gain: ReplayGain,
    stream_length: Option<u64>,
    gain_mode: GainMode,
    manual_replay_gain: Option<ReplayGain>,

    stream_format: Option<AudioFormat>,
    device_format: Option<AudioFormat>,
    resampler: Option<StreamResampler>,

    /// Frames of the *previous* stream still believed queued in the device
    /// at the moment the current stream-id took over; zero means no
    /// crossover is in progress.
    remaining: i64,
    /// Frames of the current stream written since the last transition.
    written_since_boundary: i64,
    bos_emitted: bool,
    stream_position: u64,
    last_time_update_second: Option<u32>,

    timers: TimerList,
}

impl OutputStage {
    pub fn new(fifo: Arc<EventFifo>, pool: Arc<PacketPool>, notifier: Box<dyn OutputNotifier>) -> Self {
        OutputStage {
            fifo,
            pool,
            notifier,
            plugin: None,
            output_config: OutputConfig::None,
            draining: false,
            deferred_flush: None,
            paused: false,
            staged: None,
            current_stream_id: 0,
            stream_replay_gain: ReplayGain::default(),
            stream_length: None,
            gain_mode: GainMode::default(),
            manual_replay_gain: None,
            stream_format: None,
            device_format: None,
            resampler: None,
            remaining: 0,
            written_since_boundary: 0,
            bos_emitted: false,
            stream_position: 0,
            last_time_update_second: None,
            timers: TimerList::new(),
        }
    }

    pub fn run(mut self) {
        loop {
            let event = if self.paused {
                self.fifo.wait_for_non_buffer_or_configure()
            } else if self.draining {
                self.fifo.pop_timeout(DRAIN_POLL_INTERVAL)
            } else {
                self.fifo.pop()
            };

            match event {
                Some(event) => {
                    if self.handle_event(event) {
                        return;
                    }
                }
                None => {
                    if self.draining {
                        self.poll_drain();
                        continue;
                    }
                    // `pop()` only returns `None` on close, and
                    // `wait_for_non_buffer_or_configure()` (paused) blocks
                    // past skippable events rather than returning `None`
                    // for them, so this is unambiguously "the FIFO
                    // closed": shut down.
                    return;
                }
            }
        }
    }

    /// Returns `true` if the stage should stop running.
    fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::Control(ControlEvent::Quit) => {
                if let Some(plugin) = &mut self.plugin {
                    plugin.close();
                }
                self.fifo.close();
                return true;
            }
            Event::Control(ControlEvent::Pause) => self.toggle_pause(),
            Event::Control(ControlEvent::Volume { value }) => self.set_volume(value),
            Event::Control(ControlEvent::SetReplayGain { mode, gain }) => {
                self.gain_mode = mode;
                self.manual_replay_gain = Some(gain);
            }
            Event::Control(ControlEvent::GetReplayGain { reply }) => {
                let _ = reply.send((self.gain_mode, self.effective_replay_gain()));
            }
            Event::Control(ControlEvent::SetOutputConfig { config }) => self.apply_output_config(config),
            Event::Control(ControlEvent::GetOutputConfig { reply }) => {
                let _ = reply.send(self.output_config.clone());
            }
            // Open/OpenFlush/Close/Seek are handled by the input stage and
            // never forwarded this far; drop defensively.
            Event::Control(_) => {}
            Event::Pipeline(PipelineEvent::Configure { stream_id, replay_gain, stream_length, .. }) => {
                self.on_configure(stream_id, replay_gain, stream_length);
            }
            Event::Pipeline(PipelineEvent::Flush { stream_id, close }) => self.on_flush(stream_id, close),
            Event::Pipeline(PipelineEvent::End { stream_id }) => self.on_end(stream_id),
            Event::Pipeline(PipelineEvent::Meta { stream_id, title, artist, album }) => {
                self.on_meta(stream_id, title, artist, album);
            }
            Event::Buffer(packet) => self.on_buffer(packet),
        }
        false
    }

    fn effective_replay_gain(&self) -> ReplayGain {
        self.manual_replay_gain.unwrap_or(self.stream_replay_gain)
    }

    fn device_delay(&self) -> i64 {
        self.plugin.as_ref().map(|p| p.delay()).unwrap_or(0)
    }

    fn notify(&self, notification: Notification) {
        self.notifier.notify(notification.into_wire(self.current_stream_id));
    }

    fn notify_for(&self, stream_id: StreamId, notification: Notification) {
        self.notifier.notify(notification.into_wire(stream_id));
    }

    fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        if self.paused {
            if let Some(plugin) = &mut self.plugin {
                if plugin.can_pause() {
                    plugin.pause(true);
                } else {
                    plugin.drain();
                }
            }
            self.notify(Notification::StatePausing);
        } else {
            if let Some(plugin) = &mut self.plugin {
                if plugin.can_pause() {
                    plugin.pause(false);
                }
            }
            self.notify(Notification::StatePlaying);
        }
    }

    fn set_volume(&mut self, value: f32) {
        if let Some(plugin) = &mut self.plugin {
            plugin.set_volume(value);
        }
        self.notify(Notification::VolumeNotify { value, enabled: true });
    }

    fn apply_output_config(&mut self, config: OutputConfig) {
        if let Some(plugin) = &mut self.plugin {
            plugin.close();
        }
        match host::load_plugin(&config) {
            Ok(plugin) => {
                self.plugin = Some(plugin);
                self.output_config = config;
            }
            Err(e) => {
                self.plugin = None;
                self.output_config = OutputConfig::None;
                self.notify(Notification::ErrorMessage {
                    text: format!("failed to load output device {:?}: {e}", config.kind()),
                });
            }
        }
        self.device_format = None;
        self.stream_format = None;
        self.resampler = None;
    }

    fn on_configure(&mut self, stream_id: StreamId, replay_gain: ReplayGain, stream_length: Option<u64>) {
        self.staged = Some(StagedStream { stream_id, replay_gain, stream_length });
        // "For every Configure accepted by the output stage, a StateReady
        // precedes the first TimeUpdate for that stream" — emitted here,
        // immediately, rather than deferred to the first Buffer.
        self.notify_for(stream_id, Notification::StateReady);
    }

    fn on_flush(&mut self, stream_id: StreamId, close: bool) {
        if self.draining {
            // A seek/reopen arrived before the prior stream's natural
            // drain finished. Defer applying it until the drain completes
            // and suppress that stream's in-flight EOS: the application is
            // already moving past it.
            self.timers.cancel_eos_for_stream(self.current_stream_id);
            self.deferred_flush = Some((stream_id, close));
            return;
        }
        self.apply_flush(stream_id, close);
    }

    fn apply_flush(&mut self, _stream_id: StreamId, close: bool) {
        if let Some(plugin) = &mut self.plugin {
            plugin.drop_buffered();
            if close {
                plugin.close();
            }
        }
        // Flush discards pending audio immediately rather than draining it;
        // dropping the resampler's buffered partial chunk here (without
        // writing it out) keeps pre-flush samples from bleeding into
        // whatever stream follows a Seek.
        if let Some(resampler) = &mut self.resampler {
            let _ = resampler.flush();
        }
        if close {
            self.device_format = None;
            self.stream_format = None;
            self.resampler = None;
        }
        self.timers.clear();
        self.remaining = 0;
        self.written_since_boundary = 0;
        self.current_stream_id = 0;
        self.stream_position = 0;
        self.bos_emitted = false;
        self.last_time_update_second = None;
        self.draining = false;
    }

    fn on_end(&mut self, stream_id: StreamId) {
        if stream_id != self.current_stream_id {
            return;
        }
        self.draining = true;
        // The resampler may still be holding a sub-chunk tail buffered from
        // the last `process()` call; write it now so the stream's final
        // fraction of a second is actually heard before the device drains.
        self.flush_resampler_tail();
        let delay = self.device_delay();
        let rate = self.stream_format.as_ref().map(|f| f.sample_rate).unwrap_or(0) as i64;
        // EOSTimer fires one second before the device actually empties.
        let wait = (delay - rate).max(0);
        self.timers.push(FrameTimer::new(stream_id, wait, delay, TimerAction::Eos));
        self.fire_due_timers(delay, 0);
    }

    fn on_meta(&mut self, stream_id: StreamId, title: Option<String>, artist: Option<String>, album: Option<String>) {
        if stream_id != self.current_stream_id {
            return;
        }
        let delay = self.device_delay();
        self.timers.push(FrameTimer::new(stream_id, delay, delay, TimerAction::Meta { title, artist, album }));
        self.fire_due_timers(delay, 0);
    }

    /// Poll device delay on the draining cadence; once it drops under the
    /// quarter-second threshold, physically drain the device and either
    /// apply a flush that arrived mid-drain or return to idle.
    fn poll_drain(&mut self) {
        let delay = self.device_delay();
        self.fire_due_timers(delay, 0);

        let rate = self.stream_format.as_ref().map(|f| f.sample_rate).unwrap_or(0) as i64;
        let threshold = rate >> 2;
        if delay > threshold {
            return;
        }

        if let Some(plugin) = &mut self.plugin {
            plugin.drain();
        }
        if let Some((stream_id, close)) = self.deferred_flush.take() {
            self.apply_flush(stream_id, close);
        } else {
            self.draining = false;
            self.notify(Notification::StateReady);
        }
    }

    fn fire_due_timers(&mut self, delay: i64, written_frames: i64) {
        for (stream_id, notification) in self.timers.advance(delay, written_frames) {
            self.notify_for(stream_id, notification);
        }
    }

    fn emit_bos(&mut self) {
        if !self.bos_emitted {
            self.notify(Notification::Bos);
            self.bos_emitted = true;
        }
    }

    /// Called when a `Buffer`'s stream-id differs from the one currently
    /// playing: either the very first stream, a natural gapless crossover,
    /// or (rarely) a still-draining previous stream whose tail has already
    /// fully played.
    fn begin_stream(&mut self, new_stream_id: StreamId) {
        let delay = self.device_delay();
        self.draining = false;
        self.deferred_flush = None;

        if self.current_stream_id != 0 && delay > 0 {
            // Crossover: the old stream still has frames queued. Defer BOS
            // until the crossover accounting in `update_timing` decides
            // they've played out.
            self.remaining = delay;
        } else {
            if self.current_stream_id != 0 {
                if let Some(plugin) = &mut self.plugin {
                    plugin.drain();
                }
            }
            self.timers.clear();
            self.remaining = 0;
        }

        self.written_since_boundary = 0;
        self.current_stream_id = new_stream_id;
        self.stream_position = 0;
        self.bos_emitted = false;
        self.last_time_update_second = None;

        if self.remaining <= 0 {
            self.emit_bos();
        }
    }

    fn on_buffer(&mut self, packet: crate::packet::Packet) {
        if packet.stream_id != self.current_stream_id {
            self.begin_stream(packet.stream_id);
        }
        if let Some(staged) = self.staged.take_if(|s| s.stream_id == packet.stream_id) {
            self.stream_replay_gain = staged.replay_gain;
            self.stream_length = staged.stream_length;
        }

        let Some(format) = packet.format.clone() else {
            if packet.is_eos() {
                tracing::trace!(stream_id = packet.stream_id, "end-of-stream packet marker received");
            }
            self.pool.push(packet);
            return;
        };

        if self.stream_format.as_ref() != Some(&format) {
            if let Err(e) = self.negotiate_device(&format) {
                self.notify(Notification::ErrorMessage { text: e.to_string() });
                self.pool.push(packet);
                return;
            }
        }

        let packet_stream_position = packet.stream_position;
        let frame_bytes = format.frame_bytes();
        let num_frames = packet.num_frames(frame_bytes.max(1));

        match self.process_and_write(packet.readable(), &format) {
            Ok(written_frames) => self.update_timing(packet_stream_position, written_frames),
            Err(e) => {
                self.notify(Notification::ErrorMessage { text: e.to_string() });
                if let Some(plugin) = &mut self.plugin {
                    plugin.close();
                }
                self.plugin = None;
                self.device_format = None;
                self.stream_format = None;
                // Still advance by the frames we would have written so a
                // single bad packet doesn't wedge the timing state.
                self.update_timing(packet_stream_position, num_frames as i64);
            }
        }
        self.pool.push(packet);
    }

    /// Drain device format before reconfiguring so the device sees a clean
    /// boundary between the old and new stream formats.
    fn negotiate_device(&mut self, format: &AudioFormat) -> Result<(), EngineError> {
        if let Some(plugin) = &mut self.plugin {
            plugin.drain();
        }
        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| EngineError::DeviceFailed("no output device loaded".into()))?;
        let device_format = plugin.configure(format)?;

        self.resampler = if format.sample_rate != device_format.sample_rate {
            Some(StreamResampler::new(format.channels as usize, format.sample_rate, device_format.sample_rate)?)
        } else {
            None
        };
        self.stream_format = Some(format.clone());
        self.device_format = Some(device_format);
        Ok(())
    }

    /// Replay-gain scale, resample, format-convert, channel-convert, write.
    /// Returns the number of device-format frames actually written.
    fn process_and_write(&mut self, payload: &[u8], format: &AudioFormat) -> Result<i64, EngineError> {
        let device_format = self.device_format.clone().expect("negotiated above");

        let mut samples = bytes_to_f32(payload, format.data_type, format.bits_per_sample, format.byte_order)?;

        if let Some(scale) = convert::replay_gain_scale(self.gain_mode, &self.effective_replay_gain()) {
            convert::apply_scale_f32(&mut samples, scale);
        }

        if let Some(resampler) = &mut self.resampler {
            samples = resampler.process(&mut samples)?;
            if samples.is_empty() {
                return Ok(0);
            }
        }

        self.convert_and_write(&samples, format, &device_format)
    }

    /// Drain the resampler's buffered partial chunk (if any) and write it
    /// out through the same format/channel conversion `process_and_write`
    /// uses, so a track's final sub-chunk tail is heard rather than
    /// silently dropped when the device runs at a different rate than the
    /// stream. Returns the number of device-format frames written; `0` if
    /// there was no resampler, no pending tail, or the conversion/write
    /// failed (reported as an `ErrorMessage` rather than propagated, since
    /// callers invoke this while already tearing a stream down).
    fn flush_resampler_tail(&mut self) -> i64 {
        let (Some(stream_format), Some(device_format)) = (self.stream_format.clone(), self.device_format.clone())
        else {
            return 0;
        };
        let Some(resampler) = &mut self.resampler else {
            return 0;
        };
        let tail = match resampler.flush() {
            Ok(tail) => tail,
            Err(e) => {
                self.notify(Notification::ErrorMessage { text: e.to_string() });
                return 0;
            }
        };
        if tail.is_empty() {
            return 0;
        }
        match self.convert_and_write(&tail, &stream_format, &device_format) {
            Ok(frames) => frames,
            Err(e) => {
                self.notify(Notification::ErrorMessage { text: e.to_string() });
                0
            }
        }
    }

    /// Format-convert (float -> device data type), channel-convert
    /// (mono -> stereo) and write already gain-scaled/resampled interleaved
    /// `f32` samples to the device. `stream_format` supplies the channel
    /// count the samples were produced at (resampling never changes channel
    /// count). Returns the number of device-format frames written.
    fn convert_and_write(
        &mut self,
        samples: &[f32],
        stream_format: &AudioFormat,
        device_format: &AudioFormat,
    ) -> Result<i64, EngineError> {
        if !convert::format_conversion_supported(DataType::Float, 32, device_format.data_type, device_format.bits_per_sample)
            && device_format.data_type != DataType::Float
        {
            return Err(EngineError::UnsupportedConversion(format!(
                "float -> {:?}{}",
                device_format.data_type, device_format.bits_per_sample
            )));
        }

        let mut bytes = match (device_format.data_type, device_format.bits_per_sample) {
            (DataType::Float, _) => f32_to_bytes(samples, device_format.byte_order),
            (DataType::SignedInt, 16) => i16_to_bytes(&convert::float_to_s16(samples), device_format.byte_order),
            (DataType::SignedInt, 32) => i32_to_bytes(&convert::float_to_s32(samples), device_format.byte_order),
            (dt, bits) => {
                return Err(EngineError::UnsupportedConversion(format!("float -> {dt:?}{bits}")));
            }
        };

        if stream_format.channels != device_format.channels {
            if stream_format.is_mono() && device_format.is_stereo() {
                bytes = convert::duplicate_mono_frames_bytes(&bytes, device_format.packing_bytes as usize);
            } else {
                return Err(EngineError::UnsupportedConversion(format!(
                    "{} channels -> {} channels",
                    stream_format.channels, device_format.channels
                )));
            }
        }

        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| EngineError::DeviceFailed("no output device loaded".into()))?;
        plugin.write(&bytes)?;

        let frame_bytes = device_format.frame_bytes().max(1);
        Ok((bytes.len() / frame_bytes) as i64)
    }

    /// Crossover accounting and position/`TimeUpdate` tracking
    /// (`spec.md` §4.4). `written_frames` is in terms of the *device's*
    /// rate, which only differs from the stream's own rate while
    /// resampling — `written_since_boundary`/`remaining` are themselves
    /// measured against `device.delay()`, so using the device-rate count
    /// here keeps the two comparable.
    fn update_timing(&mut self, packet_stream_position: u64, written_frames: i64) {
        let delay = self.device_delay();
        self.written_since_boundary += written_frames;

        if self.remaining > 0 {
            let diff = self.written_since_boundary - delay;
            if diff <= 0 {
                self.remaining = 0;
                self.emit_bos();
            } else {
                self.fire_due_timers(delay, written_frames);
                return;
            }
        }

        let position = (packet_stream_position as i64 - delay).max(0) as u64;
        self.stream_position = position;

        let rate = self.stream_format.as_ref().map(|f| f.sample_rate).unwrap_or(1).max(1);
        let position_seconds = (position / rate as u64) as u32;
        if self.last_time_update_second != Some(position_seconds) {
            self.last_time_update_second = Some(position_seconds);
            let length_seconds = self.stream_length.map(|l| (l / rate as u64) as u32).unwrap_or(0);
            self.notify(Notification::TimeUpdate { position_seconds, length_seconds });
        }

        self.fire_due_timers(delay, written_frames);
    }
}

fn bytes_to_f32(
    payload: &[u8],
    data_type: DataType,
    bits_per_sample: u16,
    byte_order: gap_types::Endianness,
) -> Result<Vec<f32>, EngineError> {
    match (data_type, bits_per_sample) {
        (DataType::Float, 32) => Ok(payload
            .chunks_exact(4)
            .map(|b| {
                let raw = [b[0], b[1], b[2], b[3]];
                match byte_order {
                    gap_types::Endianness::Little => f32::from_le_bytes(raw),
                    gap_types::Endianness::Big => f32::from_be_bytes(raw),
                }
            })
            .collect()),
        // Packed 24-bit-in-3-bytes is conventionally little-endian
        // regardless of the format's declared byte order (see `convert.rs`).
        (DataType::SignedInt, 24) => {
            let as_s32 = convert::s24le3_to_s32(payload)?;
            Ok(as_s32.into_iter().map(|s| s as f32 / i32::MAX as f32).collect())
        }
        (dt, bits) => Err(EngineError::UnsupportedConversion(format!("{dt:?}{bits} input"))),
    }
}

fn f32_to_bytes(samples: &[f32], byte_order: gap_types::Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        out.extend_from_slice(&match byte_order {
            gap_types::Endianness::Little => s.to_le_bytes(),
            gap_types::Endianness::Big => s.to_be_bytes(),
        });
    }
    out
}

fn i16_to_bytes(samples: &[i16], byte_order: gap_types::Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&match byte_order {
            gap_types::Endianness::Little => s.to_le_bytes(),
            gap_types::Endianness::Big => s.to_be_bytes(),
        });
    }
    out
}

fn i32_to_bytes(samples: &[i32], byte_order: gap_types::Endianness) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 4);
    for s in samples {
        out.extend_from_slice(&match byte_order {
            gap_types::Endianness::Little => s.to_le_bytes(),
            gap_types::Endianness::Big => s.to_be_bytes(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gap_types::{ChannelMap, Endianness};
    use std::sync::Mutex;

    fn float_stereo(rate: u32) -> AudioFormat {
        AudioFormat {
            sample_rate: rate,
            bits_per_sample: 32,
            packing_bytes: 4,
            data_type: DataType::Float,
            byte_order: Endianness::native(),
            channels: 2,
            channel_map: ChannelMap::stereo(),
        }
    }

    struct CapturingNotifier(Mutex<Vec<gap_types::Notification>>);
    impl OutputNotifier for CapturingNotifier {
        fn notify(&self, notification: gap_types::Notification) {
            self.0.lock().unwrap().push(notification);
        }
    }

    fn new_stage() -> (OutputStage, Arc<EventFifo>, Arc<Mutex<Vec<gap_types::Notification>>>) {
        let fifo = Arc::new(EventFifo::new());
        let pool = Arc::new(PacketPool::new(4, 64));
        let captured = Arc::new(Mutex::new(Vec::new()));
        struct Forwarding(Arc<Mutex<Vec<gap_types::Notification>>>);
        impl OutputNotifier for Forwarding {
            fn notify(&self, n: gap_types::Notification) {
                self.0.lock().unwrap().push(n);
            }
        }
        let stage = OutputStage::new(fifo.clone(), pool, Box::new(Forwarding(captured.clone())));
        (stage, fifo, captured)
    }

    #[test]
    fn bos_emits_immediately_for_the_first_stream() {
        let (mut stage, _fifo, captured) = new_stage();
        stage.begin_stream(1);
        let events = captured.lock().unwrap();
        assert!(events.iter().any(|n| n.payload == gap_types::NotificationPayload::Bos));
    }

    #[test]
    fn crossover_defers_bos_until_remaining_drains() {
        let (mut stage, _fifo, captured) = new_stage();
        stage.current_stream_id = 1;
        stage.remaining = 0;
        // Simulate a device that still reports delay for stream 1 when
        // stream 2's first buffer arrives: begin_stream with delay>0 path
        // is exercised indirectly via device_delay(); with no plugin
        // loaded, delay() is always 0, so this covers the immediate-drain
        // branch instead (the common case with no device attached).
        stage.begin_stream(2);
        let events = captured.lock().unwrap();
        assert_eq!(events.iter().filter(|n| n.payload == gap_types::NotificationPayload::Bos).count(), 1);
    }

    #[test]
    fn pause_toggles_and_notifies_each_time() {
        let (mut stage, _fifo, captured) = new_stage();
        stage.toggle_pause();
        assert!(stage.paused);
        stage.toggle_pause();
        assert!(!stage.paused);
        let events = captured.lock().unwrap();
        assert!(events.iter().any(|n| n.payload == gap_types::NotificationPayload::StatePausing));
        assert!(events.iter().any(|n| n.payload == gap_types::NotificationPayload::StatePlaying));
    }

    #[test]
    fn get_replay_gain_replies_on_its_channel() {
        let (mut stage, fifo, _captured) = new_stage();
        stage.gain_mode = GainMode::Track;
        stage.stream_replay_gain = ReplayGain { track_gain: Some(-3.0), ..Default::default() };
        let (tx, rx) = std::sync::mpsc::channel();
        fifo.post(Event::control(ControlEvent::GetReplayGain { reply: tx }), Insert::Back);
        let event = fifo.pop().unwrap();
        assert!(!stage.handle_event(event));
        let (mode, gain) = rx.recv().unwrap();
        assert_eq!(mode, GainMode::Track);
        assert_eq!(gain.track_gain, Some(-3.0));
    }

    #[test]
    fn end_of_zero_length_stream_fires_eos_without_waiting() {
        let (mut stage, _fifo, captured) = new_stage();
        stage.begin_stream(1);
        stage.stream_format = Some(float_stereo(44_100));
        stage.on_end(1);
        let events = captured.lock().unwrap();
        assert!(events.iter().any(|n| n.payload == gap_types::NotificationPayload::Eos));
    }

    #[test]
    fn flush_resets_crossover_and_position_state() {
        let (mut stage, _fifo, _captured) = new_stage();
        stage.begin_stream(1);
        stage.stream_position = 500;
        stage.apply_flush(1, false);
        assert_eq!(stage.current_stream_id, 0);
        assert_eq!(stage.stream_position, 0);
        assert!(!stage.bos_emitted);
    }

    #[test]
    fn on_end_writes_the_resampler_tail_before_draining() {
        use crate::devices::null_plugin::NullOutputPlugin;

        let (mut stage, _fifo, _captured) = new_stage();
        stage.plugin = Some(Box::new(NullOutputPlugin::new()));
        stage.begin_stream(1);
        stage.stream_format = Some(float_stereo(44_100));
        stage.device_format = Some(float_stereo(48_000));
        stage.resampler = Some(StreamResampler::new(2, 44_100, 48_000).unwrap());

        // Feed fewer frames than one resample chunk; process() buffers them
        // and emits nothing, so without the on_end tail-flush this audio
        // would simply vanish.
        let mut partial = vec![0.0f32; 2 * 100];
        let produced = stage.resampler.as_mut().unwrap().process(&mut partial).unwrap();
        assert!(produced.is_empty());

        let written = stage.flush_resampler_tail();
        assert!(written > 0, "buffered partial chunk should flush to a nonzero number of frames");
    }

    #[test]
    fn apply_flush_discards_resampler_tail_without_writing_it() {
        let (mut stage, _fifo, _captured) = new_stage();
        stage.stream_format = Some(float_stereo(44_100));
        stage.device_format = Some(float_stereo(48_000));
        stage.resampler = Some(StreamResampler::new(2, 44_100, 48_000).unwrap());
        let mut partial = vec![0.0f32; 2 * 100];
        let _ = stage.resampler.as_mut().unwrap().process(&mut partial).unwrap();

        stage.apply_flush(1, false);

        // The pending partial chunk was discarded by the flush, not carried
        // forward: a second flush has nothing left to drain.
        assert!(stage.flush_resampler_tail() == 0 || stage.resampler.is_none());
    }
}
