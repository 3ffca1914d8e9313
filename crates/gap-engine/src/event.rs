//! The event vocabulary that flows across every actor's FIFO.
//!
//! The source engine treats every event as a refcounted heap object; this
//! rewrite instead gives each FIFO exclusive ownership of the events it
//! holds (move semantics), per the design note that a target rewrite should
//! prefer ownership-transfer to reference counting. The one place the
//! source relies on multi-consumer sharing — a `Packet` surviving a
//! stream-id transition while the previous stream still drains — is handled
//! by giving the output stage's crossover accounting its own copy of the
//! frame count it needs rather than sharing the packet itself (see
//! `output::CrossoverState`).

use std::sync::atomic::{AtomicU64, Ordering};

use gap_types::{DeviceKind, GainMode, OutputConfig, ReplayGain};

use crate::packet::Packet;

/// Monotonic stream identity, allocated by the input stage each time a new
/// source is opened.
pub type StreamId = u64;

/// Allocates monotonically increasing stream ids, shared across the engine.
#[derive(Default)]
pub struct StreamIdAllocator(AtomicU64);

impl StreamIdAllocator {
    pub const fn new() -> Self {
        StreamIdAllocator(AtomicU64::new(0))
    }

    /// Allocate and return the next stream id; the first call returns 1 so
    /// that 0 can be reserved as "no stream yet".
    pub fn next(&self) -> StreamId {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Control events travel from the application down to the input stage and
/// are forwarded along the pipeline as needed.
///
/// `GetReplayGain`/`GetOutputConfig` are synchronous per `spec.md` §3: the
/// caller waits for the callee to fill fields and release. Rather than
/// reference-counted shared fields, this rewrite gives each a one-shot
/// reply channel the caller blocks on receiving from (see `engine.rs`).
pub enum ControlEvent {
    Open { url: String },
    OpenFlush { url: String },
    Close,
    Pause,
    /// Fractional position in `[0, 1]`.
    Seek { position: f64 },
    /// Volume in `[0, 1]`.
    Volume { value: f32 },
    SetReplayGain { mode: GainMode, gain: ReplayGain },
    GetReplayGain { reply: std::sync::mpsc::Sender<(GainMode, ReplayGain)> },
    SetOutputConfig { config: OutputConfig },
    GetOutputConfig { reply: std::sync::mpsc::Sender<OutputConfig> },
    Quit,
}

impl std::fmt::Debug for ControlEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlEvent::Open { url } => f.debug_struct("Open").field("url", url).finish(),
            ControlEvent::OpenFlush { url } => f.debug_struct("OpenFlush").field("url", url).finish(),
            ControlEvent::Close => write!(f, "Close"),
            ControlEvent::Pause => write!(f, "Pause"),
            ControlEvent::Seek { position } => f.debug_struct("Seek").field("position", position).finish(),
            ControlEvent::Volume { value } => f.debug_struct("Volume").field("value", value).finish(),
            ControlEvent::SetReplayGain { mode, gain } => {
                f.debug_struct("SetReplayGain").field("mode", mode).field("gain", gain).finish()
            }
            ControlEvent::GetReplayGain { .. } => write!(f, "GetReplayGain"),
            ControlEvent::SetOutputConfig { config } => {
                f.debug_struct("SetOutputConfig").field("config", config).finish()
            }
            ControlEvent::GetOutputConfig { .. } => write!(f, "GetOutputConfig"),
            ControlEvent::Quit => write!(f, "Quit"),
        }
    }
}

/// Pipeline events travel downstream, describing format/metadata changes
/// and stream boundaries. Each carries the stream-id it concerns so a
/// downstream actor can recognize one left stale by a later flush/reopen.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Configure {
        stream_id: StreamId,
        /// Raw codec parameters as the container reader reported them;
        /// the decoder stage uses these to build (or rebind) its codec
        /// plugin. The sample-level `AudioFormat` isn't known until the
        /// codec plugin has decoded at least one frame.
        codec_params: symphonia::core::codecs::CodecParameters,
        codec: String,
        stream_length: Option<u64>,
        replay_gain: ReplayGain,
        /// Leading decoded samples to discard (Opus/Vorbis pre-roll).
        pre_roll_frames: u64,
    },
    Flush {
        stream_id: StreamId,
        close: bool,
    },
    End {
        stream_id: StreamId,
    },
    Meta {
        stream_id: StreamId,
        title: Option<String>,
        artist: Option<String>,
        album: Option<String>,
    },
}

impl PipelineEvent {
    pub fn stream_id(&self) -> StreamId {
        match self {
            PipelineEvent::Configure { stream_id, .. }
            | PipelineEvent::Flush { stream_id, .. }
            | PipelineEvent::End { stream_id }
            | PipelineEvent::Meta { stream_id, .. } => *stream_id,
        }
    }
}

/// Notifications pushed up to the application.
#[derive(Debug, Clone)]
pub enum Notification {
    Bos,
    Eos,
    StateReady,
    StatePlaying,
    StatePausing,
    TimeUpdate { position_seconds: u32, length_seconds: u32 },
    MetaInfo { title: Option<String>, artist: Option<String>, album: Option<String> },
    VolumeNotify { value: f32, enabled: bool },
    ErrorMessage { text: String },
}

impl Notification {
    pub fn into_wire(self, stream_id: StreamId) -> gap_types::Notification {
        let payload = match self {
            Notification::Bos => gap_types::NotificationPayload::Bos,
            Notification::Eos => gap_types::NotificationPayload::Eos,
            Notification::StateReady => gap_types::NotificationPayload::StateReady,
            Notification::StatePlaying => gap_types::NotificationPayload::StatePlaying,
            Notification::StatePausing => gap_types::NotificationPayload::StatePausing,
            Notification::TimeUpdate { position_seconds, length_seconds } => {
                gap_types::NotificationPayload::TimeUpdate { position_seconds, length_seconds }
            }
            Notification::MetaInfo { title, artist, album } => {
                gap_types::NotificationPayload::MetaInfo { title, artist, album }
            }
            Notification::VolumeNotify { value, enabled } => {
                gap_types::NotificationPayload::VolumeNotify { value, enabled }
            }
            Notification::ErrorMessage { text } => {
                gap_types::NotificationPayload::ErrorMessage { text }
            }
        };
        gap_types::Notification { stream_id, payload }
    }
}

/// The unit carried on an actor's FIFO. Every event carries the stream-id
/// it concerns so a downstream actor can drop stale ones after a flush.
pub enum Event {
    Control(ControlEvent),
    Pipeline(PipelineEvent),
    /// A PCM or coded-data packet, always tagged `Buffer` in the vocabulary
    /// of §4.2/§4.4; kept as its own variant here for a cheaper match.
    Buffer(Packet),
}

impl Event {
    pub fn control(event: ControlEvent) -> Self {
        Event::Control(event)
    }

    pub fn pipeline(event: PipelineEvent) -> Self {
        Event::Pipeline(event)
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, Event::Buffer(_))
    }

    pub fn is_configure(&self) -> bool {
        matches!(self, Event::Pipeline(PipelineEvent::Configure { .. }))
    }

    pub fn device_kind_label(kind: DeviceKind) -> &'static str {
        match kind {
            DeviceKind::Alsa => "alsa",
            DeviceKind::Oss => "oss",
            DeviceKind::Pulse => "pulse",
            DeviceKind::RSound => "rsound",
            DeviceKind::Jack => "jack",
            DeviceKind::Wav => "wav",
            DeviceKind::None => "none",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_allocator_starts_at_one_and_increments() {
        let alloc = StreamIdAllocator::new();
        assert_eq!(alloc.next(), 1);
        assert_eq!(alloc.next(), 2);
        assert_eq!(alloc.next(), 3);
    }

    #[test]
    fn event_is_buffer_only_for_packets() {
        let p = Packet::with_capacity(4);
        assert!(Event::Buffer(p).is_buffer());
        assert!(!Event::control(ControlEvent::Close).is_buffer());
    }
}
