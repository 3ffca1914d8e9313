//! Wire/status data model shared between the GAP playback engine and the
//! applications that embed it.
//!
//! None of these types depend on a transport: a host speaking HTTP, a CLI
//! printing to stdout, or an IPC bridge can all round-trip them with
//! `serde`. The `openapi` feature additionally derives `utoipa::ToSchema`
//! for hosts that publish an OpenAPI document.

use serde::{Deserialize, Serialize};

/// In-memory representation of a sample: how to interpret the raw bytes of
/// a packet once `packing` tells you how many of them make up one sample.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    SignedInt,
    UnsignedInt,
    Float,
    Iec958,
}

/// Byte order of multi-byte samples. Irrelevant for single-byte packing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    pub const fn native() -> Self {
        #[cfg(target_endian = "little")]
        {
            Endianness::Little
        }
        #[cfg(target_endian = "big")]
        {
            Endianness::Big
        }
    }
}

/// A single loudspeaker role a channel can carry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    Mono,
    FrontLeft,
    FrontRight,
    FrontCenter,
    Lfe,
    BackLeft,
    BackRight,
    BackCenter,
    SideLeft,
    SideRight,
}

/// An ordered list of channel roles, one per interleaved channel slot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChannelMap(pub Vec<ChannelRole>);

impl ChannelMap {
    pub fn mono() -> Self {
        ChannelMap(vec![ChannelRole::Mono])
    }

    pub fn stereo() -> Self {
        ChannelMap(vec![ChannelRole::FrontLeft, ChannelRole::FrontRight])
    }

    pub fn count(&self) -> u16 {
        self.0.len() as u16
    }
}

/// The full description of how samples are laid out in a packet's buffer.
///
/// Two formats are equal exactly when every field matches, per the packet
/// invariants: a producer and consumer that agree on `AudioFormat` never
/// need to inspect the buffer's raw bytes to interpret it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Bytes occupied by one sample in memory (may exceed `bits_per_sample / 8`,
    /// e.g. S24 packed into 4-byte words).
    pub packing_bytes: u16,
    pub data_type: DataType,
    pub byte_order: Endianness,
    pub channels: u16,
    pub channel_map: ChannelMap,
}

impl AudioFormat {
    pub fn frame_bytes(&self) -> usize {
        self.packing_bytes as usize * self.channels as usize
    }

    pub fn is_mono(&self) -> bool {
        self.channels == 1
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }
}

/// Per-stream replay-gain tags. Any field may be unknown.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReplayGain {
    pub album_gain: Option<f32>,
    pub album_peak: Option<f32>,
    pub track_gain: Option<f32>,
    pub track_peak: Option<f32>,
}

impl ReplayGain {
    pub fn gain_for(&self, mode: GainMode) -> Option<f32> {
        match mode {
            GainMode::Off => None,
            GainMode::Track => self.track_gain,
            GainMode::Album => self.album_gain.or(self.track_gain),
        }
    }

    pub fn peak_for(&self, mode: GainMode) -> Option<f32> {
        match mode {
            GainMode::Off => None,
            GainMode::Track => self.track_peak,
            GainMode::Album => self.album_peak.or(self.track_peak),
        }
    }
}

/// Global per-output replay-gain setting.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum GainMode {
    #[default]
    Off,
    Track,
    Album,
}

/// The device kind tag an `OutputConfig` carries; also the ABI-level "type
/// tag" an output plugin reports from `type()`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Alsa,
    Oss,
    Pulse,
    RSound,
    Jack,
    Wav,
    None,
}

/// A tagged union of device-kind-specific settings. Applying a new
/// configuration whose kind differs from the current one requires
/// draining then reconfiguring (or reloading) the output device.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputConfig {
    Alsa {
        device: String,
        mmap: bool,
        no_resample: bool,
    },
    Oss {
        device: String,
    },
    Pulse {
        server: Option<String>,
        sink: Option<String>,
    },
    RSound {
        host: Option<String>,
    },
    Jack {
        client_name: String,
    },
    Wav {
        path: Option<std::path::PathBuf>,
    },
    None,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig::None
    }
}

impl OutputConfig {
    pub fn kind(&self) -> DeviceKind {
        match self {
            OutputConfig::Alsa { .. } => DeviceKind::Alsa,
            OutputConfig::Oss { .. } => DeviceKind::Oss,
            OutputConfig::Pulse { .. } => DeviceKind::Pulse,
            OutputConfig::RSound { .. } => DeviceKind::RSound,
            OutputConfig::Jack { .. } => DeviceKind::Jack,
            OutputConfig::Wav { .. } => DeviceKind::Wav,
            OutputConfig::None => DeviceKind::None,
        }
    }
}

/// Why a stream's playback ended, surfaced in status snapshots.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    Eof,
    Error,
    Stopped,
}

/// Application-visible notifications emitted upward out of the output
/// stage (engine-to-application queue of the external interface).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
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

/// A notification tagged with the stream it concerns. Stale notifications
/// (stream-id mismatching the application's current stream) should be
/// dropped by the host, the same way the engine drops stale control events.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Notification {
    pub stream_id: u64,
    pub payload: NotificationPayload,
}

/// A point-in-time snapshot of everything a host typically wants to show a
/// user: the teacher's `BridgeStatus`/`PlaybackStatus` generalized to the
/// engine's own vocabulary (stream-id rather than "now playing" URL only,
/// gain mode, device kind).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EngineStatus {
    pub stream_id: Option<u64>,
    pub now_playing: Option<String>,
    pub paused: bool,
    pub elapsed_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub source_codec: Option<String>,
    pub source_bit_depth: Option<u16>,
    pub container: Option<String>,
    pub output_sample_format: Option<String>,
    pub resampling: Option<bool>,
    pub resample_from_hz: Option<u32>,
    pub resample_to_hz: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub device: Option<String>,
    pub device_kind: Option<DeviceKind>,
    pub gain_mode: GainMode,
    pub volume: f32,
    pub underrun_frames: Option<u64>,
    pub underrun_events: Option<u64>,
    pub buffer_size_frames: Option<u32>,
    pub buffered_frames: Option<u64>,
    pub buffer_capacity_frames: Option<u64>,
    pub end_reason: Option<PlaybackEndReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_formats_compare_field_by_field() {
        let a = AudioFormat {
            sample_rate: 44_100,
            bits_per_sample: 16,
            packing_bytes: 2,
            data_type: DataType::SignedInt,
            byte_order: Endianness::native(),
            channels: 2,
            channel_map: ChannelMap::stereo(),
        };
        let mut b = a.clone();
        assert_eq!(a, b);
        b.sample_rate = 48_000;
        assert_ne!(a, b);
    }

    #[test]
    fn replay_gain_album_mode_falls_back_to_track() {
        let rg = ReplayGain {
            album_gain: None,
            album_peak: None,
            track_gain: Some(-6.0),
            track_peak: Some(0.9),
        };
        assert_eq!(rg.gain_for(GainMode::Album), Some(-6.0));
        assert_eq!(rg.gain_for(GainMode::Off), None);
    }

    #[test]
    fn output_config_kind_matches_variant() {
        let cfg = OutputConfig::Wav { path: None };
        assert_eq!(cfg.kind(), DeviceKind::Wav);
    }
}
