//! The codec plugin contract (§4.3) and a Symphonia-backed implementation.
//!
//! Like readers, codec plugins are internal trait objects: they are never
//! shipped or versioned independently of the engine, so no ABI boundary is
//! needed for them (design notes, §9). `SymphoniaDecoder` wraps a
//! `Box<dyn symphonia::core::codecs::Decoder>`, reconstructing a Symphonia
//! packet from the coded bytes the input stage already pulled off the
//! container, and flattening the decoded `AudioBufferRef` into an
//! interleaved `f32` PCM packet the way the teacher's
//! `decode::decode_format_loop` does with `SampleBuffer::copy_interleaved_ref`.

use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::formats::Packet as SymPacket;

use gap_types::{AudioFormat, ChannelMap, ChannelRole, DataType, Endianness, ReplayGain};

use crate::error::EngineError;
use crate::packet::Packet;
use crate::pool::PacketPool;

/// Parameters carried by a Configure pipeline event, as seen by a codec plugin.
#[derive(Clone, Debug)]
pub struct ConfigureParams {
    pub codec_params: CodecParameters,
    pub stream_length: Option<u64>,
    pub replay_gain: ReplayGain,
    pub pre_roll_frames: u64,
}

/// Outcome of `DecoderPlugin::process`.
pub enum ProcessOutcome {
    Ok,
    /// No output was emitted because a control event needed service first;
    /// the caller must not treat this as an error.
    Interrupted,
}

/// §4.3's plugin interface, minus `init`'s and `process`'s raw packet
/// acquisition details (handled by the decoder stage, which owns the pool).
pub trait DecoderPlugin: Send {
    fn codec(&self) -> &str;
    fn init(&mut self, params: &ConfigureParams) -> Result<(), EngineError>;
    /// Drop internal state (e.g. discard partially-decoded frames) and, if
    /// known, realign pre-roll accounting to `offset_frames`.
    fn flush(&mut self, offset_frames: u64) -> Result<(), EngineError>;
    /// Decode `coded` into zero or more PCM packets, acquiring each one
    /// from `acquire` (which obeys the pool's back-pressure contract and
    /// returns `None` if a control event arrived while waiting) and handing
    /// filled packets to `emit`.
    fn process(
        &mut self,
        coded: &Packet,
        acquire: &mut dyn FnMut() -> Option<Packet>,
        emit: &mut dyn FnMut(Packet),
    ) -> Result<ProcessOutcome, EngineError>;
}

/// Symphonia-backed decoder: one instance per codec, rebuilt whenever the
/// incoming codec changes (decoder stage's Configure handling).
pub struct SymphoniaDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    codec_name: String,
    spec: SignalSpec,
    track_id: u32,
    replay_gain: ReplayGain,
    /// Leading decoded frames still to discard for pre-roll.
    pre_roll_remaining: u64,
    next_ts: u64,
    stream_length: Option<u64>,
}

impl SymphoniaDecoder {
    pub fn new(codec_name: &str, track_id: u32, params: &ConfigureParams) -> Result<Self, EngineError> {
        let decoder = symphonia::default::get_codecs()
            .make(&params.codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::UnsupportedCodec(format!("{codec_name}: {e}")))?;

        let channels = params
            .codec_params
            .channels
            .ok_or_else(|| EngineError::UnsupportedCodec("unknown channel layout".into()))?;
        let rate = params
            .codec_params
            .sample_rate
            .ok_or_else(|| EngineError::UnsupportedCodec("unknown sample rate".into()))?;

        Ok(SymphoniaDecoder {
            decoder,
            codec_name: codec_name.to_string(),
            spec: SignalSpec::new(rate, channels),
            track_id,
            replay_gain: params.replay_gain,
            pre_roll_remaining: params.pre_roll_frames,
            next_ts: 0,
            stream_length: params.stream_length,
        })
    }

    fn output_format(&self) -> AudioFormat {
        let count = self.spec.channels.count() as u16;
        AudioFormat {
            sample_rate: self.spec.rate,
            bits_per_sample: 32,
            packing_bytes: 4,
            data_type: DataType::Float,
            byte_order: Endianness::native(),
            channels: count,
            channel_map: if count == 1 { ChannelMap::mono() } else { ChannelMap::stereo() },
        }
    }
}

impl DecoderPlugin for SymphoniaDecoder {
    fn codec(&self) -> &str {
        &self.codec_name
    }

    fn init(&mut self, params: &ConfigureParams) -> Result<(), EngineError> {
        self.replay_gain = params.replay_gain;
        self.pre_roll_remaining = params.pre_roll_frames;
        self.stream_length = params.stream_length;
        Ok(())
    }

    fn flush(&mut self, offset_frames: u64) -> Result<(), EngineError> {
        self.decoder.reset();
        self.next_ts = offset_frames;
        Ok(())
    }

    fn process(
        &mut self,
        coded: &Packet,
        acquire: &mut dyn FnMut() -> Option<Packet>,
        emit: &mut dyn FnMut(Packet),
    ) -> Result<ProcessOutcome, EngineError> {
        let sym_packet = SymPacket::new_from_slice(
            self.track_id,
            coded.stream_position,
            0,
            coded.readable(),
        );

        let decoded = match self.decoder.decode(&sym_packet) {
            Ok(buf) => buf,
            Err(symphonia::core::errors::Error::DecodeError(_)) => {
                // Recoverable frame error: skip this packet, the stream continues.
                return Ok(ProcessOutcome::Ok);
            }
            Err(e) => return Err(EngineError::DecodeFailed(e.to_string())),
        };

        let mut frames = decoded.frames() as u64;
        let mut sample_buf = SampleBuffer::<f32>::new(frames, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        let channels = decoded_channels(&sample_buf, frames);
        let mut samples = sample_buf.samples();

        if self.pre_roll_remaining > 0 {
            let drop_frames = self.pre_roll_remaining.min(frames);
            let drop_samples = (drop_frames as usize) * channels;
            samples = &samples[drop_samples.min(samples.len())..];
            self.pre_roll_remaining -= drop_frames;
            frames -= drop_frames;
        }

        if frames == 0 {
            return Ok(ProcessOutcome::Ok);
        }

        let format = self.output_format();
        let frame_bytes = format.frame_bytes();
        let bytes_needed = frames as usize * frame_bytes;
        let mut offset = 0usize;
        let stream_position_base = self.next_ts;

        while offset < bytes_needed {
            let Some(mut packet) = acquire() else {
                return Ok(ProcessOutcome::Interrupted);
            };
            let take = bytes_needed.saturating_sub(offset).min(packet.capacity());
            let sample_start = offset / 4;
            let sample_count = take / 4;
            let chunk = &samples[sample_start..sample_start + sample_count];
            packet.format = Some(format.clone());
            packet.stream_position = stream_position_base + (offset / frame_bytes) as u64;
            packet.stream_length = self.stream_length;
            for s in chunk {
                packet.write(&s.to_ne_bytes());
            }
            emit(packet);
            offset += take;
        }

        self.next_ts = stream_position_base + frames;
        Ok(ProcessOutcome::Ok)
    }
}

fn decoded_channels(buf: &SampleBuffer<f32>, frames: u64) -> usize {
    if frames == 0 {
        1
    } else {
        (buf.samples().len() as u64 / frames).max(1) as usize
    }
}
