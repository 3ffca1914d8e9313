//! CPAL-backed `OutputPlugin`. Used directly for `DeviceKind::Alsa` on
//! Linux and stands in for `Oss`/`Jack`/`RSound` too, since CPAL already
//! selects the right platform host API at compile time and none of those
//! kinds ship a distinct native crate in this project (see `DESIGN.md`).
//!
//! The plugin contract's `write` is blocking; CPAL's callback is not, so
//! this wraps a small byte ring buffer the same way the source's playback
//! stage wraps `SharedAudio` — `write` pushes and blocks on room, the
//! real-time callback pops without ever blocking, underruns are filled
//! with silence.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use gap_types::{AudioFormat, DataType, DeviceKind, Endianness, OutputConfig};

use super::cpal_support::{pick_buffer_size, pick_device, pick_output_config};
use crate::device::OutputPlugin;
use crate::error::EngineError;

struct Ring {
    buf: VecDeque<u8>,
    capacity: usize,
}

/// Output device backed by a real-time CPAL stream and a byte ring buffer.
pub struct CpalOutputPlugin {
    host: cpal::Host,
    device_name: Option<String>,
    frame_bytes: usize,
    stream: Option<cpal::Stream>,
    ring: Arc<(Mutex<Ring>, Condvar)>,
    paused: Arc<AtomicBool>,
    volume_bits: Arc<AtomicU32>,
}

impl CpalOutputPlugin {
    pub fn new() -> Self {
        CpalOutputPlugin {
            host: cpal::default_host(),
            device_name: None,
            frame_bytes: 0,
            stream: None,
            ring: Arc::new((Mutex::new(Ring { buf: VecDeque::new(), capacity: 0 }), Condvar::new())),
            paused: Arc::new(AtomicBool::new(false)),
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
        }
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }
}

impl Default for CpalOutputPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputPlugin for CpalOutputPlugin {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Alsa
    }

    fn set_output_config(&mut self, config: &OutputConfig) -> Result<(), EngineError> {
        match config {
            OutputConfig::Alsa { device, .. } => {
                self.device_name = if device.is_empty() { None } else { Some(device.clone()) };
                Ok(())
            }
            OutputConfig::Oss { device } => {
                self.device_name = if device.is_empty() { None } else { Some(device.clone()) };
                Ok(())
            }
            OutputConfig::Jack { client_name } => {
                self.device_name = Some(client_name.clone());
                Ok(())
            }
            OutputConfig::RSound { host } => {
                self.device_name = host.clone();
                Ok(())
            }
            OutputConfig::None => Ok(()),
            other => Err(EngineError::PluginLoadFailed {
                kind: other.kind(),
                reason: "config kind does not match a cpal-backed device".into(),
            }),
        }
    }

    fn configure(&mut self, format: &AudioFormat) -> Result<AudioFormat, EngineError> {
        self.close();

        let device = pick_device(&self.host, self.device_name.as_deref())
            .map_err(|e| EngineError::DeviceFailed(e.to_string()))?;
        let supported = pick_output_config(&device, Some(format.sample_rate))
            .map_err(|e| EngineError::DeviceFailed(e.to_string()))?;

        let sample_format = supported.sample_format();
        let mut stream_config: cpal::StreamConfig = supported.config();
        if let Some(bs) = pick_buffer_size(&supported) {
            stream_config.buffer_size = bs;
        }

        let negotiated = AudioFormat {
            sample_rate: stream_config.sample_rate.0,
            bits_per_sample: bits_for(sample_format),
            packing_bytes: bits_for(sample_format) / 8,
            data_type: data_type_for(sample_format),
            byte_order: Endianness::native(),
            channels: stream_config.channels,
            channel_map: if stream_config.channels == 1 {
                gap_types::ChannelMap::mono()
            } else {
                gap_types::ChannelMap::stereo()
            },
        };

        self.frame_bytes = negotiated.frame_bytes();
        let capacity = (negotiated.sample_rate as usize / 2).max(1) * self.frame_bytes;
        {
            let (lock, _) = &*self.ring;
            let mut ring = lock.lock().unwrap();
            ring.buf.clear();
            ring.capacity = capacity;
        }

        let stream = build_stream(
            &device,
            &stream_config,
            sample_format,
            self.ring.clone(),
            self.paused.clone(),
        )
        .map_err(|e| EngineError::DeviceFailed(e.to_string()))?;
        stream.play().map_err(|e| EngineError::DeviceFailed(e.to_string()))?;
        self.stream = Some(stream);

        Ok(negotiated)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), EngineError> {
        if self.stream.is_none() {
            return Err(EngineError::DeviceFailed("device not configured".into()));
        }
        let (lock, cvar) = &*self.ring;
        let mut ring = lock.lock().unwrap();
        let mut offset = 0;
        while offset < buf.len() {
            let room = ring.capacity.saturating_sub(ring.buf.len());
            if room == 0 {
                let (guard, _) = cvar.wait_timeout(ring, Duration::from_millis(250)).unwrap();
                ring = guard;
                continue;
            }
            let take = room.min(buf.len() - offset);
            ring.buf.extend(&buf[offset..offset + take]);
            offset += take;
        }
        Ok(())
    }

    fn delay(&self) -> i64 {
        if self.frame_bytes == 0 {
            return 0;
        }
        let (lock, _) = &*self.ring;
        let ring = lock.lock().unwrap();
        (ring.buf.len() / self.frame_bytes) as i64
    }

    fn drop_buffered(&mut self) {
        let (lock, cvar) = &*self.ring;
        let mut ring = lock.lock().unwrap();
        ring.buf.clear();
        cvar.notify_all();
    }

    fn drain(&mut self) {
        let (lock, cvar) = &*self.ring;
        let mut ring = lock.lock().unwrap();
        while !ring.buf.is_empty() {
            let (guard, timed_out) = cvar.wait_timeout(ring, Duration::from_millis(250)).unwrap();
            ring = guard;
            if timed_out.timed_out() && ring.buf.is_empty() {
                break;
            }
        }
    }

    fn can_pause(&self) -> bool {
        true
    }

    fn pause(&mut self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    fn set_volume(&mut self, value: f32) {
        self.volume_bits.store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn volume(&self) -> f32 {
        CpalOutputPlugin::volume(self)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
        let (lock, cvar) = &*self.ring;
        let mut ring = lock.lock().unwrap();
        ring.buf.clear();
        cvar.notify_all();
    }
}

fn bits_for(format: cpal::SampleFormat) -> u16 {
    match format {
        cpal::SampleFormat::F32 | cpal::SampleFormat::I32 | cpal::SampleFormat::U32 => 32,
        cpal::SampleFormat::I16 | cpal::SampleFormat::U16 => 16,
        _ => 32,
    }
}

fn data_type_for(format: cpal::SampleFormat) -> DataType {
    match format {
        cpal::SampleFormat::F32 => DataType::Float,
        cpal::SampleFormat::U16 | cpal::SampleFormat::U32 => DataType::UnsignedInt,
        _ => DataType::SignedInt,
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: Arc<(Mutex<Ring>, Condvar)>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_typed::<f32>(device, config, ring, paused),
        cpal::SampleFormat::I16 => build_typed::<i16>(device, config, ring, paused),
        cpal::SampleFormat::I32 => build_typed::<i32>(device, config, ring, paused),
        cpal::SampleFormat::U16 => build_typed::<u16>(device, config, ring, paused),
        _ => unreachable!("negotiated format restricted to F32/I16/I32/U16"),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: Arc<(Mutex<Ring>, Condvar)>,
    paused: Arc<AtomicBool>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::Sample + cpal::SizedSample,
{
    let sample_bytes = std::mem::size_of::<T>();
    let err_fn = |err| tracing::warn!("cpal stream error: {err}");

    device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if paused.load(Ordering::Relaxed) {
                data.fill(T::EQUILIBRIUM);
                return;
            }

            let want_bytes = data.len() * sample_bytes;
            let (lock, cvar) = &*ring;
            let mut r = lock.lock().unwrap();
            let have = r.buf.len().min(want_bytes);
            let mut scratch = vec![0u8; have];
            for b in scratch.iter_mut() {
                *b = r.buf.pop_front().unwrap();
            }
            drop(r);
            cvar.notify_all();

            let whole_samples = have / sample_bytes;
            for (i, dst) in data.iter_mut().enumerate() {
                if i < whole_samples {
                    let start = i * sample_bytes;
                    *dst = sample_from_bytes::<T>(&scratch[start..start + sample_bytes]);
                } else {
                    *dst = T::EQUILIBRIUM;
                }
            }
        },
        err_fn,
        None,
    )
}

fn sample_from_bytes<T: cpal::Sample>(bytes: &[u8]) -> T {
    // Safety-free reinterpretation: every `T` used here (`f32`/`i16`/`i32`/`u16`)
    // is a plain-old-data type whose native byte layout is exactly what the
    // output stage already produced via `convert.rs`.
    unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_round_trips_and_clamps() {
        let mut plugin = CpalOutputPlugin::new();
        plugin.set_volume(0.5);
        assert_eq!(OutputPlugin::volume(&plugin), 0.5);
        plugin.set_volume(2.0);
        assert_eq!(OutputPlugin::volume(&plugin), 1.0);
    }

    #[test]
    fn delay_is_zero_before_configure() {
        let plugin = CpalOutputPlugin::new();
        assert_eq!(plugin.delay(), 0);
    }
}
