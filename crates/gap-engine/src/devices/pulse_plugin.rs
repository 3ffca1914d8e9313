//! Native `DeviceKind::Pulse` backend on `libpulse-binding` /
//! `libpulse-simple-binding`'s blocking Simple API.
//!
//! The action vocabulary (cork/uncork to pause, drain, flush to discard
//! buffered data) mirrors
//! `other_examples/527bd6b5_colinmarc-pulseaudio-rs__src-client-playback_stream.rs.rs`'s
//! `PlaybackStream`, even though that crate talks to the server over its own
//! async protocol rather than through `libpulse`'s C API. The Simple API's
//! blocking `write`/`drain`/`get_latency` map directly onto `OutputPlugin`,
//! which is why this plugin reaches for `libpulse-simple-binding` instead of
//! reimplementing `PlaybackStream`'s async reactor.

use libpulse_binding as pulse;
use libpulse_binding::sample::{Format as PulseFormat, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;

use gap_types::{AudioFormat, DataType, DeviceKind, Endianness, OutputConfig};

use crate::device::OutputPlugin;
use crate::error::EngineError;

pub struct PulseSimpleOutputPlugin {
    server: Option<String>,
    sink: Option<String>,
    simple: Option<Simple>,
    sample_rate: u32,
    paused: bool,
    volume: f32,
}

impl PulseSimpleOutputPlugin {
    pub fn new() -> Self {
        PulseSimpleOutputPlugin {
            server: None,
            sink: None,
            simple: None,
            sample_rate: 0,
            paused: false,
            volume: 1.0,
        }
    }
}

impl Default for PulseSimpleOutputPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputPlugin for PulseSimpleOutputPlugin {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Pulse
    }

    fn set_output_config(&mut self, config: &OutputConfig) -> Result<(), EngineError> {
        match config {
            OutputConfig::Pulse { server, sink } => {
                self.server = server.clone();
                self.sink = sink.clone();
                Ok(())
            }
            other => Err(EngineError::PluginLoadFailed {
                kind: other.kind(),
                reason: "expected a pulse output config".into(),
            }),
        }
    }

    fn configure(&mut self, format: &AudioFormat) -> Result<AudioFormat, EngineError> {
        self.close();

        let negotiated = AudioFormat {
            data_type: DataType::SignedInt,
            bits_per_sample: 16,
            packing_bytes: 2,
            byte_order: Endianness::Little,
            ..format.clone()
        };

        let spec = Spec {
            format: PulseFormat::S16le,
            channels: negotiated.channels as u8,
            rate: negotiated.sample_rate,
        };
        if !spec.is_valid() {
            return Err(EngineError::DeviceFailed("invalid pulse sample spec".into()));
        }

        let simple = Simple::new(
            self.server.as_deref(),
            "gap",
            Direction::Playback,
            self.sink.as_deref(),
            "playback",
            &spec,
            None,
            None,
        )
        .map_err(|e| EngineError::DeviceFailed(e.to_string()))?;

        self.sample_rate = negotiated.sample_rate;
        self.simple = Some(simple);
        Ok(negotiated)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), EngineError> {
        if self.paused {
            return Ok(());
        }
        let simple = self
            .simple
            .as_ref()
            .ok_or_else(|| EngineError::DeviceFailed("pulse stream not configured".into()))?;
        simple.write(buf).map_err(|e| EngineError::DeviceFailed(e.to_string()))
    }

    fn delay(&self) -> i64 {
        let Some(simple) = &self.simple else { return 0 };
        let Ok(usec) = simple.get_latency() else { return 0 };
        (usec.as_micros() as i64 * self.sample_rate as i64) / 1_000_000
    }

    fn drop_buffered(&mut self) {
        if let Some(simple) = &self.simple {
            let _ = simple.flush();
        }
    }

    fn drain(&mut self) {
        if let Some(simple) = &self.simple {
            let _ = simple.drain();
        }
    }

    fn can_pause(&self) -> bool {
        true
    }

    fn pause(&mut self, paused: bool) {
        // The blocking Simple API has no cork/uncork primitive (that's an
        // async-API-only operation); pausing here just stops feeding `write`.
        self.paused = paused;
    }

    fn set_volume(&mut self, value: f32) {
        self.volume = value.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn close(&mut self) {
        self.simple = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_output_config_rejects_other_kinds() {
        let mut plugin = PulseSimpleOutputPlugin::new();
        let err = plugin.set_output_config(&OutputConfig::Wav { path: None });
        assert!(err.is_err());
    }

    #[test]
    fn delay_is_zero_before_configure() {
        let plugin = PulseSimpleOutputPlugin::new();
        assert_eq!(plugin.delay(), 0);
    }
}
