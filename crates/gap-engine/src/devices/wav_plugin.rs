//! `DeviceKind::Wav` — write decoded audio straight to a `.wav` file instead
//! of a sound card. Grounded on `hound`, the WAV crate already used
//! elsewhere in the pack for file-based audio I/O.

use std::path::PathBuf;

use gap_types::{AudioFormat, DataType, DeviceKind, OutputConfig};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::device::OutputPlugin;
use crate::error::EngineError;

pub struct WavFileOutputPlugin {
    path: PathBuf,
    writer: Option<WavWriter<std::io::BufWriter<std::fs::File>>>,
    volume: f32,
    paused: bool,
}

impl WavFileOutputPlugin {
    pub fn new() -> Self {
        WavFileOutputPlugin {
            path: PathBuf::from("output.wav"),
            writer: None,
            volume: 1.0,
            paused: false,
        }
    }
}

impl Default for WavFileOutputPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputPlugin for WavFileOutputPlugin {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Wav
    }

    fn set_output_config(&mut self, config: &OutputConfig) -> Result<(), EngineError> {
        match config {
            OutputConfig::Wav { path } => {
                if let Some(p) = path {
                    self.path = p.clone();
                }
                Ok(())
            }
            other => Err(EngineError::PluginLoadFailed {
                kind: other.kind(),
                reason: "expected a wav output config".into(),
            }),
        }
    }

    fn configure(&mut self, format: &AudioFormat) -> Result<AudioFormat, EngineError> {
        self.close();

        let negotiated = AudioFormat {
            data_type: DataType::SignedInt,
            bits_per_sample: 16,
            packing_bytes: 2,
            byte_order: gap_types::Endianness::Little,
            ..format.clone()
        };

        let spec = WavSpec {
            channels: negotiated.channels,
            sample_rate: negotiated.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::create(&self.path, spec)
            .map_err(|e| EngineError::DeviceFailed(format!("creating {}: {e}", self.path.display())))?;

        self.writer = Some(writer);
        Ok(negotiated)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), EngineError> {
        if self.paused {
            return Ok(());
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| EngineError::DeviceFailed("wav writer not configured".into()))?;
        for chunk in buf.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            let scaled = (sample as f32 * self.volume).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer
                .write_sample(scaled)
                .map_err(|e| EngineError::DeviceFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn delay(&self) -> i64 {
        0
    }

    fn drop_buffered(&mut self) {}

    fn drain(&mut self) {
        if let Some(w) = &mut self.writer {
            let _ = w.flush();
        }
    }

    fn can_pause(&self) -> bool {
        true
    }

    fn pause(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn set_volume(&mut self, value: f32) {
        self.volume = value.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn close(&mut self) {
        if let Some(w) = self.writer.take() {
            let _ = w.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_is_output_wav() {
        let plugin = WavFileOutputPlugin::new();
        assert_eq!(plugin.path, PathBuf::from("output.wav"));
    }

    #[test]
    fn set_output_config_rejects_other_kinds() {
        let mut plugin = WavFileOutputPlugin::new();
        let err = plugin.set_output_config(&OutputConfig::Oss { device: String::new() });
        assert!(err.is_err());
    }
}
