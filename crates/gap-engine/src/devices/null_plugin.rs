//! `DeviceKind::None` — discards everything. Used for headless tests and
//! for opening a stream without yet knowing the final output device.

use gap_types::{AudioFormat, DeviceKind, OutputConfig};

use crate::device::OutputPlugin;
use crate::error::EngineError;

#[derive(Default)]
pub struct NullOutputPlugin {
    volume: f32,
    paused: bool,
}

impl NullOutputPlugin {
    pub fn new() -> Self {
        NullOutputPlugin { volume: 1.0, paused: false }
    }
}

impl OutputPlugin for NullOutputPlugin {
    fn kind(&self) -> DeviceKind {
        DeviceKind::None
    }

    fn set_output_config(&mut self, _config: &OutputConfig) -> Result<(), EngineError> {
        Ok(())
    }

    fn configure(&mut self, format: &AudioFormat) -> Result<AudioFormat, EngineError> {
        Ok(format.clone())
    }

    fn write(&mut self, _buf: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }

    fn delay(&self) -> i64 {
        0
    }

    fn drop_buffered(&mut self) {}

    fn drain(&mut self) {}

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

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_passes_format_through_unchanged() {
        let mut plugin = NullOutputPlugin::new();
        let format = AudioFormat {
            sample_rate: 44_100,
            bits_per_sample: 32,
            packing_bytes: 4,
            data_type: gap_types::DataType::Float,
            byte_order: gap_types::Endianness::native(),
            channels: 2,
            channel_map: gap_types::ChannelMap::stereo(),
        };
        let negotiated = plugin.configure(&format).unwrap();
        assert_eq!(negotiated, format);
    }
}
