//! Output plugin host: resolves an `OutputConfig` to a concrete
//! `Box<dyn OutputPlugin>` and hands it off to the output stage. Stands in
//! for `ap_load_plugin`/`ap_free_plugin`/`ap_version` (see `device.rs` and
//! `DESIGN.md`'s Open Question entry).

use gap_types::{DeviceKind, OutputConfig};

use crate::device::OutputPlugin;
use crate::devices::{CpalOutputPlugin, NullOutputPlugin, PulseSimpleOutputPlugin, WavFileOutputPlugin};
use crate::error::EngineError;

/// Instantiate the plugin for `config`'s device kind and bind the config to
/// it. `Alsa`/`Oss`/`Jack`/`RSound` all resolve to the CPAL backend, which
/// itself picks the right platform host API at runtime (see `DESIGN.md`).
pub fn load_plugin(config: &OutputConfig) -> Result<Box<dyn OutputPlugin>, EngineError> {
    let mut plugin: Box<dyn OutputPlugin> = match config.kind() {
        DeviceKind::Alsa | DeviceKind::Oss | DeviceKind::Jack | DeviceKind::RSound => {
            Box::new(CpalOutputPlugin::new())
        }
        DeviceKind::Pulse => Box::new(PulseSimpleOutputPlugin::new()),
        DeviceKind::Wav => Box::new(WavFileOutputPlugin::new()),
        DeviceKind::None => Box::new(NullOutputPlugin::new()),
    };
    plugin.set_output_config(config)?;
    Ok(plugin)
}

/// `ap_version`'s analogue: every plugin this host can load, for discovery
/// UIs (`gap-cli`'s `--list-devices` among them).
pub fn supported_kinds() -> &'static [DeviceKind] {
    &[
        DeviceKind::Alsa,
        DeviceKind::Oss,
        DeviceKind::Pulse,
        DeviceKind::RSound,
        DeviceKind::Jack,
        DeviceKind::Wav,
        DeviceKind::None,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_none_kind_yields_a_null_plugin() {
        let plugin = load_plugin(&OutputConfig::None).unwrap();
        assert_eq!(plugin.kind(), DeviceKind::None);
    }

    #[test]
    fn loading_wav_kind_yields_a_wav_plugin() {
        let plugin = load_plugin(&OutputConfig::Wav { path: None }).unwrap();
        assert_eq!(plugin.kind(), DeviceKind::Wav);
    }

    #[test]
    fn supported_kinds_covers_every_device_kind() {
        assert_eq!(supported_kinds().len(), 7);
    }
}
