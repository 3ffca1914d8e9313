//! Concrete `OutputPlugin` implementations, one per `DeviceKind`.

pub mod cpal_plugin;
pub mod cpal_support;
pub mod null_plugin;
pub mod pulse_plugin;
pub mod wav_plugin;

pub use cpal_plugin::CpalOutputPlugin;
pub use null_plugin::NullOutputPlugin;
pub use pulse_plugin::PulseSimpleOutputPlugin;
pub use wav_plugin::WavFileOutputPlugin;
