//! The output plugin contract (§4.6).
//!
//! The source ships plugins as native shared libraries behind
//! `ap_load_plugin`/`ap_free_plugin`/`ap_version`. Per the design notes —
//! "Codec/reader plugins can be internal trait objects since they are not
//! separately shipped" — this project extends that reasoning to the output
//! side as well (see `DESIGN.md`'s Open Question entry): none of the
//! concrete plugins below are shipped independently of `gap-engine`, so a
//! `Box<dyn OutputPlugin>` stands in for the dynamic loader. The public
//! contract is otherwise reproduced field-for-field.

use gap_types::{AudioFormat, DeviceKind, OutputConfig};

use crate::error::EngineError;

/// A loaded output device. Exactly one instance is alive at a time, owned
/// solely by the output stage.
pub trait OutputPlugin: Send {
    fn kind(&self) -> DeviceKind;

    /// Accept a device-kind-specific configuration. Most plugins have
    /// nothing to do here beyond validating the kind matches.
    fn set_output_config(&mut self, config: &OutputConfig) -> Result<(), EngineError>;

    /// Prepare the device for `format`. The plugin may accept a different
    /// (compatible) format; the returned `AudioFormat` is what the stage
    /// should treat as the device format from then on.
    fn configure(&mut self, format: &AudioFormat) -> Result<AudioFormat, EngineError>;

    /// Blocking write of exactly `buf.len() / frame_bytes` frames. An `Err`
    /// is fatal and must close the device.
    fn write(&mut self, buf: &[u8]) -> Result<(), EngineError>;

    /// Unplayed frames presently buffered by the device (or this plugin's
    /// own software buffer, for backends with no hardware delay query).
    fn delay(&self) -> i64;

    /// Discard unplayed frames immediately.
    fn drop_buffered(&mut self);

    /// Block until the device empties.
    fn drain(&mut self);

    fn can_pause(&self) -> bool {
        true
    }

    /// Pause/resume; a no-op if `can_pause()` is false.
    fn pause(&mut self, paused: bool);

    fn set_volume(&mut self, value: f32);
    fn volume(&self) -> f32;

    /// Release device resources. Safe to call repeatedly.
    fn close(&mut self);
}
