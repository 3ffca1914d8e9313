//! Engine-internal error type.
//!
//! `spec.md` §7 requires every internal failure to surface as an
//! `ErrorMessage` notification rather than aborting the process, so stage
//! threads carry failures as `Result<_, EngineError>` and translate them
//! into notifications at the point they're caught, the way the teacher's
//! `bridge`/`audio-player` functions return `anyhow::Result` at their own
//! edges. A concrete `thiserror` enum is used here instead of `anyhow`
//! because `gap-engine` is a library crate whose errors a host may want to
//! match on (e.g. to decide whether a failure is retryable).
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open source: {0}")]
    OpenFailed(String),

    #[error("unsupported or unavailable codec: {0}")]
    UnsupportedCodec(String),

    #[error("decoder error: {0}")]
    DecodeFailed(String),

    #[error("output device error: {0}")]
    DeviceFailed(String),

    #[error("output plugin load failed for {kind:?}: {reason}")]
    PluginLoadFailed { kind: gap_types::DeviceKind, reason: String },

    #[error("format conversion unsupported: {0}")]
    UnsupportedConversion(String),

    #[error("operation interrupted by a control event")]
    Interrupted,
}
