//! The GAP playback engine: a three-stage pipeline (input, decoder, output)
//! connected by per-actor event FIFOs and a shared packet pool.
//!
//! [`engine::Engine`] is the entry point a host embeds; everything else here
//! is the machinery it wires together.

pub mod codec;
pub mod convert;
pub mod decoder;
pub mod device;
pub mod devices;
pub mod engine;
pub mod error;
pub mod event;
pub mod fifo;
pub mod host;
pub mod http_source;
pub mod input;
pub mod output;
pub mod packet;
pub mod pool;
pub mod reactor;
pub mod reader;
pub mod resample;
pub mod timers;

pub use engine::Engine;
pub use error::EngineError;
