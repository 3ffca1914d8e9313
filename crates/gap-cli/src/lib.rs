//! `gap-cli` entry points.
//!
//! A thin host application over `gap-engine`: CLI parsing, persisted output
//! configuration, and a blocking playback loop that prints the engine's
//! notification stream. It plays the role "the application" plays
//! throughout `spec.md` §6.

/// Command-line argument definitions.
pub mod cli;
/// Persisted output configuration (TOML, under the OS config dir).
pub mod config;
/// The blocking single-track player loop built on `gap_engine::Engine`.
pub mod player;
/// Top-level execution helpers dispatching parsed `cli::Command`s.
pub mod runtime;
/// Notification-stream-to-status folding and logging.
pub mod status;
