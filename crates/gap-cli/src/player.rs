//! The blocking single-track player loop.
//!
//! Grounded on the teacher's `bridge::player` worker thread in shape (spawn
//! the engine, drive it through a command vocabulary, fold its status
//! stream), generalized to drive `gap_engine::Engine` instead of directly
//! wiring `cpal`/`symphonia` — that wiring now lives in the engine crate.

use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use gap_engine::Engine;
use gap_types::{GainMode, OutputConfig, PlaybackEndReason, ReplayGain};

use crate::status::StatusTracker;

/// Options for a single `play_blocking` call, mirroring the control
/// vocabulary of `spec.md` §4.2/§4.4 that applies before or at Open.
#[derive(Clone, Debug, Default)]
pub struct PlayOptions {
    pub volume: Option<f32>,
    pub replay_gain: Option<GainMode>,
    pub seek: Option<f64>,
}

/// Owns a running `Engine` and plays tracks on it one at a time, blocking
/// until each one reaches a terminal state.
pub struct Player {
    engine: Engine,
    tracker: StatusTracker,
}

/// How often `play_blocking` wakes up with no notification pending, purely
/// so a host embedding this loop differently could add its own polling
/// (e.g. a TUI progress bar) without this crate growing a callback API.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

impl Player {
    pub fn new() -> Self {
        Player { engine: Engine::start(), tracker: StatusTracker::new() }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn set_output_config(&self, config: OutputConfig) {
        self.engine.set_output_config(config);
    }

    /// Open `url` and block until the stream reaches end-of-stream or a
    /// fatal error, printing every notification as it arrives.
    pub fn play_blocking(&mut self, url: &str, opts: &PlayOptions) -> PlaybackEndReason {
        if let Some(mode) = opts.replay_gain {
            self.engine.set_replay_gain(mode, ReplayGain::default());
        }
        if let Some(volume) = opts.volume {
            self.engine.set_volume(volume.clamp(0.0, 1.0));
        }

        self.engine.open(url);

        if let Some(position) = opts.seek {
            self.engine.seek(position.clamp(0.0, 1.0));
        }

        loop {
            match self.engine.notifications().recv_timeout(POLL_INTERVAL) {
                Ok(notification) => {
                    if self.tracker.apply(&notification) {
                        return self
                            .tracker
                            .status()
                            .end_reason
                            .unwrap_or(PlaybackEndReason::Eof);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return PlaybackEndReason::Error,
            }
        }
    }

    pub fn quit(self) {
        self.engine.quit();
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn play_options_default_to_unset() {
        let opts = PlayOptions::default();
        assert!(opts.volume.is_none());
        assert!(opts.replay_gain.is_none());
        assert!(opts.seek.is_none());
    }

    #[test]
    fn playing_a_missing_file_surfaces_as_an_error() {
        let mut player = Player::new();
        let reason = player.play_blocking("/nonexistent/path/does-not-exist.flac", &PlayOptions::default());
        assert_eq!(reason, PlaybackEndReason::Error);
        player.quit();
    }
}
