//! Command-line interface definitions.
//!
//! This module contains the `clap`-powered CLI surface area (args + defaults).
//! It intentionally has no audio logic so the rest of the crate can stay
//! reusable from a test or an alternate front-end.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "gap", about = "Goggles Audio Player engine CLI")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Output device kind to use (defaults to the persisted config, or `alsa`)
    #[arg(long, value_enum, global = true)]
    pub output: Option<OutputKind>,

    /// Output device name substring (ALSA/OSS/JACK/RSound all resolve through CPAL)
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// WAV output file path, only meaningful with `--output wav`
    #[arg(long, global = true)]
    pub wav_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open and play a local file path or an http(s):// URL until it ends
    Play {
        /// Path or URL to play
        url: String,

        /// Linear volume in [0, 1] (default 1.0)
        #[arg(long)]
        volume: Option<f32>,

        /// Replay-gain mode to apply
        #[arg(long, value_enum)]
        replay_gain: Option<ReplayGainMode>,

        /// Start playback at this fraction of the stream, in [0, 1]
        #[arg(long)]
        seek: Option<f64>,
    },

    /// List output devices CPAL can see on this host
    ListDevices,

    /// Print the persisted output configuration and exit
    ShowConfig,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputKind {
    Alsa,
    Oss,
    Pulse,
    Rsound,
    Jack,
    Wav,
    None,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReplayGainMode {
    Off,
    Track,
    Album,
}
