//! Top-level execution helpers dispatching a parsed `cli::Command`.

use gap_types::{DeviceKind, OutputConfig};

use crate::cli::{Args, Command, OutputKind, ReplayGainMode};
use crate::config;
use crate::player::{PlayOptions, Player};

/// List output devices CPAL can see on this host and print them to stdout.
pub fn list_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    gap_engine::devices::cpal_support::list_devices(&host)
}

/// Print the persisted output configuration and exit.
pub fn show_config() {
    let config = config::load_output_config();
    println!("{config:#?}");
}

/// Resolve the effective `OutputConfig` for this invocation: CLI flags
/// override the persisted config, which defaults to `Alsa` on first run
/// (the teacher's `bridge` defaults to whatever CPAL's default host API is,
/// which on Linux is typically ALSA).
pub fn resolve_output_config(args: &Args, persisted: OutputConfig) -> OutputConfig {
    let Some(kind) = args.output else {
        return persisted;
    };
    match kind {
        OutputKind::Alsa => OutputConfig::Alsa {
            device: args.device.clone().unwrap_or_default(),
            mmap: false,
            no_resample: false,
        },
        OutputKind::Oss => OutputConfig::Oss { device: args.device.clone().unwrap_or_default() },
        OutputKind::Pulse => OutputConfig::Pulse { server: None, sink: args.device.clone() },
        OutputKind::Rsound => OutputConfig::RSound { host: args.device.clone() },
        OutputKind::Jack => OutputConfig::Jack {
            client_name: args.device.clone().unwrap_or_else(|| "gap".to_string()),
        },
        OutputKind::Wav => OutputConfig::Wav { path: args.wav_path.clone() },
        OutputKind::None => OutputConfig::None,
    }
}

/// Run a single `play` invocation: apply the output config, play `url`
/// until it ends, and persist the config actually used.
pub fn run_play(args: &Args, url: &str, volume: Option<f32>, replay_gain: Option<ReplayGainMode>, seek: Option<f64>) -> anyhow::Result<()> {
    let persisted = config::load_output_config();
    let output_config = resolve_output_config(args, persisted);

    let mut player = Player::new();
    player.set_output_config(output_config.clone());

    install_ctrlc_handler();

    let opts = PlayOptions {
        volume,
        replay_gain: replay_gain.map(map_replay_gain_mode),
        seek,
    };
    let reason = player.play_blocking(url, &opts);
    player.quit();

    config::save_output_config(&output_config);

    match reason {
        gap_types::PlaybackEndReason::Eof | gap_types::PlaybackEndReason::Stopped => Ok(()),
        gap_types::PlaybackEndReason::Error => {
            anyhow::bail!("playback of {url} ended with an error")
        }
    }
}

fn map_replay_gain_mode(mode: ReplayGainMode) -> gap_types::GainMode {
    match mode {
        ReplayGainMode::Off => gap_types::GainMode::Off,
        ReplayGainMode::Track => gap_types::GainMode::Track,
        ReplayGainMode::Album => gap_types::GainMode::Album,
    }
}

/// Exit promptly on Ctrl-C rather than leaving stage threads blocked on a
/// device write — the same `std::process::exit` shortcut the teacher's
/// `bridge::main` uses, since there is no in-flight state here worth
/// flushing to disk before exit.
fn install_ctrlc_handler() {
    let _ = ctrlc::set_handler(|| {
        tracing::info!("interrupted");
        std::process::exit(130);
    });
}

/// Dispatch a fully-parsed `Args` to the right top-level action.
pub fn run(args: Args) -> anyhow::Result<()> {
    match &args.cmd {
        Command::ListDevices => list_devices(),
        Command::ShowConfig => {
            show_config();
            Ok(())
        }
        Command::Play { url, volume, replay_gain, seek } => {
            run_play(&args, url, *volume, *replay_gain, *seek)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn resolve_output_config_defaults_to_persisted_when_unset() {
        let args = Args::parse_from(["gap", "list-devices"]);
        let persisted = OutputConfig::Wav { path: None };
        assert_eq!(resolve_output_config(&args, persisted.clone()), persisted);
    }

    #[test]
    fn resolve_output_config_cli_flag_overrides_persisted() {
        let args = Args::parse_from(["gap", "--output", "wav", "play", "track.flac"]);
        let persisted = OutputConfig::Alsa { device: String::new(), mmap: false, no_resample: false };
        assert_eq!(resolve_output_config(&args, persisted).kind(), DeviceKind::Wav);
    }

    #[test]
    fn map_replay_gain_mode_matches_variants() {
        assert_eq!(map_replay_gain_mode(ReplayGainMode::Off), gap_types::GainMode::Off);
        assert_eq!(map_replay_gain_mode(ReplayGainMode::Track), gap_types::GainMode::Track);
        assert_eq!(map_replay_gain_mode(ReplayGainMode::Album), gap_types::GainMode::Album);
    }
}
