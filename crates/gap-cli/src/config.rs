//! Persisted output configuration.
//!
//! `spec.md` §6 says "Persisted state: none is owned by the core; the
//! output configuration round-trips through a key/value store provided by
//! the embedder" — `gap-cli` is that embedder. Grounded on the pattern
//! `ampactor-sonido`'s `sonido-config::paths` and `enscrypted-gecko`'s
//! settings loading both use: `directories` to find the OS config
//! directory, a single TOML file underneath it, missing-file-is-not-an-error
//! semantics on load.

use std::path::PathBuf;

use directories::ProjectDirs;
use gap_types::OutputConfig;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "goggles";
const APPLICATION: &str = "gap";
const CONFIG_FILE: &str = "output.toml";

#[derive(serde::Serialize, serde::Deserialize)]
struct PersistedConfig {
    output: OutputConfig,
}

fn config_path() -> Option<PathBuf> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Load the persisted output configuration, or `OutputConfig::None` if no
/// config directory is resolvable, no file exists yet, or the file fails to
/// parse (a corrupt config file is logged and treated as absent rather than
/// aborting startup).
pub fn load_output_config() -> OutputConfig {
    let Some(path) = config_path() else {
        return OutputConfig::None;
    };
    let Ok(text) = std::fs::read_to_string(&path) else {
        return OutputConfig::None;
    };
    match toml::from_str::<PersistedConfig>(&text) {
        Ok(cfg) => cfg.output,
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to parse output config, ignoring: {e}");
            OutputConfig::None
        }
    }
}

/// Persist `config` to the OS config directory. Best-effort: a failure to
/// create the directory or write the file is logged, not fatal — the
/// engine itself owns no persistence and runs fine without it.
pub fn save_output_config(config: &OutputConfig) {
    let Some(path) = config_path() else {
        tracing::warn!("no resolvable config directory; output config not saved");
        return;
    };
    let persisted = PersistedConfig { output: config.clone() };
    let text = match toml::to_string_pretty(&persisted) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("failed to serialize output config: {e}");
            return;
        }
    };
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(dir = %parent.display(), "failed to create config directory: {e}");
            return;
        }
    }
    if let Err(e) = std::fs::write(&path, text) {
        tracing::warn!(path = %path.display(), "failed to write output config: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let cfg = OutputConfig::Alsa {
            device: "hw:0".to_string(),
            mmap: true,
            no_resample: false,
        };
        let persisted = PersistedConfig { output: cfg.clone() };
        let text = toml::to_string_pretty(&persisted).unwrap();
        let back: PersistedConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.output, cfg);
    }

    #[test]
    fn none_kind_round_trips() {
        let persisted = PersistedConfig { output: OutputConfig::None };
        let text = toml::to_string_pretty(&persisted).unwrap();
        let back: PersistedConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.output, OutputConfig::None);
    }
}
