use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cadence_core::{KeyBindings, RecorderConfig};
use cadence_services::EngineConfig;
use tracing::warn;

pub const DEFAULT_LOG_FILTER: &str = "cadence=info";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Grid divisions per beat for recorded notes
    pub record_subdivision: u32,
    pub min_note_beats: f64,
    pub log_filter: String,
    /// Extra live-input keys, e.g. `z = "B3"`, on top of the default layout
    pub keys: BTreeMap<String, String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let recorder = RecorderConfig::default();
        Self {
            sample_rate: engine.sample_rate,
            block_size: engine.block_size,
            record_subdivision: recorder.subdivision,
            min_note_beats: recorder.min_note_beats,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            keys: BTreeMap::new(),
        }
    }
}

impl CliConfig {
    pub fn engine(&self) -> EngineConfig {
        EngineConfig { sample_rate: self.sample_rate.max(1), block_size: self.block_size.max(1) }
    }

    pub fn recorder(&self) -> RecorderConfig {
        RecorderConfig { subdivision: self.record_subdivision.max(1), min_note_beats: self.min_note_beats }
    }

    /// Add the configured keys; a bad note name skips that key
    pub fn apply_keys(&self, bindings: &mut KeyBindings) {
        for (key, note) in &self.keys {
            if let Err(e) = bindings.bind_note(key.as_str(), note) {
                warn!(key = %key, note = %note, error = %e, "Ignoring key binding");
            }
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
        .join("config.toml")
}

/// Read the config file; a missing file gives the defaults
pub fn load_config(path: Option<&Path>) -> anyhow::Result<CliConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Ok(CliConfig::default());
    };
    parse_config(&s).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
}

pub fn parse_config(s: &str) -> Result<CliConfig, toml::de::Error> {
    let config: CliConfig = toml::from_str(s)?;
    if config.min_note_beats <= 0.0 {
        warn!(min_note_beats = config.min_note_beats, "Ignoring non-positive minimum note length");
        return Ok(CliConfig { min_note_beats: RecorderConfig::default().min_note_beats, ..config });
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let config = parse_config("sample_rate = 48000\n").unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.block_size, 512);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.recorder(), RecorderConfig::default());
    }

    #[test]
    fn test_engine_config_never_zero() {
        let config = parse_config("sample_rate = 0\nblock_size = 0\nrecord_subdivision = 0\n").unwrap();
        let engine = config.engine();
        assert_eq!((engine.sample_rate, engine.block_size), (1, 1));
        assert_eq!(config.recorder().subdivision, 1);
    }

    #[test]
    fn test_key_bindings_from_config() {
        let config = parse_config("[keys]\nz = \"B3\"\nx = \"nope\"\n").unwrap();
        assert_eq!(config.keys.len(), 2);
        let mut bindings = KeyBindings::default();
        bindings.shift_octave(-1);
        config.apply_keys(&mut bindings);
        assert_eq!(bindings.pitch_for("z"), Some(59));
        assert_eq!(bindings.pitch_for("x"), None);
        assert_eq!(bindings.pitch_for("a"), Some(48));
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(parse_config("sample_rate = \"fast\"").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/cadence.toml"))).unwrap();
        assert_eq!(config, CliConfig::default());
    }
}
