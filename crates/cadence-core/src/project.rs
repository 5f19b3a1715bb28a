//! Project export/import (JSON)

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::track::Track;
use crate::transport::{TimeSignature, DEFAULT_BPM, DEFAULT_LOOP_END, DEFAULT_LOOP_START};

pub const PROJECT_VERSION: &str = "1.0";

fn default_version() -> String {
    PROJECT_VERSION.to_string()
}

fn default_bpm() -> f64 {
    DEFAULT_BPM
}

fn default_loop_start() -> f64 {
    DEFAULT_LOOP_START
}

fn default_loop_end() -> f64 {
    DEFAULT_LOOP_END
}

/// Everything needed to restore a session. Fields missing from a file take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    #[serde(default)]
    pub time_signature: TimeSignature,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub loop_enabled: bool,
    #[serde(default = "default_loop_start")]
    pub loop_start: f64,
    #[serde(default = "default_loop_end")]
    pub loop_end: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            version: default_version(),
            bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            tracks: Vec::new(),
            loop_enabled: false,
            loop_start: DEFAULT_LOOP_START,
            loop_end: DEFAULT_LOOP_END,
            created_at: None,
        }
    }
}

impl Project {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Write a project file, creating parent directories as needed
pub fn save_project(path: &Path, project: &Project) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, project.to_json()?)?;
    tracing::info!(path = %path.display(), tracks = project.tracks.len(), "Saved project");
    Ok(())
}

pub fn load_project(path: &Path) -> Result<Project> {
    let data = std::fs::read_to_string(path)?;
    let project = Project::from_json(&data)?;
    tracing::info!(path = %path.display(), tracks = project.tracks.len(), "Loaded project");
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let p = Project::from_json("{}").unwrap();
        assert_eq!(p.version, PROJECT_VERSION);
        assert_eq!(p.bpm, 120.0);
        assert_eq!(p.loop_start, 0.0);
        assert_eq!(p.loop_end, 16.0);
        assert_eq!(p.time_signature, TimeSignature::default());
        assert!(p.created_at.is_none());
    }

    #[test]
    fn test_camel_case_keys() {
        let p = Project { created_at: Some(Utc::now()), ..Default::default() };
        let json: serde_json::Value = serde_json::from_str(&p.to_json().unwrap()).unwrap();
        for key in ["version", "bpm", "timeSignature", "tracks", "loopEnabled", "loopStart", "loopEnd", "createdAt"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_zero_time_signature_is_rejected() {
        let json = r#"{"timeSignature": {"numerator": 0, "denominator": 4}}"#;
        assert!(Project::from_json(json).is_err());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(Project::from_json("{\"bpm\": \"fast\"}").is_err());
        assert!(Project::from_json("not json").is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = std::env::temp_dir().join(format!("cadence-project-{}", std::process::id()));
        let path = dir.join("nested").join("song.json");
        let p = Project { bpm: 97.0, ..Default::default() };
        save_project(&path, &p).unwrap();
        let back = load_project(&path).unwrap();
        assert_eq!(back, p);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
