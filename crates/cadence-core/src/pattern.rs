//! Per-track patterns: note lists for melodic tracks, step grids for drums

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

/// Steps in one drum grid row
pub const STEP_COUNT: usize = 16;
/// Default pattern length in beats (one 4/4 bar)
pub const DEFAULT_PATTERN_BEATS: f64 = 4.0;
pub const DEFAULT_VELOCITY: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub u64);

impl std::fmt::Display for NoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A note in a pattern; `time` is relative to the pattern start, in beats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub id: NoteId,
    pub pitch: u8,
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    pub time: f64,
    pub duration: f64,
}

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

fn default_pattern_beats() -> f64 {
    DEFAULT_PATTERN_BEATS
}

impl Note {
    pub fn new(id: NoteId, pitch: u8, velocity: u8, time: f64, duration: f64) -> Self {
        Self { id, pitch, velocity, time, duration }
    }

    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    pub fn validate(&self, pattern_beats: f64) -> Result<()> {
        if self.pitch > 127 {
            return Err(CadenceError::invalid(format!("pitch {} out of range", self.pitch)));
        }
        if self.velocity > 127 {
            return Err(CadenceError::invalid(format!("velocity {} out of range", self.velocity)));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(CadenceError::invalid(format!("note duration {}", self.duration)));
        }
        if !self.time.is_finite() || self.time < 0.0 || self.time >= pattern_beats {
            return Err(CadenceError::invalid(format!(
                "note time {} outside pattern of {pattern_beats} beats",
                self.time
            )));
        }
        Ok(())
    }
}

/// Partial edit of a note; `None` fields keep their value
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoteUpdate {
    pub pitch: Option<u8>,
    pub velocity: Option<u8>,
    pub time: Option<f64>,
    pub duration: Option<f64>,
}

impl NoteUpdate {
    /// The note with this update applied, validated against the pattern
    pub fn apply(&self, note: &Note, pattern_beats: f64) -> Result<Note> {
        let updated = Note {
            id: note.id,
            pitch: self.pitch.unwrap_or(note.pitch),
            velocity: self.velocity.unwrap_or(note.velocity),
            time: self.time.unwrap_or(note.time),
            duration: self.duration.unwrap_or(note.duration),
        };
        updated.validate(pattern_beats)?;
        Ok(updated)
    }
}

/// Drum sound key -> one flag per step
pub type StepGrid = BTreeMap<String, Vec<bool>>;

/// Pattern body. Serialized as either a `notes` or a `stepGrid` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternContent {
    Notes(Vec<Note>),
    StepGrid(StepGrid),
}

impl PatternContent {
    pub fn shape(&self) -> &'static str {
        match self {
            PatternContent::Notes(_) => "notes",
            PatternContent::StepGrid(_) => "a step grid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    #[serde(default)]
    pub id: PatternId,
    #[serde(default)]
    pub name: String,
    /// Start on the timeline, in beats
    #[serde(default)]
    pub start_time: f64,
    /// Length in beats; the pattern repeats with this period
    #[serde(default = "default_pattern_beats")]
    pub duration: f64,
    #[serde(flatten)]
    pub content: PatternContent,
}

impl Pattern {
    pub fn with_notes(id: PatternId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            start_time: 0.0,
            duration: DEFAULT_PATTERN_BEATS,
            content: PatternContent::Notes(Vec::new()),
        }
    }

    pub fn with_steps(id: PatternId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            start_time: 0.0,
            duration: DEFAULT_PATTERN_BEATS,
            content: PatternContent::StepGrid(StepGrid::new()),
        }
    }

    pub fn notes(&self) -> Option<&[Note]> {
        match &self.content {
            PatternContent::Notes(notes) => Some(notes),
            PatternContent::StepGrid(_) => None,
        }
    }

    pub fn step_grid(&self) -> Option<&StepGrid> {
        match &self.content {
            PatternContent::StepGrid(grid) => Some(grid),
            PatternContent::Notes(_) => None,
        }
    }

    /// Length of one grid step in beats
    pub fn step_beats(&self) -> f64 {
        self.duration / STEP_COUNT as f64
    }

    /// True when playing the pattern would produce nothing
    pub fn is_silent(&self) -> bool {
        match &self.content {
            PatternContent::Notes(notes) => notes.is_empty(),
            PatternContent::StepGrid(grid) => grid.values().all(|row| !row.iter().any(|on| *on)),
        }
    }

    pub fn set_duration(&mut self, beats: f64) -> Result<()> {
        if !beats.is_finite() || beats <= 0.0 {
            return Err(CadenceError::invalid(format!("pattern length {beats}")));
        }
        self.duration = beats;
        if let PatternContent::Notes(notes) = &mut self.content {
            notes.retain(|n| n.time < beats);
        }
        Ok(())
    }

    pub fn set_start_time(&mut self, beats: f64) -> Result<()> {
        if !beats.is_finite() || beats < 0.0 {
            return Err(CadenceError::invalid(format!("pattern start {beats}")));
        }
        self.start_time = beats;
        Ok(())
    }

    pub fn clear(&mut self) {
        match &mut self.content {
            PatternContent::Notes(notes) => notes.clear(),
            PatternContent::StepGrid(grid) => grid.clear(),
        }
    }

    /// Flip one step; returns the new state
    pub fn toggle_step(&mut self, key: &str, step: usize) -> Result<bool> {
        if step >= STEP_COUNT {
            return Err(CadenceError::invalid(format!("step {step} outside 0..{STEP_COUNT}")));
        }
        let PatternContent::StepGrid(grid) = &mut self.content else {
            return Err(CadenceError::invalid("pattern has no step grid"));
        };
        let row = grid.entry(key.to_string()).or_insert_with(|| vec![false; STEP_COUNT]);
        row.resize(STEP_COUNT, false);
        row[step] = !row[step];
        Ok(row[step])
    }
}

/// Validate and normalize a grid so every row has exactly `STEP_COUNT` steps
pub fn normalize_grid(grid: StepGrid) -> Result<StepGrid> {
    grid.into_iter()
        .map(|(key, mut row)| {
            if key.is_empty() {
                return Err(CadenceError::invalid("empty drum sound key"));
            }
            if row.len() > STEP_COUNT {
                return Err(CadenceError::invalid(format!(
                    "row {key} has {} steps, expected {STEP_COUNT}",
                    row.len()
                )));
            }
            row.resize(STEP_COUNT, false);
            Ok((key, row))
        })
        .collect()
}
