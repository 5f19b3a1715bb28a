//! Live keyboard input: key bindings, held-note tracking and quantization

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};
use crate::theory::parse_note_name;
use crate::track::TrackId;

pub const DEFAULT_SUBDIVISION: u32 = 4;
pub const DEFAULT_MIN_NOTE_BEATS: f64 = 0.25;
pub const DEFAULT_LIVE_VELOCITY: u8 = 80;
/// Octave the default layout starts at (C4 = 60)
pub const BASE_OCTAVE: i8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Grid divisions per beat; 4 = sixteenth notes
    pub subdivision: u32,
    /// Shortest note a key press can produce, in beats
    pub min_note_beats: f64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { subdivision: DEFAULT_SUBDIVISION, min_note_beats: DEFAULT_MIN_NOTE_BEATS }
    }
}

impl RecorderConfig {
    pub fn grid_beats(&self) -> f64 {
        1.0 / self.subdivision.max(1) as f64
    }
}

/// Computer-keyboard piano layout: home row for white keys, the row above
/// for black keys
const DEFAULT_LAYOUT: &[(&str, u8)] = &[
    ("a", 0),
    ("w", 1),
    ("s", 2),
    ("e", 3),
    ("d", 4),
    ("f", 5),
    ("t", 6),
    ("g", 7),
    ("y", 8),
    ("h", 9),
    ("u", 10),
    ("j", 11),
    ("k", 12),
    ("o", 13),
    ("l", 14),
    ("p", 15),
    (";", 16),
];

#[derive(Debug, Clone, PartialEq)]
pub struct KeyBindings {
    /// key -> semitones above the current octave's C
    offsets: HashMap<String, u8>,
    octave: i8,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            offsets: DEFAULT_LAYOUT.iter().map(|(k, o)| (k.to_string(), *o)).collect(),
            octave: BASE_OCTAVE,
        }
    }
}

impl KeyBindings {
    pub fn octave(&self) -> i8 {
        self.octave
    }

    pub fn set_octave(&mut self, octave: i8) {
        self.octave = octave.clamp(0, 8);
    }

    pub fn shift_octave(&mut self, delta: i8) {
        self.set_octave(self.octave.saturating_add(delta));
    }

    pub fn bind(&mut self, key: impl Into<String>, semitones: u8) {
        self.offsets.insert(key.into().to_lowercase(), semitones);
    }

    /// Bind `key` to a named note such as "F#4", relative to the current octave
    pub fn bind_note(&mut self, key: impl Into<String>, name: &str) -> Result<()> {
        let pitch = parse_note_name(name).ok_or_else(|| CadenceError::invalid(format!("note name {name:?}")))?;
        let offset = pitch as i16 - (self.octave as i16 + 1) * 12;
        let offset = u8::try_from(offset)
            .map_err(|_| CadenceError::invalid(format!("{name} is below octave {}", self.octave)))?;
        self.bind(key, offset);
        Ok(())
    }

    /// Pitch for an input key at the current octave
    pub fn pitch_for(&self, key: &str) -> Option<u8> {
        let offset = *self.offsets.get(&key.to_lowercase())?;
        let pitch = (self.octave as i16 + 1) * 12 + offset as i16;
        u8::try_from(pitch).ok().filter(|p| *p <= 127)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeldNote {
    track: TrackId,
    velocity: u8,
    down_beat: f64,
}

/// A completed key press, still in absolute beats
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Release {
    pub track: TrackId,
    pub pitch: u8,
    pub velocity: u8,
    pub down_beat: f64,
    pub up_beat: f64,
    /// How long the key was down, in beats, counting loop wraps
    pub held_beats: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LiveRecorder {
    config: RecorderConfig,
    bindings: KeyBindings,
    armed: Option<TrackId>,
    active: HashMap<u8, HeldNote>,
}

impl LiveRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self { config, ..Default::default() }
    }

    pub fn config(&self) -> RecorderConfig {
        self.config
    }

    pub fn set_config(&mut self, config: RecorderConfig) {
        self.config = config;
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut KeyBindings {
        &mut self.bindings
    }

    pub fn arm(&mut self, track: TrackId) {
        self.armed = Some(track);
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    pub fn armed(&self) -> Option<TrackId> {
        self.armed
    }

    pub fn is_active(&self, pitch: u8) -> bool {
        self.active.contains_key(&pitch)
    }

    /// Register a key press. Returns false when the pitch is already held.
    pub fn press(&mut self, track: TrackId, pitch: u8, velocity: u8, position_beats: f64) -> bool {
        if self.active.contains_key(&pitch) {
            return false;
        }
        self.active.insert(pitch, HeldNote { track, velocity, down_beat: position_beats });
        true
    }

    /// Register a key release. With a loop running, a release that lands
    /// before its press wrapped past the loop end once.
    pub fn release(&mut self, pitch: u8, position_beats: f64, loop_beats: Option<f64>) -> Option<Release> {
        let held = self.active.remove(&pitch)?;
        let mut held_beats = position_beats - held.down_beat;
        if held_beats < 0.0 {
            if let Some(length) = loop_beats {
                held_beats += length;
            }
        }
        Some(Release {
            track: held.track,
            pitch,
            velocity: held.velocity,
            down_beat: held.down_beat,
            up_beat: position_beats,
            held_beats: held_beats.max(0.0),
        })
    }

    /// Forget every held key, e.g. when the transport stops
    pub fn release_all(&mut self) {
        self.active.clear();
    }

    pub fn quantize(&self, release: &Release, pattern_start: f64, pattern_beats: f64) -> (f64, f64) {
        quantize(release.down_beat, release.held_beats, pattern_start, pattern_beats, &self.config)
    }
}

fn snap(beat: f64, grid: f64) -> f64 {
    (beat / grid).round() * grid
}

/// Snap a key press to the grid and express it relative to its pattern.
///
/// Returns `(time, duration)` in beats: the start is rounded to the nearest
/// grid line and folded into `[0, pattern_beats)`; the end is rounded the same
/// way and the duration is at least one grid step.
pub fn quantize(
    down_beat: f64,
    held_beats: f64,
    pattern_start: f64,
    pattern_beats: f64,
    config: &RecorderConfig,
) -> (f64, f64) {
    let grid = config.grid_beats();
    let held = held_beats.max(config.min_note_beats);
    let start = snap(down_beat, grid);
    let end = snap(down_beat + held, grid);
    let duration = (end - start).max(grid);
    let mut time = (start - pattern_start).rem_euclid(pattern_beats);
    if time >= pattern_beats {
        time = 0.0;
    }
    (time, duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let keys = KeyBindings::default();
        assert_eq!(keys.pitch_for("a"), Some(60));
        assert_eq!(keys.pitch_for("W"), Some(61));
        assert_eq!(keys.pitch_for("k"), Some(72));
        assert_eq!(keys.pitch_for("z"), None);
    }

    #[test]
    fn test_octave_shift() {
        let mut keys = KeyBindings::default();
        keys.shift_octave(-1);
        assert_eq!(keys.pitch_for("a"), Some(48));
        keys.set_octave(20);
        assert_eq!(keys.octave(), 8);
        assert_eq!(keys.pitch_for("a"), Some(108));
        keys.bind("X", 30);
        // past the MIDI range
        assert_eq!(keys.pitch_for("x"), None);
    }

    #[test]
    fn test_bind_note_by_name() {
        let mut keys = KeyBindings::default();
        keys.bind_note("z", "F#4").unwrap();
        assert_eq!(keys.pitch_for("z"), Some(66));
        keys.bind_note("x", "C5").unwrap();
        keys.shift_octave(-1);
        assert_eq!(keys.pitch_for("x"), Some(60));
        // below the current octave's C, or not a note at all
        assert!(keys.bind_note("c", "B2").is_err());
        assert!(keys.bind_note("c", "H4").is_err());
        assert_eq!(keys.pitch_for("c"), None);
    }

    #[test]
    fn test_quantize_at_120_bpm() {
        // down at 0.47 s, up at 0.81 s, 0.5 s per beat
        let (time, duration) = quantize(0.94, 0.68, 0.0, 4.0, &RecorderConfig::default());
        assert!((time * 0.5 - 0.5).abs() < 1e-9);
        assert!((duration * 0.5 - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_quantize_enforces_minimum_and_wraps() {
        let config = RecorderConfig::default();
        // a tap shorter than the minimum still yields one grid step
        let (time, duration) = quantize(5.02, 0.01, 0.0, 4.0, &config);
        assert_eq!(time, 1.0);
        assert_eq!(duration, 0.25);

        // relative to a pattern starting at beat 2
        let (time, _) = quantize(2.5, 0.5, 2.0, 4.0, &config);
        assert_eq!(time, 0.5);

        // rounding up onto the pattern end folds back to 0
        let (time, _) = quantize(3.99, 0.51, 0.0, 4.0, &config);
        assert_eq!(time, 0.0);
    }

    #[test]
    fn test_retrigger_ignored_until_release() {
        let mut rec = LiveRecorder::default();
        assert!(rec.press(TrackId(1), 60, 80, 0.0));
        assert!(!rec.press(TrackId(1), 60, 80, 0.5));
        let r = rec.release(60, 1.0, None).unwrap();
        assert_eq!(r.down_beat, 0.0);
        assert_eq!(r.up_beat, 1.0);
        assert_eq!(r.held_beats, 1.0);
        assert!(rec.release(60, 1.5, None).is_none());
        assert!(rec.press(TrackId(1), 60, 80, 2.0));
    }

    #[test]
    fn test_hold_across_loop_end_keeps_length() {
        let mut rec = LiveRecorder::default();
        rec.press(TrackId(1), 64, 80, 3.5);
        let r = rec.release(64, 0.5, Some(4.0)).unwrap();
        assert_eq!(r.held_beats, 1.0);
        let (time, duration) = rec.quantize(&r, 0.0, 4.0);
        assert_eq!(time, 3.5);
        assert_eq!(duration, 1.0);

        // without a loop a backwards release is treated as a tap
        rec.press(TrackId(1), 64, 80, 3.5);
        let r = rec.release(64, 0.5, None).unwrap();
        assert_eq!(r.held_beats, 0.0);
        assert_eq!(rec.quantize(&r, 0.0, 4.0).1, 0.25);
    }
}
