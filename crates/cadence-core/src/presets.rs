//! Built-in preset tables: instruments, tempos, drum kits and drum patterns.
//!
//! Every lookup falls back to a documented default instead of failing, so a
//! project written by a newer build still loads.

use serde::{Deserialize, Serialize};

use crate::pattern::{StepGrid, STEP_COUNT};

pub const DEFAULT_INSTRUMENT: &str = "synth";
pub const DEFAULT_DRUM_KIT: &str = "electronic";
pub const DEFAULT_TEMPO_BPM: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Envelope {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self { attack, decay, sustain, release }
    }
}

/// Synthesis method behind a preset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthFamily {
    /// Polyphonic oscillator + envelope
    Poly,
    /// Single voice, last note wins
    Mono,
    /// Two-operator FM
    Fm { index: f32 },
    /// Carrier ring-modulated by a square wave
    Am,
    /// Plucked string
    Pluck,
    /// Pitched playback of a sample table
    Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentPreset {
    pub key: &'static str,
    pub name: &'static str,
    pub family: SynthFamily,
    pub waveform: Waveform,
    pub envelope: Envelope,
    /// Lowpass cutoff in Hz
    pub filter_cutoff: Option<f32>,
}

const fn preset(
    key: &'static str,
    name: &'static str,
    family: SynthFamily,
    waveform: Waveform,
    envelope: Envelope,
    filter_cutoff: Option<f32>,
) -> InstrumentPreset {
    InstrumentPreset { key, name, family, waveform, envelope, filter_cutoff }
}

pub const INSTRUMENTS: &[InstrumentPreset] = &[
    preset("synth", "Basic Synth", SynthFamily::Poly, Waveform::Triangle, Envelope::new(0.01, 0.3, 0.3, 0.8), None),
    preset("synth-lead", "Synth Lead", SynthFamily::Mono, Waveform::Square, Envelope::new(0.01, 0.3, 0.4, 0.5), Some(8000.0)),
    preset("synth-bass", "Synth Bass", SynthFamily::Poly, Waveform::Square, Envelope::new(0.01, 0.15, 0.4, 0.3), Some(800.0)),
    preset("synth-pad", "Synth Pad", SynthFamily::Poly, Waveform::Triangle, Envelope::new(0.8, 0.5, 0.7, 1.5), Some(1500.0)),
    preset("am-synth", "AM Synth", SynthFamily::Am, Waveform::Sawtooth, Envelope::new(0.01, 0.3, 0.3, 0.8), None),
    preset("fm-synth", "FM Synth", SynthFamily::Fm { index: 10.0 }, Waveform::Sine, Envelope::new(0.01, 0.2, 0.2, 0.6), None),
    preset("piano", "Acoustic Piano", SynthFamily::Sampler, Waveform::Sine, Envelope::new(0.01, 0.0, 1.0, 1.0), None),
    preset("electric-piano", "Electric Piano", SynthFamily::Fm { index: 3.0 }, Waveform::Sine, Envelope::new(0.01, 0.3, 0.1, 0.8), None),
    preset("organ", "Hammond Organ", SynthFamily::Poly, Waveform::Sine, Envelope::new(0.01, 0.0, 1.0, 0.5), None),
    preset("strings", "String Section", SynthFamily::Poly, Waveform::Sawtooth, Envelope::new(0.3, 0.2, 0.8, 1.2), Some(2000.0)),
    preset("bass", "Electric Bass", SynthFamily::Mono, Waveform::Sawtooth, Envelope::new(0.01, 0.1, 0.9, 0.3), Some(300.0)),
    preset("brass", "Brass Section", SynthFamily::Am, Waveform::Sawtooth, Envelope::new(0.1, 0.2, 0.6, 0.8), None),
    preset("pad", "Pad", SynthFamily::Poly, Waveform::Triangle, Envelope::new(0.5, 0.3, 0.7, 2.0), Some(2000.0)),
    preset("pluck", "Pluck", SynthFamily::Pluck, Waveform::Sawtooth, Envelope::new(0.001, 1.0, 0.0, 1.0), Some(4000.0)),
];

/// Look up an instrument preset, falling back to the basic synth
pub fn instrument(key: &str) -> &'static InstrumentPreset {
    INSTRUMENTS
        .iter()
        .find(|p| p.key == key)
        .unwrap_or(&INSTRUMENTS[0])
}

pub fn is_known_instrument(key: &str) -> bool {
    INSTRUMENTS.iter().any(|p| p.key == key)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoPreset {
    pub key: &'static str,
    pub name: &'static str,
    pub bpm: f64,
}

pub const TEMPOS: &[TempoPreset] = &[
    TempoPreset { key: "ballad", name: "Ballad", bpm: 70.0 },
    TempoPreset { key: "pop", name: "Pop", bpm: 120.0 },
    TempoPreset { key: "rock", name: "Rock", bpm: 140.0 },
    TempoPreset { key: "dance", name: "Dance", bpm: 128.0 },
    TempoPreset { key: "hiphop", name: "Hip-Hop", bpm: 90.0 },
    TempoPreset { key: "jazz", name: "Jazz", bpm: 120.0 },
    TempoPreset { key: "dubstep", name: "Dubstep", bpm: 140.0 },
    TempoPreset { key: "house", name: "House", bpm: 125.0 },
    TempoPreset { key: "techno", name: "Techno", bpm: 130.0 },
    TempoPreset { key: "ambient", name: "Ambient", bpm: 80.0 },
];

/// Tempo for a preset key, 120 BPM when unknown
pub fn tempo(key: &str) -> f64 {
    TEMPOS
        .iter()
        .find(|t| t.key == key)
        .map_or(DEFAULT_TEMPO_BPM, |t| t.bpm)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumSound {
    pub key: &'static str,
    pub name: &'static str,
    pub pitch: u8,
}

const fn sound(key: &'static str, name: &'static str, pitch: u8) -> DrumSound {
    DrumSound { key, name, pitch }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumKit {
    pub key: &'static str,
    pub name: &'static str,
    pub sounds: &'static [DrumSound],
}

impl DrumKit {
    /// Pitch for a sound key: the kit's own mapping first, then General MIDI
    pub fn pitch_for(&self, sound_key: &str) -> Option<u8> {
        self.sounds
            .iter()
            .find(|s| s.key == sound_key)
            .map(|s| s.pitch)
            .or_else(|| gm_drum_pitch(sound_key))
    }
}

pub const DRUM_KITS: &[DrumKit] = &[
    DrumKit {
        key: "electronic",
        name: "Electronic Kit",
        sounds: &[
            sound("kick", "E-Kick", 36),
            sound("snare", "E-Snare", 38),
            sound("hihat", "E-Hat", 42),
            sound("clap", "Clap", 39),
            sound("perc1", "Perc 1", 44),
            sound("perc2", "Perc 2", 47),
            sound("cymbal", "Cymbal", 55),
            sound("fx", "FX", 56),
        ],
    },
    DrumKit {
        key: "acoustic",
        name: "Acoustic Kit",
        sounds: &[
            sound("kick", "Kick", 36),
            sound("snare", "Snare", 38),
            sound("hihat", "Hi-Hat", 42),
            sound("openhat", "Open Hat", 46),
            sound("crash", "Crash", 49),
            sound("ride", "Ride", 51),
            sound("tom1", "High Tom", 48),
            sound("tom2", "Low Tom", 45),
        ],
    },
    DrumKit {
        key: "trap",
        name: "Trap Kit",
        sounds: &[
            sound("kick", "808 Kick", 36),
            sound("snare", "Trap Snare", 38),
            sound("hihat", "Trap Hat", 42),
            sound("openhat", "Open Hat", 46),
            sound("clap", "Clap", 39),
            sound("perc", "Perc", 44),
            sound("rimshot", "Rimshot", 37),
            sound("fx", "FX", 56),
        ],
    },
];

/// Look up a drum kit, falling back to the electronic kit
pub fn drum_kit(key: &str) -> &'static DrumKit {
    DRUM_KITS.iter().find(|k| k.key == key).unwrap_or(&DRUM_KITS[0])
}

/// General MIDI percussion pitch for the sound keys the drum grid uses
pub fn gm_drum_pitch(sound_key: &str) -> Option<u8> {
    Some(match sound_key {
        "kick" => 36,
        "rimshot" => 37,
        "snare" => 38,
        "clap" => 39,
        "hihat" => 42,
        "perc" | "perc1" => 44,
        "tom2" => 45,
        "openhat" => 46,
        "perc2" => 47,
        "tom1" => 48,
        "crash" => 49,
        "ride" => 51,
        "cymbal" => 55,
        "fx" => 56,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumPatternPreset {
    pub key: &'static str,
    pub name: &'static str,
    pub rows: &'static [(&'static str, [u8; STEP_COUNT])],
}

impl DrumPatternPreset {
    pub fn to_grid(&self) -> StepGrid {
        self.rows
            .iter()
            .map(|(key, steps)| (key.to_string(), steps.iter().map(|s| *s != 0).collect()))
            .collect()
    }
}

pub const DRUM_PATTERNS: &[DrumPatternPreset] = &[
    DrumPatternPreset {
        key: "basic",
        name: "Basic Beat",
        rows: &[
            ("kick", [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
            ("hihat", [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0]),
            ("openhat", [0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1]),
        ],
    },
    DrumPatternPreset {
        key: "rock",
        name: "Rock Beat",
        rows: &[
            ("kick", [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
            ("hihat", [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1]),
            ("crash", [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
        ],
    },
    DrumPatternPreset {
        key: "funk",
        name: "Funk Beat",
        rows: &[
            ("kick", [1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 1]),
            ("hihat", [1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0]),
            ("clap", [0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0]),
        ],
    },
    DrumPatternPreset {
        key: "house",
        name: "House Beat",
        rows: &[
            ("kick", [1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
            ("hihat", [0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0]),
            ("openhat", [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]),
        ],
    },
    DrumPatternPreset {
        key: "trap",
        name: "Trap Beat",
        rows: &[
            ("kick", [1, 0, 0, 1, 0, 0, 1, 0, 1, 1, 0, 0, 1, 0, 0, 0]),
            ("snare", [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]),
            ("hihat", [0, 0, 1, 0, 0, 1, 0, 1, 0, 0, 1, 1, 0, 1, 0, 1]),
            ("rimshot", [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0]),
        ],
    },
];

pub fn drum_pattern(key: &str) -> Option<&'static DrumPatternPreset> {
    DRUM_PATTERNS.iter().find(|p| p.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_fallback() {
        assert_eq!(instrument("fm-synth").family, SynthFamily::Fm { index: 10.0 });
        assert_eq!(instrument("theremin").key, DEFAULT_INSTRUMENT);
        assert!(is_known_instrument("pluck"));
        assert!(!is_known_instrument("theremin"));
    }

    #[test]
    fn test_tempo_presets() {
        assert_eq!(tempo("ballad"), 70.0);
        assert_eq!(tempo("techno"), 130.0);
        assert_eq!(tempo("polka"), DEFAULT_TEMPO_BPM);
    }

    #[test]
    fn test_kit_pitch_lookup() {
        let trap = drum_kit("trap");
        assert_eq!(trap.pitch_for("rimshot"), Some(37));
        // not in the electronic kit, but a known GM sound
        assert_eq!(drum_kit("electronic").pitch_for("openhat"), Some(46));
        assert_eq!(drum_kit("electronic").pitch_for("cowbell"), None);
        assert_eq!(drum_kit("jazz").key, DEFAULT_DRUM_KIT);
    }

    #[test]
    fn test_drum_pattern_grid() {
        let grid = drum_pattern("basic").unwrap().to_grid();
        assert_eq!(grid.len(), 4);
        assert!(grid["kick"][0]);
        assert!(grid["snare"][4] && grid["snare"][12]);
        assert_eq!(grid["hihat"].iter().filter(|s| **s).count(), 8);
        assert!(drum_pattern("polka").is_none());
    }
}
