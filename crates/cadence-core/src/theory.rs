//! Note names, scales and chords

use serde::{Deserialize, Serialize};

pub const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Equal-tempered frequency for a MIDI pitch (A4 = 69 = 440 Hz)
pub fn pitch_to_frequency(pitch: u8) -> f32 {
    440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0)
}

/// Scientific pitch name, e.g. 60 -> "C4"
pub fn note_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[pitch as usize % 12], octave)
}

/// Parse names like "C4", "F#3", "Bb2" or "C-1" into a MIDI pitch
pub fn parse_note_name(name: &str) -> Option<u8> {
    let name = name.trim();
    let mut chars = name.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (accidental, octave) = if let Some(r) = rest.strip_prefix('#') {
        (1, r)
    } else if let Some(r) = rest.strip_prefix('b') {
        (-1, r)
    } else {
        (0, rest)
    };
    let octave: i32 = octave.parse().ok()?;
    let pitch = (octave + 1) * 12 + base + accidental;
    u8::try_from(pitch).ok().filter(|p| *p <= 127)
}

/// Scale/mode types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    Major,
    Minor,
    Pentatonic,
    Blues,
    Dorian,
    Mixolydian,
    Chromatic,
}

impl ScaleMode {
    /// Scale intervals (semitones from root)
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 2, 4, 5, 7, 9, 11],
            Self::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Self::Pentatonic => &[0, 2, 4, 7, 9],
            Self::Blues => &[0, 3, 5, 6, 7, 10],
            Self::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Self::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Self::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }
}

/// Chord quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Major7,
    Minor7,
    Dominant7,
    Sus2,
    Sus4,
}

impl ChordQuality {
    /// Chord intervals from root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Diminished => &[0, 3, 6],
            Self::Augmented => &[0, 4, 8],
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
            Self::Dominant7 => &[0, 4, 7, 10],
            Self::Sus2 => &[0, 2, 7],
            Self::Sus4 => &[0, 5, 7],
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "major" => Self::Major,
            "minor" => Self::Minor,
            "diminished" => Self::Diminished,
            "augmented" => Self::Augmented,
            "major7" => Self::Major7,
            "minor7" => Self::Minor7,
            "dominant7" => Self::Dominant7,
            "sus2" => Self::Sus2,
            "sus4" => Self::Sus4,
            _ => return None,
        })
    }
}

/// Chord tones above `root`; tones past the MIDI range are dropped
pub fn chord_notes(root: u8, quality: ChordQuality) -> Vec<u8> {
    quality
        .intervals()
        .iter()
        .map(|&i| root as u16 + i as u16)
        .filter(|p| *p <= 127)
        .map(|p| p as u8)
        .collect()
}

/// Scale notes in one octave from `root`
pub fn scale_notes(root: u8, mode: ScaleMode) -> Vec<u8> {
    mode.intervals()
        .iter()
        .map(|&interval| root.saturating_add(interval).min(127))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names_round_trip() {
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(parse_note_name("C4"), Some(60));
        assert_eq!(parse_note_name("c#4"), Some(61));
        assert_eq!(parse_note_name("Bb3"), Some(58));
        assert_eq!(parse_note_name("C-1"), Some(0));
        assert_eq!(parse_note_name("G9"), Some(127));
        assert_eq!(parse_note_name("G#9"), None);
        assert_eq!(parse_note_name("H2"), None);
        assert_eq!(parse_note_name(""), None);
    }

    #[test]
    fn test_frequency() {
        assert!((pitch_to_frequency(69) - 440.0).abs() < 1e-3);
        assert!((pitch_to_frequency(81) - 880.0).abs() < 1e-2);
    }

    #[test]
    fn test_chords() {
        assert_eq!(chord_notes(60, ChordQuality::Major), vec![60, 64, 67]);
        assert_eq!(chord_notes(57, ChordQuality::Minor7), vec![57, 60, 64, 67]);
        assert_eq!(chord_notes(125, ChordQuality::Major), vec![125]);
        assert_eq!(ChordQuality::from_key("sus4"), Some(ChordQuality::Sus4));
        assert_eq!(ChordQuality::from_key("power"), None);
    }

    #[test]
    fn test_scale_notes() {
        assert_eq!(scale_notes(60, ScaleMode::Pentatonic), vec![60, 62, 64, 67, 69]);
        assert_eq!(scale_notes(60, ScaleMode::Blues).len(), 6);
    }
}
