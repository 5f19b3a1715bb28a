//! Track representation

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::effect::{Effect, EffectId, EffectKind, ParamValue};
use crate::error::{CadenceError, Result};
use crate::pattern::Pattern;

pub const MIN_VOLUME_DB: f32 = -60.0;
pub const MAX_VOLUME_DB: f32 = 12.0;

/// Unique identifier for tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Track type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    #[default]
    Instrument,
    Drums,
    Audio,
}

impl TrackKind {
    pub fn label(&self) -> &'static str {
        match self {
            TrackKind::Instrument => "Instrument",
            TrackKind::Drums => "Drums",
            TrackKind::Audio => "Audio",
        }
    }

    /// Default UI color per kind
    pub fn default_color(&self) -> &'static str {
        match self {
            TrackKind::Instrument => "#1f9bff",
            TrackKind::Drums => "#30c48d",
            TrackKind::Audio => "#ff7b5f",
        }
    }

    /// Drum tracks hold step grids, everything else holds notes
    pub fn uses_steps(&self) -> bool {
        matches!(self, TrackKind::Drums)
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrackKind::Instrument => "instrument",
            TrackKind::Drums => "drums",
            TrackKind::Audio => "audio",
        })
    }
}

/// A track with its channel strip, effect chain and working pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    pub color: String,
    /// Channel volume in dB
    pub volume: f32,
    /// Pan (-1.0 left, 0.0 center, 1.0 right)
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub effects: Vec<Effect>,
    /// Instrument preset key (instrument and audio tracks)
    pub instrument_id: Option<String>,
    /// Drum kit key (drum tracks)
    pub drum_kit: Option<String>,
    pub pattern: Option<Pattern>,
}

impl Default for Track {
    fn default() -> Self {
        Self::new(TrackId::default(), TrackKind::default(), "")
    }
}

impl Track {
    pub fn new(id: TrackId, kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            color: kind.default_color().to_string(),
            volume: 0.0,
            pan: 0.0,
            muted: false,
            solo: false,
            effects: Vec::new(),
            instrument_id: None,
            drum_kit: None,
            pattern: None,
        }
    }

    /// Set volume in dB, clamped to the channel range. Non-finite input is ignored.
    pub fn set_volume(&mut self, db: f32) {
        if db.is_finite() {
            self.volume = db.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB);
        }
    }

    pub fn set_pan(&mut self, pan: f32) {
        if pan.is_finite() {
            self.pan = pan.clamp(-1.0, 1.0);
        }
    }

    /// Linear gain for the current volume; the bottom of the range is silence
    pub fn gain(&self) -> f32 {
        if self.volume <= MIN_VOLUME_DB {
            0.0
        } else {
            10f32.powf(self.volume / 20.0)
        }
    }

    pub fn effect(&self, id: EffectId) -> Option<&Effect> {
        self.effects.iter().find(|e| e.id == id)
    }

    pub fn push_effect(&mut self, id: EffectId, kind: EffectKind) {
        self.effects.push(Effect::new(id, kind));
    }

    pub fn remove_effect(&mut self, id: EffectId) -> Option<Effect> {
        let pos = self.effects.iter().position(|e| e.id == id)?;
        Some(self.effects.remove(pos))
    }

    pub fn update_effect(&mut self, id: EffectId, params: &BTreeMap<String, ParamValue>) -> Result<usize> {
        let effect = self
            .effects
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(CadenceError::UnknownEffect(id))?;
        Ok(effect.update(params))
    }

    pub fn set_effect_enabled(&mut self, id: EffectId, enabled: bool) -> Result<()> {
        let effect = self
            .effects
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(CadenceError::UnknownEffect(id))?;
        effect.enabled = enabled;
        Ok(())
    }

    /// Move the effect at `from` so it ends up at index `to`
    pub fn reorder_effects(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.effects.len();
        if from >= len || to >= len {
            return Err(CadenceError::invalid(format!(
                "effect index {from} -> {to} outside chain of {len}"
            )));
        }
        let effect = self.effects.remove(from);
        self.effects.insert(to, effect);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_clamps_to_range() {
        let mut t = Track::new(TrackId(1), TrackKind::Instrument, "Lead");
        t.set_volume(40.0);
        assert_eq!(t.volume, MAX_VOLUME_DB);
        t.set_volume(-200.0);
        assert_eq!(t.volume, MIN_VOLUME_DB);
        assert_eq!(t.gain(), 0.0);
        t.set_volume(f32::NAN);
        assert_eq!(t.volume, MIN_VOLUME_DB);
        t.set_volume(0.0);
        assert!((t.gain() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pan_clamps() {
        let mut t = Track::new(TrackId(1), TrackKind::Audio, "Vox");
        t.set_pan(-3.0);
        assert_eq!(t.pan, -1.0);
        t.set_pan(0.25);
        assert_eq!(t.pan, 0.25);
    }

    #[test]
    fn test_reorder_effects() {
        let mut t = Track::new(TrackId(1), TrackKind::Instrument, "Pad");
        t.push_effect(EffectId(1), EffectKind::Reverb);
        t.push_effect(EffectId(2), EffectKind::Delay);
        t.push_effect(EffectId(3), EffectKind::Filter);

        t.reorder_effects(0, 2).unwrap();
        let ids: Vec<_> = t.effects.iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        assert!(t.reorder_effects(0, 3).is_err());
        assert!(t.reorder_effects(5, 0).is_err());
    }

    #[test]
    fn test_unknown_effect_update_fails() {
        let mut t = Track::new(TrackId(1), TrackKind::Instrument, "Pad");
        let err = t.update_effect(EffectId(9), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, CadenceError::UnknownEffect(EffectId(9))));
        assert!(t.remove_effect(EffectId(9)).is_none());
    }

    #[test]
    fn test_track_json_defaults_missing_fields() {
        let t: Track = serde_json::from_str(r#"{"id": 3, "type": "drums"}"#).unwrap();
        assert_eq!(t.id, TrackId(3));
        assert_eq!(t.kind, TrackKind::Drums);
        assert_eq!(t.volume, 0.0);
        assert!(t.effects.is_empty());
        assert!(t.pattern.is_none());
    }
}
