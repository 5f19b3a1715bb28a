//! Track registry: the authoritative set of tracks, their patterns and
//! the solo/mute rules that decide who is heard

use std::collections::BTreeSet;

use crate::effect::{EffectId, EffectKind};
use crate::error::{CadenceError, Result};
use crate::pattern::{normalize_grid, Note, NoteId, NoteUpdate, Pattern, PatternContent, PatternId, StepGrid};
use crate::presets;
use crate::track::{Track, TrackId, TrackKind};

#[derive(Debug, Clone, Default)]
pub struct TrackRegistry {
    tracks: Vec<Track>,
    soloed: BTreeSet<TrackId>,
    /// Shared counter for track, effect, pattern and note ids
    next_id: u64,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self { tracks: Vec::new(), soloed: BTreeSet::new(), next_id: 1 }
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn require(&self, id: TrackId) -> Result<&Track> {
        self.get(id).ok_or(CadenceError::UnknownTrack(id))
    }

    pub fn require_mut(&mut self, id: TrackId) -> Result<&mut Track> {
        self.get_mut(id).ok_or(CadenceError::UnknownTrack(id))
    }

    /// Create a track with kind-appropriate defaults.
    ///
    /// The name defaults to "<Kind> <n>". Instrument tracks get the basic
    /// synth, drum tracks the electronic kit.
    pub fn create(&mut self, kind: TrackKind, name: Option<&str>, instrument: Option<&str>) -> TrackId {
        let id = TrackId(self.alloc_id());
        let name = match name {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => {
                let n = self.tracks.iter().filter(|t| t.kind == kind).count() + 1;
                format!("{} {}", kind.label(), n)
            }
        };
        let mut track = Track::new(id, kind, name);
        match kind {
            TrackKind::Instrument => {
                track.instrument_id = Some(instrument.unwrap_or(presets::DEFAULT_INSTRUMENT).to_string());
            }
            TrackKind::Drums => {
                track.drum_kit = Some(instrument.unwrap_or(presets::DEFAULT_DRUM_KIT).to_string());
            }
            TrackKind::Audio => track.instrument_id = instrument.map(str::to_string),
        }
        tracing::debug!(track = %id, kind = %kind, name = %track.name, "Created track");
        self.tracks.push(track);
        id
    }

    /// Adopt a track loaded from a project file, keeping its id when it is free.
    /// Effects, the pattern and notes with an id of zero get fresh ones.
    pub fn insert(&mut self, mut track: Track) -> TrackId {
        let mut max_seen = track.id.0;
        for effect in &track.effects {
            max_seen = max_seen.max(effect.id.0);
        }
        if let Some(pattern) = &track.pattern {
            max_seen = max_seen.max(pattern.id.0);
            for note in pattern.notes().unwrap_or_default() {
                max_seen = max_seen.max(note.id.0);
            }
        }
        self.next_id = self.next_id.max(max_seen + 1);

        if track.id.0 == 0 || self.get(track.id).is_some() {
            track.id = TrackId(self.alloc_id());
        }
        for effect in track.effects.iter_mut().filter(|e| e.id.0 == 0) {
            effect.id = EffectId(self.alloc_id());
        }
        if let Some(pattern) = &mut track.pattern {
            if pattern.id.0 == 0 {
                pattern.id = PatternId(self.alloc_id());
            }
            if let PatternContent::Notes(notes) = &mut pattern.content {
                for note in notes.iter_mut().filter(|n| n.id.0 == 0) {
                    note.id = NoteId(self.alloc_id());
                }
            }
        }
        if track.solo {
            self.soloed.insert(track.id);
        }
        let id = track.id;
        self.tracks.push(track);
        id
    }

    /// Remove a track. Unknown ids are a no-op.
    pub fn remove(&mut self, id: TrackId) -> Option<Track> {
        let pos = self.tracks.iter().position(|t| t.id == id)?;
        self.soloed.remove(&id);
        Some(self.tracks.remove(pos))
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.soloed.clear();
    }

    pub fn set_mute(&mut self, id: TrackId, muted: bool) -> Result<()> {
        self.require_mut(id)?.muted = muted;
        Ok(())
    }

    pub fn set_solo(&mut self, id: TrackId, solo: bool) -> Result<()> {
        self.require_mut(id)?.solo = solo;
        if solo {
            self.soloed.insert(id);
        } else {
            self.soloed.remove(&id);
        }
        Ok(())
    }

    pub fn has_solo(&self) -> bool {
        !self.soloed.is_empty()
    }

    /// Mute wins over solo; with any solo active only soloed tracks are heard
    pub fn is_effectively_muted(&self, id: TrackId) -> bool {
        match self.get(id) {
            None => true,
            Some(track) if track.muted => true,
            Some(_) => self.has_solo() && !self.soloed.contains(&id),
        }
    }

    pub fn audible(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| !self.is_effectively_muted(t.id))
    }

    pub fn add_effect(&mut self, id: TrackId, kind: EffectKind) -> Result<EffectId> {
        self.require(id)?;
        let effect_id = EffectId(self.alloc_id());
        self.require_mut(id)?.push_effect(effect_id, kind);
        Ok(effect_id)
    }

    /// The track's working pattern, created empty on first access
    pub fn pattern(&mut self, id: TrackId) -> Result<&mut Pattern> {
        let kind = self.require(id)?.kind;
        let needs_pattern = self.require(id)?.pattern.is_none();
        if needs_pattern {
            let pattern_id = PatternId(self.alloc_id());
            let track = self.require_mut(id)?;
            let name = format!("{} Pattern", track.name);
            track.pattern = Some(if kind.uses_steps() {
                Pattern::with_steps(pattern_id, name)
            } else {
                Pattern::with_notes(pattern_id, name)
            });
        }
        self.require_mut(id)?
            .pattern
            .as_mut()
            .ok_or(CadenceError::UnknownTrack(id))
    }

    fn expect_shape(&self, id: TrackId, steps: bool, shape: &'static str) -> Result<()> {
        let track = self.require(id)?;
        if track.kind.uses_steps() != steps {
            return Err(CadenceError::TypeMismatch { track: id, kind: track.kind, shape });
        }
        Ok(())
    }

    /// Replace a melodic track's notes. Ids of zero are assigned fresh ones.
    pub fn set_notes(&mut self, id: TrackId, mut notes: Vec<Note>) -> Result<()> {
        self.expect_shape(id, false, "notes")?;
        let duration = self.pattern(id)?.duration;
        for note in &notes {
            note.validate(duration)?;
        }
        for note in &mut notes {
            if note.id.0 == 0 {
                note.id = NoteId(self.alloc_id());
            } else {
                self.next_id = self.next_id.max(note.id.0 + 1);
            }
        }
        self.pattern(id)?.content = PatternContent::Notes(notes);
        Ok(())
    }

    pub fn add_note(&mut self, id: TrackId, pitch: u8, velocity: u8, time: f64, duration: f64) -> Result<NoteId> {
        self.expect_shape(id, false, "notes")?;
        let pattern_beats = self.pattern(id)?.duration;
        let note = Note::new(NoteId(self.alloc_id()), pitch, velocity, time, duration);
        note.validate(pattern_beats)?;
        let note_id = note.id;
        if let PatternContent::Notes(notes) = &mut self.pattern(id)?.content {
            notes.push(note);
        }
        Ok(note_id)
    }

    /// Edit one note in place. The edited note must still fit the pattern.
    pub fn update_note(&mut self, id: TrackId, note_id: NoteId, update: NoteUpdate) -> Result<()> {
        self.expect_shape(id, false, "notes")?;
        let pattern = self.pattern(id)?;
        let pattern_beats = pattern.duration;
        let PatternContent::Notes(notes) = &mut pattern.content else {
            return Err(CadenceError::UnknownNote(note_id));
        };
        let note = notes.iter_mut().find(|n| n.id == note_id).ok_or(CadenceError::UnknownNote(note_id))?;
        *note = update.apply(note, pattern_beats)?;
        Ok(())
    }

    /// Remove one note; unknown note ids are a no-op
    pub fn remove_note(&mut self, id: TrackId, note: NoteId) -> Result<()> {
        self.expect_shape(id, false, "notes")?;
        if let PatternContent::Notes(notes) = &mut self.pattern(id)?.content {
            notes.retain(|n| n.id != note);
        }
        Ok(())
    }

    pub fn set_step_grid(&mut self, id: TrackId, grid: StepGrid) -> Result<()> {
        self.expect_shape(id, true, "a step grid")?;
        let grid = normalize_grid(grid)?;
        self.pattern(id)?.content = PatternContent::StepGrid(grid);
        Ok(())
    }

    pub fn toggle_step(&mut self, id: TrackId, sound: &str, step: usize) -> Result<bool> {
        self.expect_shape(id, true, "a step grid")?;
        self.pattern(id)?.toggle_step(sound, step)
    }

    pub fn set_instrument(&mut self, id: TrackId, key: &str) -> Result<()> {
        let track = self.require_mut(id)?;
        if track.kind == TrackKind::Drums {
            return Err(CadenceError::TypeMismatch { track: id, kind: track.kind, shape: "an instrument" });
        }
        if !presets::is_known_instrument(key) {
            tracing::warn!(track = %id, instrument = key, "Unknown instrument preset, default will be used");
        }
        track.instrument_id = Some(key.to_string());
        Ok(())
    }

    pub fn set_drum_kit(&mut self, id: TrackId, key: &str) -> Result<()> {
        let track = self.require_mut(id)?;
        if track.kind != TrackKind::Drums {
            return Err(CadenceError::TypeMismatch { track: id, kind: track.kind, shape: "a drum kit" });
        }
        track.drum_kit = Some(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;

    fn registry_with(n: usize) -> (TrackRegistry, Vec<TrackId>) {
        let mut reg = TrackRegistry::new();
        let ids = (0..n).map(|_| reg.create(TrackKind::Instrument, None, None)).collect();
        (reg, ids)
    }

    #[test]
    fn test_create_assigns_unique_ids_and_names() {
        let mut reg = TrackRegistry::new();
        let a = reg.create(TrackKind::Instrument, None, None);
        let b = reg.create(TrackKind::Instrument, None, Some("pad"));
        let d = reg.create(TrackKind::Drums, None, None);
        assert_ne!(a, b);
        assert_eq!(reg.require(a).unwrap().name, "Instrument 1");
        assert_eq!(reg.require(b).unwrap().name, "Instrument 2");
        assert_eq!(reg.require(b).unwrap().instrument_id.as_deref(), Some("pad"));
        assert_eq!(reg.require(d).unwrap().drum_kit.as_deref(), Some("electronic"));
    }

    #[test]
    fn test_solo_silences_others() {
        let (mut reg, ids) = registry_with(3);
        reg.set_solo(ids[1], true).unwrap();
        let audible: Vec<_> = reg.audible().map(|t| t.id).collect();
        assert_eq!(audible, vec![ids[1]]);
    }

    #[test]
    fn test_mute_beats_solo() {
        let (mut reg, ids) = registry_with(2);
        reg.set_solo(ids[0], true).unwrap();
        reg.set_mute(ids[0], true).unwrap();
        assert!(reg.is_effectively_muted(ids[0]));
        assert!(reg.is_effectively_muted(ids[1]));
        assert_eq!(reg.audible().count(), 0);
    }

    #[test]
    fn test_clearing_last_solo_restores_all() {
        let (mut reg, ids) = registry_with(3);
        reg.set_solo(ids[0], true).unwrap();
        reg.set_solo(ids[2], true).unwrap();
        assert_eq!(reg.audible().count(), 2);
        reg.set_solo(ids[0], false).unwrap();
        reg.set_solo(ids[2], false).unwrap();
        assert_eq!(reg.audible().count(), 3);
    }

    #[test]
    fn test_removing_soloed_track_clears_solo() {
        let (mut reg, ids) = registry_with(2);
        reg.set_solo(ids[0], true).unwrap();
        reg.remove(ids[0]);
        assert!(!reg.has_solo());
        assert!(!reg.is_effectively_muted(ids[1]));
        // removing again is a no-op
        assert!(reg.remove(ids[0]).is_none());
    }

    #[test]
    fn test_unknown_track_errors() {
        let mut reg = TrackRegistry::new();
        assert!(matches!(reg.set_mute(TrackId(42), true), Err(CadenceError::UnknownTrack(TrackId(42)))));
        assert!(reg.add_effect(TrackId(42), EffectKind::Delay).is_err());
    }

    #[test]
    fn test_default_pattern_matches_kind() {
        let mut reg = TrackRegistry::new();
        let synth = reg.create(TrackKind::Instrument, None, None);
        let drums = reg.create(TrackKind::Drums, None, None);
        assert!(reg.pattern(synth).unwrap().notes().is_some());
        assert!(reg.pattern(drums).unwrap().step_grid().is_some());
        // same pattern on second access
        let first = reg.pattern(drums).unwrap().id;
        assert_eq!(reg.pattern(drums).unwrap().id, first);
    }

    #[test]
    fn test_pattern_shape_mismatch() {
        let mut reg = TrackRegistry::new();
        let drums = reg.create(TrackKind::Drums, None, None);
        let synth = reg.create(TrackKind::Instrument, None, None);
        let err = reg.set_notes(drums, Vec::new()).unwrap_err();
        assert!(matches!(err, CadenceError::TypeMismatch { kind: TrackKind::Drums, .. }));
        assert!(reg.toggle_step(synth, "kick", 0).is_err());
        assert!(reg.set_drum_kit(synth, "trap").is_err());
        assert!(reg.set_instrument(drums, "synth").is_err());
    }

    #[test]
    fn test_notes_get_ids_and_validation() {
        let mut reg = TrackRegistry::new();
        let synth = reg.create(TrackKind::Instrument, None, None);
        let notes = vec![
            Note::new(NoteId(0), 60, 100, 0.0, 1.0),
            Note::new(NoteId(0), 64, 100, 1.0, 1.0),
        ];
        reg.set_notes(synth, notes).unwrap();
        let stored = reg.pattern(synth).unwrap().notes().unwrap().to_vec();
        assert_ne!(stored[0].id, stored[1].id);
        assert!(stored.iter().all(|n| n.id.0 != 0));

        let bad = vec![Note::new(NoteId(0), 60, 100, 9.0, 1.0)];
        assert!(reg.set_notes(synth, bad).is_err());
        assert_eq!(reg.pattern(synth).unwrap().notes().unwrap().len(), 2);
    }

    #[test]
    fn test_add_and_remove_note() {
        let mut reg = TrackRegistry::new();
        let synth = reg.create(TrackKind::Instrument, None, None);
        let n = reg.add_note(synth, 67, 90, 2.0, 0.5).unwrap();
        assert_eq!(reg.pattern(synth).unwrap().notes().unwrap().len(), 1);
        reg.remove_note(synth, NoteId(999)).unwrap();
        reg.remove_note(synth, n).unwrap();
        assert!(reg.pattern(synth).unwrap().is_silent());
    }

    #[test]
    fn test_update_note() {
        let mut reg = TrackRegistry::new();
        let synth = reg.create(TrackKind::Instrument, None, None);
        let n = reg.add_note(synth, 60, 100, 0.0, 1.0).unwrap();
        reg.update_note(synth, n, NoteUpdate { velocity: Some(40), duration: Some(0.5), ..Default::default() })
            .unwrap();
        let note = reg.pattern(synth).unwrap().notes().unwrap()[0].clone();
        assert_eq!((note.pitch, note.velocity, note.time, note.duration), (60, 40, 0.0, 0.5));

        assert!(reg.update_note(synth, n, NoteUpdate { duration: Some(0.0), ..Default::default() }).is_err());
        assert!(matches!(
            reg.update_note(synth, NoteId(77), NoteUpdate::default()),
            Err(CadenceError::UnknownNote(_))
        ));
        let drums = reg.create(TrackKind::Drums, None, None);
        assert!(matches!(
            reg.update_note(drums, n, NoteUpdate::default()),
            Err(CadenceError::TypeMismatch { .. })
        ));
        assert_eq!(reg.pattern(synth).unwrap().notes().unwrap()[0], note);
    }

    #[test]
    fn test_insert_assigns_missing_ids() {
        let mut reg = TrackRegistry::new();
        let mut t = Track::new(TrackId(4), TrackKind::Instrument, "Loaded");
        t.effects.push(Effect::new(EffectId(0), EffectKind::Delay));
        t.effects.push(Effect::new(EffectId(9), EffectKind::Reverb));
        let mut pattern = Pattern::with_notes(PatternId(0), "p");
        pattern.content = PatternContent::Notes(vec![
            Note::new(NoteId(0), 60, 100, 0.0, 1.0),
            Note::new(NoteId(0), 62, 100, 1.0, 1.0),
        ]);
        t.pattern = Some(pattern);
        let id = reg.insert(t);

        let track = reg.get(id).unwrap();
        let mut ids = vec![track.id.0, track.effects[0].id.0, track.effects[1].id.0];
        let pattern = track.pattern.as_ref().unwrap();
        ids.push(pattern.id.0);
        ids.extend(pattern.notes().unwrap().iter().map(|n| n.id.0));
        assert!(ids.iter().all(|id| *id != 0));
        assert_eq!(track.effects[1].id, EffectId(9));
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_insert_keeps_free_ids() {
        let mut reg = TrackRegistry::new();
        let mut t = Track::new(TrackId(10), TrackKind::Instrument, "Loaded");
        t.solo = true;
        assert_eq!(reg.insert(t.clone()), TrackId(10));
        // duplicate gets a fresh id past everything seen
        let again = reg.insert(t);
        assert!(again.0 > 10);
        assert!(reg.has_solo());
        let next = reg.create(TrackKind::Audio, None, None);
        assert!(next.0 > again.0);
    }
}
