//! Session: the single owner of transport, tracks, patterns and schedule.
//!
//! Every UI command is a method here. Commands that change what should be
//! heard rebuild the schedule before returning. Work that needs the audio
//! side (previews, releasing voices) is queued as `SessionEvent`s and
//! drained by the engine at the next block.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::effect::{EffectId, EffectKind, ParamValue};
use crate::error::{CadenceError, Result};
use crate::generator::{GeneratorRack, Trigger, TriggerKey};
use crate::pattern::{normalize_grid, Note, NoteId, NoteUpdate, Pattern, PatternContent, StepGrid, DEFAULT_VELOCITY};
use crate::presets;
use crate::project::{Project, PROJECT_VERSION};
use crate::recorder::{KeyBindings, LiveRecorder, RecorderConfig, DEFAULT_LIVE_VELOCITY};
use crate::registry::TrackRegistry;
use crate::scheduler::Scheduler;
use crate::theory::{chord_notes, note_name, ChordQuality};
use crate::track::{Track, TrackId, TrackKind};
use crate::transport::{BlockSpan, TimeSignature, Transport, TransportSnapshot, TransportState};

/// Work for the audio side, applied before the next block renders
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Release every voice on every track
    ReleaseAll,
    /// Play a trigger outside the schedule (live input, auditioning)
    Preview { track: TrackId, trigger: Trigger },
    /// End a held preview
    Release { track: TrackId, key: TriggerKey },
}

#[derive(Debug, Default)]
pub struct Session {
    transport: Transport,
    registry: TrackRegistry,
    scheduler: Scheduler,
    recorder: LiveRecorder,
    ready: bool,
    start_pending: bool,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            transport: Transport::new(sample_rate),
            registry: TrackRegistry::new(),
            ..Default::default()
        }
    }

    pub fn with_recorder(mut self, config: RecorderConfig) -> Self {
        self.recorder.set_config(config);
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        self.transport.snapshot()
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn tracks(&self) -> &[Track] {
        self.registry.tracks()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.registry.get(id)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn recorder(&self) -> &LiveRecorder {
        &self.recorder
    }

    pub fn key_bindings_mut(&mut self) -> &mut KeyBindings {
        self.recorder.bindings_mut()
    }

    pub fn set_recorder_config(&mut self, config: RecorderConfig) {
        self.recorder.set_config(config);
    }

    /// Rebuild every track schedule from the current patterns and mute state
    pub fn rebuild(&mut self) {
        self.scheduler.rebuild(&self.registry);
    }

    // ---- readiness ----

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_start_pending(&self) -> bool {
        self.start_pending
    }

    /// The audio device is open. Starts playback if `play` was requested earlier.
    pub fn mark_ready(&mut self) {
        self.ready = true;
        if std::mem::take(&mut self.start_pending) {
            info!("Audio ready, starting deferred playback");
            self.play();
        }
    }

    // ---- transport ----

    pub fn play(&mut self) {
        if !self.ready {
            if !self.start_pending {
                info!("Audio not ready, playback deferred");
            }
            self.start_pending = true;
            return;
        }
        if self.transport.is_playing() {
            return;
        }
        self.rebuild();
        self.transport.start();
        info!(position = self.transport.position_beats(), bpm = self.transport.bpm(), "Transport started");
    }

    pub fn pause(&mut self) {
        self.start_pending = false;
        if self.transport.state() != TransportState::Playing {
            return;
        }
        self.transport.pause();
        self.events.push(SessionEvent::ReleaseAll);
        info!(position = self.transport.position_beats(), "Transport paused");
    }

    pub fn stop(&mut self) {
        self.start_pending = false;
        self.transport.stop();
        self.scheduler.clear();
        self.recorder.release_all();
        self.events.push(SessionEvent::ReleaseAll);
        info!("Transport stopped");
    }

    pub fn toggle_playback(&mut self) {
        if self.transport.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn seek(&mut self, beats: f64) -> Result<()> {
        self.transport.seek(beats)?;
        if self.transport.is_playing() {
            self.events.push(SessionEvent::ReleaseAll);
        }
        Ok(())
    }

    pub fn seek_secs(&mut self, secs: f64) -> Result<()> {
        self.transport.seek_secs(secs)?;
        if self.transport.is_playing() {
            self.events.push(SessionEvent::ReleaseAll);
        }
        Ok(())
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        self.transport.set_tempo(bpm)?;
        self.rebuild();
        Ok(())
    }

    /// Apply a named tempo preset; unknown names give 120 BPM
    pub fn apply_tempo_preset(&mut self, key: &str) -> Result<f64> {
        let bpm = presets::tempo(key);
        self.set_tempo(bpm)?;
        Ok(bpm)
    }

    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) -> Result<()> {
        self.transport.set_time_signature(TimeSignature::new(numerator, denominator)?);
        Ok(())
    }

    pub fn set_loop(&mut self, enabled: bool, start: f64, end: f64) -> Result<()> {
        self.transport.set_loop(enabled, start, end)?;
        self.rebuild();
        Ok(())
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.transport.set_sample_rate(sample_rate);
    }

    /// Advance one block and fire the triggers that fall inside it
    pub fn render_block(&mut self, frames: usize, rack: &mut dyn GeneratorRack) -> BlockSpan {
        let span = self.transport.advance(frames);
        if !span.segments.is_empty() {
            self.scheduler.dispatch(&span, rack);
        }
        span
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- tracks ----

    pub fn create_track(&mut self, kind: TrackKind, name: Option<&str>, instrument: Option<&str>) -> TrackId {
        let id = self.registry.create(kind, name, instrument);
        info!(track = %id, kind = %kind, "Track created");
        self.rebuild();
        id
    }

    /// Delete a track; unknown ids are ignored
    pub fn delete_track(&mut self, id: TrackId) {
        let Some(track) = self.registry.remove(id) else {
            return;
        };
        if self.recorder.armed() == Some(id) {
            self.recorder.disarm();
        }
        info!(track = %id, name = %track.name, "Track deleted");
        self.rebuild();
    }

    pub fn clear_all(&mut self) {
        self.registry.clear();
        self.recorder.disarm();
        self.recorder.release_all();
        self.scheduler.clear();
        self.events.push(SessionEvent::ReleaseAll);
        info!("Cleared all tracks");
    }

    pub fn rename_track(&mut self, id: TrackId, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(CadenceError::invalid("track name is empty"));
        }
        self.registry.require_mut(id)?.name = name.to_string();
        Ok(())
    }

    pub fn set_track_color(&mut self, id: TrackId, color: &str) -> Result<()> {
        self.registry.require_mut(id)?.color = color.to_string();
        Ok(())
    }

    pub fn set_volume(&mut self, id: TrackId, db: f32) -> Result<()> {
        self.registry.require_mut(id)?.set_volume(db);
        Ok(())
    }

    pub fn set_pan(&mut self, id: TrackId, pan: f32) -> Result<()> {
        self.registry.require_mut(id)?.set_pan(pan);
        Ok(())
    }

    pub fn set_mute(&mut self, id: TrackId, muted: bool) -> Result<()> {
        self.registry.set_mute(id, muted)?;
        self.rebuild();
        Ok(())
    }

    pub fn toggle_mute(&mut self, id: TrackId) -> Result<bool> {
        let muted = !self.registry.require(id)?.muted;
        self.set_mute(id, muted)?;
        Ok(muted)
    }

    pub fn set_solo(&mut self, id: TrackId, solo: bool) -> Result<()> {
        self.registry.set_solo(id, solo)?;
        self.rebuild();
        Ok(())
    }

    pub fn toggle_solo(&mut self, id: TrackId) -> Result<bool> {
        let solo = !self.registry.require(id)?.solo;
        self.set_solo(id, solo)?;
        Ok(solo)
    }

    pub fn set_instrument(&mut self, id: TrackId, key: &str) -> Result<()> {
        self.registry.set_instrument(id, key)?;
        info!(track = %id, instrument = key, "Instrument changed");
        Ok(())
    }

    pub fn set_drum_kit(&mut self, id: TrackId, key: &str) -> Result<()> {
        self.registry.set_drum_kit(id, key)?;
        info!(track = %id, kit = key, "Drum kit changed");
        Ok(())
    }

    // ---- effects ----

    pub fn add_effect(&mut self, track: TrackId, kind: EffectKind) -> Result<EffectId> {
        let id = self.registry.add_effect(track, kind)?;
        debug!(track = %track, effect = %id, kind = %kind, "Effect added");
        Ok(id)
    }

    /// Remove an effect; unknown effect ids are ignored
    pub fn remove_effect(&mut self, track: TrackId, effect: EffectId) -> Result<()> {
        self.registry.require_mut(track)?.remove_effect(effect);
        Ok(())
    }

    pub fn update_effect(
        &mut self,
        track: TrackId,
        effect: EffectId,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<()> {
        self.registry.require_mut(track)?.update_effect(effect, params)?;
        Ok(())
    }

    pub fn set_effect_enabled(&mut self, track: TrackId, effect: EffectId, enabled: bool) -> Result<()> {
        self.registry.require_mut(track)?.set_effect_enabled(effect, enabled)
    }

    pub fn reorder_effects(&mut self, track: TrackId, from: usize, to: usize) -> Result<()> {
        self.registry.require_mut(track)?.reorder_effects(from, to)
    }

    // ---- patterns ----

    pub fn get_or_create_default_pattern(&mut self, track: TrackId) -> Result<&Pattern> {
        self.registry.pattern(track).map(|p| &*p)
    }

    pub fn set_notes(&mut self, track: TrackId, notes: Vec<Note>) -> Result<()> {
        self.registry.set_notes(track, notes)?;
        self.rebuild();
        Ok(())
    }

    pub fn add_note(&mut self, track: TrackId, pitch: u8, velocity: u8, time: f64, duration: f64) -> Result<NoteId> {
        let id = self.registry.add_note(track, pitch, velocity, time, duration)?;
        self.rebuild();
        Ok(id)
    }

    pub fn update_note(&mut self, track: TrackId, note: NoteId, update: NoteUpdate) -> Result<()> {
        self.registry.update_note(track, note, update)?;
        self.rebuild();
        Ok(())
    }

    pub fn remove_note(&mut self, track: TrackId, note: NoteId) -> Result<()> {
        self.registry.remove_note(track, note)?;
        self.rebuild();
        Ok(())
    }

    pub fn set_step_grid(&mut self, track: TrackId, grid: StepGrid) -> Result<()> {
        self.registry.set_step_grid(track, grid)?;
        self.rebuild();
        Ok(())
    }

    pub fn toggle_step(&mut self, track: TrackId, sound: &str, step: usize) -> Result<bool> {
        let on = self.registry.toggle_step(track, sound, step)?;
        self.rebuild();
        Ok(on)
    }

    pub fn load_drum_pattern(&mut self, track: TrackId, key: &str) -> Result<()> {
        let preset = presets::drum_pattern(key)
            .ok_or_else(|| CadenceError::invalid(format!("unknown drum pattern {key}")))?;
        self.set_step_grid(track, preset.to_grid())
    }

    pub fn set_pattern_length(&mut self, track: TrackId, beats: f64) -> Result<()> {
        self.registry.pattern(track)?.set_duration(beats)?;
        self.rebuild();
        Ok(())
    }

    pub fn set_pattern_start(&mut self, track: TrackId, beats: f64) -> Result<()> {
        self.registry.pattern(track)?.set_start_time(beats)?;
        self.rebuild();
        Ok(())
    }

    pub fn clear_pattern(&mut self, track: TrackId) -> Result<()> {
        self.registry.pattern(track)?.clear();
        self.rebuild();
        Ok(())
    }

    // ---- previews and live input ----

    /// Queue a preview, failing with `DeviceNotReady` before the device is open
    pub fn try_preview(&mut self, track: TrackId, key: TriggerKey, velocity: u8, duration_beats: f64) -> Result<()> {
        self.registry.require(track)?;
        if !self.ready {
            return Err(CadenceError::DeviceNotReady);
        }
        let trigger = Trigger {
            key,
            velocity,
            time: self.transport.clock_secs(),
            duration: duration_beats * self.transport.secs_per_beat(),
        };
        self.events.push(SessionEvent::Preview { track, trigger });
        Ok(())
    }

    /// Audition a sound. Before the device is ready the preview is dropped.
    pub fn preview(&mut self, track: TrackId, key: TriggerKey, velocity: u8, duration_beats: f64) -> Result<()> {
        match self.try_preview(track, key, velocity, duration_beats) {
            Err(CadenceError::DeviceNotReady) => {
                warn!(track = %track, "Audio not ready, preview dropped");
                Ok(())
            }
            other => other,
        }
    }

    pub fn preview_note(&mut self, track: TrackId, pitch: u8, velocity: u8, duration_beats: f64) -> Result<()> {
        self.preview(track, TriggerKey::Pitch(pitch), velocity, duration_beats)
    }

    pub fn preview_sound(&mut self, track: TrackId, sound: &str) -> Result<()> {
        self.preview(track, TriggerKey::Sound(sound.to_string()), DEFAULT_VELOCITY, 0.25)
    }

    pub fn play_chord(&mut self, track: TrackId, root: u8, quality: ChordQuality, duration_beats: f64) -> Result<()> {
        for pitch in chord_notes(root, quality) {
            self.preview_note(track, pitch, DEFAULT_LIVE_VELOCITY, duration_beats)?;
        }
        Ok(())
    }

    /// Arm a melodic track so released keys are written into its pattern
    pub fn arm_recording(&mut self, track: TrackId) -> Result<()> {
        let kind = self.registry.require(track)?.kind;
        if kind.uses_steps() {
            return Err(CadenceError::TypeMismatch { track, kind, shape: "recorded notes" });
        }
        self.recorder.arm(track);
        info!(track = %track, "Recording armed");
        Ok(())
    }

    pub fn disarm_recording(&mut self) {
        self.recorder.disarm();
    }

    /// Key pressed on `track`. Returns false if the pitch was already held.
    pub fn note_down(&mut self, track: TrackId, pitch: u8, velocity: u8) -> Result<bool> {
        self.registry.require(track)?;
        let position = self.transport.position_beats();
        if !self.recorder.press(track, pitch, velocity, position) {
            return Ok(false);
        }
        self.preview(track, TriggerKey::Pitch(pitch), velocity, f64::INFINITY)?;
        Ok(true)
    }

    /// Key released. Returns the recorded note when the track is armed.
    pub fn note_up(&mut self, pitch: u8) -> Result<Option<NoteId>> {
        let position = self.transport.position_beats();
        let loop_beats = self.transport.loop_enabled().then(|| self.transport.loop_region().length());
        let Some(release) = self.recorder.release(pitch, position, loop_beats) else {
            return Ok(None);
        };
        if self.ready {
            self.events.push(SessionEvent::Release { track: release.track, key: TriggerKey::Pitch(pitch) });
        }
        if self.recorder.armed() != Some(release.track) || self.registry.get(release.track).is_none() {
            return Ok(None);
        }
        let pattern = self.registry.pattern(release.track)?;
        let (time, duration) = self.recorder.quantize(&release, pattern.start_time, pattern.duration);
        let id = self.registry.add_note(release.track, pitch, release.velocity, time, duration)?;
        debug!(track = %release.track, note = %note_name(pitch), time, duration, "Recorded note");
        self.rebuild();
        Ok(Some(id))
    }

    /// Computer-keyboard press mapped through the key bindings
    pub fn key_down(&mut self, track: TrackId, key: &str) -> Result<bool> {
        match self.recorder.bindings().pitch_for(key) {
            Some(pitch) => self.note_down(track, pitch, DEFAULT_LIVE_VELOCITY),
            None => Ok(false),
        }
    }

    pub fn key_up(&mut self, key: &str) -> Result<Option<NoteId>> {
        match self.recorder.bindings().pitch_for(key) {
            Some(pitch) => self.note_up(pitch),
            None => Ok(None),
        }
    }

    // ---- project ----

    pub fn export_project(&self) -> Project {
        Project {
            version: PROJECT_VERSION.to_string(),
            bpm: self.transport.bpm(),
            time_signature: self.transport.time_signature(),
            tracks: self.registry.tracks().to_vec(),
            loop_enabled: self.transport.loop_enabled(),
            loop_start: self.transport.loop_region().start,
            loop_end: self.transport.loop_region().end,
            created_at: Some(Utc::now()),
        }
    }

    /// Replace the session contents with a project. Nothing changes if the
    /// project's transport settings are invalid.
    pub fn import_project(&mut self, project: Project) -> Result<()> {
        if project.version != PROJECT_VERSION {
            debug!(version = %project.version, "Importing project from another version");
        }
        let mut transport = self.transport.clone();
        transport.stop();
        transport.set_tempo(project.bpm)?;
        transport.set_time_signature(project.time_signature);
        transport.set_loop(project.loop_enabled, project.loop_start, project.loop_end)?;
        transport.stop();

        let mut registry = TrackRegistry::new();
        for track in project.tracks {
            registry.insert(sanitize_track(track));
        }

        self.transport = transport;
        self.registry = registry;
        self.start_pending = false;
        self.recorder.disarm();
        self.recorder.release_all();
        self.events.push(SessionEvent::ReleaseAll);
        self.rebuild();
        info!(tracks = self.registry.len(), bpm = self.transport.bpm(), "Project imported");
        Ok(())
    }
}

/// Bring a loaded track back inside the model's invariants
fn sanitize_track(mut track: Track) -> Track {
    let (volume, pan) = (track.volume, track.pan);
    track.set_volume(volume);
    track.set_pan(pan);
    if track.color.is_empty() {
        track.color = track.kind.default_color().to_string();
    }
    track.effects = track.effects.iter().map(|e| e.sanitized()).collect();
    match track.kind {
        TrackKind::Instrument if track.instrument_id.is_none() => {
            track.instrument_id = Some(presets::DEFAULT_INSTRUMENT.to_string());
        }
        TrackKind::Drums if track.drum_kit.is_none() => {
            track.drum_kit = Some(presets::DEFAULT_DRUM_KIT.to_string());
        }
        _ => {}
    }

    if let Some(mut pattern) = track.pattern.take() {
        let keep = match &mut pattern.content {
            PatternContent::Notes(notes) if !track.kind.uses_steps() => {
                let before = notes.len();
                let beats = pattern.duration;
                notes.retain(|n| n.validate(beats).is_ok());
                if notes.len() != before {
                    warn!(track = %track.id, dropped = before - notes.len(), "Dropped invalid notes");
                }
                pattern.duration.is_finite() && pattern.duration > 0.0
            }
            PatternContent::StepGrid(grid) if track.kind.uses_steps() => match normalize_grid(std::mem::take(grid)) {
                Ok(normalized) => {
                    *grid = normalized;
                    true
                }
                Err(e) => {
                    warn!(track = %track.id, error = %e, "Dropped invalid step grid");
                    false
                }
            },
            other => {
                warn!(track = %track.id, kind = %track.kind, shape = other.shape(), "Pattern does not fit track");
                false
            }
        };
        if keep {
            if pattern.name.is_empty() {
                pattern.name = format!("{} Pattern", track.name);
            }
            track.pattern = Some(pattern);
        }
    }
    track
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::test_support::FakeRack;

    const SR: u32 = 48000;

    fn ready_session() -> Session {
        let mut s = Session::new(SR);
        s.mark_ready();
        s
    }

    fn run(session: &mut Session, rack: &mut FakeRack, seconds: f64) {
        let blocks = (seconds * SR as f64 / 256.0).ceil() as usize;
        for _ in 0..blocks {
            session.render_block(256, rack);
        }
    }

    #[test]
    fn test_tempo_invariance() {
        for (bpm, expected) in [(120.0, 1.0), (60.0, 2.0)] {
            let mut s = ready_session();
            let id = s.create_track(TrackKind::Instrument, None, None);
            s.add_note(id, 60, 100, 2.0, 0.5).unwrap();
            s.set_tempo(bpm).unwrap();
            let mut rack = FakeRack::with(&[id]);
            s.play();
            run(&mut s, &mut rack, 2.5);
            let hits = rack.hits(id);
            assert_eq!(hits.len(), 1, "bpm {bpm}");
            assert!((hits[0].time - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_solo_precedence() {
        let mut s = ready_session();
        let a = s.create_track(TrackKind::Instrument, None, None);
        let b = s.create_track(TrackKind::Instrument, None, None);
        let c = s.create_track(TrackKind::Instrument, None, None);
        for id in [a, b, c] {
            s.add_note(id, 60, 100, 0.0, 1.0).unwrap();
        }
        s.set_solo(a, true).unwrap();
        s.set_mute(c, true).unwrap();

        let audible: Vec<_> = s.registry().audible().map(|t| t.id).collect();
        assert_eq!(audible, vec![a]);

        s.set_solo(a, false).unwrap();
        let audible: Vec<_> = s.registry().audible().map(|t| t.id).collect();
        assert_eq!(audible, vec![a, b]);
        let scheduled: Vec<_> = s.scheduler().schedules().iter().map(|t| t.track).collect();
        assert_eq!(scheduled, vec![a, b]);
    }

    #[test]
    fn test_play_deferred_until_ready() {
        let mut s = Session::new(SR);
        s.play();
        assert!(s.is_start_pending());
        assert_eq!(s.transport().state(), TransportState::Stopped);
        s.mark_ready();
        assert!(!s.is_start_pending());
        assert!(s.transport().is_playing());
    }

    #[test]
    fn test_preview_dropped_before_ready() {
        let mut s = Session::new(SR);
        let id = s.create_track(TrackKind::Instrument, None, None);
        assert!(matches!(s.try_preview(id, TriggerKey::Pitch(60), 100, 1.0), Err(CadenceError::DeviceNotReady)));
        s.preview_note(id, 60, 100, 1.0).unwrap();
        assert!(s.drain_events().is_empty());

        s.mark_ready();
        s.preview_note(id, 60, 100, 1.0).unwrap();
        assert!(matches!(s.drain_events().as_slice(), [SessionEvent::Preview { .. }]));
    }

    #[test]
    fn test_stop_releases_and_rewinds() {
        let mut s = ready_session();
        s.play();
        let mut rack = FakeRack::default();
        run(&mut s, &mut rack, 0.5);
        s.drain_events();
        s.stop();
        assert_eq!(s.snapshot().position_beats, 0.0);
        assert_eq!(s.drain_events(), vec![SessionEvent::ReleaseAll]);
        assert!(s.scheduler().is_empty());
    }

    #[test]
    fn test_pause_resume_continues() {
        let mut s = ready_session();
        let id = s.create_track(TrackKind::Instrument, None, None);
        s.add_note(id, 60, 100, 3.0, 0.5).unwrap();
        let mut rack = FakeRack::with(&[id]);
        s.play();
        run(&mut s, &mut rack, 1.0);
        s.pause();
        let held = s.snapshot().position_beats;
        run(&mut s, &mut rack, 1.0);
        assert_eq!(s.snapshot().position_beats, held);
        assert!(rack.hits(id).is_empty());

        s.play();
        run(&mut s, &mut rack, 1.0);
        assert_eq!(rack.hits(id).len(), 1);
    }

    #[test]
    fn test_live_recording_quantizes() {
        let mut s = ready_session();
        let id = s.create_track(TrackKind::Instrument, None, None);
        s.arm_recording(id).unwrap();

        s.seek_secs(0.47).unwrap();
        assert!(s.note_down(id, 64, 90).unwrap());
        assert!(!s.note_down(id, 64, 90).unwrap());
        s.seek_secs(0.81).unwrap();
        let note_id = s.note_up(64).unwrap().unwrap();

        let pattern = s.get_or_create_default_pattern(id).unwrap();
        let note = pattern.notes().unwrap().iter().find(|n| n.id == note_id).unwrap().clone();
        let spb = s.transport().secs_per_beat();
        assert!((note.time * spb - 0.5).abs() < 1e-9);
        assert!((note.duration * spb - 0.25).abs() < 1e-9);
        assert_eq!(note.velocity, 90);
        // the recorded note is scheduled right away
        assert_eq!(s.scheduler().schedules().len(), 1);
    }

    #[test]
    fn test_note_held_across_loop_end() {
        let mut s = ready_session();
        let id = s.create_track(TrackKind::Instrument, None, None);
        s.set_loop(true, 0.0, 4.0).unwrap();
        s.arm_recording(id).unwrap();

        s.seek(3.5).unwrap();
        s.note_down(id, 64, 90).unwrap();
        // the playhead wraps before the key comes up
        s.seek(0.5).unwrap();
        let note_id = s.note_up(64).unwrap().unwrap();

        let pattern = s.get_or_create_default_pattern(id).unwrap();
        let note = pattern.notes().unwrap().iter().find(|n| n.id == note_id).unwrap();
        assert_eq!(note.time, 3.5);
        assert_eq!(note.duration, 1.0);
    }

    #[test]
    fn test_update_note_revalidates_and_reschedules() {
        let mut s = ready_session();
        let id = s.create_track(TrackKind::Instrument, None, None);
        let note_id = s.add_note(id, 60, 100, 0.0, 1.0).unwrap();
        assert_eq!(s.scheduler().schedules()[0].events[0].beat, 0.0);

        s.update_note(id, note_id, NoteUpdate { pitch: Some(67), time: Some(2.0), ..Default::default() })
            .unwrap();
        let note = s.get_or_create_default_pattern(id).unwrap().notes().unwrap()[0].clone();
        assert_eq!((note.pitch, note.velocity, note.time, note.duration), (67, 100, 2.0, 1.0));
        let event = &s.scheduler().schedules()[0].events[0];
        assert_eq!(event.beat, 2.0);

        // rejected updates leave the note untouched
        let outside = NoteUpdate { time: Some(4.0), ..Default::default() };
        assert!(matches!(s.update_note(id, note_id, outside), Err(CadenceError::InvalidParameter(_))));
        let loud = NoteUpdate { velocity: Some(200), ..Default::default() };
        assert!(s.update_note(id, note_id, loud).is_err());
        assert!(matches!(
            s.update_note(id, NoteId(999), NoteUpdate::default()),
            Err(CadenceError::UnknownNote(NoteId(999)))
        ));
        assert_eq!(s.get_or_create_default_pattern(id).unwrap().notes().unwrap()[0], note);
    }

    #[test]
    fn test_unarmed_input_only_previews() {
        let mut s = ready_session();
        let id = s.create_track(TrackKind::Instrument, None, None);
        assert!(s.key_down(id, "a").unwrap());
        assert_eq!(s.key_up("a").unwrap(), None);
        let events = s.drain_events();
        assert!(matches!(
            events.as_slice(),
            [SessionEvent::Preview { trigger, .. }, SessionEvent::Release { .. }] if trigger.is_held()
        ));
        assert!(s.get_or_create_default_pattern(id).unwrap().is_silent());
    }

    #[test]
    fn test_drum_tracks_cannot_be_armed() {
        let mut s = ready_session();
        let drums = s.create_track(TrackKind::Drums, None, None);
        assert!(matches!(s.arm_recording(drums), Err(CadenceError::TypeMismatch { .. })));
    }

    #[test]
    fn test_load_drum_pattern() {
        let mut s = ready_session();
        let drums = s.create_track(TrackKind::Drums, None, None);
        s.load_drum_pattern(drums, "house").unwrap();
        let grid = s.get_or_create_default_pattern(drums).unwrap().step_grid().unwrap().clone();
        assert!(grid["openhat"][15]);
        assert!(s.load_drum_pattern(drums, "polka").is_err());
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut s = ready_session();
        s.set_tempo(96.0).unwrap();
        s.set_loop(true, 4.0, 12.0).unwrap();
        s.set_time_signature(3, 4).unwrap();
        let lead = s.create_track(TrackKind::Instrument, Some("Lead"), Some("fm-synth"));
        s.add_note(lead, 72, 110, 1.5, 0.5).unwrap();
        s.set_volume(lead, -6.0).unwrap();
        s.set_pan(lead, 0.3).unwrap();
        let fx = s.add_effect(lead, EffectKind::Delay).unwrap();
        s.update_effect(lead, fx, &BTreeMap::from([("feedback".to_string(), ParamValue::Number(0.6))]))
            .unwrap();
        let drums = s.create_track(TrackKind::Drums, None, Some("trap"));
        s.load_drum_pattern(drums, "trap").unwrap();
        s.set_solo(drums, true).unwrap();

        let json = s.export_project().to_json().unwrap();
        let mut restored = Session::new(SR);
        restored.import_project(Project::from_json(&json).unwrap()).unwrap();

        assert_eq!(restored.tracks(), s.tracks());
        assert_eq!(restored.transport().bpm(), 96.0);
        assert_eq!(restored.transport().time_signature(), TimeSignature::new(3, 4).unwrap());
        assert!(restored.transport().loop_enabled());
        assert_eq!(restored.transport().loop_region().start, 4.0);
        assert!(restored.registry().is_effectively_muted(lead));
        let scheduled: Vec<_> = restored.scheduler().schedules().iter().map(|t| t.track).collect();
        assert_eq!(scheduled, vec![drums]);
    }

    #[test]
    fn test_import_rejects_bad_transport() {
        let mut s = ready_session();
        s.create_track(TrackKind::Instrument, None, None);
        let bad = Project { bpm: -5.0, ..Default::default() };
        assert!(s.import_project(bad).is_err());
        assert_eq!(s.tracks().len(), 1);
    }

    #[test]
    fn test_import_repairs_tracks() {
        let json = r#"{
            "tracks": [
                {"id": 1, "type": "instrument", "volume": 40, "pan": -5,
                 "pattern": {"id": 2, "name": "p", "startTime": 0, "duration": 4,
                             "notes": [{"id": 3, "pitch": 60, "velocity": 100, "time": 9, "duration": 1},
                                       {"id": 4, "pitch": 62, "velocity": 100, "time": 1, "duration": 1}]}},
                {"id": 5, "type": "drums",
                 "pattern": {"id": 6, "name": "p", "startTime": 0, "duration": 4, "notes": []}}
            ]
        }"#;
        let mut s = ready_session();
        s.import_project(Project::from_json(json).unwrap()).unwrap();
        let synth = s.track(TrackId(1)).unwrap();
        assert_eq!(synth.volume, 12.0);
        assert_eq!(synth.pan, -1.0);
        assert_eq!(synth.instrument_id.as_deref(), Some("synth"));
        assert_eq!(synth.pattern.as_ref().unwrap().notes().unwrap().len(), 1);
        let drums = s.track(TrackId(5)).unwrap();
        assert!(drums.pattern.is_none());
        assert_eq!(drums.drum_kit.as_deref(), Some("electronic"));
    }

    #[test]
    fn test_import_fills_partial_entries() {
        let json = r#"{
            "tracks": [
                {"id": 1, "type": "instrument",
                 "effects": [{"id": 2, "type": "delay"}, {"type": "reverb", "enabled": false}],
                 "pattern": {"notes": [{"pitch": 60, "time": 0, "duration": 1},
                                       {"pitch": 64, "time": 1, "duration": 1}]}}
            ]
        }"#;
        let mut s = ready_session();
        s.import_project(Project::from_json(json).unwrap()).unwrap();
        let track = s.track(TrackId(1)).unwrap().clone();

        assert_eq!(track.effects[0].id, EffectId(2));
        assert_eq!(track.effects[0].name, "Delay");
        assert!(track.effects[0].enabled);
        assert_eq!(track.effects[0].number("feedback"), 0.4);
        assert!(!track.effects[1].enabled);
        assert!(track.effects[1].id.0 > 2);

        let pattern = track.pattern.unwrap();
        assert_ne!(pattern.id.0, 0);
        assert_eq!(pattern.start_time, 0.0);
        assert_eq!(pattern.duration, 4.0);
        assert!(!pattern.name.is_empty());
        let notes = pattern.notes().unwrap();
        assert_eq!(notes.len(), 2);
        assert!(notes.iter().all(|n| n.id.0 != 0 && n.velocity == 100));
        assert_ne!(notes[0].id, notes[1].id);

        // both notes are live in the schedule
        assert_eq!(s.scheduler().schedules()[0].events.len(), 2);
        // a later edit does not collide with any loaded id
        let fresh = s.add_note(TrackId(1), 67, 100, 2.0, 1.0).unwrap();
        assert!(notes.iter().all(|n| n.id != fresh));
    }

    #[test]
    fn test_delete_unknown_track_is_noop() {
        let mut s = ready_session();
        let id = s.create_track(TrackKind::Audio, None, None);
        s.delete_track(TrackId(999));
        assert_eq!(s.tracks().len(), 1);
        s.delete_track(id);
        assert!(s.tracks().is_empty());
    }

    #[test]
    fn test_toggles() {
        let mut s = ready_session();
        let id = s.create_track(TrackKind::Instrument, None, None);
        assert!(s.toggle_mute(id).unwrap());
        assert!(!s.toggle_mute(id).unwrap());
        assert!(s.toggle_solo(id).unwrap());
        assert!(s.registry().has_solo());
        assert!(s.toggle_mute(TrackId(77)).is_err());
    }

    #[test]
    fn test_tempo_preset_fallback() {
        let mut s = ready_session();
        assert_eq!(s.apply_tempo_preset("ambient").unwrap(), 80.0);
        assert_eq!(s.apply_tempo_preset("unknown").unwrap(), 120.0);
        assert_eq!(s.transport().bpm(), 120.0);
    }
}
