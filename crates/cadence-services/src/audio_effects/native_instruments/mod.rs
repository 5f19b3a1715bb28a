//! Native instruments: every track's sound generator lives here

pub mod drum_synth;
mod envelope;
pub mod poly_synth;
pub mod sampler;

pub use drum_synth::DrumSynth;
pub use envelope::{Adsr, EnvelopeStage};
pub use poly_synth::PolySynth;
pub use sampler::Sampler;

use cadence_core::presets::{self, SynthFamily};
use cadence_core::{GeneratorError, SoundGenerator, Track, TrackKind, Trigger, TriggerKey};

/// Triggers waiting for the block they start in
#[derive(Debug, Default)]
pub(crate) struct PendingTriggers {
    queue: Vec<Trigger>,
}

impl PendingTriggers {
    pub fn push(&mut self, trigger: Trigger) {
        self.queue.push(trigger);
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Remove the triggers that start before the end of this block and
    /// return them with their frame offsets, earliest first. Late triggers
    /// start at frame 0.
    pub fn take_due(&mut self, clock_secs: f64, sample_rate: f32, frames: usize) -> Vec<(usize, Trigger)> {
        let sample_rate = sample_rate as f64;
        let mut due = Vec::new();
        self.queue.retain(|t| {
            let offset = ((t.time - clock_secs) * sample_rate).round();
            if offset < frames as f64 {
                due.push((offset.max(0.0) as usize, t.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(offset, _)| *offset);
        due
    }
}

/// Frames a trigger should sound for, `None` when held until released
pub(crate) fn duration_frames(trigger: &Trigger, sample_rate: f32) -> Option<usize> {
    if trigger.is_held() {
        return None;
    }
    Some((trigger.duration.max(0.0) * sample_rate as f64).round() as usize)
}

/// Unified generator wrapper so a track's channel can own any instrument
#[derive(Debug)]
pub enum Generator {
    Synth(PolySynth),
    Drums(DrumSynth),
    Sampler(Sampler),
}

impl Generator {
    /// Build the generator a track's kind and preset call for
    pub fn for_track(track: &Track, sample_rate: f32) -> Self {
        match track.kind {
            TrackKind::Drums => {
                let kit = presets::drum_kit(track.drum_kit.as_deref().unwrap_or(presets::DEFAULT_DRUM_KIT));
                Self::Drums(DrumSynth::new(kit, sample_rate))
            }
            TrackKind::Instrument => {
                let preset =
                    presets::instrument(track.instrument_id.as_deref().unwrap_or(presets::DEFAULT_INSTRUMENT));
                match preset.family {
                    SynthFamily::Sampler => Self::Sampler(Sampler::piano(preset, sample_rate)),
                    _ => Self::Synth(PolySynth::new(preset, sample_rate)),
                }
            }
            // audio tracks have no recorded material to play yet
            TrackKind::Audio => Self::Sampler(Sampler::empty(sample_rate)),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        match self {
            Self::Synth(s) => s.set_sample_rate(sample_rate),
            Self::Drums(d) => d.set_sample_rate(sample_rate),
            Self::Sampler(s) => s.set_sample_rate(sample_rate),
        }
    }

    pub fn active_voices(&self) -> usize {
        match self {
            Self::Synth(s) => s.active_voices(),
            Self::Drums(d) => d.active_voices(),
            Self::Sampler(s) => s.active_voices(),
        }
    }
}

impl SoundGenerator for Generator {
    fn name(&self) -> &str {
        match self {
            Self::Synth(s) => s.name(),
            Self::Drums(d) => d.name(),
            Self::Sampler(s) => s.name(),
        }
    }

    fn trigger(&mut self, trigger: Trigger) -> Result<(), GeneratorError> {
        match self {
            Self::Synth(s) => s.trigger(trigger),
            Self::Drums(d) => d.trigger(trigger),
            Self::Sampler(s) => s.trigger(trigger),
        }
    }

    fn release(&mut self, key: &TriggerKey) {
        match self {
            Self::Synth(s) => s.release(key),
            Self::Drums(d) => d.release(key),
            Self::Sampler(s) => s.release(key),
        }
    }

    fn release_all(&mut self) {
        match self {
            Self::Synth(s) => s.release_all(),
            Self::Drums(d) => d.release_all(),
            Self::Sampler(s) => s.release_all(),
        }
    }

    fn render(&mut self, clock_secs: f64, out: &mut [f32]) {
        match self {
            Self::Synth(s) => s.render(clock_secs, out),
            Self::Drums(d) => d.render(clock_secs, out),
            Self::Sampler(s) => s.render(clock_secs, out),
        }
    }

    fn dispose(&mut self) {
        match self {
            Self::Synth(s) => s.dispose(),
            Self::Drums(d) => d.dispose(),
            Self::Sampler(s) => s.dispose(),
        }
    }
}
