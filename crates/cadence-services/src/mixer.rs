//! Per-track channel strips and the stereo mix bus

use std::f32::consts::FRAC_PI_4;

use cadence_core::{
    GeneratorRack, SessionEvent, SoundGenerator, Track, TrackId, TrackKind, TrackRegistry,
};
use tracing::{debug, warn};

use crate::audio_effects::{EffectChain, Generator};

/// What a channel's generator was built from; a change means a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
struct GeneratorSource {
    kind: TrackKind,
    instrument: Option<String>,
    drum_kit: Option<String>,
}

impl GeneratorSource {
    fn of(track: &Track) -> Self {
        Self { kind: track.kind, instrument: track.instrument_id.clone(), drum_kit: track.drum_kit.clone() }
    }
}

/// Equal-power pan law, `pan` in [-1, 1]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// A track's signal path: generator, effects, then gain and pan
#[derive(Debug)]
pub struct ChannelStrip {
    track: TrackId,
    source: GeneratorSource,
    generator: Generator,
    effects: EffectChain,
    /// Gain applied at the end of the previous block
    gain: f32,
    target_gain: f32,
    pan: f32,
    scratch: Vec<f32>,
}

impl ChannelStrip {
    pub fn new(track: &Track, sample_rate: f32) -> Self {
        let mut effects = EffectChain::new(sample_rate);
        effects.sync(&track.effects);
        Self {
            track: track.id,
            source: GeneratorSource::of(track),
            generator: Generator::for_track(track, sample_rate),
            effects,
            gain: 0.0,
            target_gain: 0.0,
            pan: track.pan,
            scratch: Vec::new(),
        }
    }

    pub fn track(&self) -> TrackId {
        self.track
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn effects(&self) -> &EffectChain {
        &self.effects
    }

    pub fn target_gain(&self) -> f32 {
        self.target_gain
    }

    /// Follow the track's settings. Muted or solo-excluded channels fade to zero.
    fn update(&mut self, track: &Track, audible: bool, sample_rate: f32) {
        let source = GeneratorSource::of(track);
        if source != self.source {
            debug!(track = %track.id, instrument = ?source.instrument, kit = ?source.drum_kit, "Rebuilding generator");
            self.generator.dispose();
            self.generator = Generator::for_track(track, sample_rate);
            self.source = source;
        }
        self.effects.sync(&track.effects);
        self.target_gain = if audible { track.gain() } else { 0.0 };
        self.pan = track.pan;
    }

    /// Render one block and add it into the stereo bus
    fn render(&mut self, clock_secs: f64, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len();
        self.scratch.clear();
        self.scratch.resize(frames, 0.0);
        self.generator.render(clock_secs, &mut self.scratch);
        self.effects.process(&mut self.scratch);

        // ramp gain across the block so fader moves do not click
        let start = self.gain;
        let step = (self.target_gain - start) / frames.max(1) as f32;
        let (pan_l, pan_r) = pan_gains(self.pan);
        for (i, sample) in self.scratch.iter().enumerate() {
            let g = start + step * (i + 1) as f32;
            left[i] += sample * g * pan_l;
            right[i] += sample * g * pan_r;
        }
        self.gain = self.target_gain;
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.generator.set_sample_rate(sample_rate);
        self.effects.set_sample_rate(sample_rate);
    }
}

/// All channel strips, summed into a soft-clipped stereo bus
#[derive(Debug)]
pub struct Mixer {
    channels: Vec<ChannelStrip>,
    sample_rate: f32,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Mixer {
    pub fn new(sample_rate: f32) -> Self {
        Self { channels: Vec::new(), sample_rate, left: Vec::new(), right: Vec::new() }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> &[ChannelStrip] {
        &self.channels
    }

    pub fn channel(&self, track: TrackId) -> Option<&ChannelStrip> {
        self.channels.iter().find(|c| c.track == track)
    }

    /// Match channels to the registry: create, rebuild, update and drop
    pub fn sync(&mut self, registry: &TrackRegistry) {
        let mut existing = std::mem::take(&mut self.channels);
        for track in registry.tracks() {
            let audible = !registry.is_effectively_muted(track.id);
            let mut channel = match existing.iter().position(|c| c.track == track.id) {
                Some(pos) => existing.swap_remove(pos),
                None => {
                    debug!(track = %track.id, kind = %track.kind, "Creating channel");
                    ChannelStrip::new(track, self.sample_rate)
                }
            };
            channel.update(track, audible, self.sample_rate);
            self.channels.push(channel);
        }
        for mut gone in existing {
            debug!(track = %gone.track, "Disposing channel");
            gone.generator.dispose();
        }
    }

    /// Apply queued session work to the generators
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ReleaseAll => {
                for channel in &mut self.channels {
                    channel.generator.release_all();
                }
            }
            SessionEvent::Preview { track, trigger } => {
                let Some(channel) = self.channels.iter_mut().find(|c| c.track == track) else {
                    warn!(track = %track, "Preview for a track without a channel");
                    return;
                };
                if let Err(e) = channel.generator.trigger(trigger) {
                    warn!(track = %track, error = %e, "Preview failed");
                }
            }
            SessionEvent::Release { track, key } => {
                if let Some(channel) = self.channels.iter_mut().find(|c| c.track == track) {
                    channel.generator.release(&key);
                }
            }
        }
    }

    /// Render every channel for one block. Returns the left and right bus.
    pub fn render(&mut self, clock_secs: f64, frames: usize) -> (&[f32], &[f32]) {
        self.left.clear();
        self.left.resize(frames, 0.0);
        self.right.clear();
        self.right.resize(frames, 0.0);

        for channel in &mut self.channels {
            channel.render(clock_secs, &mut self.left, &mut self.right);
        }
        for sample in self.left.iter_mut().chain(self.right.iter_mut()) {
            *sample = sample.tanh();
        }
        (&self.left, &self.right)
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        if sample_rate == self.sample_rate {
            return;
        }
        self.sample_rate = sample_rate;
        for channel in &mut self.channels {
            channel.set_sample_rate(sample_rate);
        }
    }
}

impl GeneratorRack for Mixer {
    fn generator_mut(&mut self, track: TrackId) -> Option<&mut dyn SoundGenerator> {
        self.channels
            .iter_mut()
            .find(|c| c.track == track)
            .map(|c| &mut c.generator as &mut dyn SoundGenerator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{EffectKind, Trigger, TriggerKey};

    const SR: f32 = 8000.0;

    fn registry_with(kinds: &[TrackKind]) -> (TrackRegistry, Vec<TrackId>) {
        let mut registry = TrackRegistry::new();
        let ids = kinds.iter().map(|k| registry.create(*k, None, None)).collect();
        (registry, ids)
    }

    #[test]
    fn test_pan_law() {
        let (l, r) = pan_gains(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-6);
        assert!(pan_gains(-1.0).1.abs() < 1e-6);
        assert!(pan_gains(1.0).0.abs() < 1e-6);
    }

    #[test]
    fn test_sync_creates_and_drops_channels() {
        let (mut registry, ids) = registry_with(&[TrackKind::Instrument, TrackKind::Drums]);
        let mut mixer = Mixer::new(SR);
        mixer.sync(&registry);
        assert_eq!(mixer.channels().len(), 2);
        assert!(matches!(mixer.channel(ids[1]).unwrap().generator(), Generator::Drums(_)));

        registry.remove(ids[0]);
        mixer.sync(&registry);
        assert_eq!(mixer.channels().len(), 1);
        assert!(mixer.channel(ids[0]).is_none());
    }

    #[test]
    fn test_instrument_change_rebuilds_generator() {
        let (mut registry, ids) = registry_with(&[TrackKind::Instrument]);
        let mut mixer = Mixer::new(SR);
        mixer.sync(&registry);
        assert!(matches!(mixer.channel(ids[0]).unwrap().generator(), Generator::Synth(_)));

        registry.set_instrument(ids[0], "piano").unwrap();
        mixer.sync(&registry);
        assert!(matches!(mixer.channel(ids[0]).unwrap().generator(), Generator::Sampler(_)));
    }

    #[test]
    fn test_effects_follow_track() {
        let (mut registry, ids) = registry_with(&[TrackKind::Instrument]);
        registry.add_effect(ids[0], EffectKind::Reverb).unwrap();
        registry.add_effect(ids[0], EffectKind::Delay).unwrap();
        let mut mixer = Mixer::new(SR);
        mixer.sync(&registry);
        let expected: Vec<_> = registry.get(ids[0]).unwrap().effects.iter().map(|e| e.id).collect();
        assert_eq!(mixer.channel(ids[0]).unwrap().effects().ids(), expected);
    }

    #[test]
    fn test_muted_channel_targets_silence() {
        let (mut registry, ids) = registry_with(&[TrackKind::Instrument, TrackKind::Instrument]);
        registry.set_mute(ids[0], true).unwrap();
        let mut mixer = Mixer::new(SR);
        mixer.sync(&registry);
        assert_eq!(mixer.channel(ids[0]).unwrap().target_gain(), 0.0);
        assert_eq!(mixer.channel(ids[1]).unwrap().target_gain(), 1.0);
    }

    #[test]
    fn test_preview_and_pan() {
        let (mut registry, ids) = registry_with(&[TrackKind::Instrument]);
        registry.require_mut(ids[0]).unwrap().set_pan(-1.0);
        let mut mixer = Mixer::new(SR);
        mixer.sync(&registry);
        mixer.apply(SessionEvent::Preview { track: ids[0], trigger: Trigger::pitch(60, 120, 0.0, 0.5) });

        let (left, right) = mixer.render(0.0, 800);
        assert!(left.iter().any(|s| s.abs() > 0.0));
        assert!(right.iter().all(|s| s.abs() < 1e-6));
        assert!(left.iter().all(|s| s.abs() < 1.0));

        mixer.apply(SessionEvent::Release { track: ids[0], key: TriggerKey::Pitch(60) });
        mixer.apply(SessionEvent::ReleaseAll);
    }
}
