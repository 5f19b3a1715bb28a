//! Oscillator synthesizer covering the poly, mono, FM, AM and pluck presets

use std::f32::consts::TAU;

use cadence_core::presets::{InstrumentPreset, SynthFamily, Waveform};
use cadence_core::theory::pitch_to_frequency;
use cadence_core::{GeneratorError, SoundGenerator, Trigger, TriggerKey};

use super::envelope::Adsr;
use super::{duration_frames, PendingTriggers};

const MAX_VOICES: usize = 16;
/// Per-voice output scale, leaves headroom for chords
const VOICE_GAIN: f32 = 0.25;
const FM_HARMONICITY: f32 = 3.0;
const AM_HARMONICITY: f32 = 3.0;
/// Loss per pass through the plucked-string loop
const PLUCK_DAMPING: f32 = 0.996;

fn oscillator(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (phase * TAU).sin(),
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => 2.0 * phase - 1.0,
    }
}

#[derive(Debug, Clone)]
struct Voice {
    pitch: u8,
    freq: f32,
    velocity: f32,
    phase: f32,
    mod_phase: f32,
    env: Adsr,
    /// Frames until the note releases itself; `None` while held
    remaining: Option<usize>,
    age: u64,
    /// Plucked-string delay line
    string: Vec<f32>,
    string_pos: usize,
    /// One-pole lowpass memory
    filter_state: f32,
}

impl Voice {
    fn new(preset: &InstrumentPreset, sample_rate: f32) -> Self {
        Self {
            pitch: 0,
            freq: 0.0,
            velocity: 0.0,
            phase: 0.0,
            mod_phase: 0.0,
            env: Adsr::new(preset.envelope, sample_rate),
            remaining: None,
            age: 0,
            string: Vec::new(),
            string_pos: 0,
            filter_state: 0.0,
        }
    }

    fn is_active(&self) -> bool {
        self.env.is_active()
    }

    fn start(&mut self, family: SynthFamily, trigger: &Trigger, pitch: u8, sample_rate: f32) {
        self.pitch = pitch;
        self.freq = pitch_to_frequency(pitch);
        self.velocity = trigger.velocity.min(127) as f32 / 127.0;
        self.phase = 0.0;
        self.mod_phase = 0.0;
        self.remaining = duration_frames(trigger, sample_rate);
        self.age = 0;
        self.filter_state = 0.0;
        if family == SynthFamily::Pluck {
            let len = ((sample_rate / self.freq) as usize).max(2);
            self.string = (0..len).map(|_| fastrand::f32() * 2.0 - 1.0).collect();
            self.string_pos = 0;
        }
        self.env.reset();
        self.env.note_on();
    }

    fn tick(&mut self, preset: &InstrumentPreset, sample_rate: f32, filter_coeff: Option<f32>) -> f32 {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                self.env.note_off();
                self.remaining = None;
            } else {
                *remaining -= 1;
            }
        }
        self.age += 1;

        let step = self.freq / sample_rate;
        let raw = match preset.family {
            SynthFamily::Fm { index } => {
                let modulator = (self.mod_phase * TAU).sin() * index;
                self.mod_phase = (self.mod_phase + step * FM_HARMONICITY).fract();
                (self.phase * TAU + modulator).sin()
            }
            SynthFamily::Am => {
                let modulator = 0.5 + 0.5 * oscillator(Waveform::Square, self.mod_phase);
                self.mod_phase = (self.mod_phase + step * AM_HARMONICITY).fract();
                oscillator(preset.waveform, self.phase) * modulator
            }
            SynthFamily::Pluck => {
                let len = self.string.len();
                let next = (self.string_pos + 1) % len;
                let out = self.string[self.string_pos];
                self.string[self.string_pos] = 0.5 * (out + self.string[next]) * PLUCK_DAMPING;
                self.string_pos = next;
                out
            }
            SynthFamily::Poly | SynthFamily::Mono | SynthFamily::Sampler => oscillator(preset.waveform, self.phase),
        };
        self.phase = (self.phase + step).fract();

        let filtered = match filter_coeff {
            Some(coeff) => {
                self.filter_state += coeff * (raw - self.filter_state);
                self.filter_state
            }
            None => raw,
        };

        filtered * self.env.tick() * self.velocity * VOICE_GAIN
    }
}

/// Preset-driven oscillator synth. Mono presets keep a single voice where the
/// newest note wins.
pub struct PolySynth {
    preset: &'static InstrumentPreset,
    sample_rate: f32,
    voices: Vec<Voice>,
    pending: PendingTriggers,
    disposed: bool,
}

impl std::fmt::Debug for PolySynth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolySynth")
            .field("preset", &self.preset.key)
            .field("sample_rate", &self.sample_rate)
            .field("active_voices", &self.active_voices())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl PolySynth {
    pub fn new(preset: &'static InstrumentPreset, sample_rate: f32) -> Self {
        let count = if preset.family == SynthFamily::Mono { 1 } else { MAX_VOICES };
        Self {
            preset,
            sample_rate,
            voices: (0..count).map(|_| Voice::new(preset, sample_rate)).collect(),
            pending: PendingTriggers::default(),
            disposed: false,
        }
    }

    pub fn preset(&self) -> &'static InstrumentPreset {
        self.preset
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        for voice in &mut self.voices {
            voice.env.set_sample_rate(sample_rate);
        }
    }

    fn filter_coeff(&self) -> Option<f32> {
        self.preset
            .filter_cutoff
            .map(|hz| 1.0 - (-TAU * hz.min(self.sample_rate * 0.45) / self.sample_rate).exp())
    }

    fn start_voice(&mut self, trigger: &Trigger) {
        let TriggerKey::Pitch(pitch) = trigger.key else { return };
        // free voice first, otherwise steal the oldest
        let idx = self
            .voices
            .iter()
            .position(|v| !v.is_active())
            .or_else(|| self.voices.iter().enumerate().max_by_key(|(_, v)| v.age).map(|(i, _)| i))
            .unwrap_or(0);
        self.voices[idx].start(self.preset.family, trigger, pitch, self.sample_rate);
    }
}

impl SoundGenerator for PolySynth {
    fn name(&self) -> &str {
        self.preset.name
    }

    fn trigger(&mut self, trigger: Trigger) -> Result<(), GeneratorError> {
        if self.disposed {
            return Err(GeneratorError::Disposed);
        }
        if !matches!(trigger.key, TriggerKey::Pitch(_)) {
            return Err(GeneratorError::Unsupported { generator: self.preset.name.to_string(), key: trigger.key });
        }
        self.pending.push(trigger);
        Ok(())
    }

    fn release(&mut self, key: &TriggerKey) {
        let TriggerKey::Pitch(pitch) = *key else { return };
        for voice in self.voices.iter_mut().filter(|v| v.is_active() && v.pitch == pitch) {
            voice.env.note_off();
            voice.remaining = None;
        }
    }

    fn release_all(&mut self) {
        self.pending.clear();
        for voice in &mut self.voices {
            voice.env.note_off();
            voice.remaining = None;
        }
    }

    fn render(&mut self, clock_secs: f64, out: &mut [f32]) {
        if self.disposed {
            return;
        }
        let mut due = self.pending.take_due(clock_secs, self.sample_rate, out.len()).into_iter().peekable();
        let filter_coeff = self.filter_coeff();

        for (frame, sample) in out.iter_mut().enumerate() {
            while let Some((_, trigger)) = due.next_if(|(offset, _)| *offset <= frame) {
                self.start_voice(&trigger);
            }
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
                mix += voice.tick(self.preset, self.sample_rate, filter_coeff);
            }
            *sample += mix;
        }
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.pending.clear();
        for voice in &mut self.voices {
            voice.env.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::presets;

    const SR: f32 = 8000.0;

    fn energy(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s * s).sum()
    }

    #[test]
    fn test_trigger_starts_at_offset() {
        let mut synth = PolySynth::new(presets::instrument("synth"), SR);
        synth.trigger(Trigger::pitch(69, 127, 0.05, 0.2)).unwrap();
        let mut out = vec![0.0; 800];
        synth.render(0.0, &mut out);
        assert!(out[..400].iter().all(|s| *s == 0.0));
        assert!(energy(&out[400..]) > 0.0);
    }

    #[test]
    fn test_note_releases_after_duration() {
        let mut synth = PolySynth::new(presets::instrument("organ"), SR);
        synth.trigger(Trigger::pitch(60, 100, 0.0, 0.1)).unwrap();
        let mut out = vec![0.0; 8000];
        synth.render(0.0, &mut out);
        // organ release is 0.5 s, so after 1 s the voice is gone
        assert_eq!(synth.active_voices(), 0);
        assert!(energy(&out[..800]) > 0.0);
    }

    #[test]
    fn test_held_note_waits_for_release() {
        let mut synth = PolySynth::new(presets::instrument("organ"), SR);
        synth.trigger(Trigger::pitch(60, 100, 0.0, f64::INFINITY)).unwrap();
        let mut out = vec![0.0; 16000];
        synth.render(0.0, &mut out);
        assert_eq!(synth.active_voices(), 1);
        synth.release(&TriggerKey::Pitch(60));
        let mut out = vec![0.0; 8000];
        synth.render(2.0, &mut out);
        assert_eq!(synth.active_voices(), 0);
    }

    #[test]
    fn test_chord_uses_several_voices() {
        let mut synth = PolySynth::new(presets::instrument("synth-pad"), SR);
        for pitch in [60, 64, 67] {
            synth.trigger(Trigger::pitch(pitch, 100, 0.0, 1.0)).unwrap();
        }
        let mut out = vec![0.0; 64];
        synth.render(0.0, &mut out);
        assert_eq!(synth.active_voices(), 3);
    }

    #[test]
    fn test_mono_preset_keeps_one_voice() {
        let mut synth = PolySynth::new(presets::instrument("bass"), SR);
        for pitch in [40, 43] {
            synth.trigger(Trigger::pitch(pitch, 100, 0.0, 1.0)).unwrap();
        }
        let mut out = vec![0.0; 64];
        synth.render(0.0, &mut out);
        assert_eq!(synth.active_voices(), 1);
        assert_eq!(synth.voices[0].pitch, 43);
    }

    #[test]
    fn test_every_family_makes_sound() {
        for key in ["synth", "synth-lead", "am-synth", "fm-synth", "pluck"] {
            let mut synth = PolySynth::new(presets::instrument(key), SR);
            synth.trigger(Trigger::pitch(57, 120, 0.0, 0.25)).unwrap();
            let mut out = vec![0.0; 2000];
            synth.render(0.0, &mut out);
            assert!(energy(&out) > 0.0, "{key}");
            assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0), "{key}");
        }
    }

    #[test]
    fn test_sound_keys_and_disposal() {
        let mut synth = PolySynth::new(presets::instrument("synth"), SR);
        assert!(matches!(
            synth.trigger(Trigger::sound("kick", 100, 0.0, 0.1)),
            Err(GeneratorError::Unsupported { .. })
        ));
        synth.dispose();
        assert_eq!(synth.trigger(Trigger::pitch(60, 100, 0.0, 0.1)), Err(GeneratorError::Disposed));
    }
}
