//! Pitched sample playback

use std::f32::consts::TAU;
use std::sync::Arc;

use cadence_core::presets::{Envelope, InstrumentPreset};
use cadence_core::theory::pitch_to_frequency;
use cadence_core::{GeneratorError, SoundGenerator, Trigger, TriggerKey};

use super::envelope::Adsr;
use super::{duration_frames, PendingTriggers};

const MAX_VOICES: usize = 16;
const VOICE_GAIN: f32 = 0.35;
/// Pitch the sample table was recorded at
const ROOT_PITCH: u8 = 60;
const PIANO_TABLE_SECS: f32 = 3.0;

/// Render a struck-string tone at the root pitch: decaying partials with
/// slight inharmonicity and a short hammer noise
fn piano_table(sample_rate: f32) -> Vec<f32> {
    let root = pitch_to_frequency(ROOT_PITCH);
    let len = (PIANO_TABLE_SECS * sample_rate) as usize;
    let mut rng = fastrand::Rng::with_seed(60);
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate;
            let mut s = 0.0;
            for h in 1..=8 {
                let h = h as f32;
                let freq = root * h * (1.0 + 0.0004 * h * h);
                s += (TAU * freq * t).sin() * (-t * (0.6 + 0.9 * h)).exp() / h;
            }
            let hammer = (rng.f32() * 2.0 - 1.0) * (-t * 300.0).exp() * 0.2;
            (s + hammer) * 0.6
        })
        .collect()
}

#[derive(Debug, Clone)]
struct SampleVoice {
    pitch: u8,
    position: f64,
    rate: f64,
    velocity: f32,
    env: Adsr,
    remaining: Option<usize>,
    age: u64,
}

impl SampleVoice {
    fn is_active(&self) -> bool {
        self.env.is_active()
    }

    fn tick(&mut self, table: &[f32]) -> f32 {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                self.env.note_off();
                self.remaining = None;
            } else {
                *remaining -= 1;
            }
        }
        self.age += 1;

        let idx = self.position as usize;
        if idx + 1 >= table.len() {
            self.env.reset();
            return 0.0;
        }
        let frac = (self.position - idx as f64) as f32;
        let sample = table[idx] * (1.0 - frac) + table[idx + 1] * frac;
        self.position += self.rate;
        sample * self.env.tick() * self.velocity * VOICE_GAIN
    }
}

/// Plays a sample table transposed to each triggered pitch. An empty table
/// accepts triggers and stays silent.
pub struct Sampler {
    name: String,
    table: Arc<Vec<f32>>,
    envelope: Envelope,
    sample_rate: f32,
    /// Rate the table was rendered at
    table_rate: f32,
    voices: Vec<SampleVoice>,
    pending: PendingTriggers,
    disposed: bool,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("name", &self.name)
            .field("table_len", &self.table.len())
            .field("active_voices", &self.active_voices())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Sampler {
    pub fn new(name: impl Into<String>, table: Arc<Vec<f32>>, table_rate: f32, envelope: Envelope, sample_rate: f32) -> Self {
        Self {
            name: name.into(),
            table,
            envelope,
            sample_rate,
            table_rate,
            voices: Vec::new(),
            pending: PendingTriggers::default(),
            disposed: false,
        }
    }

    pub fn piano(preset: &InstrumentPreset, sample_rate: f32) -> Self {
        Self::new(preset.name, Arc::new(piano_table(sample_rate)), sample_rate, preset.envelope, sample_rate)
    }

    pub fn empty(sample_rate: f32) -> Self {
        Self::new("Audio", Arc::new(Vec::new()), sample_rate, Envelope::new(0.0, 0.0, 1.0, 0.05), sample_rate)
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

    fn start_voice(&mut self, trigger: &Trigger) {
        let TriggerKey::Pitch(pitch) = trigger.key else { return };
        if self.table.is_empty() {
            return;
        }
        let transpose = pitch_to_frequency(pitch) / pitch_to_frequency(ROOT_PITCH);
        let mut env = Adsr::new(self.envelope, self.sample_rate);
        env.note_on();
        let voice = SampleVoice {
            pitch,
            position: 0.0,
            rate: (transpose * self.table_rate / self.sample_rate) as f64,
            velocity: trigger.velocity.min(127) as f32 / 127.0,
            env,
            remaining: duration_frames(trigger, self.sample_rate),
            age: 0,
        };

        if let Some(slot) = self.voices.iter_mut().find(|v| !v.is_active()) {
            *slot = voice;
        } else if self.voices.len() < MAX_VOICES {
            self.voices.push(voice);
        } else if let Some(oldest) = self.voices.iter_mut().max_by_key(|v| v.age) {
            *oldest = voice;
        }
    }
}

impl SoundGenerator for Sampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn trigger(&mut self, trigger: Trigger) -> Result<(), GeneratorError> {
        if self.disposed {
            return Err(GeneratorError::Disposed);
        }
        if !matches!(trigger.key, TriggerKey::Pitch(_)) {
            return Err(GeneratorError::Unsupported { generator: self.name.clone(), key: trigger.key });
        }
        self.pending.push(trigger);
        Ok(())
    }

    fn release(&mut self, key: &TriggerKey) {
        let TriggerKey::Pitch(pitch) = *key else { return };
        for voice in self.voices.iter_mut().filter(|v| v.pitch == pitch) {
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
        let table = Arc::clone(&self.table);

        for (frame, sample) in out.iter_mut().enumerate() {
            while let Some((_, trigger)) = due.next_if(|(offset, _)| *offset <= frame) {
                self.start_voice(&trigger);
            }
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
                mix += voice.tick(&table);
            }
            *sample += mix;
        }
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.pending.clear();
        self.voices.clear();
    }
}
