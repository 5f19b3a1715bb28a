//! Analog-style drum synthesizer voiced per drum kit

use std::f64::consts::TAU;

use cadence_core::presets::DrumKit;
use cadence_core::{GeneratorError, SoundGenerator, Trigger, TriggerKey};

use super::PendingTriggers;

/// Drum sound types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrumKind {
    Kick,
    RimShot,
    Snare,
    Clap,
    ClosedHat,
    OpenHat,
    LowTom,
    MidTom,
    HighTom,
    Cymbal,
    Cowbell,
}

impl DrumKind {
    /// General MIDI percussion pitch to the closest synthesized sound
    pub fn from_pitch(pitch: u8) -> Option<Self> {
        Some(match pitch {
            35 | 36 => Self::Kick,
            37 => Self::RimShot,
            38 | 40 => Self::Snare,
            39 => Self::Clap,
            42 | 44 => Self::ClosedHat,
            46 => Self::OpenHat,
            41 | 43 | 45 => Self::LowTom,
            47 => Self::MidTom,
            48 | 50 => Self::HighTom,
            49 | 51 | 52 | 55 | 57 | 59 => Self::Cymbal,
            54 | 56 => Self::Cowbell,
            _ => return None,
        })
    }

    fn is_hat(self) -> bool {
        matches!(self, Self::ClosedHat | Self::OpenHat)
    }
}

/// Kit character: how long and how low the drums ring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumVoicing {
    pub kick_freq: f64,
    pub kick_decay: f64,
    pub snare_tone: f64,
    pub snare_decay: f64,
    pub hat_decay: f64,
    pub tom_decay: f64,
    pub master: f32,
}

impl DrumVoicing {
    pub fn for_kit(kit: &DrumKit) -> Self {
        match kit.key {
            // long, low 808 kick and crisp hats
            "trap" => Self {
                kick_freq: 45.0,
                kick_decay: 0.8,
                snare_tone: 0.3,
                snare_decay: 0.12,
                hat_decay: 0.025,
                tom_decay: 0.3,
                master: 0.8,
            },
            "acoustic" => Self {
                kick_freq: 60.0,
                kick_decay: 0.25,
                snare_tone: 0.5,
                snare_decay: 0.18,
                hat_decay: 0.05,
                tom_decay: 0.4,
                master: 0.8,
            },
            _ => Self {
                kick_freq: 55.0,
                kick_decay: 0.35,
                snare_tone: 0.4,
                snare_decay: 0.1,
                hat_decay: 0.035,
                tom_decay: 0.3,
                master: 0.8,
            },
        }
    }
}

/// State for a single drum voice
#[derive(Debug, Clone)]
struct DrumVoice {
    kind: DrumKind,
    active: bool,
    age: usize,
    phase: f64,
    phase2: f64,
    amp_env: f64,
    pitch_env: f64,
    noise_env: f64,
    /// Remaining clap re-triggers and frames until the next one
    bursts: usize,
    burst_timer: usize,
    filter_state: f64,
    filter_state2: f64,
    velocity: f32,
}

impl DrumVoice {
    fn idle() -> Self {
        Self {
            kind: DrumKind::Kick,
            active: false,
            age: 0,
            phase: 0.0,
            phase2: 0.0,
            amp_env: 0.0,
            pitch_env: 0.0,
            noise_env: 0.0,
            bursts: 0,
            burst_timer: 0,
            filter_state: 0.0,
            filter_state2: 0.0,
            velocity: 0.0,
        }
    }

    fn trigger(&mut self, kind: DrumKind, velocity: u8) {
        *self = Self {
            kind,
            active: true,
            amp_env: 1.0,
            pitch_env: 1.0,
            noise_env: 1.0,
            bursts: if kind == DrumKind::Clap { 3 } else { 0 },
            velocity: velocity.min(127) as f32 / 127.0,
            ..Self::idle()
        };
    }

    fn tick(&mut self, sample_rate: f32, voicing: &DrumVoicing) -> f32 {
        if !self.active {
            return 0.0;
        }
        self.age += 1;
        let dt = 1.0 / sample_rate as f64;

        let sample = match self.kind {
            DrumKind::Kick => self.tick_kick(dt, voicing),
            DrumKind::RimShot => self.tick_rimshot(dt),
            DrumKind::Snare => self.tick_snare(dt, voicing),
            DrumKind::Clap => self.tick_clap(dt, sample_rate),
            DrumKind::ClosedHat => self.tick_metal(dt, 0.3, voicing.hat_decay, 0.6),
            DrumKind::OpenHat => self.tick_metal(dt, 0.3, voicing.hat_decay * 8.0, 0.6),
            DrumKind::Cymbal => self.tick_metal(dt, 0.25, 1.2, 0.5),
            DrumKind::LowTom => self.tick_tom(dt, 90.0, voicing),
            DrumKind::MidTom => self.tick_tom(dt, 130.0, voicing),
            DrumKind::HighTom => self.tick_tom(dt, 175.0, voicing),
            DrumKind::Cowbell => self.tick_cowbell(dt),
        };

        if self.amp_env < 1e-4 && self.noise_env < 1e-4 {
            self.active = false;
        }
        sample as f32 * self.velocity
    }

    fn decay(env: &mut f64, dt: f64, secs: f64) {
        *env *= (-dt / secs).exp();
    }

    fn sine(phase: &mut f64, freq: f64, dt: f64) -> f64 {
        *phase += freq * dt;
        (*phase * TAU).sin()
    }

    fn tick_kick(&mut self, dt: f64, voicing: &DrumVoicing) -> f64 {
        Self::decay(&mut self.pitch_env, dt, 0.03);
        let freq = voicing.kick_freq * (1.0 + self.pitch_env * 3.0);
        let osc = Self::sine(&mut self.phase, freq, dt);
        Self::decay(&mut self.amp_env, dt, voicing.kick_decay);
        self.noise_env = 0.0;
        osc * self.amp_env * 0.9
    }

    fn tick_snare(&mut self, dt: f64, voicing: &DrumVoicing) -> f64 {
        // two tuned bodies plus band-limited noise for the wires
        let body = Self::sine(&mut self.phase, 185.0, dt) * 0.6 + Self::sine(&mut self.phase2, 330.0, dt) * 0.4;
        Self::decay(&mut self.pitch_env, dt, 0.03);

        let noise = fastrand::f64() * 2.0 - 1.0;
        self.filter_state += 0.15 * (noise - self.filter_state);
        self.filter_state2 += 0.1 * (self.filter_state - self.filter_state2);
        let wires = self.filter_state - self.filter_state2;
        Self::decay(&mut self.noise_env, dt, voicing.snare_decay);
        self.amp_env = self.pitch_env;

        let tone = voicing.snare_tone;
        (body * self.pitch_env * tone + wires * self.noise_env * 1.5 * (1.0 - tone * 0.3)) * 0.8
    }

    fn tick_clap(&mut self, dt: f64, sample_rate: f32) -> f64 {
        // a few quick noise bursts, then a short tail
        if self.bursts > 0 {
            self.burst_timer += 1;
            if self.burst_timer as f32 > sample_rate * 0.017 {
                self.burst_timer = 0;
                self.bursts -= 1;
                self.noise_env = 0.9;
            }
        }
        let noise = fastrand::f64() * 2.0 - 1.0;
        self.filter_state += 0.12 * (noise - self.filter_state);
        let band = noise - self.filter_state * 1.8;
        let decay = if self.bursts > 0 { 0.004 } else { 0.15 };
        Self::decay(&mut self.noise_env, dt, decay);
        self.amp_env = 0.0;
        (band * 1.5).tanh() * self.noise_env * 0.7
    }

    /// Highpassed noise for hats and cymbals
    fn tick_metal(&mut self, dt: f64, hp: f64, decay: f64, level: f64) -> f64 {
        let noise = fastrand::f64() * 2.0 - 1.0;
        self.filter_state += hp * (noise - self.filter_state);
        Self::decay(&mut self.amp_env, dt, decay);
        self.noise_env = 0.0;
        (noise - self.filter_state) * self.amp_env * level
    }

    fn tick_tom(&mut self, dt: f64, base_freq: f64, voicing: &DrumVoicing) -> f64 {
        Self::decay(&mut self.pitch_env, dt, 0.05);
        let osc = Self::sine(&mut self.phase, base_freq * (1.0 + self.pitch_env * 0.5), dt);
        Self::decay(&mut self.amp_env, dt, voicing.tom_decay);
        self.noise_env = 0.0;
        osc * self.amp_env * 0.7
    }

    fn tick_rimshot(&mut self, dt: f64) -> f64 {
        let tone = Self::sine(&mut self.phase, 500.0, dt);
        Self::decay(&mut self.amp_env, dt, 0.015);
        let noise = fastrand::f64() * 2.0 - 1.0;
        Self::decay(&mut self.noise_env, dt, 0.005);
        (tone * 0.7 + noise * self.noise_env * 0.3) * self.amp_env * 0.7
    }

    fn tick_cowbell(&mut self, dt: f64) -> f64 {
        // two detuned squares
        self.phase += 560.0 * dt;
        self.phase2 += 845.0 * dt;
        let square = |p: f64| if p.fract() < 0.5 { 1.0 } else { -1.0 };
        Self::decay(&mut self.amp_env, dt, 0.15);
        self.noise_env = 0.0;
        (square(self.phase) + square(self.phase2)) * 0.3 * self.amp_env * 0.7
    }
}

const MAX_VOICES: usize = 16;

/// One-shot drum synthesizer. Accepts sound keys resolved through its kit
/// and raw General MIDI pitches.
pub struct DrumSynth {
    kit: &'static DrumKit,
    voicing: DrumVoicing,
    sample_rate: f32,
    voices: Vec<DrumVoice>,
    pending: PendingTriggers,
    disposed: bool,
}

impl std::fmt::Debug for DrumSynth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrumSynth")
            .field("kit", &self.kit.key)
            .field("sample_rate", &self.sample_rate)
            .field("active_voices", &self.active_voices())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl DrumSynth {
    pub fn new(kit: &'static DrumKit, sample_rate: f32) -> Self {
        Self {
            kit,
            voicing: DrumVoicing::for_kit(kit),
            sample_rate,
            voices: (0..MAX_VOICES).map(|_| DrumVoice::idle()).collect(),
            pending: PendingTriggers::default(),
            disposed: false,
        }
    }

    pub fn kit(&self) -> &'static DrumKit {
        self.kit
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    fn resolve(&self, key: &TriggerKey) -> Option<DrumKind> {
        let pitch = match key {
            TriggerKey::Pitch(pitch) => *pitch,
            TriggerKey::Sound(sound) => self.kit.pitch_for(sound)?,
        };
        DrumKind::from_pitch(pitch)
    }

    fn hit(&mut self, kind: DrumKind, velocity: u8) {
        // hats choke each other
        if kind.is_hat() {
            for voice in self.voices.iter_mut().filter(|v| v.active && v.kind.is_hat()) {
                voice.active = false;
            }
        }

        // same drum retriggers, then a free voice, then the oldest
        let idx = self
            .voices
            .iter()
            .position(|v| v.active && v.kind == kind)
            .or_else(|| self.voices.iter().position(|v| !v.active))
            .or_else(|| self.voices.iter().enumerate().max_by_key(|(_, v)| v.age).map(|(i, _)| i))
            .unwrap_or(0);
        self.voices[idx].trigger(kind, velocity);
    }
}

impl SoundGenerator for DrumSynth {
    fn name(&self) -> &str {
        self.kit.name
    }

    fn trigger(&mut self, trigger: Trigger) -> Result<(), GeneratorError> {
        if self.disposed {
            return Err(GeneratorError::Disposed);
        }
        if self.resolve(&trigger.key).is_none() {
            return Err(GeneratorError::Unsupported { generator: self.kit.name.to_string(), key: trigger.key });
        }
        self.pending.push(trigger);
        Ok(())
    }

    fn release_all(&mut self) {
        // drums are one-shots, so only pending hits are dropped
        self.pending.clear();
    }

    fn render(&mut self, clock_secs: f64, out: &mut [f32]) {
        if self.disposed {
            return;
        }
        let mut due = self.pending.take_due(clock_secs, self.sample_rate, out.len()).into_iter().peekable();

        for (frame, sample) in out.iter_mut().enumerate() {
            while let Some((_, trigger)) = due.next_if(|(offset, _)| *offset <= frame) {
                if let Some(kind) = self.resolve(&trigger.key) {
                    self.hit(kind, trigger.velocity);
                }
            }
            let mut mix = 0.0f32;
            for voice in self.voices.iter_mut().filter(|v| v.active) {
                mix += voice.tick(self.sample_rate, &self.voicing);
            }
            *sample += (mix * self.voicing.master).tanh();
        }
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.pending.clear();
        for voice in &mut self.voices {
            voice.active = false;
        }
    }
}
