//! Linear ADSR envelope shared by the melodic instruments

use cadence_core::presets::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Per-voice amplitude envelope.
///
/// Release always ramps from the current level so a note cut during attack
/// or decay does not click.
#[derive(Debug, Clone)]
pub struct Adsr {
    shape: Envelope,
    stage: EnvelopeStage,
    level: f32,
    release_step: f32,
    sample_rate: f32,
}

impl Adsr {
    pub fn new(shape: Envelope, sample_rate: f32) -> Self {
        Self { shape, stage: EnvelopeStage::Idle, level: 0.0, release_step: 0.0, sample_rate }
    }

    fn samples(&self, secs: f32) -> f32 {
        (secs * self.sample_rate).max(1.0)
    }

    pub fn note_on(&mut self) {
        self.stage = EnvelopeStage::Attack;
    }

    pub fn note_off(&mut self) {
        if self.stage == EnvelopeStage::Idle || self.stage == EnvelopeStage::Release {
            return;
        }
        self.stage = EnvelopeStage::Release;
        self.release_step = self.level / self.samples(self.shape.release);
    }

    /// Silence immediately
    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn tick(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => return 0.0,
            EnvelopeStage::Attack => {
                self.level += 1.0 / self.samples(self.shape.attack);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                let sustain = self.shape.sustain.clamp(0.0, 1.0);
                self.level -= (1.0 - sustain) / self.samples(self.shape.decay);
                if self.level <= sustain {
                    self.level = sustain;
                    // nothing left to hold
                    self.stage = if sustain <= 0.0 { EnvelopeStage::Idle } else { EnvelopeStage::Sustain };
                }
            }
            EnvelopeStage::Sustain => {}
            EnvelopeStage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.reset();
                }
            }
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages() {
        let mut env = Adsr::new(Envelope::new(0.01, 0.01, 0.5, 0.01), 1000.0);
        env.note_on();
        for _ in 0..11 {
            env.tick();
        }
        assert_eq!(env.stage(), EnvelopeStage::Decay);
        for _ in 0..12 {
            env.tick();
        }
        assert_eq!(env.stage(), EnvelopeStage::Sustain);
        assert_eq!(env.tick(), 0.5);

        env.note_off();
        for _ in 0..12 {
            env.tick();
        }
        assert!(!env.is_active());
    }

    #[test]
    fn test_zero_sustain_ends_after_decay() {
        let mut env = Adsr::new(Envelope::new(0.001, 0.01, 0.0, 1.0), 1000.0);
        env.note_on();
        for _ in 0..20 {
            env.tick();
        }
        assert!(!env.is_active());
    }
}
