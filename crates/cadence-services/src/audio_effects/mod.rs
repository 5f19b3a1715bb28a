//! Audio effects chain and built-in effects

mod native;
pub mod native_instruments;

pub use native::{
    BitCrusherEffect, ChorusEffect, CompressorEffect, DelayEffect, DistortionEffect, Eq3Effect,
    FilterEffect, ReverbEffect, TremoloEffect,
};
pub use native_instruments::{DrumSynth, Generator, PolySynth, Sampler};

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use cadence_core::{Effect, EffectId, EffectKind, ParamValue};
use tracing::debug;

/// Audio effect that can process samples in-place
pub trait AudioEffect: Send + Debug {
    fn name(&self) -> &str;
    fn process(&mut self, samples: &mut [f32]);
    /// Apply one parameter by its project name; unknown names are ignored
    fn set_param(&mut self, name: &str, value: &ParamValue);
    fn set_bypass(&mut self, bypass: bool);
    fn is_bypassed(&self) -> bool;
    /// Update sample rate for effects that depend on it
    fn set_sample_rate(&mut self, _sample_rate: f32) {}
}

/// Build the processor for an effect type at its default settings
pub fn create_effect(kind: EffectKind, sample_rate: f32) -> Box<dyn AudioEffect> {
    match kind {
        EffectKind::Reverb => Box::new(ReverbEffect::new(0.7, 3000.0, 0.3, sample_rate)),
        EffectKind::Delay => Box::new(DelayEffect::new(0.25, 0.4, 0.3, sample_rate)),
        EffectKind::Distortion => Box::new(DistortionEffect::new(0.4, 1.0)),
        EffectKind::Chorus => Box::new(ChorusEffect::new(1.5, 3.5, 0.7, 0.5, sample_rate)),
        EffectKind::Compressor => Box::new(CompressorEffect::new(-24.0, 4.0, 0.003, 0.25)),
        EffectKind::Eq3 => Box::new(Eq3Effect::new(400.0, 2500.0, sample_rate)),
        EffectKind::Filter => Box::new(FilterEffect::new(1000.0, 0.707, sample_rate)),
        EffectKind::BitCrusher => Box::new(BitCrusherEffect::new(4.0, 0.5)),
        EffectKind::Tremolo => Box::new(TremoloEffect::new(10.0, 0.9, sample_rate)),
    }
}

#[derive(Debug)]
struct EffectSlot {
    id: EffectId,
    kind: EffectKind,
    processor: Box<dyn AudioEffect>,
    /// Parameter values already pushed into the processor
    applied: BTreeMap<String, ParamValue>,
}

impl EffectSlot {
    fn new(effect: &Effect, sample_rate: f32) -> Self {
        Self {
            id: effect.id,
            kind: effect.kind,
            processor: create_effect(effect.kind, sample_rate),
            applied: BTreeMap::new(),
        }
    }

    /// Push parameters that changed since the last sync
    fn apply(&mut self, effect: &Effect) {
        for (name, value) in &effect.parameters {
            if self.applied.get(name) == Some(value) {
                continue;
            }
            self.processor.set_param(name, value);
            self.applied.insert(name.clone(), value.clone());
        }
        self.processor.set_bypass(!effect.enabled);
    }
}

/// A track's processors, kept in the same order as its effect list
#[derive(Debug)]
pub struct EffectChain {
    slots: Vec<EffectSlot>,
    sample_rate: f32,
}

impl EffectChain {
    pub fn new(sample_rate: f32) -> Self {
        Self { slots: Vec::new(), sample_rate }
    }

    /// Match the processors to `effects`: create new ones, drop removed ones,
    /// follow reordering and apply changed parameters. Processors whose effect
    /// survives keep their internal state (delay lines, filter memory).
    pub fn sync(&mut self, effects: &[Effect]) {
        let mut existing: HashMap<EffectId, EffectSlot> =
            self.slots.drain(..).map(|slot| (slot.id, slot)).collect();

        for effect in effects {
            let mut slot = match existing.remove(&effect.id) {
                Some(slot) if slot.kind == effect.kind => slot,
                _ => {
                    debug!(effect = %effect.id, kind = %effect.kind, "Creating effect processor");
                    EffectSlot::new(effect, self.sample_rate)
                }
            };
            slot.apply(effect);
            self.slots.push(slot);
        }

        for id in existing.keys() {
            debug!(effect = %id, "Dropped effect processor");
        }
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        for slot in &mut self.slots {
            if !slot.processor.is_bypassed() {
                slot.processor.process(samples);
            }
        }
    }

    /// Effect ids in signal order
    pub fn ids(&self) -> Vec<EffectId> {
        self.slots.iter().map(|s| s.id).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        for slot in &mut self.slots {
            slot.processor.set_sample_rate(sample_rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(id: u64, kind: EffectKind) -> Effect {
        Effect::new(EffectId(id), kind)
    }

    #[test]
    fn test_sync_follows_list_order() {
        let mut chain = EffectChain::new(44100.0);
        let mut effects = vec![effect(1, EffectKind::Reverb), effect(2, EffectKind::Delay), effect(3, EffectKind::Filter)];
        chain.sync(&effects);
        assert_eq!(chain.ids(), vec![EffectId(1), EffectId(2), EffectId(3)]);

        effects.swap(0, 2);
        effects.remove(1);
        chain.sync(&effects);
        assert_eq!(chain.ids(), vec![EffectId(3), EffectId(1)]);
    }

    #[test]
    fn test_disabled_effect_is_bypassed() {
        let mut chain = EffectChain::new(44100.0);
        let mut crush = effect(1, EffectKind::BitCrusher);
        crush.parameters.insert("wet".into(), ParamValue::Number(1.0));
        crush.parameters.insert("bits".into(), ParamValue::Number(1.0));
        crush.enabled = false;
        chain.sync(std::slice::from_ref(&crush));

        let mut samples = vec![0.3f32; 64];
        chain.process(&mut samples);
        assert!(samples.iter().all(|s| *s == 0.3));

        crush.enabled = true;
        chain.sync(std::slice::from_ref(&crush));
        chain.process(&mut samples);
        assert!(samples.iter().any(|s| *s != 0.3));
    }

    #[test]
    fn test_every_kind_has_a_processor() {
        for kind in EffectKind::ALL {
            let mut fx = create_effect(kind, 48000.0);
            let mut samples: Vec<f32> = (0..256).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
            fx.process(&mut samples);
            assert!(samples.iter().all(|s| s.is_finite()), "{kind}");
        }
    }
}
