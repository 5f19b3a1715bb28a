//! cadence-services: audio engine, mixer, instruments and effects

pub mod audio_effects;
pub mod audio_engine;
pub mod audio_io;
pub mod mixer;

pub use audio_effects::{create_effect, AudioEffect, EffectChain};
pub use audio_effects::{
    BitCrusherEffect, ChorusEffect, CompressorEffect, DelayEffect, DistortionEffect, Eq3Effect, FilterEffect,
    ReverbEffect, TremoloEffect,
};
pub use audio_effects::{DrumSynth, Generator, PolySynth, Sampler};
pub use audio_engine::{AudioEngine, AudioEngineError, EngineConfig, EngineState};
pub use audio_io::{default_output_info, AudioOutputError, OutputDeviceInfo, RealtimeOutputStream};
pub use mixer::{pan_gains, ChannelStrip, Mixer};
