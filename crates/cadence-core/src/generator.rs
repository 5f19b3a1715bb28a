//! The seam between scheduling and sound: anything that can be triggered

use thiserror::Error;

use crate::track::TrackId;

/// What to play: a pitch for melodic generators, a sound key for drums
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerKey {
    Pitch(u8),
    Sound(String),
}

/// A scheduled or live note event
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub key: TriggerKey,
    pub velocity: u8,
    /// Start time on the audio clock, in seconds
    pub time: f64,
    /// Sounding length in seconds; infinite means held until released
    pub duration: f64,
}

impl Trigger {
    pub fn pitch(pitch: u8, velocity: u8, time: f64, duration: f64) -> Self {
        Self { key: TriggerKey::Pitch(pitch), velocity, time, duration }
    }

    pub fn sound(key: impl Into<String>, velocity: u8, time: f64, duration: f64) -> Self {
        Self { key: TriggerKey::Sound(key.into()), velocity, time, duration }
    }

    pub fn is_held(&self) -> bool {
        self.duration.is_infinite()
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeneratorError {
    #[error("{generator} cannot play {key:?}")]
    Unsupported { generator: String, key: TriggerKey },
    #[error("Generator has been disposed")]
    Disposed,
}

/// A sound source that turns triggers into audio.
///
/// Implementations release a note on their own once its duration has elapsed.
/// Only held live notes need an explicit `release`.
pub trait SoundGenerator: Send {
    fn name(&self) -> &str;
    fn trigger(&mut self, trigger: Trigger) -> Result<(), GeneratorError>;
    /// End a held trigger for `key`
    fn release(&mut self, _key: &TriggerKey) {}
    /// Move every sounding voice into its release stage and drop pending triggers
    fn release_all(&mut self);
    /// Render mono audio for a block starting at `clock_secs`, adding into `out`
    fn render(&mut self, clock_secs: f64, out: &mut [f32]);
    /// Tear down; later triggers fail with `GeneratorError::Disposed`
    fn dispose(&mut self);
}

/// Lookup from track to its generator, provided by whoever owns the audio graph
pub trait GeneratorRack {
    fn generator_mut(&mut self, track: TrackId) -> Option<&mut dyn SoundGenerator>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use super::*;

    /// Generator that records what it was asked to play
    #[derive(Debug, Default)]
    pub struct FakeGenerator {
        pub fail: bool,
        pub hits: Vec<Trigger>,
        pub releases: usize,
    }

    impl SoundGenerator for FakeGenerator {
        fn name(&self) -> &str {
            "fake"
        }

        fn trigger(&mut self, trigger: Trigger) -> Result<(), GeneratorError> {
            if self.fail {
                return Err(GeneratorError::Disposed);
            }
            self.hits.push(trigger);
            Ok(())
        }

        fn release_all(&mut self) {
            self.releases += 1;
        }

        fn render(&mut self, _clock_secs: f64, _out: &mut [f32]) {}

        fn dispose(&mut self) {}
    }

    #[derive(Debug, Default)]
    pub struct FakeRack(pub HashMap<TrackId, FakeGenerator>);

    impl FakeRack {
        pub fn with(tracks: &[TrackId]) -> Self {
            Self(tracks.iter().map(|t| (*t, FakeGenerator::default())).collect())
        }

        pub fn hits(&self, track: TrackId) -> &[Trigger] {
            self.0.get(&track).map_or(&[], |p| p.hits.as_slice())
        }
    }

    impl GeneratorRack for FakeRack {
        fn generator_mut(&mut self, track: TrackId) -> Option<&mut dyn SoundGenerator> {
            self.0.get_mut(&track).map(|g| g as &mut dyn SoundGenerator)
        }
    }
}
