//! cadence-core: transport, tracks, patterns and scheduling for the cadence DAW

mod error;
pub mod effect;
pub mod generator;
pub mod pattern;
pub mod presets;
pub mod project;
pub mod recorder;
mod registry;
pub mod scheduler;
mod session;
pub mod theory;
mod track;
pub mod transport;

pub use effect::{Effect, EffectId, EffectKind, ParamRange, ParamSpec, ParamValue};
pub use error::{CadenceError, Result};
pub use generator::{GeneratorError, GeneratorRack, SoundGenerator, Trigger, TriggerKey};
pub use pattern::{Note, NoteId, NoteUpdate, Pattern, PatternContent, PatternId, StepGrid, STEP_COUNT};
pub use project::{load_project, save_project, Project};
pub use recorder::{KeyBindings, LiveRecorder, RecorderConfig};
pub use registry::TrackRegistry;
pub use scheduler::{DueTrigger, Scheduler, TrackSchedule};
pub use session::{Session, SessionEvent};
pub use theory::{ChordQuality, ScaleMode};
pub use track::{Track, TrackId, TrackKind};
pub use transport::{BlockSpan, TimeSignature, Transport, TransportSnapshot, TransportState};
