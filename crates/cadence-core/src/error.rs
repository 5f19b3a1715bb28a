//! Error types for cadence

use thiserror::Error;

use crate::effect::EffectId;
use crate::pattern::NoteId;
use crate::track::{TrackId, TrackKind};

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Track not found: {0}")]
    UnknownTrack(TrackId),
    #[error("Effect not found: {0}")]
    UnknownEffect(EffectId),
    #[error("Note not found: {0}")]
    UnknownNote(NoteId),
    #[error("Track {track} is a {kind} track and does not accept {shape}")]
    TypeMismatch {
        track: TrackId,
        kind: TrackKind,
        shape: &'static str,
    },
    #[error("Audio device not ready")]
    DeviceNotReady,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Project format error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CadenceError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CadenceError>;
