// src/error.rs

//! Error type shared by the loop store, the engine and the audio backends.

use crate::looper::LoopId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LooperError {
    /// A command would break a store invariant, e.g. deleting the last loop.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("unknown loop {0}")]
    UnknownLoop(LoopId),

    #[error("no recorded session data to save")]
    EmptyRecording,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("settings: {0}")]
    Settings(#[from] serde_json::Error),
}

impl LooperError {
    pub(crate) fn device(context: &str, err: impl std::fmt::Display) -> Self {
        LooperError::Device(format!("{}: {}", context, err))
    }
}

pub type Result<T> = std::result::Result<T, LooperError>;
