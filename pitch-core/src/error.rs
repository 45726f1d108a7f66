//! # Error Types
//!
//! Typed errors for every failure the pipeline can surface. Only
//! `DeviceError` (at start) ends a session; `ReadFault` is local to a single
//! tick and `InvalidInput` only concerns the caller of the note mapper.

use thiserror::Error;

use crate::controller::StreamState;

/// The input device could not be opened. Fatal to `start()`.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no input device available")]
    NoInputDevice,

    #[error("no suitable f32 input format found")]
    NoSupportedConfig,

    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("capture thread exited before the stream was ready")]
    CaptureThread,
}

/// A transient failure to read one frame. The tick is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadFault {
    #[error("input overflow, {dropped} frame(s) dropped")]
    Overflow { dropped: usize },

    #[error("no audio data arrived within the read budget")]
    Timeout,

    #[error("capture stream disconnected")]
    Disconnected,
}

/// Malformed free-text note entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    #[error("note input is empty")]
    Empty,

    #[error("note input {0:?} has no note letter")]
    MissingLetter(String),

    #[error("note input {0:?} has an unusable octave")]
    BadOctave(String),

    #[error("note {0:?} is not in the note table")]
    UnknownNote(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("window_size ({window}) must be a multiple of hop_size ({hop})")]
    WindowNotMultipleOfHop { window: usize, hop: usize },

    #[error("frequency range {min} Hz..{max} Hz is empty")]
    FrequencyRange { min: f32, max: f32 },

    #[error("{name} must be finite and non-negative, got {value}")]
    NotFinite { name: &'static str, value: f32 },
}

/// Errors returned by the stream controller and its handle.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot {action} while {from:?}")]
    InvalidTransition {
        from: StreamState,
        action: &'static str,
    },

    #[error("stream worker has already shut down")]
    Closed,

    #[error("could not start stream worker: {0}")]
    Worker(String),
}
