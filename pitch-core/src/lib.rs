// pitch-core/src/lib.rs

//! The core logic for the pitch helper.
//! This crate is responsible for audio capture, pitch detection,
//! note naming and the play/pause stream pipeline. It is completely
//! headless and contains no display code.

pub mod audio;
pub mod buffer;
pub mod config;
pub mod controller;
pub mod error;
pub mod fft;
pub mod mapper;
pub mod notes;
pub mod pitch;
pub mod stream;
pub mod subscriber;
pub mod timeseries;
pub mod tuning;

use serde::Serialize;

pub use audio::{AudioBackend, AudioFrame, AudioSource, CpalBackend, SignalBackend};
pub use config::PipelineConfig;
pub use controller::{StreamController, StreamState};
pub use error::{ConfigError, DeviceError, InvalidInput, ReadFault, StreamError};
pub use mapper::NoteMapper;
pub use notes::{NoteName, NoteRow, NoteTable};
pub use stream::{StartError, StreamHandle};
pub use subscriber::{ChannelSubscriber, NoteSubscriber, SubscriberId};
pub use timeseries::{TimeSeries, TimeSeriesPoint};

/// What subscribers receive after every successful tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteEvent {
    pub tick_index: u64,
    /// Detected note number, 0 when nothing was detected.
    pub note_number: u8,
    /// Name of the detected note, empty when nothing was detected or the
    /// note table has no entry for it.
    pub note_name: String,
    /// Relative loudness of the hop read on this tick.
    pub peak_level: f32,
    pub frequency: Option<f32>,
    pub cents: Option<f32>,
}

impl NoteEvent {
    pub fn has_note(&self) -> bool {
        !self.note_name.is_empty()
    }
}
