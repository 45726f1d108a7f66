//! # Stream Controller
//!
//! The play/pause state machine of the pipeline. A controller owns the audio
//! source, the frame buffer, the estimator and the time series, and is the
//! only thing that mutates them. Each call to `tick` runs one
//! read → estimate → map → publish cycle.
//!
//! ```text
//! Idle --start--> Capturing <--pause/resume--> Paused
//!   \                 |                          |
//!    `-----close------+-----------close----------+--> Closed
//! ```

use std::sync::{Arc, Weak};

use crate::audio::{AudioBackend, AudioSource};
use crate::buffer::FrameBuffer;
use crate::config::PipelineConfig;
use crate::error::StreamError;
use crate::mapper::NoteMapper;
use crate::notes::NoteTable;
use crate::pitch::PitchEstimator;
use crate::subscriber::{NoteSubscriber, SubscriberId, SubscriberSet};
use crate::timeseries::TimeSeries;
use crate::NoteEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed, device not opened yet.
    Idle,
    /// Device open, ticks are processed.
    Capturing,
    /// Device open but unread; the time series is frozen.
    Paused,
    /// Device released. Terminal.
    Closed,
}

pub struct StreamController {
    config: PipelineConfig,
    state: StreamState,
    backend: Box<dyn AudioBackend>,
    source: Option<Box<dyn AudioSource>>,
    buffer: FrameBuffer,
    estimator: Option<PitchEstimator>,
    mapper: NoteMapper,
    series: TimeSeries,
    subscribers: SubscriberSet,
}

impl StreamController {
    pub fn new(
        config: PipelineConfig,
        table: Arc<NoteTable>,
        backend: Box<dyn AudioBackend>,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self {
            buffer: FrameBuffer::new(config.window_size, config.hop_size),
            mapper: NoteMapper::new(table, config.default_octave),
            config,
            state: StreamState::Idle,
            backend,
            source: None,
            estimator: None,
            series: TimeSeries::new(),
            subscribers: SubscriberSet::new(),
        })
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn mapper(&self) -> &NoteMapper {
        &self.mapper
    }

    pub fn time_series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn into_time_series(mut self) -> TimeSeries {
        std::mem::take(&mut self.series)
    }

    /// Opens the device and starts capturing with an empty time series.
    ///
    /// On a device error the controller stays `Idle`.
    pub fn start(&mut self) -> Result<(), StreamError> {
        self.expect_state(StreamState::Idle, "start")?;

        let source = self
            .backend
            .open(self.config.sample_rate, self.config.hop_size)?;
        let sample_rate = source.sample_rate();
        if sample_rate != self.config.sample_rate {
            log::warn!(
                "[STREAM] Device runs at {} Hz instead of the configured {} Hz",
                sample_rate,
                self.config.sample_rate
            );
        }

        self.estimator = Some(PitchEstimator::new(&self.config, sample_rate));
        self.source = Some(source);
        self.buffer.reset();
        self.series.reset();
        self.state = StreamState::Capturing;
        log::info!("[STREAM] Capturing at {} Hz", sample_rate);
        Ok(())
    }

    /// Suspends ticking. The device stays open but is not read.
    pub fn pause(&mut self) -> Result<(), StreamError> {
        self.expect_state(StreamState::Capturing, "pause")?;
        self.state = StreamState::Paused;
        log::info!(
            "[STREAM] Paused after {} point(s)",
            self.series.len()
        );
        Ok(())
    }

    /// Resumes ticking where the time series left off.
    ///
    /// Audio queued while paused is discarded, so the first tick after
    /// resuming reads fresh input instead of reporting an overflow.
    pub fn resume(&mut self) -> Result<(), StreamError> {
        self.expect_state(StreamState::Paused, "resume")?;
        if let Some(source) = self.source.as_mut() {
            source.discard_pending();
        }
        self.state = StreamState::Capturing;
        log::info!(
            "[STREAM] Resumed at tick {}",
            self.series.next_index()
        );
        Ok(())
    }

    /// Releases the device and detaches every subscriber. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.state == StreamState::Closed {
            return;
        }
        if let Some(source) = self.source.take() {
            source.close();
        }
        self.subscribers.clear();
        self.state = StreamState::Closed;
        log::info!("[STREAM] Closed with {} point(s)", self.series.len());
    }

    pub fn subscribe<S: NoteSubscriber + 'static>(&mut self, subscriber: &Arc<S>) -> SubscriberId {
        self.subscribe_weak(crate::subscriber::downgrade(subscriber))
    }

    pub fn subscribe_weak(&mut self, subscriber: Weak<dyn NoteSubscriber>) -> SubscriberId {
        self.subscribers.add(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(id)
    }

    /// Runs one read → estimate → map → publish cycle.
    ///
    /// Does nothing unless capturing. A read fault consumes the tick index
    /// but records no point and notifies nobody.
    pub fn tick(&mut self) -> Option<NoteEvent> {
        if self.state != StreamState::Capturing {
            return None;
        }
        let (Some(source), Some(estimator)) = (self.source.as_mut(), self.estimator.as_mut())
        else {
            return None;
        };

        let frame = match source.read_frame() {
            Ok(frame) => frame,
            Err(fault) => {
                let skipped = self.series.skip();
                log::warn!("[STREAM] Skipping tick {}: {}", skipped, fault);
                return None;
            }
        };

        let window = self.buffer.push(&frame);
        let estimate = estimator.estimate(&window);
        let note_name = estimate
            .note
            .and_then(|note| self.mapper.to_name(note))
            .map(|name| name.to_string())
            .unwrap_or_default();

        let tick_index = self.series.push(estimate.peak, note_name.clone());
        let event = NoteEvent {
            tick_index,
            note_number: estimate.note_number(),
            note_name,
            peak_level: estimate.peak,
            frequency: estimate.frequency,
            cents: estimate.cents,
        };
        log::debug!(
            "[STREAM] Tick {:04} peak {:.1} note {:?}",
            event.tick_index,
            event.peak_level,
            event.note_name
        );

        self.subscribers.notify_all(&event);
        Some(event)
    }

    fn expect_state(&self, expected: StreamState, action: &'static str) -> Result<(), StreamError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(StreamError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.close();
    }
}
