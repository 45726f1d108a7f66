//! # Audio Capture Module
//!
//! This module abstracts the input device behind the `AudioSource` trait and
//! provides two backends:
//! - `CpalBackend` captures from the default input device using CPAL
//!   (Cross-Platform Audio Library) on a dedicated capture thread
//! - `SignalBackend` synthesizes a sine tone or silence, for headless runs
//!
//! ## Live capture
//! The device callback chops incoming samples into hop-sized frames and
//! hands them to the reader over a bounded channel. Each read joins every
//! pending hop, so consecutive reads form one contiguous signal. Frames that
//! do not fit are dropped and reported to the reader as an overflow.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::{DeviceError, ReadFault};

/// A block of mono samples in the normalized -1.0..=1.0 range, usually one
/// or more whole hops.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// An open input device.
///
/// `close` consumes the source, so it can only be released once and never
/// read afterwards.
pub trait AudioSource: Send {
    /// The sample rate the device actually runs at.
    fn sample_rate(&self) -> u32;

    /// Reads the audio captured since the last read. A fault means "no new
    /// data this tick".
    fn read_frame(&mut self) -> Result<AudioFrame, ReadFault>;

    /// Drops audio that queued up while the source was not being read.
    fn discard_pending(&mut self) {}

    /// Releases the device.
    fn close(self: Box<Self>);
}

/// Opens audio sources. Held by the stream controller until `start()`.
pub trait AudioBackend: Send {
    fn open(
        &self,
        sample_rate: u32,
        hop_size: usize,
    ) -> Result<Box<dyn AudioSource>, DeviceError>;
}

// --- Live input ---

/// Opens the default input device through CPAL.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    /// How long `read_frame` waits for the first hop.
    pub read_timeout: Duration,
    /// Hops buffered between the device callback and the reader.
    pub channel_capacity: usize,
    /// Most samples a single read returns; older pending samples are dropped.
    pub max_read_samples: usize,
}

impl CpalBackend {
    pub fn new(read_timeout: Duration, channel_capacity: usize, max_read_samples: usize) -> Self {
        Self {
            read_timeout,
            channel_capacity,
            max_read_samples,
        }
    }

    /// Reads wait one tick and return at most one analysis window.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.tick_interval(),
            config.channel_capacity,
            config.window_size,
        )
    }
}

impl AudioBackend for CpalBackend {
    fn open(
        &self,
        sample_rate: u32,
        hop_size: usize,
    ) -> Result<Box<dyn AudioSource>, DeviceError> {
        let source = CpalSource::open(sample_rate, hop_size, self)?;
        Ok(Box::new(source))
    }
}

/// Creates both ends of the channel between the device callback and the reader.
pub(crate) fn hop_channel(
    hop_size: usize,
    capacity: usize,
    read_timeout: Duration,
    max_read_samples: usize,
) -> (HopSender, HopReader) {
    let hop_size = hop_size.max(1);
    let (sender, frames) = crossbeam_channel::bounded(capacity.max(1));
    let dropped = Arc::new(AtomicUsize::new(0));
    let hop_sender = HopSender {
        sender,
        dropped: Arc::clone(&dropped),
        pending: Vec::with_capacity(hop_size * 2),
        hop_size,
    };
    let reader = HopReader {
        frames,
        dropped,
        read_timeout,
        max_read_samples: max_read_samples.max(hop_size),
    };
    (hop_sender, reader)
}

/// Callback side: chops device samples into hops without ever blocking.
pub(crate) struct HopSender {
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
    pending: Vec<f32>,
    hop_size: usize,
}

impl HopSender {
    /// Takes interleaved samples, keeps the first channel and queues every
    /// complete hop. Hops that do not fit are dropped and counted.
    pub(crate) fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        self.pending.extend(data.iter().step_by(channels.max(1)));

        while self.pending.len() >= self.hop_size {
            let hop: Vec<f32> = self.pending.drain(..self.hop_size).collect();
            match self.sender.try_send(hop) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::AcqRel);
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.pending.clear();
                    break;
                }
            }
        }
    }
}

/// Reader side of the hop channel.
pub(crate) struct HopReader {
    frames: Receiver<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
    read_timeout: Duration,
    max_read_samples: usize,
}

impl HopReader {
    /// Returns every pending hop joined in arrival order, trimmed to the
    /// newest `max_read_samples`.
    ///
    /// Waits up to the read timeout for the first hop. If hops were dropped
    /// since the last read, the queue is discarded and an overflow reported.
    pub(crate) fn read(&mut self) -> Result<Vec<f32>, ReadFault> {
        let dropped = self.dropped.swap(0, Ordering::AcqRel);
        if dropped > 0 {
            // Whatever is queued predates the gap; start over with fresh data.
            let _ = self.frames.try_iter().count();
            return Err(ReadFault::Overflow { dropped });
        }

        let mut samples = match self.frames.recv_timeout(self.read_timeout) {
            Ok(hop) => hop,
            Err(RecvTimeoutError::Timeout) => return Err(ReadFault::Timeout),
            Err(RecvTimeoutError::Disconnected) => return Err(ReadFault::Disconnected),
        };
        for hop in self.frames.try_iter() {
            samples.extend_from_slice(&hop);
        }
        if samples.len() > self.max_read_samples {
            samples.drain(..samples.len() - self.max_read_samples);
        }
        Ok(samples)
    }

    /// Throws away queued hops and forgets any overflow. Returns the number
    /// of hops discarded.
    pub(crate) fn discard_pending(&mut self) -> usize {
        let discarded = self.frames.try_iter().count();
        self.dropped.store(0, Ordering::Release);
        discarded
    }
}

/// A running capture stream owned by its own thread.
///
/// `cpal::Stream` is not `Send` on every platform, so the stream lives and
/// dies on the capture thread; this handle only holds channels.
pub struct CpalSource {
    reader: HopReader,
    sample_rate: u32,
    shutdown_tx: Sender<()>,
    capture_thread: Option<JoinHandle<()>>,
}

impl CpalSource {
    fn open(
        sample_rate: u32,
        hop_size: usize,
        backend: &CpalBackend,
    ) -> Result<Self, DeviceError> {
        let (hop_sender, reader) = hop_channel(
            hop_size,
            backend.channel_capacity,
            backend.read_timeout,
            backend.max_read_samples,
        );
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);

        let capture_thread = thread::Builder::new()
            .name("pitch-capture".to_string())
            .spawn(move || {
                log::info!("[AUDIO-THREAD] Starting audio capture...");
                let (stream, rate) = match start_audio_capture(sample_rate, hop_sender) {
                    Ok(started) => started,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(rate));

                // Park until the owner closes us or goes away.
                let _ = shutdown_rx.recv();

                log::info!("[AUDIO-THREAD] Stopping stream and exiting...");
                if let Err(e) = stream.pause() {
                    log::warn!("[AUDIO-THREAD] Error pausing stream: {}", e);
                }
                drop(stream);
                log::info!("[AUDIO-THREAD] Capture thread finished");
            })
            .map_err(|e| DeviceError::Backend(e.to_string()))?;

        let started = ready_rx.recv().unwrap_or(Err(DeviceError::CaptureThread));
        match started {
            Ok(rate) => Ok(Self {
                reader,
                sample_rate: rate,
                shutdown_tx,
                capture_thread: Some(capture_thread),
            }),
            Err(e) => {
                let _ = capture_thread.join();
                Err(e)
            }
        }
    }

    /// A source fed by a `HopSender` instead of a device.
    #[cfg(test)]
    pub(crate) fn detached(reader: HopReader, sample_rate: u32) -> Self {
        let (shutdown_tx, _) = crossbeam_channel::bounded(1);
        Self {
            reader,
            sample_rate,
            shutdown_tx,
            capture_thread: None,
        }
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.capture_thread.take() {
            let _ = self.shutdown_tx.send(());
            if handle.join().is_err() {
                log::error!("[AUDIO] Capture thread panicked during shutdown");
            }
        }
    }
}

impl AudioSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns all audio captured since the last read, up to one window.
    fn read_frame(&mut self) -> Result<AudioFrame, ReadFault> {
        let samples = self.reader.read()?;
        Ok(AudioFrame::new(samples, self.sample_rate))
    }

    fn discard_pending(&mut self) {
        let discarded = self.reader.discard_pending();
        log::debug!("[AUDIO] Discarded {} hop(s) queued while paused", discarded);
    }

    fn close(mut self: Box<Self>) {
        self.shutdown();
        log::info!("[AUDIO] Input device released");
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Builds and starts an input stream on the default device.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and the rate it runs at
/// * `Err(e)` - No device or no usable f32 configuration
fn start_audio_capture(
    target_rate: u32,
    mut hop_sender: HopSender,
) -> Result<(cpal::Stream, u32), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(DeviceError::NoInputDevice)?;

    let device_name = device
        .name()
        .unwrap_or_else(|_| "<unnamed device>".to_string());
    log::info!("[AUDIO] Using audio input device: {}", device_name);

    let configs = device
        .supported_input_configs()
        .map_err(|e| DeviceError::Backend(e.to_string()))?
        .collect::<Vec<_>>();
    let supported_config =
        find_supported_config(configs, target_rate).ok_or(DeviceError::NoSupportedConfig)?;

    let rate = target_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let channels = supported_config.channels().max(1) as usize;
    let config: cpal::StreamConfig = supported_config
        .with_sample_rate(cpal::SampleRate(rate))
        .into();

    if rate != target_rate {
        log::warn!(
            "[AUDIO] Requested {} Hz is unsupported, capturing at {} Hz",
            target_rate,
            rate
        );
    }
    log::info!(
        "[AUDIO] Selected sample rate: {} Hz, {} channel(s)",
        rate,
        channels
    );

    let err_fn = |err| log::error!("[AUDIO] An error occurred on the audio stream: {}", err);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                hop_sender.push_interleaved(data, channels);
            },
            err_fn,
            None,
        )
        .map_err(|e| DeviceError::Backend(e.to_string()))?;

    stream
        .play()
        .map_err(|e| DeviceError::Backend(e.to_string()))?;

    Ok((stream, rate))
}

/// Finds the best supported configuration for the target sample rate.
///
/// Only 32-bit float formats qualify. Mono is preferred over multi-channel,
/// then the range closest to the target rate wins.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
            let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
            let in_range = c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0;
            let rate_penalty = if in_range { 0 } else { min_diff.min(max_diff) };
            (c.channels() != 1, rate_penalty)
        })
}

// --- Synthetic input ---

/// Produces a sine tone, or silence when `frequency` is `None`.
#[derive(Debug, Clone)]
pub struct SignalBackend {
    pub frequency: Option<f32>,
    pub amplitude: f32,
}

impl SignalBackend {
    pub fn tone(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency: Some(frequency),
            amplitude,
        }
    }

    pub fn silence() -> Self {
        Self {
            frequency: None,
            amplitude: 0.0,
        }
    }
}

impl AudioBackend for SignalBackend {
    fn open(
        &self,
        sample_rate: u32,
        hop_size: usize,
    ) -> Result<Box<dyn AudioSource>, DeviceError> {
        log::info!(
            "[AUDIO] Using synthetic input: {:?} Hz at {} Hz",
            self.frequency,
            sample_rate
        );
        Ok(Box::new(SignalSource {
            frequency: self.frequency,
            amplitude: self.amplitude,
            sample_rate,
            hop_size,
            phase: 0.0,
        }))
    }
}

/// Phase-continuous sine generator.
#[derive(Debug)]
pub struct SignalSource {
    frequency: Option<f32>,
    amplitude: f32,
    sample_rate: u32,
    hop_size: usize,
    phase: f64,
}

impl AudioSource for SignalSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self) -> Result<AudioFrame, ReadFault> {
        let samples = match self.frequency {
            Some(freq) => {
                let step = std::f64::consts::TAU * freq as f64 / self.sample_rate as f64;
                (0..self.hop_size)
                    .map(|_| {
                        let value = self.amplitude * self.phase.sin() as f32;
                        self.phase = (self.phase + step) % std::f64::consts::TAU;
                        value
                    })
                    .collect()
            }
            None => vec![0.0; self.hop_size],
        };
        Ok(AudioFrame::new(samples, self.sample_rate))
    }

    fn close(self: Box<Self>) {
        log::info!("[AUDIO] Synthetic input closed");
    }
}
