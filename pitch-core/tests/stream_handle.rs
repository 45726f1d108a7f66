use pitch_core::{
    AudioBackend, AudioFrame, AudioSource, ChannelSubscriber, DeviceError, NoteEvent,
    NoteRow, NoteSubscriber, NoteTable, PipelineConfig, ReadFault, SignalBackend,
    StreamController, StreamError, StreamHandle, StreamState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn table() -> Arc<NoteTable> {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let rows: Vec<NoteRow> = (0..=127u8)
        .map(|n| {
            let octave = n as i32 / 12 - 1;
            NoteRow::new(n.to_string(), format!("{}{}", NAMES[n as usize % 12], octave))
        })
        .collect();
    Arc::new(NoteTable::build(&rows))
}

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        tick_interval_ms: 5,
        ..PipelineConfig::default()
    }
}

fn start(backend: impl AudioBackend + 'static) -> StreamHandle {
    let controller = StreamController::new(fast_config(), table(), Box::new(backend)).unwrap();
    StreamHandle::start(controller).unwrap()
}

fn wait_for_points(handle: &StreamHandle, count: usize) -> usize {
    let deadline = Instant::now() + WAIT;
    loop {
        let len = handle.time_series().len();
        if len >= count || Instant::now() > deadline {
            return len;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Wraps the signal backend and counts how often the device is released.
struct CountingBackend {
    inner: SignalBackend,
    closes: Arc<AtomicUsize>,
}

struct CountingSource {
    inner: Box<dyn AudioSource>,
    closes: Arc<AtomicUsize>,
}

impl AudioBackend for CountingBackend {
    fn open(&self, sample_rate: u32, hop_size: usize) -> Result<Box<dyn AudioSource>, DeviceError> {
        Ok(Box::new(CountingSource {
            inner: self.inner.open(sample_rate, hop_size)?,
            closes: Arc::clone(&self.closes),
        }))
    }
}

impl AudioSource for CountingSource {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn read_frame(&mut self) -> Result<AudioFrame, ReadFault> {
        self.inner.read_frame()
    }

    fn close(self: Box<Self>) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }
}

struct NoDevice;

impl AudioBackend for NoDevice {
    fn open(&self, _: u32, _: usize) -> Result<Box<dyn AudioSource>, DeviceError> {
        Err(DeviceError::NoInputDevice)
    }
}

/// Fails to open the device a set number of times, then plays silence.
struct FlakyBackend {
    failures_left: AtomicUsize,
}

impl AudioBackend for FlakyBackend {
    fn open(&self, sample_rate: u32, hop_size: usize) -> Result<Box<dyn AudioSource>, DeviceError> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DeviceError::NoInputDevice);
        }
        SignalBackend::silence().open(sample_rate, hop_size)
    }
}

struct Panicker;

impl NoteSubscriber for Panicker {
    fn notify(&self, _event: &NoteEvent) -> anyhow::Result<()> {
        panic!("display crashed");
    }
}

#[test]
fn tone_is_detected_through_the_worker() {
    let mut handle = start(SignalBackend::tone(440.0, 0.5));
    let (subscriber, events) = ChannelSubscriber::bounded(256);
    handle.subscribe(&subscriber).unwrap();

    let deadline = Instant::now() + WAIT;
    let mut detected = None;
    while detected.is_none() && Instant::now() < deadline {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(50)) {
            if event.note_number == 69 {
                detected = Some(event);
            }
        }
    }
    let detected = detected.expect("no A4 detected in time");
    assert_eq!(detected.note_name, "A4");
    assert!(detected.frequency.is_some());

    handle.close();
    assert_eq!(handle.state(), StreamState::Closed);
}

#[test]
fn pause_freezes_and_resume_continues_the_series() {
    let mut handle = start(SignalBackend::silence());
    assert!(wait_for_points(&handle, 3) >= 3);

    handle.pause().unwrap();
    assert_eq!(handle.state(), StreamState::Paused);
    let paused_len = handle.time_series().len();
    thread::sleep(Duration::from_millis(40));
    assert_eq!(handle.time_series().len(), paused_len);

    handle.resume().unwrap();
    assert!(wait_for_points(&handle, paused_len + 1) > paused_len);

    let series = handle.time_series();
    assert_eq!(series.points()[paused_len].tick_index, paused_len as u64);
    handle.close();
}

#[test]
fn close_is_idempotent_and_releases_the_device_once() {
    let closes = Arc::new(AtomicUsize::new(0));
    let mut handle = start(CountingBackend {
        inner: SignalBackend::silence(),
        closes: Arc::clone(&closes),
    });
    wait_for_points(&handle, 2);

    handle.close();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    handle.close();
    drop(handle);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn closed_handle_rejects_commands_but_keeps_the_series() {
    let mut handle = start(SignalBackend::silence());
    let len = wait_for_points(&handle, 2);
    handle.close();

    assert!(matches!(handle.pause(), Err(StreamError::Closed)));
    assert!(matches!(handle.resume(), Err(StreamError::Closed)));
    assert!(handle.time_series().len() >= len);
}

#[test]
fn device_error_hands_back_an_idle_controller() {
    let controller = StreamController::new(fast_config(), table(), Box::new(NoDevice)).unwrap();
    let Err(failed) = StreamHandle::start(controller) else {
        panic!("start succeeded without a device");
    };
    assert!(matches!(
        failed.error(),
        StreamError::Device(DeviceError::NoInputDevice)
    ));

    let controller = failed.into_controller();
    assert_eq!(controller.state(), StreamState::Idle);
}

#[test]
fn start_can_be_retried_after_a_device_error() {
    let backend = FlakyBackend {
        failures_left: AtomicUsize::new(1),
    };
    let controller = StreamController::new(fast_config(), table(), Box::new(backend)).unwrap();
    let controller = match StreamHandle::start(controller) {
        Ok(_) => panic!("first start should fail"),
        Err(failed) => failed.into_controller(),
    };

    let mut handle = StreamHandle::start(controller).unwrap();
    assert_eq!(handle.state(), StreamState::Capturing);
    assert!(wait_for_points(&handle, 2) >= 2);
    handle.close();
}

#[test]
fn stalled_and_panicking_subscribers_do_not_stop_ticking() {
    let handle = start(SignalBackend::silence());
    let panicker = Arc::new(Panicker);
    let (stalled, _never_read) = ChannelSubscriber::bounded(1);
    handle.subscribe(&panicker).unwrap();
    handle.subscribe(&stalled).unwrap();

    assert!(wait_for_points(&handle, 10) >= 10);
    assert!(stalled.dropped() > 0);
    assert_eq!(handle.state(), StreamState::Capturing);
}
