//! # Stream Worker
//!
//! Runs a `StreamController` on a dedicated thread driven by a fixed-interval
//! ticker. Other threads talk to it through a `StreamHandle`, which sends
//! commands over a channel; the worker applies them between ticks, so the
//! controller is never touched by two threads at once.
//!
//! Pausing is a state change only: the ticker keeps firing and the worker
//! ignores ticks until the stream is resumed.

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crate::controller::{StreamController, StreamState};
use crate::error::StreamError;
use crate::subscriber::{NoteSubscriber, SubscriberId};
use crate::timeseries::TimeSeries;

enum Command {
    Pause(Sender<Result<(), StreamError>>),
    Resume(Sender<Result<(), StreamError>>),
    Subscribe(Weak<dyn NoteSubscriber>, Sender<SubscriberId>),
    Unsubscribe(SubscriberId),
    Snapshot(Sender<TimeSeries>),
    State(Sender<StreamState>),
    Close,
}

/// `StreamHandle::start` failed. Carries the controller back to the caller.
#[derive(Error)]
#[error("could not start stream: {error}")]
pub struct StartError {
    controller: StreamController,
    #[source]
    error: StreamError,
}

impl StartError {
    pub fn error(&self) -> &StreamError {
        &self.error
    }

    pub fn controller(&self) -> &StreamController {
        &self.controller
    }

    pub fn into_controller(self) -> StreamController {
        self.controller
    }

    pub fn into_error(self) -> StreamError {
        self.error
    }
}

impl fmt::Debug for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartError")
            .field("state", &self.controller.state())
            .field("error", &self.error)
            .finish()
    }
}

/// Control handle for a running stream. Dropping it closes the stream.
pub struct StreamHandle {
    commands: Sender<Command>,
    worker: Option<JoinHandle<TimeSeries>>,
    final_series: TimeSeries,
}

impl StreamHandle {
    /// Starts the controller and hands it to a new worker thread.
    ///
    /// The device is opened on the calling thread. On failure no worker
    /// runs and the controller comes back inside the error, still `Idle`
    /// after a device error, so the caller can inspect it or retry.
    pub fn start(mut controller: StreamController) -> Result<Self, StartError> {
        if let Err(error) = controller.start() {
            return Err(StartError { controller, error });
        }

        // The worker only receives the controller once the thread is running.
        let (handoff_tx, handoff_rx) = crossbeam_channel::bounded::<StreamController>(1);
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let spawned = thread::Builder::new()
            .name("pitch-stream".to_string())
            .spawn(move || match handoff_rx.recv() {
                Ok(controller) => run_worker(controller, command_rx),
                Err(_) => TimeSeries::new(),
            });
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                return Err(StartError {
                    controller,
                    error: StreamError::Worker(e.to_string()),
                });
            }
        };
        if let Err(returned) = handoff_tx.send(controller) {
            let _ = worker.join();
            return Err(StartError {
                controller: returned.into_inner(),
                error: StreamError::Worker("stream worker exited before start".to_string()),
            });
        }

        Ok(Self {
            commands: command_tx,
            worker: Some(worker),
            final_series: TimeSeries::new(),
        })
    }

    pub fn pause(&self) -> Result<(), StreamError> {
        self.request(Command::Pause)?
    }

    pub fn resume(&self) -> Result<(), StreamError> {
        self.request(Command::Resume)?
    }

    pub fn subscribe<S: NoteSubscriber + 'static>(
        &self,
        subscriber: &Arc<S>,
    ) -> Result<SubscriberId, StreamError> {
        let weak = crate::subscriber::downgrade(subscriber);
        self.request(|reply| Command::Subscribe(weak, reply))
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.commands.send(Command::Unsubscribe(id));
    }

    pub fn state(&self) -> StreamState {
        self.request(Command::State).unwrap_or(StreamState::Closed)
    }

    /// A copy of the time series as of the last completed tick.
    pub fn time_series(&self) -> TimeSeries {
        self.request(Command::Snapshot)
            .unwrap_or_else(|_| self.final_series.clone())
    }

    /// Stops the worker and releases the device before returning.
    ///
    /// A tick in progress finishes first. Further calls do nothing.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.commands.send(Command::Close);
        match worker.join() {
            Ok(series) => self.final_series = series,
            Err(_) => log::error!("[STREAM] Stream worker panicked"),
        }
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> Command) -> Result<T, StreamError> {
        if self.worker.is_none() {
            return Err(StreamError::Closed);
        }
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(make(reply_tx))
            .map_err(|_| StreamError::Closed)?;
        reply_rx.recv().map_err(|_| StreamError::Closed)
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(mut controller: StreamController, commands: Receiver<Command>) -> TimeSeries {
    let ticker = crossbeam_channel::tick(controller.config().tick_interval());
    log::info!(
        "[STREAM] Worker ticking every {} ms",
        controller.config().tick_interval_ms
    );

    loop {
        crossbeam_channel::select! {
            recv(ticker) -> _ => {
                let ticked = panic::catch_unwind(AssertUnwindSafe(|| controller.tick()));
                if ticked.is_err() {
                    log::error!("[STREAM] Tick panicked, continuing with the next one");
                }
            },
            recv(commands) -> msg => match msg {
                Ok(Command::Pause(reply)) => {
                    let _ = reply.send(controller.pause());
                }
                Ok(Command::Resume(reply)) => {
                    let _ = reply.send(controller.resume());
                }
                Ok(Command::Subscribe(subscriber, reply)) => {
                    let _ = reply.send(controller.subscribe_weak(subscriber));
                }
                Ok(Command::Unsubscribe(id)) => {
                    controller.unsubscribe(id);
                }
                Ok(Command::Snapshot(reply)) => {
                    let _ = reply.send(controller.time_series().clone());
                }
                Ok(Command::State(reply)) => {
                    let _ = reply.send(controller.state());
                }
                Ok(Command::Close) | Err(_) => break,
            },
        }
    }

    controller.close();
    controller.into_time_series()
}
