//! # Subscribers
//!
//! Consumers (the display, the synthesizer input) observe the stream by
//! registering a `NoteSubscriber`. The controller only keeps weak handles,
//! so dropping the subscriber's last `Arc` unsubscribes it.
//!
//! Notification is synchronous on the tick thread. Every call is isolated:
//! errors are logged and panics are caught, so one bad subscriber cannot
//! halt the pipeline. Slow consumers should go through `ChannelSubscriber`,
//! which never blocks.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::NoteEvent;

pub trait NoteSubscriber: Send + Sync {
    fn notify(&self, event: &NoteEvent) -> anyhow::Result<()>;
}

/// Downgrades a subscriber to the weak handle the stream keeps.
pub fn downgrade<S: NoteSubscriber + 'static>(subscriber: &Arc<S>) -> Weak<dyn NoteSubscriber> {
    let subscriber: Arc<dyn NoteSubscriber> = subscriber.clone();
    Arc::downgrade(&subscriber)
}

/// Identifies a registration so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Default)]
pub struct SubscriberSet {
    entries: Vec<(SubscriberId, Weak<dyn NoteSubscriber>)>,
    next_id: u64,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscriber: Weak<dyn NoteSubscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, subscriber));
        id
    }

    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registrations whose subscriber is still alive.
    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Delivers an event to every live subscriber and prunes dead ones.
    pub fn notify_all(&mut self, event: &NoteEvent) {
        self.entries.retain(|(_, weak)| weak.strong_count() > 0);

        for (id, weak) in &self.entries {
            let Some(subscriber) = weak.upgrade() else {
                continue;
            };
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber.notify(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!(
                        "[STREAM] Subscriber {:?} failed on tick {}: {}",
                        id,
                        event.tick_index,
                        e
                    );
                }
                Err(_) => {
                    log::error!(
                        "[STREAM] Subscriber {:?} panicked on tick {}",
                        id,
                        event.tick_index
                    );
                }
            }
        }
    }
}

/// Forwards events into a bounded channel without ever blocking the tick.
///
/// When the receiving side falls behind, new events are dropped and counted.
pub struct ChannelSubscriber {
    sender: Sender<NoteEvent>,
    dropped: AtomicUsize,
}

impl ChannelSubscriber {
    pub fn bounded(capacity: usize) -> (Arc<Self>, Receiver<NoteEvent>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        let subscriber = Arc::new(Self {
            sender,
            dropped: AtomicUsize::new(0),
        });
        (subscriber, receiver)
    }

    /// Events discarded because the channel was full.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl NoteSubscriber for ChannelSubscriber {
    fn notify(&self, event: &NoteEvent) -> anyhow::Result<()> {
        match self.sender.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("[STREAM] Channel subscriber lagging, dropped tick {}", event.tick_index);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(anyhow::anyhow!("channel subscriber receiver was dropped"))
            }
        }
    }
}
