//! Fan-out of worker events to subscribers.
//!
//! Each subscriber owns an unbounded FIFO queue, so a slow reader never
//! blocks the worker or other readers and never loses events. Queues whose
//! receiver has gone away are pruned on the next publish.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use super::events::WorkerEvent;

#[derive(Debug, Default)]
struct HubState {
    next_id: u64,
    subscribers: BTreeMap<u64, UnboundedSender<WorkerEvent>>,
}

/// Registry of subscriber queues.
#[derive(Debug, Default)]
pub struct EventHub {
    state: Mutex<HubState>,
}

impl EventHub {
    /// Registers a subscriber whose queue starts with `initial`.
    ///
    /// The initial event is enqueued before the subscriber becomes visible
    /// to [`EventHub::publish`], so it always precedes published events.
    #[must_use]
    pub fn register(self: &Arc<Self>, initial: WorkerEvent) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        if sender.send(initial).is_ok() {
            state.subscribers.insert(id, sender);
        }
        debug!(subscriber = id, total = state.subscribers.len(), "subscriber registered");

        Subscription {
            id,
            receiver,
            hub: Arc::clone(self),
        }
    }

    /// Enqueues `event` for every live subscriber.
    pub fn publish(&self, event: &WorkerEvent) {
        let mut state = self.lock();
        state.subscribers.retain(|id, sender| {
            let delivered = sender.send(event.clone()).is_ok();
            if !delivered {
                debug!(subscriber = *id, "pruning disconnected subscriber");
            }
            delivered
        });
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Returns true when nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().subscribers.is_empty()
    }

    fn remove(&self, id: u64) {
        if self.lock().subscribers.remove(&id).is_some() {
            debug!(subscriber = id, "subscriber removed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live subscription to worker events.
///
/// Yields events in emission order, starting with a snapshot. Dropping the
/// subscription deregisters it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: UnboundedReceiver<WorkerEvent>,
    hub: Arc<EventHub>,
}

impl Subscription {
    /// Waits for the next event.
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        self.receiver.recv().await
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<WorkerEvent> {
        self.receiver.try_recv().ok()
    }

    /// Deregisters the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Stream for Subscription {
    type Item = WorkerEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.remove(self.id);
    }
}
