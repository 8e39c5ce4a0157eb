//! In-process event bus for session updates.
//!
//! Two kinds of subscribers: weakly held [`SessionListener`]s and crossbeam channel
//! receivers. Fan-out copies the subscriber list under the lock and delivers outside it,
//! so listeners can register or unregister at any time, including from inside a callback.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crossbeam_channel::{Receiver, Sender};
use session_types::SessionEvent;

/// Observer notified for every published [`SessionEvent`].
pub trait SessionListener: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Registration token returned by [`EventBus::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(ListenerId, Weak<dyn SessionListener>)>,
    channels: Vec<Sender<SessionEvent>>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` without taking ownership. It stops receiving events once the
    /// last strong reference elsewhere is dropped.
    pub fn add_listener(&self, listener: &Arc<dyn SessionListener>) -> ListenerId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner.listeners.push((id, Arc::downgrade(listener)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(existing, _)| *existing != id);
        inner.listeners.len() != before
    }

    /// Subscribe to the event stream. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.lock().channels.push(tx);
        rx
    }

    /// Live listeners plus channel subscribers.
    pub fn subscriber_count(&self) -> usize {
        let inner = self.lock();
        inner
            .listeners
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
            + inner.channels.len()
    }

    /// Deliver `event` to every subscriber.
    pub fn publish(&self, event: SessionEvent) {
        let (listeners, channels) = {
            let mut inner = self.lock();
            inner.listeners.retain(|(_, weak)| weak.strong_count() > 0);
            let listeners: Vec<Arc<dyn SessionListener>> = inner
                .listeners
                .iter()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect();
            (listeners, inner.channels.clone())
        };

        for listener in listeners {
            let delivered = catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
            if delivered.is_err() {
                tracing::warn!("session listener panicked; continuing fan-out");
            }
        }

        let dead: Vec<Sender<SessionEvent>> = channels
            .into_iter()
            .filter(|tx| tx.send(event.clone()).is_err())
            .collect();
        if !dead.is_empty() {
            self.lock()
                .channels
                .retain(|tx| !dead.iter().any(|d| d.same_channel(tx)));
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
