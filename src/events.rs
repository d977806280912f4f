//! Event Bus Module
//!
//! Fan-out of events to independent subscribers. Each subscriber owns a
//! bounded queue; a full or closed queue drops the event for that subscriber
//! only, so publishing never waits on a slow consumer.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, warn};

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Subscriber<T> {
    sender: mpsc::Sender<T>,
    filter: Option<Predicate<T>>,
}

// == Event Bus ==
/// Multi-subscriber publisher with bounded per-subscriber queues.
pub struct EventBus<T> {
    subscribers: Mutex<Vec<Subscriber<T>>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Creates a bus whose subscriber queues hold `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber<T>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribes to every event.
    pub fn subscribe(&self) -> Subscription<T> {
        self.register(None)
    }

    /// Subscribes to events accepted by `filter`.
    pub fn subscribe_filtered<F>(&self, filter: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.register(Some(Box::new(filter)))
    }

    fn register(&self, filter: Option<Predicate<T>>) -> Subscription<T> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.lock().push(Subscriber { sender, filter });
        Subscription { receiver }
    }

    /// Delivers `event` to every interested subscriber.
    ///
    /// Returns the number of queues that accepted the event.
    pub fn publish(&self, event: T) -> usize {
        let mut subscribers = self.lock();
        let mut delivered = 0;

        subscribers.retain(|sub| {
            if sub.filter.as_ref().is_some_and(|f| !f(&event)) {
                return !sub.sender.is_closed();
            }
            match sub.sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Subscriber queue full, event dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Removing closed subscriber");
                    false
                }
            }
        });

        delivered
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|sub| !sub.sender.is_closed());
        subscribers.len()
    }

    /// Drops every subscriber; their streams end once drained.
    pub fn close(&self) {
        self.lock().clear();
    }
}

// == Subscription ==
/// Receiving end of an event bus subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    /// Waits for the next event. `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Returns a queued event without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Stops receiving; the bus drops this subscriber on its next publish.
    pub fn unsubscribe(mut self) {
        self.receiver.close();
    }
}
