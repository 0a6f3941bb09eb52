//! EventHub - fan-out publisher with one bounded [`EventBus`] per subscriber
//!
//! Each subscriber drains its own queue, so a slow or absent consumer only
//! loses its own oldest events.

use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::{EventBus, StateChangeEvent, EVENT_QUEUE_CAPACITY};

pub struct EventHub {
    subscribers: Mutex<Vec<Weak<EventBus>>>,
    capacity: usize,
}

/// A subscriber's queue; dropping it unsubscribes
pub struct Subscription {
    bus: Arc<EventBus>,
}

impl Deref for Subscription {
    type Target = EventBus;

    fn deref(&self) -> &EventBus {
        &self.bus
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    /// Hub whose subscriber queues each hold `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Open a new queue that receives every event published from now on
    pub fn subscribe(&self) -> Subscription {
        let bus = Arc::new(EventBus::with_capacity(self.capacity));
        self.subscribers.lock().push(Arc::downgrade(&bus));
        Subscription { bus }
    }

    /// Deliver `event` to every live subscriber
    pub fn publish(&self, event: &StateChangeEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|weak| match weak.upgrade() {
            Some(bus) => {
                bus.publish(event.clone());
                true
            }
            None => {
                trace!("Pruning dropped event subscriber");
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|weak| weak.strong_count() > 0);
        subscribers.len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
