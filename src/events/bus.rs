//! Bounded drop-oldest event queue with blocking pop-with-timeout
//!
//! One logical consumer per bus: `pop_next` removes the event. For several
//! independent consumers use [`super::EventHub`].

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::StateChangeEvent;

/// Default queue capacity
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

pub struct EventBus {
    queue: Mutex<VecDeque<StateChangeEvent>>,
    available: Condvar,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    /// Bus holding at most `capacity` events (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Append an event, discarding the oldest one when full. Never blocks
    /// on consumers.
    pub fn publish(&self, event: StateChangeEvent) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
            }
            queue.push_back(event);
        }
        self.available.notify_all();
    }

    /// Wait up to `timeout` for the next event. `None` means timed out.
    pub fn pop_next(&self, timeout: Duration) -> Option<StateChangeEvent> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            self.available
                .wait_while_for(&mut queue, |q| q.is_empty(), timeout);
        }
        queue.pop_front()
    }

    /// Non-blocking pop
    pub fn try_pop(&self) -> Option<StateChangeEvent> {
        self.queue.lock().pop_front()
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn slider(id: usize, value: u16) -> StateChangeEvent {
        StateChangeEvent::SliderChanged {
            id,
            value,
            previous: 0,
            timestamp: value as i64,
        }
    }

    #[test]
    fn test_fifo_order() {
        let bus = EventBus::new();
        bus.publish(slider(0, 1));
        bus.publish(slider(0, 2));

        assert_eq!(bus.pop_next(Duration::ZERO), Some(slider(0, 1)));
        assert_eq!(bus.pop_next(Duration::ZERO), Some(slider(0, 2)));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let bus = EventBus::new();
        for i in 0..=EVENT_QUEUE_CAPACITY {
            bus.publish(slider(0, i as u16));
        }

        assert_eq!(bus.len(), EVENT_QUEUE_CAPACITY);
        // event 0 was dropped, event 1 is now the oldest
        assert_eq!(bus.try_pop(), Some(slider(0, 1)));
    }

    #[test]
    fn test_pop_times_out() {
        let bus = EventBus::new();
        let started = Instant::now();
        assert_eq!(bus.pop_next(Duration::from_millis(30)), None);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(25));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn test_pop_wakes_on_publish() {
        let bus = Arc::new(EventBus::new());
        let producer = bus.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.publish(slider(4, 900));
        });

        assert_eq!(bus.pop_next(Duration::from_secs(5)), Some(slider(4, 900)));
        handle.join().unwrap();
    }

    #[test]
    fn test_clear_and_small_capacity() {
        let bus = EventBus::with_capacity(2);
        bus.publish(slider(0, 1));
        bus.publish(slider(0, 2));
        bus.publish(slider(0, 3));
        assert_eq!(bus.len(), 2);
        assert_eq!(bus.capacity(), 2);

        bus.clear();
        assert!(bus.is_empty());
        assert_eq!(EventBus::with_capacity(0).capacity(), 1);
    }
}
