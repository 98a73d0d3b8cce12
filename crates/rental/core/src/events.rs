//! Event bus for rental state transitions
//!
//! Publication is fire-and-forget: the bus never blocks a mutation, and a
//! subscriber that falls more than `capacity` events behind observes a lag
//! error on its receiver.

use rental_types::EventEnvelope;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn publish(&self, envelope: EventEnvelope) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(envelope.event.name()).or_insert(0) += 1;
        }

        // No receivers is fine
        let _ = self.sender.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Events published so far, by event name.
    pub fn counts(&self) -> HashMap<&'static str, u64> {
        self.counts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
