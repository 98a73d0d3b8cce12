//! Durable event journal.
//!
//! The service writes each event to the store before applying it in memory,
//! and rebuilds its state on startup by replaying [`RentalStore::load`].
//!
//! Invariant handling:
//! - Sequence numbers are contiguous from 0; an append out of order is refused.
//! - A failed append aborts the operation before any in-memory change.

use crate::error::{RentalError, Result};
use async_trait::async_trait;
use rental_types::EventEnvelope;
use tokio::sync::RwLock;

#[async_trait]
pub trait RentalStore: Send + Sync {
    fn backend_label(&self) -> &'static str;

    async fn append(&self, envelope: &EventEnvelope) -> Result<()>;

    /// All journaled events in sequence order.
    async fn load(&self) -> Result<Vec<EventEnvelope>>;
}

/// Process-memory journal.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<EventEnvelope>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl RentalStore for MemoryStore {
    fn backend_label(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut entries = self.entries.write().await;
        let expected = entries.len() as u64;
        if envelope.sequence != expected {
            return Err(RentalError::Storage(format!(
                "append sequence mismatch: expected {expected}, got {}",
                envelope.sequence
            )));
        }
        entries.push(envelope.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Vec<EventEnvelope>> {
        Ok(self.entries.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rental_types::{Identity, RentalEvent};

    fn envelope(sequence: u64) -> EventEnvelope {
        EventEnvelope::new(
            sequence,
            Utc::now(),
            RentalEvent::RefundIssued {
                payee: Identity::new("renter"),
                amount: 1,
            },
        )
    }

    #[tokio::test]
    async fn appends_in_sequence() {
        let store = MemoryStore::new();
        store.append(&envelope(0)).await.unwrap();
        store.append(&envelope(1)).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].sequence, 1);
    }

    #[tokio::test]
    async fn rejects_sequence_gaps() {
        let store = MemoryStore::new();
        store.append(&envelope(0)).await.unwrap();

        let err = store.append(&envelope(2)).await.unwrap_err();
        assert!(err.to_string().contains("expected 1, got 2"));
        assert_eq!(store.len().await, 1);
    }
}
