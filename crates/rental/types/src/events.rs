//! Event types for the rental state machine
//!
//! Every state transition is described by exactly one [`RentalEvent`]. The
//! service journals the event before applying it, so replaying a journal in
//! order reproduces the state that produced it.

use crate::book::{Book, Rental};
use crate::ids::{amount_serde, Amount, BookId, Identity};
use crate::settlement::Settlement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all rental events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Position in the journal, starting at 0
    pub sequence: u64,

    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp (service clock)
    pub timestamp: DateTime<Utc>,

    /// The actual event
    pub event: RentalEvent,
}

impl EventEnvelope {
    pub fn new(sequence: u64, timestamp: DateTime<Utc>, event: RentalEvent) -> Self {
        Self {
            sequence,
            id: Uuid::new_v4(),
            timestamp,
            event,
        }
    }
}

/// Rental events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RentalEvent {
    /// A book was listed
    BookListed { book: Book },

    /// A book was removed from the active set
    BookUnlisted { book_id: BookId, by: Identity },

    /// A book was rented. `payment` is what the renter sent; anything above
    /// `rental.escrowed` was credited back as `excess_refund`.
    BookRented {
        rental: Rental,
        #[serde(with = "amount_serde")]
        payment: Amount,
        #[serde(with = "amount_serde")]
        excess_refund: Amount,
    },

    /// A rental was closed and settled
    BookReturned {
        book_id: BookId,
        renter: Identity,
        lister: Identity,
        settlement: Settlement,
    },

    /// A pending balance was cleared for payout
    RefundIssued {
        payee: Identity,
        #[serde(with = "amount_serde")]
        amount: Amount,
    },

    /// The payment sink rejected a payout whose balance was already cleared
    PayoutFailed {
        payee: Identity,
        #[serde(with = "amount_serde")]
        amount: Amount,
        reason: String,
    },
}

impl RentalEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BookListed { .. } => "BookListed",
            Self::BookUnlisted { .. } => "BookUnlisted",
            Self::BookRented { .. } => "BookRented",
            Self::BookReturned { .. } => "BookReturned",
            Self::RefundIssued { .. } => "RefundIssued",
            Self::PayoutFailed { .. } => "PayoutFailed",
        }
    }

    /// Book the event concerns, if any.
    pub fn book_id(&self) -> Option<BookId> {
        match self {
            Self::BookListed { book } => Some(book.id),
            Self::BookUnlisted { book_id, .. } | Self::BookReturned { book_id, .. } => {
                Some(*book_id)
            }
            Self::BookRented { rental, .. } => Some(rental.book_id),
            Self::RefundIssued { .. } | Self::PayoutFailed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = RentalEvent::RefundIssued {
            payee: Identity::new("renter"),
            amount: 50,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "refund_issued");
        assert_eq!(json["amount"], "50");
        assert_eq!(event.name(), "RefundIssued");
        assert_eq!(event.book_id(), None);
    }

    #[test]
    fn wei_scale_events_survive_the_journal_format() {
        let amount: Amount = 30_000_000_000_000_000_000;
        let event = RentalEvent::PayoutFailed {
            payee: Identity::new("renter"),
            amount,
            reason: "rail offline".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: RentalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unlisted_event_reports_book() {
        let event = RentalEvent::BookUnlisted {
            book_id: BookId::new(3),
            by: Identity::new("owner"),
        };
        assert_eq!(event.book_id(), Some(BookId::new(3)));
    }
}
