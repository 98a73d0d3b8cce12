//! Error types for rental-core.
//!
//! Every failure carries a kind from a small stable taxonomy plus a
//! human-readable reason. Mutating operations that fail leave no partial state.

use rental_types::{Amount, BookId, Identity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during rental operations.
#[derive(Debug, Error)]
pub enum RentalError {
    /// Malformed input: empty title, zero price, excess payment.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Caller lacks the required role.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Operation invalid for the current lifecycle state.
    #[error("invalid state: {0}")]
    State(String),

    /// Unknown or unlisted book.
    #[error("not found: {0}")]
    NotFound(String),

    /// Insufficient funds supplied.
    #[error("payment rejected: {0}")]
    Payment(String),

    /// The payment sink failed after the balance was zeroed. The balance is
    /// not restored; the amount must be reconciled out of band.
    #[error("payout of {amount} to {payee} failed, balance already cleared: {reason}")]
    PayoutFailed {
        payee: Identity,
        amount: Amount,
        reason: String,
    },

    /// The durable store rejected a write or returned corrupt data.
    #[error("storage error: {0}")]
    Storage(String),

    /// An internal accounting invariant would be broken.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

/// Coarse error category, stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    NotFound,
    Payment,
    PayoutFailed,
    Storage,
    Invariant,
}

impl RentalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::State(_) => ErrorKind::State,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Payment(_) => ErrorKind::Payment,
            Self::PayoutFailed { .. } => ErrorKind::PayoutFailed,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Invariant(_) => ErrorKind::Invariant,
        }
    }

    pub fn book_not_found(book_id: BookId) -> Self {
        Self::NotFound(format!("{book_id} is not listed"))
    }

    pub fn not_available(book_id: BookId) -> Self {
        Self::State(format!("book is not available ({book_id})"))
    }

    pub fn currently_rented(book_id: BookId) -> Self {
        Self::State(format!("book is currently rented ({book_id})"))
    }

    pub fn lock_poisoned(what: &str) -> Self {
        Self::Invariant(format!("{what} lock poisoned"))
    }
}

/// Errors reported by a payment sink.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayoutError {
    #[error("payout rejected: {0}")]
    Rejected(String),

    #[error("payout rail unavailable: {0}")]
    Unavailable(String),
}

/// Result type for rental operations.
pub type Result<T> = std::result::Result<T, RentalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(
            RentalError::Validation("x".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            RentalError::not_available(BookId::new(1)).kind(),
            ErrorKind::State
        );
        assert_eq!(
            RentalError::book_not_found(BookId::new(1)).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn messages_carry_reason() {
        let err = RentalError::currently_rented(BookId::new(0));
        assert!(err.to_string().contains("book is currently rented"));

        let err = RentalError::PayoutFailed {
            payee: Identity::new("renter"),
            amount: 500,
            reason: "rail down".into(),
        };
        let s = err.to_string();
        assert!(s.contains("balance already cleared"));
        assert!(s.contains("500"));
        assert!(s.contains("renter"));
    }
}
