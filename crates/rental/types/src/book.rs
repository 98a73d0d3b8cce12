//! Book and rental records

use crate::ids::{amount_serde, Amount, BookId, Identity};
use crate::settlement::Settlement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A listed book and its static rental terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    /// Base fee, always retained by the lister.
    #[serde(with = "amount_serde")]
    pub daily_price: Amount,
    /// Refundable security amount collected at rental time.
    #[serde(with = "amount_serde")]
    pub deposit: Amount,
    pub lister: Identity,
    pub is_available: bool,
    /// Set once the book has been unlisted. The record is kept for history.
    pub unlisted: bool,
    pub listed_at: DateTime<Utc>,
}

impl Book {
    /// Total a renter must pay to take the book.
    ///
    /// Saturates rather than wrapping; listing rejects terms whose sum overflows.
    pub fn rental_cost(&self) -> Amount {
        self.daily_price.saturating_add(self.deposit)
    }

    /// Whether the book is listed and can currently be rented.
    pub fn is_rentable(&self) -> bool {
        !self.unlisted && self.is_available
    }
}

/// The open rental of a book. At most one exists per book id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub book_id: BookId,
    pub renter: Identity,
    pub rented_at: DateTime<Utc>,
    /// Amount escrowed for this rental (daily price + deposit).
    #[serde(with = "amount_serde")]
    pub escrowed: Amount,
}

/// Joined view of an active book and its rental, as a listing page renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookView {
    pub book: Book,
    pub rental: Option<Rental>,
    /// Whole minutes elapsed since the rental began, if rented.
    pub elapsed_minutes: Option<u64>,
    /// Settlement that would apply if the book were returned now.
    pub return_quote: Option<Settlement>,
}
