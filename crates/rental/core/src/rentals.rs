//! Rental ledger
//!
//! At most one open rental per book. Opening and closing a rental flips the
//! book's availability in the registry in the same step, so
//! `is_available == false` holds exactly while a rental is open.

use crate::error::{RentalError, Result};
use crate::registry::BookRegistry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rental_types::{BookId, Rental};

pub struct RentalLedger {
    open: DashMap<BookId, Rental>,
}

impl RentalLedger {
    pub fn new() -> Self {
        Self {
            open: DashMap::new(),
        }
    }

    pub fn open(&self, books: &BookRegistry, rental: Rental) -> Result<()> {
        let book_id = rental.book_id;
        match self.open.entry(book_id) {
            Entry::Occupied(_) => Err(RentalError::not_available(book_id)),
            Entry::Vacant(slot) => {
                books.set_available(book_id, false)?;
                slot.insert(rental);
                Ok(())
            }
        }
    }

    /// Close the open rental and return it for settlement.
    pub fn close(&self, books: &BookRegistry, book_id: BookId) -> Result<Rental> {
        if !self.open.contains_key(&book_id) {
            return Err(RentalError::NotFound(format!(
                "no open rental for {book_id}"
            )));
        }
        books.set_available(book_id, true)?;

        self.open
            .remove(&book_id)
            .map(|(_, rental)| rental)
            .ok_or_else(|| RentalError::Invariant(format!("rental for {book_id} vanished")))
    }

    pub fn get(&self, book_id: BookId) -> Option<Rental> {
        self.open.get(&book_id).map(|r| r.clone())
    }

    pub fn is_open(&self, book_id: BookId) -> bool {
        self.open.contains_key(&book_id)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

impl Default for RentalLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rental_types::{Book, Identity};

    fn registry_with_book() -> BookRegistry {
        let registry = BookRegistry::new();
        registry
            .insert(Book {
                id: BookId::new(0),
                title: "Solidity Guide".to_string(),
                daily_price: 10,
                deposit: 50,
                lister: Identity::new("owner"),
                is_available: true,
                unlisted: false,
                listed_at: Utc::now(),
            })
            .unwrap();
        registry
    }

    fn rental(renter: &str) -> Rental {
        Rental {
            book_id: BookId::new(0),
            renter: Identity::new(renter),
            rented_at: Utc::now(),
            escrowed: 60,
        }
    }

    #[test]
    fn open_marks_book_unavailable() {
        let books = registry_with_book();
        let ledger = RentalLedger::new();

        ledger.open(&books, rental("renter")).unwrap();

        assert!(!books.get(BookId::new(0)).unwrap().is_available);
        assert_eq!(
            ledger.get(BookId::new(0)).unwrap().renter,
            Identity::new("renter")
        );
    }

    #[test]
    fn second_open_is_rejected() {
        let books = registry_with_book();
        let ledger = RentalLedger::new();
        ledger.open(&books, rental("renter")).unwrap();

        let err = ledger.open(&books, rental("another")).unwrap_err();
        assert!(err.to_string().contains("book is not available"));
        assert_eq!(
            ledger.get(BookId::new(0)).unwrap().renter,
            Identity::new("renter")
        );
    }

    #[test]
    fn close_returns_rental_and_frees_book() {
        let books = registry_with_book();
        let ledger = RentalLedger::new();
        ledger.open(&books, rental("renter")).unwrap();

        let closed = ledger.close(&books, BookId::new(0)).unwrap();

        assert_eq!(closed.renter, Identity::new("renter"));
        assert!(books.get(BookId::new(0)).unwrap().is_available);
        assert!(ledger.is_empty());
        assert!(ledger.close(&books, BookId::new(0)).is_err());
    }

    #[test]
    fn open_for_unknown_book_leaves_ledger_empty() {
        let books = BookRegistry::new();
        let ledger = RentalLedger::new();

        assert!(ledger.open(&books, rental("renter")).is_err());
        assert!(ledger.is_empty());
    }
}
