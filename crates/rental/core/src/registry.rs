//! Book registry
//!
//! Owns every book ever listed and the ordered set of active ids. Unlisted
//! books stay in the registry for historical queries.

use crate::error::{RentalError, Result};
use dashmap::DashMap;
use rental_types::{Book, BookId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

pub struct BookRegistry {
    books: DashMap<BookId, Book>,
    /// Listed ids in listing order.
    active: RwLock<Vec<BookId>>,
    next_id: AtomicU64,
}

impl BookRegistry {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            active: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Id the next listing will receive. Callers serialize allocation.
    pub fn next_id(&self) -> BookId {
        BookId::new(self.next_id.load(Ordering::SeqCst))
    }

    pub fn insert(&self, book: Book) -> Result<()> {
        let id = book.id;
        if self.books.contains_key(&id) {
            return Err(RentalError::Invariant(format!("{id} already exists")));
        }

        let mut active = self
            .active
            .write()
            .map_err(|_| RentalError::lock_poisoned("registry"))?;
        if !book.unlisted {
            active.push(id);
        }
        self.books.insert(id, book);
        self.next_id
            .fetch_max(id.value().saturating_add(1), Ordering::SeqCst);

        Ok(())
    }

    pub fn get(&self, id: BookId) -> Option<Book> {
        self.books.get(&id).map(|b| b.clone())
    }

    /// Get a book that is still listed.
    pub fn get_listed(&self, id: BookId) -> Result<Book> {
        match self.get(id) {
            Some(book) if !book.unlisted => Ok(book),
            _ => Err(RentalError::book_not_found(id)),
        }
    }

    pub fn set_available(&self, id: BookId, available: bool) -> Result<()> {
        let mut book = self
            .books
            .get_mut(&id)
            .ok_or_else(|| RentalError::book_not_found(id))?;
        book.is_available = available;
        Ok(())
    }

    /// Remove from the active set, keeping the record.
    pub fn unlist(&self, id: BookId) -> Result<()> {
        let mut active = self
            .active
            .write()
            .map_err(|_| RentalError::lock_poisoned("registry"))?;

        let mut book = self
            .books
            .get_mut(&id)
            .ok_or_else(|| RentalError::book_not_found(id))?;
        if book.unlisted {
            return Err(RentalError::book_not_found(id));
        }
        if !book.is_available {
            return Err(RentalError::currently_rented(id));
        }

        book.unlisted = true;
        active.retain(|listed| *listed != id);
        Ok(())
    }

    pub fn active_ids(&self) -> Vec<BookId> {
        self.active
            .read()
            .map(|active| active.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Total books ever listed, including unlisted ones.
    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

impl Default for BookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rental_types::Identity;

    fn book(id: u64, title: &str) -> Book {
        Book {
            id: BookId::new(id),
            title: title.to_string(),
            daily_price: 10,
            deposit: 50,
            lister: Identity::new("owner"),
            is_available: true,
            unlisted: false,
            listed_at: Utc::now(),
        }
    }

    #[test]
    fn insert_advances_next_id_and_keeps_order() {
        let registry = BookRegistry::new();
        assert_eq!(registry.next_id(), BookId::new(0));

        registry.insert(book(0, "a")).unwrap();
        registry.insert(book(1, "b")).unwrap();
        registry.insert(book(2, "c")).unwrap();

        assert_eq!(registry.next_id(), BookId::new(3));
        assert_eq!(
            registry.active_ids(),
            vec![BookId::new(0), BookId::new(1), BookId::new(2)]
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let registry = BookRegistry::new();
        registry.insert(book(0, "a")).unwrap();
        assert!(registry.insert(book(0, "again")).is_err());
        assert_eq!(registry.get(BookId::new(0)).unwrap().title, "a");
    }

    #[test]
    fn unlist_keeps_record_and_preserves_remaining_order() {
        let registry = BookRegistry::new();
        for id in 0..3 {
            registry.insert(book(id, "t")).unwrap();
        }

        registry.unlist(BookId::new(1)).unwrap();

        assert_eq!(registry.active_ids(), vec![BookId::new(0), BookId::new(2)]);
        assert!(registry.get(BookId::new(1)).unwrap().unlisted);
        assert!(registry.get_listed(BookId::new(1)).is_err());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn rented_books_cannot_be_unlisted() {
        let registry = BookRegistry::new();
        registry.insert(book(0, "t")).unwrap();
        registry.set_available(BookId::new(0), false).unwrap();

        let err = registry.unlist(BookId::new(0)).unwrap_err();
        assert!(err.to_string().contains("book is currently rented"));
        assert_eq!(registry.active_ids(), vec![BookId::new(0)]);
    }
}
