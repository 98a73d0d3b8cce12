//! Per-book mutual exclusion.

use dashmap::DashMap;
use rental_types::BookId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per book id, created on first use.
///
/// Holding the guard serializes every mutation of that book; different books
/// proceed independently.
#[derive(Default)]
pub struct BookLocks {
    locks: DashMap<BookId, Arc<Mutex<()>>>,
}

impl BookLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, book_id: BookId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(book_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_book_is_exclusive() {
        let locks = BookLocks::new();
        let guard = locks.acquire(BookId::new(0)).await;

        let second = tokio::time::timeout(Duration::from_millis(20), locks.acquire(BookId::new(0)));
        assert!(second.await.is_err());

        drop(guard);
        let _again = locks.acquire(BookId::new(0)).await;
    }

    #[tokio::test]
    async fn different_books_do_not_contend() {
        let locks = BookLocks::new();
        let _a = locks.acquire(BookId::new(0)).await;
        let b = tokio::time::timeout(Duration::from_millis(20), locks.acquire(BookId::new(1)));
        assert!(b.await.is_ok());
    }
}
