//! Rental service: the only entry point that mutates rental state.
//!
//! Every mutating operation follows the same path:
//!
//! 1. take the book's lock (per-id serialization)
//! 2. validate against current state, failing without side effects
//! 3. journal the resulting [`RentalEvent`] in the durable store
//! 4. apply the event to registry, rental ledger and escrow
//! 5. publish the event to subscribers
//!
//! Steps 3-5 run under the journal cursor so the journal order is the apply
//! order, which is what lets [`RentalService::bootstrap`] rebuild state by
//! replaying the journal through the same `apply` path.

use crate::clock::Clock;
use crate::config::{OverpaymentPolicy, RentalConfig};
use crate::error::{RentalError, Result};
use crate::escrow::{EscrowAccounts, EscrowSnapshot};
use crate::events::EventBus;
use crate::locks::BookLocks;
use crate::payout::PayoutSink;
use crate::penalty::elapsed_minutes;
use crate::registry::BookRegistry;
use crate::rentals::RentalLedger;
use crate::store::{MemoryStore, RentalStore};
use rental_types::{
    Amount, Book, BookId, BookView, EventEnvelope, Identity, Rental, RentalEvent, Settlement,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

pub struct RentalService {
    config: RentalConfig,
    registry: BookRegistry,
    rentals: RentalLedger,
    escrow: EscrowAccounts,
    locks: BookLocks,
    /// Next journal sequence number.
    journal: AsyncMutex<u64>,
    store: Arc<dyn RentalStore>,
    clock: Arc<dyn Clock>,
    payouts: Arc<dyn PayoutSink>,
    events: EventBus,
}

impl RentalService {
    /// Fresh service journaling to process memory.
    pub fn new(config: RentalConfig, clock: Arc<dyn Clock>, payouts: Arc<dyn PayoutSink>) -> Self {
        Self::assemble(config, Arc::new(MemoryStore::new()), clock, payouts)
    }

    /// Build a service over `store`, replaying whatever it already holds.
    pub async fn bootstrap(
        config: RentalConfig,
        store: Arc<dyn RentalStore>,
        clock: Arc<dyn Clock>,
        payouts: Arc<dyn PayoutSink>,
    ) -> Result<Self> {
        let entries = store.load().await?;
        let mut service = Self::assemble(config, store, clock, payouts);

        for (expected, envelope) in entries.iter().enumerate() {
            if envelope.sequence != expected as u64 {
                return Err(RentalError::Storage(format!(
                    "journal gap at position {expected} (found sequence {})",
                    envelope.sequence
                )));
            }
            service.apply(&envelope.event)?;
        }
        *service.journal.get_mut() = entries.len() as u64;

        info!(
            backend = service.store.backend_label(),
            replayed = entries.len(),
            books = service.registry.len(),
            open_rentals = service.rentals.len(),
            "rental service bootstrapped"
        );
        Ok(service)
    }

    fn assemble(
        config: RentalConfig,
        store: Arc<dyn RentalStore>,
        clock: Arc<dyn Clock>,
        payouts: Arc<dyn PayoutSink>,
    ) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            config,
            registry: BookRegistry::new(),
            rentals: RentalLedger::new(),
            escrow: EscrowAccounts::new(),
            locks: BookLocks::new(),
            journal: AsyncMutex::new(0),
            store,
            clock,
            payouts,
            events,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // OPERATIONS
    // ═══════════════════════════════════════════════════════════════════

    /// List a book. The caller becomes its lister.
    pub async fn list_item(
        &self,
        caller: &Identity,
        title: &str,
        daily_price: Amount,
        deposit: Amount,
    ) -> Result<BookId> {
        self.try_list(caller, title, daily_price, deposit)
            .await
            .inspect_err(|err| debug!(%caller, kind = ?err.kind(), %err, "list rejected"))
    }

    async fn try_list(
        &self,
        caller: &Identity,
        title: &str,
        daily_price: Amount,
        deposit: Amount,
    ) -> Result<BookId> {
        let title = title.trim();
        if title.is_empty() {
            return Err(RentalError::Validation("title must not be empty".into()));
        }
        if daily_price == 0 {
            return Err(RentalError::Validation(
                "daily price must be greater than zero".into(),
            ));
        }
        if deposit == 0 {
            return Err(RentalError::Validation(
                "deposit must be greater than zero".into(),
            ));
        }
        if daily_price.checked_add(deposit).is_none() {
            return Err(RentalError::Validation(
                "daily price plus deposit overflows".into(),
            ));
        }
        if !self
            .config
            .authority
            .may_list(caller, &self.config.administrator)
        {
            return Err(RentalError::Authorization(
                "only the administrator may list books".into(),
            ));
        }

        let listed_at = self.clock.now();
        let envelope = self
            .commit(|| {
                // Allocation happens under the journal cursor, so ids stay sequential.
                let book = Book {
                    id: self.registry.next_id(),
                    title: title.to_string(),
                    daily_price,
                    deposit,
                    lister: caller.clone(),
                    is_available: true,
                    unlisted: false,
                    listed_at,
                };
                Ok(Some(RentalEvent::BookListed { book }))
            })
            .await?;

        let book_id = envelope
            .and_then(|e| e.event.book_id())
            .ok_or_else(|| RentalError::Invariant("listing produced no book id".into()))?;

        info!(%book_id, lister = %caller, title, daily_price, deposit, "book listed");
        Ok(book_id)
    }

    /// Remove an available book from the active set.
    pub async fn unlist_item(&self, caller: &Identity, book_id: BookId) -> Result<()> {
        self.try_unlist(caller, book_id)
            .await
            .inspect_err(|err| debug!(%caller, %book_id, kind = ?err.kind(), %err, "unlist rejected"))
    }

    async fn try_unlist(&self, caller: &Identity, book_id: BookId) -> Result<()> {
        let _guard = self.locks.acquire(book_id).await;

        let book = self.registry.get_listed(book_id)?;
        if !self
            .config
            .authority
            .may_unlist(caller, &book.lister, &self.config.administrator)
        {
            return Err(RentalError::Authorization(format!(
                "only the lister or administrator may unlist {book_id}"
            )));
        }
        if !book.is_available {
            return Err(RentalError::currently_rented(book_id));
        }

        self.commit(|| {
            Ok(Some(RentalEvent::BookUnlisted {
                book_id,
                by: caller.clone(),
            }))
        })
        .await?;

        info!(%book_id, by = %caller, "book unlisted");
        Ok(())
    }

    /// Rent a book, paying daily price plus deposit into escrow.
    pub async fn rent_item(
        &self,
        caller: &Identity,
        book_id: BookId,
        payment: Amount,
    ) -> Result<Rental> {
        self.try_rent(caller, book_id, payment)
            .await
            .inspect_err(|err| debug!(%caller, %book_id, payment, kind = ?err.kind(), %err, "rent rejected"))
    }

    async fn try_rent(&self, caller: &Identity, book_id: BookId, payment: Amount) -> Result<Rental> {
        let _guard = self.locks.acquire(book_id).await;

        let book = self.registry.get_listed(book_id)?;
        if !book.is_rentable() || self.rentals.is_open(book_id) {
            return Err(RentalError::not_available(book_id));
        }

        let cost = book.rental_cost();
        if payment < cost {
            return Err(RentalError::Payment(format!(
                "insufficient funds: {book_id} requires {cost}, received {payment}"
            )));
        }
        let excess = payment - cost;
        if excess > 0 && self.config.overpayment == OverpaymentPolicy::Reject {
            return Err(RentalError::Validation(format!(
                "payment {payment} exceeds the required {cost} for {book_id}"
            )));
        }

        let rental = Rental {
            book_id,
            renter: caller.clone(),
            rented_at: self.clock.now(),
            escrowed: cost,
        };
        self.commit(|| {
            self.escrow.check_payment(payment, cost)?;
            Ok(Some(RentalEvent::BookRented {
                rental: rental.clone(),
                payment,
                excess_refund: excess,
            }))
        })
        .await?;

        info!(%book_id, renter = %caller, escrowed = cost, excess, "book rented");
        Ok(rental)
    }

    /// Return a rented book and settle its escrow.
    pub async fn return_item(&self, caller: &Identity, book_id: BookId) -> Result<Settlement> {
        self.try_return(caller, book_id)
            .await
            .inspect_err(|err| debug!(%caller, %book_id, kind = ?err.kind(), %err, "return rejected"))
    }

    async fn try_return(&self, caller: &Identity, book_id: BookId) -> Result<Settlement> {
        let _guard = self.locks.acquire(book_id).await;

        let book = self
            .registry
            .get(book_id)
            .ok_or_else(|| RentalError::book_not_found(book_id))?;
        let rental = self
            .rentals
            .get(book_id)
            .ok_or_else(|| RentalError::State(format!("{book_id} has no open rental")))?;
        if rental.renter != *caller {
            return Err(RentalError::Authorization(format!(
                "only the renter may return {book_id}"
            )));
        }

        let settlement = self.settlement_at(&book, &rental);
        self.commit(|| {
            self.escrow.check_settlement(rental.escrowed, &settlement)?;
            Ok(Some(RentalEvent::BookReturned {
                book_id,
                renter: rental.renter.clone(),
                lister: book.lister.clone(),
                settlement,
            }))
        })
        .await?;

        info!(
            %book_id,
            renter = %caller,
            elapsed_minutes = settlement.elapsed_minutes,
            refund = settlement.renter_refund,
            penalty = settlement.penalty,
            full_refund = settlement.is_full_refund(),
            "book returned"
        );
        Ok(settlement)
    }

    /// Pay out the caller's pending balance.
    ///
    /// The balance is zeroed (and journaled) before the payment sink is
    /// called. A sink failure is reported as [`RentalError::PayoutFailed`]
    /// and the balance stays at zero.
    pub async fn withdraw_refund(&self, caller: &Identity) -> Result<Amount> {
        let envelope = self
            .commit(|| {
                let amount = self.escrow.balance(caller);
                if amount == 0 {
                    if self.config.reject_empty_withdrawal {
                        return Err(RentalError::State("nothing to withdraw".into()));
                    }
                    return Ok(None);
                }
                Ok(Some(RentalEvent::RefundIssued {
                    payee: caller.clone(),
                    amount,
                }))
            })
            .await
            .inspect_err(|err| debug!(%caller, kind = ?err.kind(), %err, "withdraw rejected"))?;

        let amount = match envelope.map(|e| e.event) {
            None => return Ok(0),
            Some(RentalEvent::RefundIssued { amount, .. }) => amount,
            Some(other) => {
                return Err(RentalError::Invariant(format!(
                    "withdrawal journaled {} instead of RefundIssued",
                    other.name()
                )))
            }
        };

        match self.payouts.pay(caller, amount).await {
            Ok(receipt) => {
                info!(
                    payee = %caller,
                    amount,
                    rail = self.payouts.rail(),
                    payout_id = %receipt.payout_id,
                    "refund paid out"
                );
                Ok(amount)
            }
            Err(err) => {
                let reason = err.to_string();
                warn!(
                    payee = %caller,
                    amount,
                    rail = self.payouts.rail(),
                    %reason,
                    "payout failed after balance was cleared; manual reconciliation required"
                );
                let recorded = self
                    .commit(|| {
                        Ok(Some(RentalEvent::PayoutFailed {
                            payee: caller.clone(),
                            amount,
                            reason: reason.clone(),
                        }))
                    })
                    .await;
                if let Err(journal_err) = recorded {
                    error!(payee = %caller, amount, %journal_err, "could not journal payout failure");
                }
                Err(RentalError::PayoutFailed {
                    payee: caller.clone(),
                    amount,
                    reason,
                })
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════

    /// Any book ever listed, including unlisted ones.
    pub fn book(&self, book_id: BookId) -> Result<Book> {
        self.registry
            .get(book_id)
            .ok_or_else(|| RentalError::NotFound(format!("{book_id} does not exist")))
    }

    pub fn rental(&self, book_id: BookId) -> Option<Rental> {
        self.rentals.get(book_id)
    }

    pub fn pending_refund(&self, identity: &Identity) -> Amount {
        self.escrow.balance(identity)
    }

    pub fn active_book_ids(&self) -> Vec<BookId> {
        self.registry.active_ids()
    }

    /// The administrator.
    pub fn owner(&self) -> &Identity {
        &self.config.administrator
    }

    pub fn lister_of(&self, book_id: BookId) -> Result<Identity> {
        self.book(book_id).map(|b| b.lister)
    }

    /// Settlement the renter would receive if the book were returned now.
    pub fn quote_return(&self, book_id: BookId) -> Result<Settlement> {
        let book = self.book(book_id)?;
        let rental = self
            .rentals
            .get(book_id)
            .ok_or_else(|| RentalError::State(format!("{book_id} has no open rental")))?;
        Ok(self.settlement_at(&book, &rental))
    }

    /// Every active book joined with its rental, in listing order.
    pub fn books_with_rentals(&self) -> Vec<BookView> {
        let now = self.clock.now();
        self.registry
            .active_ids()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .map(|book| {
                let rental = self.rentals.get(book.id);
                let elapsed = rental
                    .as_ref()
                    .map(|r| elapsed_minutes(r.rented_at, now));
                let return_quote = elapsed.map(|minutes| {
                    self.config
                        .penalty
                        .settle(book.daily_price, book.deposit, minutes)
                });
                BookView {
                    book,
                    rental,
                    elapsed_minutes: elapsed,
                    return_quote,
                }
            })
            .collect()
    }

    pub fn escrow_snapshot(&self) -> Result<EscrowSnapshot> {
        self.escrow.snapshot()
    }

    /// Check that escrow totals cover every balance and match the open rentals.
    pub fn verify_solvency(&self) -> Result<bool> {
        let snapshot = self.escrow.snapshot()?;
        let locked: Option<Amount> = self
            .registry
            .active_ids()
            .into_iter()
            .filter_map(|id| self.rentals.get(id))
            .try_fold(0 as Amount, |acc, r| acc.checked_add(r.escrowed));

        Ok(self.escrow.verify()? && locked == Some(snapshot.in_rental))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    /// Events published since startup, by name. Replayed events are not counted.
    pub fn event_counts(&self) -> HashMap<&'static str, u64> {
        self.events.counts()
    }

    pub fn config(&self) -> &RentalConfig {
        &self.config
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend_label()
    }

    // ═══════════════════════════════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════════════════════════════

    fn settlement_at(&self, book: &Book, rental: &Rental) -> Settlement {
        let minutes = elapsed_minutes(rental.rented_at, self.clock.now());
        self.config
            .penalty
            .settle(book.daily_price, book.deposit, minutes)
    }

    /// Journal, apply and publish the event produced by `build`.
    ///
    /// `build` runs under the journal cursor, so state it reads cannot change
    /// before the event is applied. Returning `Ok(None)` commits nothing.
    ///
    /// Once appended, an event is replayed on every bootstrap. `build` must
    /// therefore refuse anything `apply` would refuse; an apply failure here
    /// means the two have drifted apart.
    async fn commit<F>(&self, build: F) -> Result<Option<EventEnvelope>>
    where
        F: FnOnce() -> Result<Option<RentalEvent>>,
    {
        let mut next_sequence = self.journal.lock().await;
        let Some(event) = build()? else {
            return Ok(None);
        };

        let envelope = EventEnvelope::new(*next_sequence, self.clock.now(), event);
        self.store.append(&envelope).await?;
        // The store now holds this sequence number whatever apply does.
        *next_sequence += 1;

        if let Err(err) = self.apply(&envelope.event) {
            error!(
                sequence = envelope.sequence,
                event = envelope.event.name(),
                %err,
                "journaled event could not be applied"
            );
            return Err(err);
        }

        self.events.publish(envelope.clone());
        Ok(Some(envelope))
    }

    fn apply(&self, event: &RentalEvent) -> Result<()> {
        match event {
            RentalEvent::BookListed { book } => self.registry.insert(book.clone()),
            RentalEvent::BookUnlisted { book_id, .. } => self.registry.unlist(*book_id),
            RentalEvent::BookRented {
                rental, payment, ..
            } => {
                self.rentals.open(&self.registry, rental.clone())?;
                if let Err(err) = self
                    .escrow
                    .lock_payment(&rental.renter, *payment, rental.escrowed)
                {
                    self.rentals.close(&self.registry, rental.book_id)?;
                    return Err(err);
                }
                Ok(())
            }
            RentalEvent::BookReturned {
                book_id,
                renter,
                lister,
                settlement,
            } => {
                let rental = self.rentals.get(*book_id).ok_or_else(|| {
                    RentalError::Invariant(format!("return of {book_id} without an open rental"))
                })?;
                if rental.renter != *renter {
                    return Err(RentalError::Invariant(format!(
                        "return of {book_id} by {renter}, rented by {}",
                        rental.renter
                    )));
                }
                self.escrow
                    .settle(renter, lister, rental.escrowed, settlement)?;
                self.rentals.close(&self.registry, *book_id).map(|_| ())
            }
            RentalEvent::RefundIssued { payee, amount } => {
                let balance = self.escrow.balance(payee);
                if balance != *amount {
                    return Err(RentalError::Invariant(format!(
                        "refund of {amount} to {payee} but balance is {balance}"
                    )));
                }
                self.escrow.withdraw(payee).map(|_| ())
            }
            RentalEvent::PayoutFailed { .. } => Ok(()),
        }
    }
}
