//! Escrow accounting
//!
//! Tracks the funds the service holds and how they are allocated:
//!
//! - `in_rental`: payments locked against open rentals
//! - pending balances: amounts owed to a party and not yet withdrawn
//!
//! `held >= in_rental + pending_total` at all times. Every mutation is first
//! computed as the totals it would produce; a refused call changes nothing.
//! The `check_*` methods run the same computation without applying it, so a
//! caller can refuse an operation before it is journaled.

use crate::error::{RentalError, Result};
use rental_types::{amount_serde, Amount, Identity, Settlement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Point-in-time view of the escrow totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EscrowSnapshot {
    #[serde(with = "amount_serde")]
    pub held: Amount,
    #[serde(with = "amount_serde")]
    pub in_rental: Amount,
    #[serde(with = "amount_serde")]
    pub pending_total: Amount,
}

impl EscrowSnapshot {
    /// Funds held but not allocated to a rental or a pending balance.
    pub fn unallocated(&self) -> Amount {
        self.held
            .saturating_sub(self.in_rental)
            .saturating_sub(self.pending_total)
    }

    pub fn is_solvent(&self) -> bool {
        self.in_rental
            .checked_add(self.pending_total)
            .map(|owed| owed <= self.held)
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct EscrowBook {
    balances: HashMap<Identity, Amount>,
    totals: EscrowSnapshot,
}

fn overflow(what: &str) -> RentalError {
    RentalError::Invariant(format!("escrow {what} overflow"))
}

impl EscrowBook {
    /// Totals after accepting `payment` with `escrowed` locked to a rental.
    fn after_payment(&self, payment: Amount, escrowed: Amount) -> Result<EscrowSnapshot> {
        if payment < escrowed {
            return Err(RentalError::Invariant(format!(
                "payment {payment} below escrowed amount {escrowed}"
            )));
        }
        let totals = self.totals;
        Ok(EscrowSnapshot {
            held: totals
                .held
                .checked_add(payment)
                .ok_or_else(|| overflow("total"))?,
            in_rental: totals
                .in_rental
                .checked_add(escrowed)
                .ok_or_else(|| overflow("rental total"))?,
            pending_total: totals
                .pending_total
                .checked_add(payment - escrowed)
                .ok_or_else(|| overflow("pending total"))?,
        })
    }

    /// Totals after releasing `escrowed` into the balances `settlement` names.
    fn after_settlement(&self, escrowed: Amount, settlement: &Settlement) -> Result<EscrowSnapshot> {
        let released = settlement.total().ok_or_else(|| overflow("settlement"))?;
        if released != escrowed {
            return Err(RentalError::Invariant(format!(
                "settlement total {released} does not match escrowed {escrowed}"
            )));
        }
        let totals = self.totals;
        if totals.in_rental < escrowed {
            return Err(RentalError::Invariant(format!(
                "releasing {escrowed} but only {} is locked in rentals",
                totals.in_rental
            )));
        }
        Ok(EscrowSnapshot {
            held: totals.held,
            in_rental: totals.in_rental - escrowed,
            pending_total: totals
                .pending_total
                .checked_add(escrowed)
                .ok_or_else(|| overflow("pending total"))?,
        })
    }

    /// Add to a balance whose sum is already accounted in `pending_total`.
    fn add_balance(&mut self, identity: &Identity, amount: Amount) {
        if amount == 0 {
            return;
        }
        // Bounded by `pending_total`, so the sum cannot overflow.
        *self.balances.entry(identity.clone()).or_insert(0) += amount;
    }

    fn credit(&mut self, identity: &Identity, amount: Amount) -> Result<()> {
        if amount > self.totals.unallocated() {
            return Err(RentalError::Invariant(format!(
                "credit of {amount} to {identity} exceeds unallocated funds {}",
                self.totals.unallocated()
            )));
        }
        self.totals.pending_total += amount;
        self.add_balance(identity, amount);
        Ok(())
    }
}

pub struct EscrowAccounts {
    inner: Mutex<EscrowBook>,
}

impl EscrowAccounts {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(EscrowBook::default()),
        }
    }

    fn book(&self) -> Result<MutexGuard<'_, EscrowBook>> {
        self.inner
            .lock()
            .map_err(|_| RentalError::lock_poisoned("escrow"))
    }

    /// Whether [`lock_payment`](Self::lock_payment) would accept these amounts.
    pub fn check_payment(&self, payment: Amount, escrowed: Amount) -> Result<()> {
        self.book()?.after_payment(payment, escrowed).map(|_| ())
    }

    /// Whether [`settle`](Self::settle) would accept this settlement.
    pub fn check_settlement(&self, escrowed: Amount, settlement: &Settlement) -> Result<()> {
        self.book()?
            .after_settlement(escrowed, settlement)
            .map(|_| ())
    }

    /// Accept a rent payment: `escrowed` is locked against the rental and any
    /// excess is credited straight back to the renter.
    pub fn lock_payment(&self, renter: &Identity, payment: Amount, escrowed: Amount) -> Result<()> {
        let mut book = self.book()?;
        book.totals = book.after_payment(payment, escrowed)?;
        book.add_balance(renter, payment - escrowed);
        Ok(())
    }

    /// Release a rental's escrow into the renter's and lister's balances.
    pub fn settle(
        &self,
        renter: &Identity,
        lister: &Identity,
        escrowed: Amount,
        settlement: &Settlement,
    ) -> Result<()> {
        let mut book = self.book()?;
        book.totals = book.after_settlement(escrowed, settlement)?;
        book.add_balance(renter, settlement.renter_refund);
        book.add_balance(lister, settlement.lister_credit);
        Ok(())
    }

    /// Credit a pending balance from unallocated funds.
    pub fn credit(&self, identity: &Identity, amount: Amount) -> Result<()> {
        self.book()?.credit(identity, amount)
    }

    /// Read and zero a balance in one step. The returned amount has left the
    /// escrow and belongs to the payment sink.
    pub fn withdraw(&self, identity: &Identity) -> Result<Amount> {
        let mut book = self.book()?;
        let amount = book.balances.remove(identity).unwrap_or(0);
        book.totals.pending_total -= amount;
        book.totals.held -= amount;
        Ok(amount)
    }

    pub fn balance(&self, identity: &Identity) -> Amount {
        let book = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        book.balances.get(identity).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> Result<EscrowSnapshot> {
        Ok(self.book()?.totals)
    }

    /// Check that the totals agree with the per-party balances and cover them.
    pub fn verify(&self) -> Result<bool> {
        let book = self.book()?;
        let summed = book
            .balances
            .values()
            .try_fold(0 as Amount, |acc, v| acc.checked_add(*v));
        Ok(summed == Some(book.totals.pending_total) && book.totals.is_solvent())
    }
}

impl Default for EscrowAccounts {
    fn default() -> Self {
        Self::new()
    }
}
