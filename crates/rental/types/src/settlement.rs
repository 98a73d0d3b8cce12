//! Return settlement record

use crate::ids::{amount_serde, Amount};
use serde::{Deserialize, Serialize};

/// Split of an escrowed rental payment at return time.
///
/// `renter_refund + lister_credit` always equals the daily price plus the deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Whole minutes between rental start and return.
    pub elapsed_minutes: u64,
    /// Portion of the deposit forfeited to the lister.
    #[serde(with = "amount_serde")]
    pub penalty: Amount,
    /// Credited to the renter's pending balance.
    #[serde(with = "amount_serde")]
    pub renter_refund: Amount,
    /// Credited to the lister's pending balance (base fee + penalty).
    #[serde(with = "amount_serde")]
    pub lister_credit: Amount,
}

impl Settlement {
    /// Amount released from escrow, `None` if the parts overflow.
    pub fn total(&self) -> Option<Amount> {
        self.renter_refund.checked_add(self.lister_credit)
    }

    pub fn is_full_refund(&self) -> bool {
        self.penalty == 0
    }
}
