//! Rental service configuration.

use crate::penalty::PenaltySchedule;
use rental_types::Identity;
use serde::{Deserialize, Serialize};

/// Who may list and unlist books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingAuthority {
    /// Anyone lists; the lister or the administrator unlists.
    #[default]
    Open,
    /// Only the administrator lists or unlists.
    AdministratorOnly,
}

impl ListingAuthority {
    pub fn may_list(&self, caller: &Identity, administrator: &Identity) -> bool {
        match self {
            Self::Open => true,
            Self::AdministratorOnly => caller == administrator,
        }
    }

    pub fn may_unlist(&self, caller: &Identity, lister: &Identity, administrator: &Identity) -> bool {
        match self {
            Self::Open => caller == lister || caller == administrator,
            Self::AdministratorOnly => caller == administrator,
        }
    }
}

/// Handling of a rent payment above daily price + deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverpaymentPolicy {
    /// Fail the rent with a validation error.
    #[default]
    Reject,
    /// Accept and credit the excess to the renter's pending balance.
    RefundExcess,
}

/// Rental service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RentalConfig {
    /// Deployment owner. May always unlist.
    pub administrator: Identity,
    pub authority: ListingAuthority,
    pub overpayment: OverpaymentPolicy,
    /// Fail `withdraw_refund` with a state error when nothing is owed. When
    /// false, an empty withdrawal returns 0 and never reaches the sink.
    pub reject_empty_withdrawal: bool,
    pub penalty: PenaltySchedule,
    /// Broadcast buffer for event subscribers.
    pub event_capacity: usize,
}

impl Default for RentalConfig {
    fn default() -> Self {
        Self {
            administrator: Identity::new("owner"),
            authority: ListingAuthority::Open,
            overpayment: OverpaymentPolicy::Reject,
            reject_empty_withdrawal: true,
            penalty: PenaltySchedule::default(),
            event_capacity: 1024,
        }
    }
}

impl RentalConfig {
    pub fn with_administrator(administrator: impl Into<Identity>) -> Self {
        Self {
            administrator: administrator.into(),
            ..Self::default()
        }
    }
}
