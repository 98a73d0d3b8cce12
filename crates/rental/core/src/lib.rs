//! Rental Core - escrow service for peer-to-peer book rentals
//!
//! A lister publishes a book with a daily price and a refundable deposit.
//! A renter pays both into escrow, and on return the escrow is split by the
//! penalty schedule: the renter's share becomes a pending refund, the lister's
//! share (price plus any penalty) a pending credit. Parties pull their
//! balances out with [`RentalService::withdraw_refund`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     RentalService                        │
//! │  BookLocks ─▶ validate ─▶ RentalStore ─▶ apply ─▶ EventBus │
//! │                                │                         │
//! │          ┌─────────────┬───────┴──────┬──────────────┐   │
//! │          ▼             ▼              ▼              ▼   │
//! │    BookRegistry  RentalLedger  EscrowAccounts  PayoutSink│
//! └──────────────────────────────────────────────────────────┘
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod locks;
pub mod payout;
pub mod penalty;
pub mod registry;
pub mod rentals;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ListingAuthority, OverpaymentPolicy, RentalConfig};
pub use error::{ErrorKind, PayoutError, RentalError, Result};
pub use escrow::{EscrowAccounts, EscrowSnapshot};
pub use events::EventBus;
pub use payout::{PayoutReceipt, PayoutSink, RecordingSink};
pub use penalty::{
    compute_settlement, elapsed_minutes, PenaltySchedule, FORFEIT_AFTER_MINUTES, GRACE_MINUTES,
};
pub use service::RentalService;
pub use store::{MemoryStore, RentalStore};
