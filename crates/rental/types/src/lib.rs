//! Rental Types - Core types for the book rental escrow
//!
//! These types are shared by the rental service and any consumer of its
//! event stream (dashboards, presentation layers, audit tooling).
//!
//! ## Key Concepts
//!
//! - **Book**: a listed item with static terms (daily price, deposit, lister)
//! - **Rental**: the single open rental of a book (renter, start time)
//! - **Settlement**: how a returned rental's funds split between renter and lister
//! - **Events**: the append-only stream of state transitions

#![deny(unsafe_code)]

pub mod book;
pub mod events;
pub mod ids;
pub mod settlement;

pub use book::{Book, BookView, Rental};
pub use events::{EventEnvelope, RentalEvent};
pub use ids::{amount_serde, Amount, BookId, Identity};
pub use settlement::Settlement;
