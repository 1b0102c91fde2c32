//! `seatlock` - concurrency-safe registration for capacity-limited events
//!
//! Many attendees may try to register for the same event at the same time.
//! `seatlock` admits exactly as many of them as the event has seats, rejects
//! the rest with a definite answer, and never double-books or double-counts a
//! seat, no matter how the attempts interleave.
//!
//! The crate defines the protocol and the storage seams it runs on:
//!
//! - [`coordinator::RegistrationCoordinator`] runs the reservation
//!   transaction
//! - [`ledger::SeatLedger`] holds the per-event seat count primitives
//! - [`store::RegistrationStore`] and [`catalog::CatalogStore`] are
//!   implemented by the storage backends (`seatlock-postgres`,
//!   `seatlock-memory`)
//!
//! # Example
//!
//! ```rust,ignore
//! use seatlock::{RegistrationCoordinator, RegistrationError};
//!
//! let coordinator = RegistrationCoordinator::new(store);
//! match coordinator.register(user_id, event_id).await {
//!     Ok(registration) => println!("registered as {}", registration.id),
//!     Err(RegistrationError::EventFull(_)) => println!("sold out"),
//!     Err(other) => return Err(other.into()),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod coordinator;
pub mod errors;
pub mod ledger;
pub mod retry;
pub mod store;
pub mod types;

pub use catalog::{CatalogStore, NewEvent, NewUser};
pub use coordinator::{CancelOutcome, RegistrationCoordinator};
pub use errors::{
    CatalogError, CatalogResult, ErrorClass, LedgerError, LedgerResult, Operation,
    RegistrationError, RegistrationResult, StoreError, StoreResult,
};
pub use ledger::{LockedEvent, SeatLedger};
pub use retry::{RetryPolicy, Retryable};
pub use store::{InsertOutcome, RegistrationStore, RegistrationTransaction};
pub use types::{
    Capacity, Email, Event, EventId, EventTitle, Registration, RegistrationId, User, UserId,
    UserName, UserRole,
};
