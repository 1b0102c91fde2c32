//! Storage seams the registration coordinator runs on.
//!
//! A backend provides a [`RegistrationStore`] that opens transactions, and a
//! [`RegistrationTransaction`] that exposes the seat ledger plus the handful
//! of registration-row operations a reservation needs. Everything done
//! through one transaction handle becomes visible atomically at
//! [`commit`](RegistrationTransaction::commit) or not at all.
//!
//! Implementations include:
//! - `seatlock-postgres`: PostgreSQL with row locks and a unique index
//! - `seatlock-memory`: an in-process emulation of the same guarantees

use crate::errors::StoreResult;
use crate::ledger::SeatLedger;
use crate::types::{EventId, Registration, UserId};
use std::future::Future;

/// Result of inserting a registration with conflict-do-nothing semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row was written.
    Inserted,
    /// A live registration for the same (user, event) pair already exists.
    /// Nothing was written.
    Conflict,
}

/// An open unit of work against the store.
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// everything it did and releases its locks, same as
/// [`rollback`](Self::rollback).
pub trait RegistrationTransaction: SeatLedger {
    /// Looks up the live registration for a (user, event) pair.
    fn find_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> impl Future<Output = StoreResult<Option<Registration>>> + Send;

    /// Inserts a registration unless one already exists for the same pair.
    ///
    /// The uniqueness check is the store's own constraint, so two concurrent
    /// inserts for one pair can never both report
    /// [`InsertOutcome::Inserted`].
    fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> impl Future<Output = StoreResult<InsertOutcome>> + Send;

    /// Deletes the live registration for a pair, returning whether a row
    /// was removed.
    fn delete_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Makes every write of this transaction durable and visible.
    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Discards every write of this transaction.
    fn rollback(self) -> impl Future<Output = StoreResult<()>> + Send;
}

/// Entry point of a backend for the reservation protocol.
pub trait RegistrationStore: Send + Sync {
    /// Transaction handle produced by [`begin`](Self::begin).
    type Transaction: RegistrationTransaction;

    /// Whether the user exists, read outside any transaction.
    fn user_exists(&self, user_id: UserId) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Opens a new transaction.
    fn begin(&self) -> impl Future<Output = StoreResult<Self::Transaction>> + Send;
}
