//! The seat ledger: the authoritative per-event count of free seats.
//!
//! The ledger owns `0 <= available_seats <= capacity` for every event. The
//! only writes it accepts are [`SeatLedger::reserve`] and
//! [`SeatLedger::release`], each moving the count by exactly one seat.
//!
//! Ledger primitives are methods on a transaction handle rather than on the
//! store, so every call is part of the surrounding unit of work and is undone
//! if that work is rolled back.

use crate::errors::LedgerResult;
use crate::types::{Capacity, EventId};
use std::future::Future;

/// Ledger row of an event, read while holding its exclusive lock.
///
/// The snapshot stays accurate for as long as the lock is held, which is
/// until the owning transaction commits or rolls back. It must not be reused
/// after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedEvent {
    /// The event whose row is locked.
    pub event_id: EventId,
    /// Seats offered by the event.
    pub capacity: Capacity,
    /// Seats free at the moment the lock was granted.
    pub available_seats: i32,
}

impl LockedEvent {
    /// Whether a reservation can still succeed under this lock.
    pub const fn has_free_seat(&self) -> bool {
        self.available_seats > 0
    }
}

/// Seat ledger primitives available inside an open transaction.
///
/// # Lock discipline
///
/// [`lock_for_update`](SeatLedger::lock_for_update) blocks until the caller
/// is the only holder of the event's row lock. Waiters are served in
/// acquisition order and proceed once the holder commits or rolls back. A
/// wait that exceeds the backend's lock timeout fails with a transient
/// [`StoreError`](crate::errors::StoreError) instead of hanging.
///
/// [`reserve`](SeatLedger::reserve) and [`release`](SeatLedger::release) also
/// take the row lock if the transaction does not hold it yet, so the
/// conditional decrement is correct even without an explicit lock.
pub trait SeatLedger: Send {
    /// Acquires the exclusive lock on the event's ledger row and returns the
    /// row as seen under the lock.
    ///
    /// Fails with [`LedgerError::EventNotFound`](crate::errors::LedgerError::EventNotFound)
    /// when the event does not exist.
    fn lock_for_update(
        &mut self,
        event_id: EventId,
    ) -> impl Future<Output = LedgerResult<LockedEvent>> + Send;

    /// Decrements `available_seats` by one if and only if it is positive.
    ///
    /// The test and the write are a single conditional update evaluated by
    /// the store. When no seat is free the call fails with
    /// [`LedgerError::SeatsExhausted`](crate::errors::LedgerError::SeatsExhausted)
    /// and nothing changes.
    fn reserve(&mut self, event_id: EventId) -> impl Future<Output = LedgerResult<()>> + Send;

    /// Increments `available_seats` by one.
    ///
    /// Callers release only a seat that a deleted registration held, so the
    /// count never exceeds capacity. The schema check rejects the write if a
    /// caller gets that wrong.
    fn release(&mut self, event_id: EventId) -> impl Future<Output = LedgerResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_event_with_zero_seats_has_no_free_seat() {
        let locked = LockedEvent {
            event_id: EventId::generate(),
            capacity: Capacity::try_new(2).unwrap(),
            available_seats: 0,
        };
        assert!(!locked.has_free_seat());
        assert!(LockedEvent {
            available_seats: 1,
            ..locked
        }
        .has_free_seat());
    }
}
