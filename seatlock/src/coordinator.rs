//! The registration coordinator: the reservation transaction protocol.
//!
//! For a (user, event) pair the coordinator either admits the user, taking
//! exactly one seat and recording exactly one registration in the same
//! transaction, or rejects the attempt and leaves the store untouched.
//!
//! # Protocol
//!
//! `register(user, event)`:
//!
//! 1. Check that the user exists (outside the transaction).
//! 2. Open a transaction covering steps 3 to 7.
//! 3. An existing registration for the pair fails with `AlreadyRegistered`.
//! 4. Lock the event's ledger row; a missing row fails with `EventNotFound`.
//! 5. No free seat under the lock fails with `EventFull`.
//! 6. Insert the registration with conflict-do-nothing semantics. A conflict
//!    means a concurrent attempt for the same pair won the race; it fails with
//!    `AlreadyRegistered` and no seat is taken.
//! 7. Take the seat with the conditional decrement.
//! 8. Commit. A failed commit is `Transient`.
//!
//! Every failing step rolls the transaction back, so a retry from step 1 is
//! always safe. Transient failures are retried according to the
//! coordinator's [`RetryPolicy`].
//!
//! The user check in step 1 runs outside the transaction. A user deleted
//! between that check and the insert surfaces as a foreign key violation,
//! which is reported as `UserNotFound`.

use tracing::{debug, error, info, instrument, warn};

use crate::errors::{LedgerError, RegistrationError, RegistrationResult, StoreError};
use crate::retry::RetryPolicy;
use crate::store::{InsertOutcome, RegistrationStore, RegistrationTransaction};
use crate::types::{EventId, Registration, UserId};

/// What a successful cancellation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// A registration was deleted and its seat returned to the event.
    Released,
    /// There was no registration for the pair; nothing changed.
    NotRegistered,
}

/// Runs the reservation protocol against a [`RegistrationStore`].
#[derive(Debug, Clone)]
pub struct RegistrationCoordinator<S> {
    store: S,
    retry_policy: RetryPolicy,
}

impl<S> RegistrationCoordinator<S>
where
    S: RegistrationStore,
{
    /// Creates a coordinator with the default retry policy.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The active retry policy.
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Registers `user_id` for `event_id`, taking one seat.
    ///
    /// Returns the registration that was committed. The returned value is the
    /// one built before the insert; the row is not read back.
    #[instrument(
        name = "coordinator.register",
        skip(self),
        fields(user_id = %user_id, event_id = %event_id)
    )]
    pub async fn register(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> RegistrationResult<Registration> {
        self.retry_policy
            .run("coordinator.register", || self.register_once(user_id, event_id))
            .await
    }

    /// Cancels the registration of `user_id` for `event_id`, returning its
    /// seat. Cancelling a registration that does not exist succeeds without
    /// changing anything.
    #[instrument(
        name = "coordinator.cancel",
        skip(self),
        fields(user_id = %user_id, event_id = %event_id)
    )]
    pub async fn cancel(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> RegistrationResult<CancelOutcome> {
        self.retry_policy
            .run("coordinator.cancel", || self.cancel_once(user_id, event_id))
            .await
    }

    async fn register_once(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> RegistrationResult<Registration> {
        if !self.store.user_exists(user_id).await? {
            info!("[coordinator.user_not_found]");
            return Err(RegistrationError::UserNotFound(user_id));
        }

        let mut tx = self.store.begin().await?;
        match reserve_seat(&mut tx, user_id, event_id).await {
            Ok(registration) => {
                commit(tx).await?;
                debug!(registration_id = %registration.id, "[coordinator.registered]");
                Ok(registration)
            }
            Err(error) => {
                abort(tx).await;
                Err(error)
            }
        }
    }

    async fn cancel_once(
        &self,
        user_id: UserId,
        event_id: EventId,
    ) -> RegistrationResult<CancelOutcome> {
        let mut tx = self.store.begin().await?;
        match release_seat(&mut tx, user_id, event_id).await {
            Ok(outcome) => {
                commit(tx).await?;
                debug!(?outcome, "[coordinator.cancelled]");
                Ok(outcome)
            }
            Err(error) => {
                abort(tx).await;
                Err(error)
            }
        }
    }
}

async fn reserve_seat<T>(
    tx: &mut T,
    user_id: UserId,
    event_id: EventId,
) -> RegistrationResult<Registration>
where
    T: RegistrationTransaction,
{
    if tx.find_registration(user_id, event_id).await?.is_some() {
        info!("[coordinator.already_registered]");
        return Err(RegistrationError::AlreadyRegistered { user_id, event_id });
    }

    let locked = tx
        .lock_for_update(event_id)
        .await
        .map_err(|error| from_ledger(error, event_id))?;

    if !locked.has_free_seat() {
        info!(capacity = %locked.capacity, "[coordinator.event_full]");
        return Err(RegistrationError::EventFull(event_id));
    }

    let registration = Registration::new(user_id, event_id);
    match tx.insert_registration(&registration).await {
        Ok(InsertOutcome::Inserted) => {}
        Ok(InsertOutcome::Conflict) => {
            warn!("[coordinator.duplicate_insert] concurrent registration for the same pair");
            return Err(RegistrationError::AlreadyRegistered { user_id, event_id });
        }
        Err(StoreError::ForeignKeyViolation { constraint }) => {
            warn!(%constraint, "[coordinator.user_vanished] user deleted during registration");
            return Err(RegistrationError::UserNotFound(user_id));
        }
        Err(error) => return Err(error.into()),
    }

    match tx.reserve(event_id).await {
        Ok(()) => Ok(registration),
        Err(LedgerError::SeatsExhausted(_)) => {
            error!(
                available_seats = locked.available_seats,
                "[coordinator.invariant_violation] seat vanished while the event row was locked"
            );
            Err(RegistrationError::EventFull(event_id))
        }
        Err(error) => Err(from_ledger(error, event_id)),
    }
}

async fn release_seat<T>(
    tx: &mut T,
    user_id: UserId,
    event_id: EventId,
) -> RegistrationResult<CancelOutcome>
where
    T: RegistrationTransaction,
{
    match tx.lock_for_update(event_id).await {
        Ok(_) => {}
        Err(LedgerError::EventNotFound(_)) => return Ok(CancelOutcome::NotRegistered),
        Err(error) => return Err(from_ledger(error, event_id)),
    }

    if !tx.delete_registration(user_id, event_id).await? {
        return Ok(CancelOutcome::NotRegistered);
    }

    tx.release(event_id)
        .await
        .map_err(|error| from_ledger(error, event_id))?;
    Ok(CancelOutcome::Released)
}

async fn commit<T: RegistrationTransaction>(tx: T) -> RegistrationResult<()> {
    tx.commit().await.map_err(|error| {
        warn!(%error, "[coordinator.commit_failed]");
        RegistrationError::Transient(error)
    })
}

async fn abort<T: RegistrationTransaction>(tx: T) {
    if let Err(error) = tx.rollback().await {
        warn!(%error, "[coordinator.rollback_failed] transaction dropped");
    }
}

fn from_ledger(error: LedgerError, event_id: EventId) -> RegistrationError {
    match error {
        LedgerError::EventNotFound(_) => RegistrationError::EventNotFound(event_id),
        LedgerError::SeatsExhausted(_) => RegistrationError::EventFull(event_id),
        LedgerError::Store(error) => error.into(),
    }
}
