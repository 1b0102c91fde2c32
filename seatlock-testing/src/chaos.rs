//! Transient-failure injection for seatlock stores.
//!
//! [`ChaosStore`] wraps any [`RegistrationStore`] and makes selected
//! operations fail with the transient errors a real database produces under
//! contention or network trouble: a refused connection at `begin`, a lock
//! timeout at `lock_for_update`, a serialization failure at `commit`. The
//! coordinator must absorb these through its retry policy without ever
//! leaving a partial reservation behind.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use nutype::nutype;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{random, Rng, SeedableRng};
use seatlock::{
    CatalogResult, CatalogStore, Event, EventId, EventTitle, InsertOutcome, LedgerResult,
    LockedEvent, NewEvent, NewUser, Operation, Registration, RegistrationId, RegistrationStore,
    RegistrationTransaction, SeatLedger, StoreError, StoreResult, User, UserId,
};
use tracing::debug;

/// Chance of injecting a failure, in `[0.0, 1.0]`.
///
/// ```ignore
/// let sometimes = Probability::try_new(0.5).unwrap();
/// assert!(Probability::try_new(1.5).is_err());
/// ```
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, Into)
)]
pub struct Probability(f64);

/// Which failures to inject and how often.
#[derive(Debug, Clone, Default)]
pub struct ChaosConfig {
    deterministic_seed: Option<u64>,
    begin_failure: Option<Probability>,
    lock_timeout: Option<Probability>,
    commit_failure: Option<Probability>,
}

impl ChaosConfig {
    /// A configuration whose random decisions are reproducible.
    pub fn deterministic() -> Self {
        Self {
            deterministic_seed: Some(0),
            ..Self::default()
        }
    }

    /// Fail `begin` as if the connection pool were exhausted.
    #[must_use]
    pub const fn with_begin_failure(mut self, probability: Probability) -> Self {
        self.begin_failure = Some(probability);
        self
    }

    /// Fail `lock_for_update` as if the lock wait timed out.
    #[must_use]
    pub const fn with_lock_timeout(mut self, probability: Probability) -> Self {
        self.lock_timeout = Some(probability);
        self
    }

    /// Fail `commit` with a serialization conflict. The wrapped transaction
    /// is rolled back first, so nothing it did becomes visible.
    #[must_use]
    pub const fn with_commit_failure(mut self, probability: Probability) -> Self {
        self.commit_failure = Some(probability);
        self
    }
}

#[derive(Debug)]
struct ChaosState {
    config: ChaosConfig,
    rng: Mutex<StdRng>,
    forced_commit_failures: AtomicU32,
    injected: AtomicU64,
}

impl ChaosState {
    fn should_inject(&self, probability: Option<Probability>) -> bool {
        let Some(probability) = probability else {
            return false;
        };
        let p: f64 = probability.into();
        let inject = if p <= 0.0 {
            false
        } else if p >= 1.0 {
            true
        } else {
            self.rng.lock().random_bool(p)
        };
        if inject {
            self.injected.fetch_add(1, Ordering::Relaxed);
        }
        inject
    }

    fn should_fail_commit(&self) -> bool {
        let forced = self
            .forced_commit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            self.injected.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        self.should_inject(self.config.commit_failure)
    }
}

/// Extension trait for wrapping a store in a [`ChaosStore`].
pub trait ChaosStoreExt: Sized {
    /// Wraps `self` with the given fault configuration.
    fn with_chaos(self, config: ChaosConfig) -> ChaosStore<Self>;
}

impl<S: RegistrationStore> ChaosStoreExt for S {
    fn with_chaos(self, config: ChaosConfig) -> ChaosStore<Self> {
        ChaosStore::new(self, config)
    }
}

/// A store wrapper that injects transient failures.
///
/// Clones share the fault state, including the counter returned by
/// [`injected_faults`](Self::injected_faults).
#[derive(Debug, Clone)]
pub struct ChaosStore<S> {
    store: S,
    state: Arc<ChaosState>,
}

impl<S> ChaosStore<S> {
    /// Wraps `store`.
    pub fn new(store: S, config: ChaosConfig) -> Self {
        let seed = config.deterministic_seed.unwrap_or_else(random);
        Self {
            store,
            state: Arc::new(ChaosState {
                config,
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
                forced_commit_failures: AtomicU32::new(0),
                injected: AtomicU64::new(0),
            }),
        }
    }

    /// Makes the next `count` commits fail regardless of the configured
    /// probability.
    pub fn fail_next_commits(&self, count: u32) {
        self.state
            .forced_commit_failures
            .store(count, Ordering::SeqCst);
    }

    /// Number of failures injected so far.
    pub fn injected_faults(&self) -> u64 {
        self.state.injected.load(Ordering::Relaxed)
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.store
    }
}

/// Transaction handle of a [`ChaosStore`].
#[derive(Debug)]
pub struct ChaosTransaction<T> {
    inner: T,
    state: Arc<ChaosState>,
}

impl<T: RegistrationTransaction> SeatLedger for ChaosTransaction<T> {
    async fn lock_for_update(&mut self, event_id: EventId) -> LedgerResult<LockedEvent> {
        if self.state.should_inject(self.state.config.lock_timeout) {
            debug!(%event_id, "[chaos.lock_timeout]");
            return Err(StoreError::LockTimeout {
                operation: Operation::LockEvent,
            }
            .into());
        }
        self.inner.lock_for_update(event_id).await
    }

    async fn reserve(&mut self, event_id: EventId) -> LedgerResult<()> {
        self.inner.reserve(event_id).await
    }

    async fn release(&mut self, event_id: EventId) -> LedgerResult<()> {
        self.inner.release(event_id).await
    }
}

impl<T: RegistrationTransaction> RegistrationTransaction for ChaosTransaction<T> {
    async fn find_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreResult<Option<Registration>> {
        self.inner.find_registration(user_id, event_id).await
    }

    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> StoreResult<InsertOutcome> {
        self.inner.insert_registration(registration).await
    }

    async fn delete_registration(&mut self, user_id: UserId, event_id: EventId) -> StoreResult<bool> {
        self.inner.delete_registration(user_id, event_id).await
    }

    async fn commit(self) -> StoreResult<()> {
        if self.state.should_fail_commit() {
            debug!("[chaos.commit_failure]");
            self.inner.rollback().await?;
            return Err(StoreError::SerializationConflict {
                operation: Operation::CommitTransaction,
            });
        }
        self.inner.commit().await
    }

    async fn rollback(self) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

impl<S: RegistrationStore> RegistrationStore for ChaosStore<S> {
    type Transaction = ChaosTransaction<S::Transaction>;

    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
        self.store.user_exists(user_id).await
    }

    async fn begin(&self) -> StoreResult<Self::Transaction> {
        if self.state.should_inject(self.state.config.begin_failure) {
            debug!("[chaos.begin_failure]");
            return Err(StoreError::Unavailable {
                operation: Operation::BeginTransaction,
                detail: "injected connection failure".to_string(),
            });
        }
        Ok(ChaosTransaction {
            inner: self.store.begin().await?,
            state: Arc::clone(&self.state),
        })
    }
}

impl<S: CatalogStore> CatalogStore for ChaosStore<S> {
    async fn create_user(&self, new_user: NewUser) -> CatalogResult<User> {
        self.store.create_user(new_user).await
    }

    async fn get_user(&self, user_id: UserId) -> CatalogResult<User> {
        self.store.get_user(user_id).await
    }

    async fn list_users(&self) -> CatalogResult<Vec<User>> {
        self.store.list_users().await
    }

    async fn delete_user(&self, user_id: UserId) -> CatalogResult<()> {
        self.store.delete_user(user_id).await
    }

    async fn create_event(&self, new_event: NewEvent) -> CatalogResult<Event> {
        self.store.create_event(new_event).await
    }

    async fn get_event(&self, event_id: EventId) -> CatalogResult<Event> {
        self.store.get_event(event_id).await
    }

    async fn list_events(&self) -> CatalogResult<Vec<Event>> {
        self.store.list_events().await
    }

    async fn list_events_by_organizer(&self, organizer_id: UserId) -> CatalogResult<Vec<Event>> {
        self.store.list_events_by_organizer(organizer_id).await
    }

    async fn update_event_title(&self, event_id: EventId, title: EventTitle) -> CatalogResult<Event> {
        self.store.update_event_title(event_id, title).await
    }

    async fn delete_event(&self, event_id: EventId) -> CatalogResult<()> {
        self.store.delete_event(event_id).await
    }

    async fn get_registration(&self, registration_id: RegistrationId) -> CatalogResult<Registration> {
        self.store.get_registration(registration_id).await
    }

    async fn list_registrations_by_user(&self, user_id: UserId) -> CatalogResult<Vec<Registration>> {
        self.store.list_registrations_by_user(user_id).await
    }

    async fn list_registrations_by_event(
        &self,
        event_id: EventId,
    ) -> CatalogResult<Vec<Registration>> {
        self.store.list_registrations_by_event(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_config_sets_seed() {
        assert!(ChaosConfig::default().deterministic_seed.is_none());
        assert_eq!(ChaosConfig::deterministic().deterministic_seed, Some(0));
    }

    #[test]
    fn probability_rejects_values_outside_unit_interval() {
        assert!(Probability::try_new(-0.1).is_err());
        assert!(Probability::try_new(1.5).is_err());
        assert!(Probability::try_new(f64::NAN).is_err());
        assert!(Probability::try_new(0.25).is_ok());
    }

    #[test]
    fn unset_and_zero_probabilities_never_inject() {
        let state = ChaosStore::new((), ChaosConfig::deterministic()).state;
        assert!(!state.should_inject(None));
        assert!(!state.should_inject(Some(Probability::try_new(0.0).unwrap())));
        assert_eq!(state.injected.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn forced_commit_failures_are_consumed_one_at_a_time() {
        let chaos = ChaosStore::new((), ChaosConfig::deterministic());
        chaos.fail_next_commits(2);

        assert!(chaos.state.should_fail_commit());
        assert!(chaos.state.should_fail_commit());
        assert!(!chaos.state.should_fail_commit());
        assert_eq!(chaos.injected_faults(), 2);
    }
}
