//! In-memory backend for `seatlock`
//!
//! This crate implements the seatlock storage traits on plain in-process
//! maps. It gives the same observable guarantees as the PostgreSQL backend,
//! which makes it suitable for tests, demos and single-process deployments
//! where durability is not required:
//!
//! - every event row has a FIFO lock; a transaction that writes to an event
//!   (or to one of its registrations) holds that lock until it commits or
//!   rolls back
//! - lock waits are bounded by [`MemoryConfig::lock_timeout`] and fail with
//!   a transient [`StoreError::LockTimeout`]
//! - writes are buffered in the transaction and applied atomically at commit;
//!   other transactions only ever see committed state
//! - at most one registration exists per (user, event) pair

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use seatlock::{
    CatalogError, CatalogResult, CatalogStore, Event, EventId, EventTitle, InsertOutcome,
    LedgerError, LedgerResult, LockedEvent, NewEvent, NewUser, Operation, Registration,
    RegistrationId, RegistrationStore, RegistrationTransaction, SeatLedger, StoreError,
    StoreResult, User, UserId,
};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::{debug, warn};

const SEATS_CHECK: &str = "events_available_seats_check";
const USER_FK: &str = "registrations_user_id_fkey";
const EVENT_FK: &str = "registrations_event_id_fkey";
const USER_EVENT_KEY: &str = "registrations_user_event_key";

/// Configuration for [`InMemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Longest time a transaction waits for an event row lock.
    pub lock_timeout: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    events: HashMap<EventId, Event>,
    registrations: HashMap<RegistrationId, Registration>,
    /// Unique index over (user, event).
    by_pair: HashMap<(UserId, EventId), RegistrationId>,
}

impl Tables {
    fn registration_for(&self, user_id: UserId, event_id: EventId) -> Option<&Registration> {
        self.by_pair
            .get(&(user_id, event_id))
            .and_then(|id| self.registrations.get(id))
    }

    fn insert_registration(&mut self, registration: Registration) {
        self.by_pair
            .insert((registration.user_id, registration.event_id), registration.id);
        self.registrations.insert(registration.id, registration);
    }

    fn remove_registration(&mut self, registration_id: RegistrationId) {
        if let Some(registration) = self.registrations.remove(&registration_id) {
            self.by_pair
                .remove(&(registration.user_id, registration.event_id));
        }
    }

    fn remove_event(&mut self, event_id: EventId) -> bool {
        self.registrations.retain(|_, r| r.event_id != event_id);
        self.by_pair.retain(|&(_, pair_event), _| pair_event != event_id);
        self.events.remove(&event_id).is_some()
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<EventId, Arc<RowLock<()>>>>,
}

impl Shared {
    fn row_lock(&self, event_id: EventId) -> Arc<RowLock<()>> {
        Arc::clone(self.row_locks.lock().entry(event_id).or_default())
    }

    fn forget_row_lock(&self, event_id: EventId) {
        self.row_locks.lock().remove(&event_id);
    }

    fn event_exists(&self, event_id: EventId) -> bool {
        self.tables.read().events.contains_key(&event_id)
    }

    async fn lock_row(
        &self,
        event_id: EventId,
        timeout: Duration,
        operation: Operation,
    ) -> StoreResult<OwnedMutexGuard<()>> {
        let lock = self.row_lock(event_id);
        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                warn!(%event_id, %operation, ?timeout, "[memory.lock_timeout]");
                StoreError::LockTimeout { operation }
            })
    }
}

/// Thread-safe in-memory store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
    config: MemoryConfig,
}

impl InMemoryStore {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given configuration.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            shared: Arc::default(),
            config,
        }
    }

    /// The active configuration.
    pub const fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

/// Open transaction on an [`InMemoryStore`].
///
/// Dropping the transaction discards its writes and releases its row locks.
#[derive(Debug)]
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    held: HashMap<EventId, OwnedMutexGuard<()>>,
    seat_deltas: HashMap<EventId, i32>,
    inserted: Vec<Registration>,
    deleted: Vec<RegistrationId>,
}

impl InMemoryTransaction {
    fn new(shared: Arc<Shared>, lock_timeout: Duration) -> Self {
        Self {
            shared,
            lock_timeout,
            held: HashMap::new(),
            seat_deltas: HashMap::new(),
            inserted: Vec::new(),
            deleted: Vec::new(),
        }
    }

    async fn hold(&mut self, event_id: EventId, operation: Operation) -> StoreResult<()> {
        if self.held.contains_key(&event_id) {
            return Ok(());
        }
        let guard = self
            .shared
            .lock_row(event_id, self.lock_timeout, operation)
            .await?;
        self.held.insert(event_id, guard);
        Ok(())
    }

    /// Ledger row as this transaction sees it: committed count plus own
    /// pending reserves and releases.
    fn ledger_row(&self, event_id: EventId) -> Option<LockedEvent> {
        let tables = self.shared.tables.read();
        let event = tables.events.get(&event_id)?;
        let delta = self.seat_deltas.get(&event_id).copied().unwrap_or_default();
        Some(LockedEvent {
            event_id,
            capacity: event.capacity,
            available_seats: event.available_seats + delta,
        })
    }

    fn visible_registration(&self, user_id: UserId, event_id: EventId) -> Option<Registration> {
        if let Some(own) = self
            .inserted
            .iter()
            .find(|r| r.user_id == user_id && r.event_id == event_id)
        {
            return Some(own.clone());
        }
        let tables = self.shared.tables.read();
        tables
            .registration_for(user_id, event_id)
            .filter(|r| !self.deleted.contains(&r.id))
            .cloned()
    }

    /// Locks the event row for a ledger write, failing early for unknown
    /// events so no lock is created for them.
    async fn hold_existing(&mut self, event_id: EventId, operation: Operation) -> LedgerResult<()> {
        if self.hold_live(event_id, operation).await? {
            Ok(())
        } else {
            Err(LedgerError::EventNotFound(event_id))
        }
    }

    /// Locks the event row and reports whether the event still exists once
    /// the lock is held. An event deleted while this transaction waited has
    /// its lock entry dropped again.
    async fn hold_live(&mut self, event_id: EventId, operation: Operation) -> StoreResult<bool> {
        if !self.shared.event_exists(event_id) {
            return Ok(false);
        }
        self.hold(event_id, operation).await?;
        if self.shared.event_exists(event_id) {
            return Ok(true);
        }
        self.held.remove(&event_id);
        self.shared.forget_row_lock(event_id);
        Ok(false)
    }
}

impl SeatLedger for InMemoryTransaction {
    async fn lock_for_update(&mut self, event_id: EventId) -> LedgerResult<LockedEvent> {
        self.hold_existing(event_id, Operation::LockEvent).await?;
        self.ledger_row(event_id)
            .ok_or(LedgerError::EventNotFound(event_id))
    }

    async fn reserve(&mut self, event_id: EventId) -> LedgerResult<()> {
        self.hold_existing(event_id, Operation::ReserveSeat).await?;
        let row = self
            .ledger_row(event_id)
            .ok_or(LedgerError::EventNotFound(event_id))?;
        if row.available_seats <= 0 {
            return Err(LedgerError::SeatsExhausted(event_id));
        }
        *self.seat_deltas.entry(event_id).or_default() -= 1;
        Ok(())
    }

    async fn release(&mut self, event_id: EventId) -> LedgerResult<()> {
        self.hold_existing(event_id, Operation::ReleaseSeat).await?;
        let row = self
            .ledger_row(event_id)
            .ok_or(LedgerError::EventNotFound(event_id))?;
        if row.available_seats >= i32::from(row.capacity) {
            return Err(StoreError::CheckViolation {
                constraint: SEATS_CHECK.to_string(),
            }
            .into());
        }
        *self.seat_deltas.entry(event_id).or_default() += 1;
        Ok(())
    }
}

impl RegistrationTransaction for InMemoryTransaction {
    async fn find_registration(
        &mut self,
        user_id: UserId,
        event_id: EventId,
    ) -> StoreResult<Option<Registration>> {
        Ok(self.visible_registration(user_id, event_id))
    }

    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> StoreResult<InsertOutcome> {
        let (user_id, event_id) = (registration.user_id, registration.event_id);
        if !self.hold_live(event_id, Operation::InsertRegistration).await? {
            return Err(StoreError::ForeignKeyViolation {
                constraint: EVENT_FK.to_string(),
            });
        }

        if self.visible_registration(user_id, event_id).is_some() {
            return Ok(InsertOutcome::Conflict);
        }
        if !self.shared.tables.read().users.contains_key(&user_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: USER_FK.to_string(),
            });
        }

        self.inserted.push(registration.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn delete_registration(&mut self, user_id: UserId, event_id: EventId) -> StoreResult<bool> {
        if !self.hold_live(event_id, Operation::DeleteRegistration).await? {
            return Ok(false);
        }

        if let Some(position) = self
            .inserted
            .iter()
            .position(|r| r.user_id == user_id && r.event_id == event_id)
        {
            self.inserted.swap_remove(position);
            return Ok(true);
        }

        match self.visible_registration(user_id, event_id) {
            Some(registration) => {
                self.deleted.push(registration.id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn commit(self) -> StoreResult<()> {
        let Self {
            shared,
            held,
            seat_deltas,
            inserted,
            deleted,
            ..
        } = self;

        // Applied under the table lock and before the row locks in `held` are
        // released, so the next lock holder sees the new counts.
        let mut tables = shared.tables.write();

        if let Some(orphan) = inserted
            .iter()
            .find(|r| !tables.users.contains_key(&r.user_id))
        {
            warn!(user_id = %orphan.user_id, "[memory.commit_rejected] user no longer exists");
            return Err(StoreError::ForeignKeyViolation {
                constraint: USER_FK.to_string(),
            });
        }

        if let Some(duplicate) = inserted.iter().find(|r| {
            tables
                .by_pair
                .get(&(r.user_id, r.event_id))
                .is_some_and(|existing| !deleted.contains(existing))
        }) {
            warn!(
                user_id = %duplicate.user_id,
                event_id = %duplicate.event_id,
                "[memory.commit_rejected] pair already registered"
            );
            return Err(StoreError::UniqueViolation {
                constraint: USER_EVENT_KEY.to_string(),
            });
        }

        for (event_id, delta) in &seat_deltas {
            if let Some(event) = tables.events.get_mut(event_id) {
                event.available_seats += delta;
            }
        }
        for id in &deleted {
            tables.remove_registration(*id);
        }
        for registration in inserted {
            tables.insert_registration(registration);
        }
        drop(tables);

        debug!(locked_events = held.len(), "[memory.commit]");
        drop(held);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        debug!(locked_events = self.held.len(), "[memory.rollback]");
        Ok(())
    }
}

impl RegistrationStore for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool> {
        Ok(self.shared.tables.read().users.contains_key(&user_id))
    }

    async fn begin(&self) -> StoreResult<InMemoryTransaction> {
        Ok(InMemoryTransaction::new(
            Arc::clone(&self.shared),
            self.config.lock_timeout,
        ))
    }
}

impl CatalogStore for InMemoryStore {
    async fn create_user(&self, new_user: NewUser) -> CatalogResult<User> {
        let mut tables = self.shared.tables.write();
        if tables.users.values().any(|u| u.email == new_user.email) {
            return Err(CatalogError::DuplicateEmail(new_user.email));
        }
        let user = User {
            id: UserId::generate(),
            name: new_user.name,
            email: new_user.email,
            role: new_user.role,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> CatalogResult<User> {
        self.shared
            .tables
            .read()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(CatalogError::UserNotFound(user_id))
    }

    async fn list_users(&self) -> CatalogResult<Vec<User>> {
        let mut users: Vec<User> = self.shared.tables.read().users.values().cloned().collect();
        users.sort_by_key(|u| (u.created_at, u.id));
        Ok(users)
    }

    async fn delete_user(&self, user_id: UserId) -> CatalogResult<()> {
        let mut tables = self.shared.tables.write();
        if !tables.users.contains_key(&user_id) {
            return Err(CatalogError::UserNotFound(user_id));
        }
        if tables.events.values().any(|e| e.organizer_id == user_id) {
            return Err(CatalogError::UserOrganizesEvents(user_id));
        }
        if tables.registrations.values().any(|r| r.user_id == user_id) {
            return Err(CatalogError::UserHasRegistrations(user_id));
        }
        tables.users.remove(&user_id);
        Ok(())
    }

    async fn create_event(&self, new_event: NewEvent) -> CatalogResult<Event> {
        let mut tables = self.shared.tables.write();
        if !tables.users.contains_key(&new_event.organizer_id) {
            return Err(CatalogError::OrganizerNotFound(new_event.organizer_id));
        }
        let event = Event {
            id: EventId::generate(),
            title: new_event.title,
            capacity: new_event.capacity,
            available_seats: new_event.capacity.into(),
            organizer_id: new_event.organizer_id,
            created_at: Utc::now(),
        };
        tables.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_event(&self, event_id: EventId) -> CatalogResult<Event> {
        self.shared
            .tables
            .read()
            .events
            .get(&event_id)
            .cloned()
            .ok_or(CatalogError::EventNotFound(event_id))
    }

    async fn list_events(&self) -> CatalogResult<Vec<Event>> {
        let mut events: Vec<Event> = self.shared.tables.read().events.values().cloned().collect();
        events.sort_by_key(|e| (e.created_at, e.id));
        Ok(events)
    }

    async fn list_events_by_organizer(&self, organizer_id: UserId) -> CatalogResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .shared
            .tables
            .read()
            .events
            .values()
            .filter(|e| e.organizer_id == organizer_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.created_at, e.id));
        Ok(events)
    }

    async fn update_event_title(&self, event_id: EventId, title: EventTitle) -> CatalogResult<Event> {
        let mut tables = self.shared.tables.write();
        let event = tables
            .events
            .get_mut(&event_id)
            .ok_or(CatalogError::EventNotFound(event_id))?;
        event.title = title;
        Ok(event.clone())
    }

    async fn delete_event(&self, event_id: EventId) -> CatalogResult<()> {
        if !self.shared.event_exists(event_id) {
            return Err(CatalogError::EventNotFound(event_id));
        }
        let guard = self
            .shared
            .lock_row(event_id, self.config.lock_timeout, Operation::DeleteEvent)
            .await?;

        let removed = self.shared.tables.write().remove_event(event_id);
        drop(guard);
        self.shared.forget_row_lock(event_id);

        if !removed {
            return Err(CatalogError::EventNotFound(event_id));
        }
        Ok(())
    }

    async fn get_registration(&self, registration_id: RegistrationId) -> CatalogResult<Registration> {
        self.shared
            .tables
            .read()
            .registrations
            .get(&registration_id)
            .cloned()
            .ok_or(CatalogError::RegistrationNotFound)
    }

    async fn list_registrations_by_user(&self, user_id: UserId) -> CatalogResult<Vec<Registration>> {
        let mut registrations: Vec<Registration> = self
            .shared
            .tables
            .read()
            .registrations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        registrations.sort_by_key(|r| (r.created_at, r.id));
        Ok(registrations)
    }

    async fn list_registrations_by_event(
        &self,
        event_id: EventId,
    ) -> CatalogResult<Vec<Registration>> {
        let mut registrations: Vec<Registration> = self
            .shared
            .tables
            .read()
            .registrations
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        registrations.sort_by_key(|r| (r.created_at, r.id));
        Ok(registrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatlock::{Capacity, Email, UserName, UserRole};

    async fn user(store: &InMemoryStore, email: &str) -> User {
        store
            .create_user(NewUser {
                name: UserName::try_new("Test User").unwrap(),
                email: Email::try_new(email).unwrap(),
                role: UserRole::Attendee,
            })
            .await
            .unwrap()
    }

    async fn event(store: &InMemoryStore, organizer: UserId, capacity: i32) -> Event {
        store
            .create_event(NewEvent {
                title: EventTitle::try_new("Meetup").unwrap(),
                capacity: Capacity::try_new(capacity).unwrap(),
                organizer_id: organizer,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible_to_other_transactions() {
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        let attendee = user(&store, "a@example.com").await;
        let event = event(&store, organizer.id, 2).await;

        let mut tx = store.begin().await.unwrap();
        tx.lock_for_update(event.id).await.unwrap();
        tx.insert_registration(&Registration::new(attendee.id, event.id))
            .await
            .unwrap();
        tx.reserve(event.id).await.unwrap();

        let mut other = store.begin().await.unwrap();
        assert!(other
            .find_registration(attendee.id, event.id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.get_event(event.id).await.unwrap().available_seats, 2);

        tx.commit().await.unwrap();
        assert_eq!(store.get_event(event.id).await.unwrap().available_seats, 1);
        assert!(other
            .find_registration(attendee.id, event.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes_and_releases_the_lock() {
        let store = InMemoryStore::with_config(MemoryConfig {
            lock_timeout: Duration::from_millis(50),
        });
        let organizer = user(&store, "org@example.com").await;
        let event = event(&store, organizer.id, 1).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.reserve(event.id).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        let locked = tx.lock_for_update(event.id).await.unwrap();
        assert_eq!(locked.available_seats, 1);
    }

    #[tokio::test]
    async fn second_locker_times_out_while_the_row_is_held() {
        let store = InMemoryStore::with_config(MemoryConfig {
            lock_timeout: Duration::from_millis(20),
        });
        let organizer = user(&store, "org@example.com").await;
        let event = event(&store, organizer.id, 1).await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_for_update(event.id).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let result = waiter.lock_for_update(event.id).await;

        assert_eq!(
            result,
            Err(LedgerError::Store(StoreError::LockTimeout {
                operation: Operation::LockEvent
            }))
        );
        holder.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn reserve_never_goes_below_zero() {
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        let event = event(&store, organizer.id, 1).await;

        let mut tx = store.begin().await.unwrap();
        tx.reserve(event.id).await.unwrap();
        assert_eq!(
            tx.reserve(event.id).await,
            Err(LedgerError::SeatsExhausted(event.id))
        );
    }

    #[tokio::test]
    async fn release_is_bounded_by_capacity() {
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        let event = event(&store, organizer.id, 3).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx.release(event.id).await;
        assert!(matches!(
            result,
            Err(LedgerError::Store(StoreError::CheckViolation { .. }))
        ));
    }

    #[tokio::test]
    async fn insert_for_missing_user_is_a_foreign_key_violation() {
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        let event = event(&store, organizer.id, 3).await;

        let mut tx = store.begin().await.unwrap();
        let result = tx
            .insert_registration(&Registration::new(UserId::generate(), event.id))
            .await;
        assert!(matches!(
            result,
            Err(StoreError::ForeignKeyViolation { .. })
        ));
    }

    #[tokio::test]
    async fn commit_fails_when_the_user_was_deleted_meanwhile() {
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        let attendee = user(&store, "a@example.com").await;
        let event = event(&store, organizer.id, 3).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_registration(&Registration::new(attendee.id, event.id))
            .await
            .unwrap();
        tx.reserve(event.id).await.unwrap();

        store.delete_user(attendee.id).await.unwrap();

        assert!(tx.commit().await.is_err());
        assert_eq!(store.get_event(event.id).await.unwrap().available_seats, 3);
    }

    #[tokio::test]
    async fn delete_event_removes_its_registrations() {
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        let attendee = user(&store, "a@example.com").await;
        let event = event(&store, organizer.id, 3).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_registration(&Registration::new(attendee.id, event.id))
            .await
            .unwrap();
        tx.reserve(event.id).await.unwrap();
        tx.commit().await.unwrap();

        store.delete_event(event.id).await.unwrap();

        assert!(store
            .list_registrations_by_user(attendee.id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store.get_event(event.id).await,
            Err(CatalogError::EventNotFound(event.id))
        );
        store.delete_user(attendee.id).await.unwrap();
    }

    #[tokio::test]
    async fn commit_refuses_a_pair_that_is_already_registered() {
        // Given: a transaction with a pending registration for a pair
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        let attendee = user(&store, "a@example.com").await;
        let event = event(&store, organizer.id, 3).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_registration(&Registration::new(attendee.id, event.id))
            .await
            .unwrap();
        tx.reserve(event.id).await.unwrap();

        // And: a row for the same pair lands without going through the row lock
        let sneaked = Registration::new(attendee.id, event.id);
        store.shared.tables.write().insert_registration(sneaked.clone());

        // When: the transaction commits
        let result = tx.commit().await;

        // Then: the unique index rejects it and nothing is applied
        assert_eq!(
            result,
            Err(StoreError::UniqueViolation {
                constraint: USER_EVENT_KEY.to_string()
            })
        );
        assert_eq!(store.get_event(event.id).await.unwrap().available_seats, 3);
        assert_eq!(
            store.list_registrations_by_event(event.id).await.unwrap(),
            vec![sneaked]
        );
    }

    #[tokio::test]
    async fn pair_index_follows_cancellation_and_event_deletion() {
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        let attendee = user(&store, "a@example.com").await;
        let event = event(&store, organizer.id, 3).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_registration(&Registration::new(attendee.id, event.id))
            .await
            .unwrap();
        tx.reserve(event.id).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.delete_registration(attendee.id, event.id).await.unwrap());
        tx.release(event.id).await.unwrap();
        tx.commit().await.unwrap();
        assert!(store.shared.tables.read().by_pair.is_empty());

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.insert_registration(&Registration::new(attendee.id, event.id))
                .await
                .unwrap(),
            InsertOutcome::Inserted
        );
        tx.reserve(event.id).await.unwrap();
        tx.commit().await.unwrap();

        store.delete_event(event.id).await.unwrap();
        assert!(store.shared.tables.read().by_pair.is_empty());
    }

    #[tokio::test]
    async fn waiter_on_a_deleted_event_drops_its_row_lock() {
        // Given: a transaction holding the event row lock
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        let attendee = user(&store, "a@example.com").await;
        let event = event(&store, organizer.id, 3).await;

        let mut holder = store.begin().await.unwrap();
        holder.lock_for_update(event.id).await.unwrap();

        // And: a deletion queued behind it, then a registration queued behind that
        let deleter = store.clone();
        let deletion = tokio::spawn(async move { deleter.delete_event(event.id).await });
        tokio::task::yield_now().await;

        let mut waiter = store.begin().await.unwrap();
        let queued = tokio::spawn(async move {
            let locked = waiter.lock_for_update(event.id).await;
            let inserted = waiter
                .insert_registration(&Registration::new(attendee.id, event.id))
                .await;
            (locked, inserted)
        });
        tokio::task::yield_now().await;

        // When: the holder lets go
        holder.rollback().await.unwrap();

        // Then: the deletion wins, the waiter sees the event gone, and no lock
        // entry survives
        deletion.await.unwrap().unwrap();
        let (locked, inserted) = queued.await.unwrap();
        assert_eq!(locked, Err(LedgerError::EventNotFound(event.id)));
        assert!(matches!(
            inserted,
            Err(StoreError::ForeignKeyViolation { .. })
        ));
        assert!(!store.shared.row_locks.lock().contains_key(&event.id));
    }

    #[tokio::test]
    async fn organizer_with_events_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let organizer = user(&store, "org@example.com").await;
        event(&store, organizer.id, 3).await;

        assert_eq!(
            store.delete_user(organizer.id).await,
            Err(CatalogError::UserOrganizesEvents(organizer.id))
        );
    }
}
