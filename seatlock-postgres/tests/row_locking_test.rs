//! Behavior that depends on PostgreSQL itself: row-lock timeouts, the
//! ledger check constraint and the frozen-capacity trigger.

mod common;

use std::time::Duration;

use seatlock::{
    Capacity, CatalogError, CatalogStore, Email, Event, EventTitle, LedgerError, NewEvent,
    NewUser, Operation, RegistrationCoordinator, RegistrationError, RegistrationStore,
    RegistrationTransaction, RetryPolicy, SeatLedger, StoreError, User, UserName, UserRole,
};
use seatlock_postgres::PostgresStore;
use uuid::Uuid;

async fn user(store: &PostgresStore, label: &str, role: UserRole) -> User {
    store
        .create_user(NewUser {
            name: UserName::try_new(label).unwrap(),
            email: Email::try_new(format!("{label}.{}@locking.test", Uuid::now_v7().simple()))
                .unwrap(),
            role,
        })
        .await
        .unwrap()
}

async fn event(store: &PostgresStore, organizer: &User, capacity: i32) -> Event {
    store
        .create_event(NewEvent {
            title: EventTitle::try_new("Locking test").unwrap(),
            capacity: Capacity::try_new(capacity).unwrap(),
            organizer_id: organizer.id,
        })
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
#[tracing_test::traced_test]
async fn held_row_lock_surfaces_as_transient_lock_timeout() {
    // Given: a store that waits at most 200ms for a row lock
    let store = common::store_with_lock_timeout(Duration::from_millis(200)).await;
    let organizer = user(&store, "organizer", UserRole::Organizer).await;
    let attendee = user(&store, "attendee", UserRole::Attendee).await;
    let event = event(&store, &organizer, 3).await;

    // And: another session holding the event row lock
    let mut holder = store.pool().begin().await.unwrap();
    sqlx::query("SELECT id FROM events WHERE id = $1 FOR UPDATE")
        .bind(event.id.into_inner())
        .execute(&mut *holder)
        .await
        .unwrap();

    // When: the attendee registers without retries
    let coordinator =
        RegistrationCoordinator::new(store.clone()).with_retry_policy(RetryPolicy::no_retry());
    let result = coordinator.register(attendee.id, event.id).await;

    // Then: the failure is transient and nothing was reserved
    assert_eq!(
        result,
        Err(RegistrationError::Transient(StoreError::LockTimeout {
            operation: Operation::LockEvent,
        }))
    );
    assert!(logs_contain("[postgres.lock_timeout]"));

    holder.rollback().await.unwrap();
    assert_eq!(store.get_event(event.id).await.unwrap().available_seats, 3);

    // And: once the lock is released the same request succeeds
    coordinator.register(attendee.id, event.id).await.unwrap();
    assert_eq!(store.get_event(event.id).await.unwrap().available_seats, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn retries_outlast_a_briefly_held_row_lock() {
    // Given: a short lock timeout and a holder that lets go after 300ms
    let store = common::store_with_lock_timeout(Duration::from_millis(100)).await;
    let organizer = user(&store, "organizer", UserRole::Organizer).await;
    let attendee = user(&store, "attendee", UserRole::Attendee).await;
    let event = event(&store, &organizer, 1).await;

    let mut holder = store.pool().begin().await.unwrap();
    sqlx::query("SELECT id FROM events WHERE id = $1 FOR UPDATE")
        .bind(event.id.into_inner())
        .execute(&mut *holder)
        .await
        .unwrap();
    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        holder.rollback().await.unwrap();
    });

    // When: registering with a generous retry budget
    let coordinator = RegistrationCoordinator::new(store.clone())
        .with_retry_policy(RetryPolicy::default().with_max_attempts(10));
    let registration = coordinator.register(attendee.id, event.id).await;
    release.await.unwrap();

    // Then: the registration eventually commits exactly one seat
    let registration = registration.unwrap();
    assert_eq!(registration.event_id, event.id);
    assert_eq!(store.get_event(event.id).await.unwrap().available_seats, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn check_constraint_refuses_release_beyond_capacity() {
    // Given: an event with every seat free
    let store = common::store().await;
    let organizer = user(&store, "organizer", UserRole::Organizer).await;
    let event = event(&store, &organizer, 2).await;

    // When: a transaction tries to release a seat nobody holds
    let mut tx = store.begin().await.unwrap();
    tx.lock_for_update(event.id).await.unwrap();
    let result = tx.release(event.id).await;
    tx.rollback().await.unwrap();

    // Then: the database refuses and the ledger is untouched
    assert_eq!(
        result,
        Err(LedgerError::Store(StoreError::CheckViolation {
            constraint: "events_available_seats_check".to_string(),
        }))
    );
    assert_eq!(store.get_event(event.id).await.unwrap().available_seats, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn reserve_distinguishes_exhausted_from_missing_events() {
    // Given: an event whose only seat is taken inside a transaction
    let store = common::store().await;
    let organizer = user(&store, "organizer", UserRole::Organizer).await;
    let event = event(&store, &organizer, 1).await;
    let mut tx = store.begin().await.unwrap();
    let locked = tx.lock_for_update(event.id).await.unwrap();
    assert!(locked.has_free_seat());
    tx.reserve(event.id).await.unwrap();

    // When: reserving again, and reserving on an event that does not exist
    let exhausted = tx.reserve(event.id).await;
    let missing_id = seatlock::EventId::generate();
    let missing = tx.reserve(missing_id).await;
    tx.rollback().await.unwrap();

    // Then: each failure names its cause
    assert_eq!(exhausted, Err(LedgerError::SeatsExhausted(event.id)));
    assert_eq!(missing, Err(LedgerError::EventNotFound(missing_id)));
    assert_eq!(store.get_event(event.id).await.unwrap().available_seats, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn capacity_cannot_be_changed_after_creation() {
    // Given: an existing event
    let store = common::store().await;
    let organizer = user(&store, "organizer", UserRole::Organizer).await;
    let event = event(&store, &organizer, 5).await;

    // When: something updates the capacity column directly
    let error = sqlx::query("UPDATE events SET capacity = 50, available_seats = 50 WHERE id = $1")
        .bind(event.id.into_inner())
        .execute(store.pool())
        .await
        .unwrap_err();

    // Then: the trigger raises a check violation
    let database_error = error.as_database_error().unwrap();
    assert_eq!(database_error.code().as_deref(), Some("23514"));
    assert_eq!(store.get_event(event.id).await.unwrap().capacity, event.capacity);
}

#[tokio::test(flavor = "multi_thread")]
async fn organizer_with_events_cannot_be_deleted() {
    // Given: an organizer who published an event
    let store = common::store().await;
    let organizer = user(&store, "organizer", UserRole::Organizer).await;
    let event = event(&store, &organizer, 5).await;

    // When / Then: deleting the organizer is refused until the event is gone
    assert_eq!(
        store.delete_user(organizer.id).await,
        Err(CatalogError::UserOrganizesEvents(organizer.id))
    );
    store.delete_event(event.id).await.unwrap();
    store.delete_user(organizer.id).await.unwrap();
    assert_eq!(
        store.get_user(organizer.id).await,
        Err(CatalogError::UserNotFound(organizer.id))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn migrations_can_be_applied_twice() {
    // Given: a store whose schema is already migrated
    let store = common::store().await;

    // When / Then: migrating again is a no-op
    store.migrate().await.unwrap();
    store.ping().await.unwrap();
}
