//! Protocol scenarios every seatlock backend must pass.
//!
//! Each scenario takes a store factory, seeds its own users and events with
//! unique emails, and checks the outcomes of the reservation protocol plus the
//! seat invariant `capacity - available_seats == live registrations`. The
//! scenarios never assume an empty store, so they can run in parallel against
//! one shared database.
//!
//! Use [`reservation_contract_tests!`](crate::reservation_contract_tests) to
//! generate one `#[tokio::test]` per scenario.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use seatlock::{
    CancelOutcome, Capacity, CatalogError, CatalogStore, Email, Event, EventId, EventTitle,
    NewEvent, NewUser, RegistrationCoordinator, RegistrationError, RegistrationStore, User,
    UserId, UserName, UserRole,
};
use tokio::sync::Barrier;
use uuid::Uuid;

/// A scenario observed something a conforming backend must not do.
#[derive(Debug)]
pub struct ContractTestFailure {
    scenario: &'static str,
    detail: String,
}

impl ContractTestFailure {
    fn new(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scenario,
            detail: detail.into(),
        }
    }

    fn unexpected(scenario: &'static str, operation: &str, error: impl fmt::Display) -> Self {
        Self::new(
            scenario,
            format!("{operation} returned unexpected error: {error}"),
        )
    }
}

impl fmt::Display for ContractTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.detail)
    }
}

impl std::error::Error for ContractTestFailure {}

/// Outcome of a contract scenario.
pub type ContractTestResult = Result<(), ContractTestFailure>;

fn ensure(scenario: &'static str, condition: bool, detail: impl FnOnce() -> String) -> ContractTestResult {
    if condition {
        Ok(())
    } else {
        Err(ContractTestFailure::new(scenario, detail()))
    }
}

async fn seed_user<S: CatalogStore>(
    scenario: &'static str,
    store: &S,
    label: &str,
    role: UserRole,
) -> Result<User, ContractTestFailure> {
    let email = format!("{scenario}.{label}.{}@contract.test", Uuid::now_v7().simple());
    let new_user = NewUser {
        name: UserName::try_new(format!("{scenario} {label}"))
            .map_err(|error| ContractTestFailure::unexpected(scenario, "UserName::try_new", error))?,
        email: Email::try_new(email)
            .map_err(|error| ContractTestFailure::unexpected(scenario, "Email::try_new", error))?,
        role,
    };
    store
        .create_user(new_user)
        .await
        .map_err(|error| ContractTestFailure::unexpected(scenario, "create_user", error))
}

async fn seed_users<S: CatalogStore>(
    scenario: &'static str,
    store: &S,
    count: usize,
) -> Result<Vec<User>, ContractTestFailure> {
    let mut users = Vec::with_capacity(count);
    for index in 0..count {
        users.push(seed_user(scenario, store, &format!("attendee{index}"), UserRole::Attendee).await?);
    }
    Ok(users)
}

async fn seed_event<S: CatalogStore>(
    scenario: &'static str,
    store: &S,
    capacity: i32,
) -> Result<Event, ContractTestFailure> {
    let organizer = seed_user(scenario, store, "organizer", UserRole::Organizer).await?;
    let new_event = NewEvent {
        title: EventTitle::try_new(format!("{scenario} event"))
            .map_err(|error| ContractTestFailure::unexpected(scenario, "EventTitle::try_new", error))?,
        capacity: Capacity::try_new(capacity)
            .map_err(|error| ContractTestFailure::unexpected(scenario, "Capacity::try_new", error))?,
        organizer_id: organizer.id,
    };
    store
        .create_event(new_event)
        .await
        .map_err(|error| ContractTestFailure::unexpected(scenario, "create_event", error))
}

async fn available_seats<S: CatalogStore>(
    scenario: &'static str,
    store: &S,
    event_id: EventId,
) -> Result<i32, ContractTestFailure> {
    store
        .get_event(event_id)
        .await
        .map(|event| event.available_seats)
        .map_err(|error| ContractTestFailure::unexpected(scenario, "get_event", error))
}

/// Checks `capacity - available_seats == live registrations` for one event.
pub async fn assert_seat_invariant<S: CatalogStore>(
    scenario: &'static str,
    store: &S,
    event_id: EventId,
) -> ContractTestResult {
    let event = store
        .get_event(event_id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(scenario, "get_event", error))?;
    let live = store
        .list_registrations_by_event(event_id)
        .await
        .map_err(|error| {
            ContractTestFailure::unexpected(scenario, "list_registrations_by_event", error)
        })?
        .len();

    let registered = usize::try_from(event.registered_seats()).map_err(|_| {
        ContractTestFailure::new(
            scenario,
            format!("available_seats {} exceeds capacity", event.available_seats),
        )
    })?;
    ensure(scenario, registered == live, || {
        format!(
            "seat invariant broken: capacity {} - available {} != {live} live registrations",
            event.capacity, event.available_seats
        )
    })?;
    ensure(scenario, event.available_seats >= 0, || {
        format!("available_seats went negative: {}", event.available_seats)
    })
}

/// Registering twice yields one registration and takes one seat.
pub async fn test_duplicate_registration<F, Fut, S>(make_store: F) -> ContractTestResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = S>,
    S: RegistrationStore + CatalogStore,
{
    const SCENARIO: &str = "duplicate_registration";

    let store = make_store().await;
    let event = seed_event(SCENARIO, &store, 5).await?;
    let user = seed_user(SCENARIO, &store, "attendee", UserRole::Attendee).await?;
    let coordinator = RegistrationCoordinator::new(store);

    let registration = coordinator
        .register(user.id, event.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "first register", error))?;
    ensure(SCENARIO, registration.user_id == user.id, || {
        "registration belongs to another user".to_string()
    })?;

    match coordinator.register(user.id, event.id).await {
        Err(RegistrationError::AlreadyRegistered { .. }) => {}
        other => {
            return Err(ContractTestFailure::new(
                SCENARIO,
                format!("second register should be AlreadyRegistered, got {other:?}"),
            ))
        }
    }

    let seats = available_seats(SCENARIO, coordinator.store(), event.id).await?;
    ensure(SCENARIO, seats == 4, || {
        format!("expected one seat taken (4 left), found {seats}")
    })?;
    assert_seat_invariant(SCENARIO, coordinator.store(), event.id).await
}

/// More concurrent attempts than seats: exactly `capacity` succeed and the
/// rest see `EventFull`.
pub async fn test_concurrent_registrations_respect_capacity<F, Fut, S>(
    make_store: F,
) -> ContractTestResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = S>,
    S: RegistrationStore + CatalogStore + 'static,
{
    const SCENARIO: &str = "concurrent_registrations_respect_capacity";
    const CAPACITY: usize = 10;
    const ATTEMPTS: usize = 50;

    let store = make_store().await;
    let event = seed_event(SCENARIO, &store, 10).await?;
    let users = seed_users(SCENARIO, &store, ATTEMPTS).await?;
    let coordinator = Arc::new(RegistrationCoordinator::new(store));
    let barrier = Arc::new(Barrier::new(ATTEMPTS));

    let handles: Vec<_> = users
        .iter()
        .map(|user| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            let (user_id, event_id) = (user.id, event.id);
            tokio::spawn(async move {
                barrier.wait().await;
                coordinator.register(user_id, event_id).await
            })
        })
        .collect();

    let mut registered = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(_)) => registered += 1,
            Ok(Err(RegistrationError::EventFull(_))) => full += 1,
            Ok(Err(error)) => {
                return Err(ContractTestFailure::unexpected(SCENARIO, "register", error))
            }
            Err(join_error) => {
                return Err(ContractTestFailure::unexpected(SCENARIO, "join", join_error))
            }
        }
    }

    ensure(SCENARIO, registered == CAPACITY, || {
        format!("expected {CAPACITY} registrations, got {registered}")
    })?;
    ensure(SCENARIO, full == ATTEMPTS - CAPACITY, || {
        format!("expected {} EventFull, got {full}", ATTEMPTS - CAPACITY)
    })?;
    let seats = available_seats(SCENARIO, coordinator.store(), event.id).await?;
    ensure(SCENARIO, seats == 0, || format!("expected 0 seats left, found {seats}"))?;
    assert_seat_invariant(SCENARIO, coordinator.store(), event.id).await
}

/// The same pair registering concurrently takes exactly one seat.
pub async fn test_concurrent_duplicate_registrations<F, Fut, S>(make_store: F) -> ContractTestResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = S>,
    S: RegistrationStore + CatalogStore + 'static,
{
    const SCENARIO: &str = "concurrent_duplicate_registrations";
    const ATTEMPTS: usize = 10;

    let store = make_store().await;
    let event = seed_event(SCENARIO, &store, 5).await?;
    let user = seed_user(SCENARIO, &store, "attendee", UserRole::Attendee).await?;
    let coordinator = Arc::new(RegistrationCoordinator::new(store));
    let barrier = Arc::new(Barrier::new(ATTEMPTS));

    let handles: Vec<_> = (0..ATTEMPTS)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            let (user_id, event_id) = (user.id, event.id);
            tokio::spawn(async move {
                barrier.wait().await;
                coordinator.register(user_id, event_id).await
            })
        })
        .collect();

    let mut registered = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(_)) => registered += 1,
            Ok(Err(RegistrationError::AlreadyRegistered { .. })) => duplicates += 1,
            Ok(Err(error)) => {
                return Err(ContractTestFailure::unexpected(SCENARIO, "register", error))
            }
            Err(join_error) => {
                return Err(ContractTestFailure::unexpected(SCENARIO, "join", join_error))
            }
        }
    }

    ensure(SCENARIO, registered == 1 && duplicates == ATTEMPTS - 1, || {
        format!("expected 1 registration and {} duplicates, got {registered} and {duplicates}", ATTEMPTS - 1)
    })?;
    let seats = available_seats(SCENARIO, coordinator.store(), event.id).await?;
    ensure(SCENARIO, seats == 4, || format!("expected 4 seats left, found {seats}"))?;
    assert_seat_invariant(SCENARIO, coordinator.store(), event.id).await
}

/// Cancelling returns the seat and lets the user register again.
pub async fn test_cancel_then_register_again<F, Fut, S>(make_store: F) -> ContractTestResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = S>,
    S: RegistrationStore + CatalogStore,
{
    const SCENARIO: &str = "cancel_then_register_again";

    let store = make_store().await;
    let event = seed_event(SCENARIO, &store, 1).await?;
    let user = seed_user(SCENARIO, &store, "attendee", UserRole::Attendee).await?;
    let other = seed_user(SCENARIO, &store, "other", UserRole::Attendee).await?;
    let coordinator = RegistrationCoordinator::new(store);

    coordinator
        .register(user.id, event.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "register", error))?;

    match coordinator.register(other.id, event.id).await {
        Err(RegistrationError::EventFull(_)) => {}
        result => {
            return Err(ContractTestFailure::new(
                SCENARIO,
                format!("single-seat event should be full, got {result:?}"),
            ))
        }
    }

    let outcome = coordinator
        .cancel(user.id, event.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "cancel", error))?;
    ensure(SCENARIO, outcome == CancelOutcome::Released, || {
        format!("cancel should release a seat, got {outcome:?}")
    })?;
    let seats = available_seats(SCENARIO, coordinator.store(), event.id).await?;
    ensure(SCENARIO, seats == 1, || format!("expected the seat back, found {seats}"))?;

    coordinator
        .register(user.id, event.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "re-register", error))?;
    let seats = available_seats(SCENARIO, coordinator.store(), event.id).await?;
    ensure(SCENARIO, seats == 0, || format!("expected 0 seats left, found {seats}"))?;
    assert_seat_invariant(SCENARIO, coordinator.store(), event.id).await
}

/// Cancelling something that was never registered changes nothing.
pub async fn test_cancel_without_registration_is_noop<F, Fut, S>(make_store: F) -> ContractTestResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = S>,
    S: RegistrationStore + CatalogStore,
{
    const SCENARIO: &str = "cancel_without_registration_is_noop";

    let store = make_store().await;
    let event = seed_event(SCENARIO, &store, 3).await?;
    let user = seed_user(SCENARIO, &store, "attendee", UserRole::Attendee).await?;
    let coordinator = RegistrationCoordinator::new(store);

    let outcome = coordinator
        .cancel(user.id, event.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "cancel", error))?;
    ensure(SCENARIO, outcome == CancelOutcome::NotRegistered, || {
        format!("expected NotRegistered, got {outcome:?}")
    })?;

    let outcome = coordinator
        .cancel(user.id, EventId::generate())
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "cancel unknown event", error))?;
    ensure(SCENARIO, outcome == CancelOutcome::NotRegistered, || {
        format!("expected NotRegistered for unknown event, got {outcome:?}")
    })?;

    let seats = available_seats(SCENARIO, coordinator.store(), event.id).await?;
    ensure(SCENARIO, seats == 3, || format!("seats changed to {seats}"))?;
    assert_seat_invariant(SCENARIO, coordinator.store(), event.id).await
}

/// Unknown users and events are reported as such and leave no trace.
pub async fn test_missing_user_or_event<F, Fut, S>(make_store: F) -> ContractTestResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = S>,
    S: RegistrationStore + CatalogStore,
{
    const SCENARIO: &str = "missing_user_or_event";

    let store = make_store().await;
    let event = seed_event(SCENARIO, &store, 3).await?;
    let user = seed_user(SCENARIO, &store, "attendee", UserRole::Attendee).await?;
    let coordinator = RegistrationCoordinator::new(store);

    let ghost = UserId::generate();
    match coordinator.register(ghost, event.id).await {
        Err(RegistrationError::UserNotFound(id)) if id == ghost => {}
        result => {
            return Err(ContractTestFailure::new(
                SCENARIO,
                format!("expected UserNotFound, got {result:?}"),
            ))
        }
    }

    let missing = EventId::generate();
    match coordinator.register(user.id, missing).await {
        Err(RegistrationError::EventNotFound(id)) if id == missing => {}
        result => {
            return Err(ContractTestFailure::new(
                SCENARIO,
                format!("expected EventNotFound, got {result:?}"),
            ))
        }
    }

    let registrations = coordinator
        .store()
        .list_registrations_by_user(user.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "list_registrations_by_user", error))?;
    ensure(SCENARIO, registrations.is_empty(), || {
        format!("failed registration left {} rows behind", registrations.len())
    })?;
    assert_seat_invariant(SCENARIO, coordinator.store(), event.id).await
}

/// Registrations and cancellations racing on one event keep the invariant.
pub async fn test_concurrent_register_and_cancel<F, Fut, S>(make_store: F) -> ContractTestResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = S>,
    S: RegistrationStore + CatalogStore + 'static,
{
    const SCENARIO: &str = "concurrent_register_and_cancel";
    const USERS: usize = 20;

    let store = make_store().await;
    let event = seed_event(SCENARIO, &store, 10).await?;
    let users = seed_users(SCENARIO, &store, USERS).await?;
    let coordinator = Arc::new(RegistrationCoordinator::new(store));

    for user in users.iter().step_by(2) {
        coordinator
            .register(user.id, event.id)
            .await
            .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "pre-register", error))?;
    }

    let barrier = Arc::new(Barrier::new(USERS));
    let handles: Vec<_> = users
        .iter()
        .enumerate()
        .map(|(index, user)| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            let (user_id, event_id) = (user.id, event.id);
            tokio::spawn(async move {
                barrier.wait().await;
                if index % 2 == 0 {
                    coordinator.cancel(user_id, event_id).await.map(|_| ())
                } else {
                    coordinator.register(user_id, event_id).await.map(|_| ())
                }
            })
        })
        .collect();

    for handle in handles {
        match handle.await {
            Ok(Ok(()) | Err(RegistrationError::EventFull(_))) => {}
            Ok(Err(error)) => {
                return Err(ContractTestFailure::unexpected(SCENARIO, "register/cancel", error))
            }
            Err(join_error) => {
                return Err(ContractTestFailure::unexpected(SCENARIO, "join", join_error))
            }
        }
    }

    assert_seat_invariant(SCENARIO, coordinator.store(), event.id).await
}

/// Catalog rules that protect the seat invariant.
pub async fn test_catalog_rules<F, Fut, S>(make_store: F) -> ContractTestResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = S>,
    S: RegistrationStore + CatalogStore,
{
    const SCENARIO: &str = "catalog_rules";

    let store = make_store().await;
    let event = seed_event(SCENARIO, &store, 2).await?;
    let user = seed_user(SCENARIO, &store, "attendee", UserRole::Attendee).await?;

    let duplicate = store
        .create_user(NewUser {
            name: user.name.clone(),
            email: user.email.clone(),
            role: UserRole::Attendee,
        })
        .await;
    ensure(SCENARIO, matches!(duplicate, Err(CatalogError::DuplicateEmail(_))), || {
        format!("duplicate email should be refused, got {duplicate:?}")
    })?;

    let coordinator = RegistrationCoordinator::new(store);
    coordinator
        .register(user.id, event.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "register", error))?;

    let refused = coordinator.store().delete_user(user.id).await;
    ensure(
        SCENARIO,
        refused == Err(CatalogError::UserHasRegistrations(user.id)),
        || format!("deleting a registered user should be refused, got {refused:?}"),
    )?;

    let title = EventTitle::try_new(format!("{SCENARIO} renamed"))
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "EventTitle::try_new", error))?;
    let renamed = coordinator
        .store()
        .update_event_title(event.id, title.clone())
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "update_event_title", error))?;
    ensure(
        SCENARIO,
        renamed.title == title && renamed.available_seats == 1 && renamed.capacity == event.capacity,
        || format!("rename touched the ledger: {renamed:?}"),
    )?;
    assert_seat_invariant(SCENARIO, coordinator.store(), event.id).await?;

    coordinator
        .store()
        .delete_event(event.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "delete_event", error))?;
    let remaining = coordinator
        .store()
        .list_registrations_by_user(user.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "list_registrations_by_user", error))?;
    ensure(SCENARIO, remaining.is_empty(), || {
        "deleting the event left its registrations behind".to_string()
    })?;

    coordinator
        .store()
        .delete_user(user.id)
        .await
        .map_err(|error| ContractTestFailure::unexpected(SCENARIO, "delete_user", error))
}

/// Generates one test per contract scenario for a backend.
///
/// `make_store` is a closure returning a future of the store, so backends
/// that connect asynchronously can be used directly.
///
/// ```ignore
/// seatlock_testing::reservation_contract_tests! {
///     suite = in_memory,
///     make_store = || async { seatlock_memory::InMemoryStore::new() },
/// }
/// ```
#[macro_export]
macro_rules! reservation_contract_tests {
    (suite = $suite:ident, make_store = $make_store:expr $(,)?) => {
        mod $suite {
            use $crate::contract::{
                test_cancel_then_register_again, test_cancel_without_registration_is_noop,
                test_catalog_rules, test_concurrent_duplicate_registrations,
                test_concurrent_register_and_cancel,
                test_concurrent_registrations_respect_capacity, test_duplicate_registration,
                test_missing_user_or_event,
            };

            #[tokio::test(flavor = "multi_thread")]
            async fn duplicate_registration_contract() {
                test_duplicate_registration($make_store)
                    .await
                    .expect("reservation contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn concurrent_registrations_respect_capacity_contract() {
                test_concurrent_registrations_respect_capacity($make_store)
                    .await
                    .expect("reservation contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn concurrent_duplicate_registrations_contract() {
                test_concurrent_duplicate_registrations($make_store)
                    .await
                    .expect("reservation contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn cancel_then_register_again_contract() {
                test_cancel_then_register_again($make_store)
                    .await
                    .expect("reservation contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn cancel_without_registration_is_noop_contract() {
                test_cancel_without_registration_is_noop($make_store)
                    .await
                    .expect("reservation contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn missing_user_or_event_contract() {
                test_missing_user_or_event($make_store)
                    .await
                    .expect("reservation contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn concurrent_register_and_cancel_contract() {
                test_concurrent_register_and_cancel($make_store)
                    .await
                    .expect("reservation contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            async fn catalog_rules_contract() {
                test_catalog_rules($make_store)
                    .await
                    .expect("reservation contract failed");
            }
        }
    };
}
