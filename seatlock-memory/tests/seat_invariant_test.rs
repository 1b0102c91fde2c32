use std::sync::Arc;

use proptest::prelude::*;
use seatlock::{
    Capacity, CatalogStore, Email, EventId, EventTitle, NewEvent, NewUser,
    RegistrationCoordinator, RegistrationError, UserId, UserName, UserRole,
};
use seatlock_memory::InMemoryStore;
use tokio::sync::Barrier;
use tracing::Instrument;

async fn seed(store: &InMemoryStore, attendees: usize, capacity: i32) -> (EventId, Vec<UserId>) {
    let organizer = store
        .create_user(NewUser {
            name: UserName::try_new("Organizer").unwrap(),
            email: Email::try_new("organizer@example.com").unwrap(),
            role: UserRole::Organizer,
        })
        .await
        .unwrap();
    let event = store
        .create_event(NewEvent {
            title: EventTitle::try_new("Tech conference").unwrap(),
            capacity: Capacity::try_new(capacity).unwrap(),
            organizer_id: organizer.id,
        })
        .await
        .unwrap();

    let mut users = Vec::with_capacity(attendees);
    for index in 0..attendees {
        let user = store
            .create_user(NewUser {
                name: UserName::try_new(format!("Attendee {index}")).unwrap(),
                email: Email::try_new(format!("attendee{index}@example.com")).unwrap(),
                role: UserRole::Attendee,
            })
            .await
            .unwrap();
        users.push(user.id);
    }
    (event.id, users)
}

async fn assert_invariant(store: &InMemoryStore, event_id: EventId) {
    let event = store.get_event(event_id).await.unwrap();
    let live = store.list_registrations_by_event(event_id).await.unwrap();
    assert_eq!(
        usize::try_from(event.registered_seats()).unwrap(),
        live.len(),
        "capacity - available_seats must equal live registrations"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[tracing_test::traced_test]
async fn fifty_attendees_race_for_ten_seats() {
    // Given: an event with 10 seats and 50 distinct attendees
    let store = InMemoryStore::new();
    let (event_id, users) = seed(&store, 50, 10).await;
    let coordinator = Arc::new(RegistrationCoordinator::new(store.clone()));
    let barrier = Arc::new(Barrier::new(users.len()));

    // When: every attendee registers at the same moment
    let handles: Vec<_> = users
        .iter()
        .map(|&user_id| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            // Spawned tasks carry the test span so their events are captured.
            tokio::spawn(
                async move {
                    barrier.wait().await;
                    coordinator.register(user_id, event_id).await
                }
                .in_current_span(),
            )
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("registration task panicked"))
        .collect();

    // Then: exactly 10 are admitted and 40 are told the event is full
    let admitted = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(RegistrationError::EventFull(_))))
        .count();
    assert_eq!(admitted, 10);
    assert_eq!(full, 40);

    // And: the ledger agrees with the registrations
    assert_eq!(store.get_event(event_id).await.unwrap().available_seats, 0);
    assert_invariant(&store, event_id).await;
    assert!(logs_contain("[coordinator.event_full]"));
}

#[tokio::test]
async fn second_registration_of_the_same_pair_is_rejected_and_charged_once() {
    let store = InMemoryStore::new();
    let (event_id, users) = seed(&store, 1, 3).await;
    let coordinator = RegistrationCoordinator::new(store.clone());

    coordinator.register(users[0], event_id).await.unwrap();
    let second = coordinator.register(users[0], event_id).await;

    assert_eq!(
        second,
        Err(RegistrationError::AlreadyRegistered {
            user_id: users[0],
            event_id
        })
    );
    assert_eq!(store.get_event(event_id).await.unwrap().available_seats, 2);
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Register(usize),
    Cancel(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..6usize).prop_map(Step::Register),
        (0..6usize).prop_map(Step::Cancel),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn invariant_holds_for_any_register_cancel_sequence(
        capacity in 1i32..5,
        steps in prop::collection::vec(step(), 1..30),
    ) {
        tokio_test::block_on(async {
            let store = InMemoryStore::new();
            let (event_id, users) = seed(&store, 6, capacity).await;
            let coordinator = RegistrationCoordinator::new(store.clone());

            for step in steps {
                match step {
                    Step::Register(index) => {
                        let result = coordinator.register(users[index], event_id).await;
                        assert!(
                            matches!(
                                result,
                                Ok(_)
                                    | Err(RegistrationError::EventFull(_))
                                    | Err(RegistrationError::AlreadyRegistered { .. })
                            ),
                            "unexpected outcome {result:?}"
                        );
                    }
                    Step::Cancel(index) => {
                        coordinator.cancel(users[index], event_id).await.unwrap();
                    }
                }

                let event = store.get_event(event_id).await.unwrap();
                assert!(event.available_seats >= 0);
                assert!(event.available_seats <= capacity);
                assert_invariant(&store, event_id).await;
            }
        });
    }
}

#[tokio::test]
async fn cancel_of_a_pair_that_never_registered_leaves_seats_alone() {
    let store = InMemoryStore::new();
    let (event_id, users) = seed(&store, 2, 2).await;
    let coordinator = RegistrationCoordinator::new(store.clone());
    coordinator.register(users[0], event_id).await.unwrap();

    coordinator.cancel(users[1], event_id).await.unwrap();
    coordinator.cancel(users[1], EventId::generate()).await.unwrap();

    assert_eq!(store.get_event(event_id).await.unwrap().available_seats, 1);
    assert_invariant(&store, event_id).await;
}
