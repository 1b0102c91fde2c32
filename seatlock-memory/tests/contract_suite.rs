//! Runs the backend contract suite against the in-memory store.

seatlock_testing::reservation_contract_tests! {
    suite = in_memory_store,
    make_store = || async { seatlock_memory::InMemoryStore::new() },
}
