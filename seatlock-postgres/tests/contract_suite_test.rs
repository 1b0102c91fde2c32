//! Runs the backend contract suite against PostgreSQL.

mod common;

seatlock_testing::reservation_contract_tests! {
    suite = postgres_store,
    make_store = || crate::common::store(),
}
