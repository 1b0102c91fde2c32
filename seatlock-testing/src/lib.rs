//! Testing utilities for `seatlock` storage backends
//!
//! - [`contract`]: protocol scenarios every backend must pass, wired into a
//!   test module by [`reservation_contract_tests!`]
//! - [`chaos`]: a store wrapper that injects transient failures

#![forbid(unsafe_code)]
#![deny(
    bad_style,
    clippy::allow_attributes,
    deprecated,
    non_ascii_idents,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_code,
    unused_imports,
    unused_must_use,
    unused_mut,
    unused_qualifications,
    unused_variables
)]
#![warn(missing_docs)]

pub mod chaos;
pub mod contract;

pub use chaos::{ChaosConfig, ChaosStore, ChaosStoreExt, Probability};
pub use contract::{ContractTestFailure, ContractTestResult};
