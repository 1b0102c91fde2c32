//! Shared handler state.

use std::sync::Arc;

use seatlock::{CatalogStore, RegistrationCoordinator, RegistrationStore};

/// Storage the HTTP layer can run on.
pub trait ServerStore: RegistrationStore + CatalogStore + 'static {}

impl<S> ServerStore for S where S: RegistrationStore + CatalogStore + 'static {}

/// Shared handler state: the coordinator and, through it, the store.
#[derive(Debug)]
pub struct AppState<S> {
    coordinator: Arc<RegistrationCoordinator<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<S: ServerStore> AppState<S> {
    /// Wraps a configured coordinator.
    pub fn new(coordinator: RegistrationCoordinator<S>) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }

    /// The registration coordinator.
    pub fn coordinator(&self) -> &RegistrationCoordinator<S> {
        &self.coordinator
    }

    /// The underlying store, for catalog operations.
    pub fn store(&self) -> &S {
        self.coordinator.store()
    }
}
