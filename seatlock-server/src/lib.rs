//! HTTP service for seatlock.
//!
//! [`router`] builds the axum application over any store that implements
//! both [`RegistrationStore`](seatlock::RegistrationStore) and
//! [`CatalogStore`](seatlock::CatalogStore). Registration and cancellation
//! go through the [`RegistrationCoordinator`](seatlock::RegistrationCoordinator);
//! everything else is plain catalog access.
//!
//! | outcome | status |
//! |---|---|
//! | user, event or registration missing | 404 |
//! | event full, already registered, duplicate email, user still referenced | 409 |
//! | lock timeout, deadlock, lost connection after retries | 503 |
//! | malformed body or path | 400 |
//! | anything else | 500 |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::{ConfigError, LogFormat, ServerConfig, StoreBackend};
pub use error::ApiError;
pub use state::{AppState, ServerStore};

use handlers::{events, meta, registrations, users};

/// Builds the application router.
pub fn router<S: ServerStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(meta::health))
        .route("/", get(meta::api_info))
        .route(
            "/api/v1/users",
            get(users::list_users::<S>).post(users::create_user::<S>),
        )
        .route(
            "/api/v1/users/{id}",
            get(users::get_user::<S>).delete(users::delete_user::<S>),
        )
        .route(
            "/api/v1/events",
            get(events::list_events::<S>).post(events::create_event::<S>),
        )
        .route(
            "/api/v1/events/{id}",
            get(events::get_event::<S>)
                .put(events::update_event::<S>)
                .delete(events::delete_event::<S>),
        )
        .route(
            "/api/v1/events/organizer/{organizer_id}",
            get(events::list_organizer_events::<S>),
        )
        .route(
            "/api/v1/registrations",
            post(registrations::register::<S>).delete(registrations::cancel::<S>),
        )
        .route(
            "/api/v1/registrations/{id}",
            get(registrations::get_registration::<S>),
        )
        .route(
            "/api/v1/registrations/user/{user_id}",
            get(registrations::list_user_registrations::<S>),
        )
        .route(
            "/api/v1/registrations/event/{event_id}",
            get(registrations::list_event_registrations::<S>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
