//! `/api/v1/registrations`: the reservation protocol over HTTP, plus lookups.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use seatlock::{CancelOutcome, EventId, Registration, RegistrationId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::{AppState, ServerStore};

/// Body of `POST` and `DELETE /api/v1/registrations`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RegistrationRequest {
    /// Attendee.
    pub user_id: UserId,
    /// Event to reserve a seat for, or to give one back.
    pub event_id: EventId,
}

/// Body of a successful cancellation.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Always a confirmation; cancelling twice is not an error.
    pub message: &'static str,
    /// Whether a seat was actually given back.
    pub released: bool,
}

/// `POST /api/v1/registrations`: reserve a seat.
pub async fn register<S: ServerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Registration>), ApiError> {
    let Json(request) = payload?;
    let registration = state
        .coordinator()
        .register(request.user_id, request.event_id)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// `DELETE /api/v1/registrations`: give a seat back.
pub async fn cancel<S: ServerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<Json<CancelResponse>, ApiError> {
    let Json(request) = payload?;
    let outcome = state
        .coordinator()
        .cancel(request.user_id, request.event_id)
        .await?;
    Ok(Json(CancelResponse {
        message: "registration cancelled successfully",
        released: outcome == CancelOutcome::Released,
    }))
}

/// `GET /api/v1/registrations/{id}`
pub async fn get_registration<S: ServerStore>(
    State(state): State<AppState<S>>,
    registration_id: Result<Path<RegistrationId>, PathRejection>,
) -> Result<Json<Registration>, ApiError> {
    let Path(registration_id) = registration_id?;
    Ok(Json(state.store().get_registration(registration_id).await?))
}

/// `GET /api/v1/registrations/user/{user_id}`
pub async fn list_user_registrations<S: ServerStore>(
    State(state): State<AppState<S>>,
    user_id: Result<Path<UserId>, PathRejection>,
) -> Result<Json<Vec<Registration>>, ApiError> {
    let Path(user_id) = user_id?;
    Ok(Json(state.store().list_registrations_by_user(user_id).await?))
}

/// `GET /api/v1/registrations/event/{event_id}`
pub async fn list_event_registrations<S: ServerStore>(
    State(state): State<AppState<S>>,
    event_id: Result<Path<EventId>, PathRejection>,
) -> Result<Json<Vec<Registration>>, ApiError> {
    let Path(event_id) = event_id?;
    Ok(Json(
        state.store().list_registrations_by_event(event_id).await?,
    ))
}
