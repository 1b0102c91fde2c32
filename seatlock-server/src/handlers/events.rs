//! `/api/v1/events`

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use seatlock::{Event, EventId, EventTitle, NewEvent, UserId};
use serde::Deserialize;
use tracing::instrument;

use crate::error::ApiError;
use crate::handlers::MessageResponse;
use crate::state::{AppState, ServerStore};

/// Body of `PUT /api/v1/events/{id}`. Capacity is fixed at creation, so a
/// request carrying it is rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEventRequest {
    /// New title.
    pub title: EventTitle,
}

/// `POST /api/v1/events`
#[instrument(name = "http.create_event", skip_all)]
pub async fn create_event<S: ServerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<NewEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let Json(new_event) = payload?;
    let event = state.store().create_event(new_event).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// `GET /api/v1/events`
pub async fn list_events<S: ServerStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<Event>>, ApiError> {
    Ok(Json(state.store().list_events().await?))
}

/// `GET /api/v1/events/{id}`
pub async fn get_event<S: ServerStore>(
    State(state): State<AppState<S>>,
    event_id: Result<Path<EventId>, PathRejection>,
) -> Result<Json<Event>, ApiError> {
    let Path(event_id) = event_id?;
    Ok(Json(state.store().get_event(event_id).await?))
}

/// `GET /api/v1/events/organizer/{organizer_id}`
pub async fn list_organizer_events<S: ServerStore>(
    State(state): State<AppState<S>>,
    organizer_id: Result<Path<UserId>, PathRejection>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let Path(organizer_id) = organizer_id?;
    Ok(Json(
        state.store().list_events_by_organizer(organizer_id).await?,
    ))
}

/// `PUT /api/v1/events/{id}`
#[instrument(name = "http.update_event", skip_all)]
pub async fn update_event<S: ServerStore>(
    State(state): State<AppState<S>>,
    event_id: Result<Path<EventId>, PathRejection>,
    payload: Result<Json<UpdateEventRequest>, JsonRejection>,
) -> Result<Json<Event>, ApiError> {
    let Path(event_id) = event_id?;
    let Json(update) = payload?;
    Ok(Json(
        state.store().update_event_title(event_id, update.title).await?,
    ))
}

/// `DELETE /api/v1/events/{id}`; its registrations go with it.
#[instrument(name = "http.delete_event", skip_all)]
pub async fn delete_event<S: ServerStore>(
    State(state): State<AppState<S>>,
    event_id: Result<Path<EventId>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(event_id) = event_id?;
    state.store().delete_event(event_id).await?;
    Ok(Json(MessageResponse {
        message: "event deleted successfully",
    }))
}
