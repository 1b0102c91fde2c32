//! `/api/v1/users`

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use seatlock::{NewUser, User, UserId};
use tracing::instrument;

use crate::error::ApiError;
use crate::handlers::MessageResponse;
use crate::state::{AppState, ServerStore};

/// `POST /api/v1/users`
#[instrument(name = "http.create_user", skip_all)]
pub async fn create_user<S: ServerStore>(
    State(state): State<AppState<S>>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(new_user) = payload?;
    let user = state.store().create_user(new_user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /api/v1/users`
pub async fn list_users<S: ServerStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.store().list_users().await?))
}

/// `GET /api/v1/users/{id}`
pub async fn get_user<S: ServerStore>(
    State(state): State<AppState<S>>,
    user_id: Result<Path<UserId>, PathRejection>,
) -> Result<Json<User>, ApiError> {
    let Path(user_id) = user_id?;
    Ok(Json(state.store().get_user(user_id).await?))
}

/// `DELETE /api/v1/users/{id}`; refused while the user holds registrations
/// or organizes events.
#[instrument(name = "http.delete_user", skip_all)]
pub async fn delete_user<S: ServerStore>(
    State(state): State<AppState<S>>,
    user_id: Result<Path<UserId>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(user_id) = user_id?;
    state.store().delete_user(user_id).await?;
    Ok(Json(MessageResponse {
        message: "user deleted successfully",
    }))
}
