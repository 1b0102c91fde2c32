//! Mapping of domain failures onto HTTP responses.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use seatlock::{CatalogError, ErrorClass, RegistrationError};
use serde::Serialize;
use tracing::{error, warn};

/// Error returned by every handler.
///
/// The body is always `{"error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    /// A 400 response for a malformed request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Status code of the response.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Message placed in the body.
    pub fn message(&self) -> &str {
        &self.message
    }

    fn classified(class: ErrorClass, message: String) -> Self {
        let status = match class {
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Conflict => StatusCode::CONFLICT,
            ErrorClass::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match class {
            ErrorClass::Transient => {
                warn!(error = %message, "[http.unavailable]");
                Self {
                    status,
                    message: "temporarily unavailable, please retry".to_string(),
                }
            }
            ErrorClass::Internal => {
                error!(error = %message, "[http.internal_error]");
                Self {
                    status,
                    message: "internal server error".to_string(),
                }
            }
            ErrorClass::NotFound | ErrorClass::Conflict => Self { status, message },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RegistrationError> for ApiError {
    fn from(error: RegistrationError) -> Self {
        Self::classified(error.class(), error.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(error: CatalogError) -> Self {
        Self::classified(error.class(), error.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatlock::{EventId, Operation, StoreError, UserId};

    #[test]
    fn registration_outcomes_map_to_statuses() {
        let user_id = UserId::generate();
        let event_id = EventId::generate();
        let cases = [
            (RegistrationError::UserNotFound(user_id), StatusCode::NOT_FOUND),
            (RegistrationError::EventNotFound(event_id), StatusCode::NOT_FOUND),
            (RegistrationError::EventFull(event_id), StatusCode::CONFLICT),
            (
                RegistrationError::AlreadyRegistered { user_id, event_id },
                StatusCode::CONFLICT,
            ),
            (
                RegistrationError::Transient(StoreError::LockTimeout {
                    operation: Operation::LockEvent,
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RegistrationError::Store(StoreError::CheckViolation {
                    constraint: "events_available_seats_check".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let error = ApiError::from(CatalogError::Store(StoreError::StoreFailure {
            operation: Operation::ListUsers,
            detail: "relation \"users\" does not exist".to_string(),
        }));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.message(), "internal server error");
    }

    #[test]
    fn business_messages_are_passed_through() {
        let user_id = UserId::generate();
        let error = ApiError::from(CatalogError::UserHasRegistrations(user_id));
        assert_eq!(error.status(), StatusCode::CONFLICT);
        assert_eq!(error.message(), format!("user {user_id} still holds registrations"));
    }
}
