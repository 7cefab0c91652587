//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use homehub_domain::error::{DriverError, HubError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`HubError`] (and malformed requests) to an HTTP response with an
/// appropriate status code.
#[derive(Debug)]
pub enum ApiError {
    Hub(HubError),
    BadRequest(String),
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        Self::Hub(err)
    }
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        let err = match self {
            Self::BadRequest(message) => return (StatusCode::BAD_REQUEST, message.clone()),
            Self::Hub(err) => err,
        };
        match err {
            HubError::Validation(inner) => (StatusCode::BAD_REQUEST, inner.to_string()),
            HubError::UnsupportedProtocol(_) => (StatusCode::BAD_REQUEST, err.to_string()),
            HubError::UnknownDevice(_) => (StatusCode::NOT_FOUND, err.to_string()),
            HubError::InvalidTransition(inner) => (StatusCode::CONFLICT, inner.to_string()),
            HubError::AlreadyRunning => (StatusCode::CONFLICT, err.to_string()),
            HubError::Driver(inner @ DriverError::Timeout { .. }) => {
                (StatusCode::GATEWAY_TIMEOUT, inner.to_string())
            }
            HubError::Driver(inner) => (StatusCode::BAD_GATEWAY, inner.to_string()),
            HubError::NotReady { .. } => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            HubError::Storage(_) | HubError::SchemaMismatch { .. } => {
                tracing::error!(error = ?err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_message();
        (status, Json(ErrorBody { error })).into_response()
    }
}
