use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::approval::IllegalTransition;
use crate::compose::TimeError;

#[derive(Debug, Clone, Error)]
pub enum EventError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid date or time: {0}")]
    InvalidTime(#[from] TimeError),
    #[error("class-specific events must target at least one class")]
    MissingTarget,
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("event {0} not found")]
    NotFound(String),
    #[error("events API unreachable: {0}")]
    Network(String),
    #[error("events API error: {message}")]
    Api { status: Option<u16>, message: String },
    #[error("unexpected events API response: {0}")]
    Decode(String),
}

impl EventError {
    /// Failures the user can retry unchanged, as opposed to fix-and-resubmit.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventError::Network(_) | EventError::Api { .. } | EventError::Decode(_)
        )
    }

    /// Failures caught before anything reaches the network.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EventError::Validation(_) | EventError::InvalidTime(_) | EventError::MissingTarget
        )
    }
}

impl From<reqwest::Error> for EventError {
    fn from(value: reqwest::Error) -> Self {
        EventError::Network(value.to_string())
    }
}

#[derive(Debug)]
pub enum HttpError {
    Unauthorized(String),
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    BadGateway(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match self {
            HttpError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, false),
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, false),
            HttpError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, false),
            HttpError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, false),
            HttpError::Conflict(msg) => (StatusCode::CONFLICT, msg, false),
            HttpError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg, true),
        };
        (status, Json(json!({ "error": message, "retryable": retryable }))).into_response()
    }
}

impl From<EventError> for HttpError {
    fn from(value: EventError) -> Self {
        match value {
            EventError::Validation(_) | EventError::InvalidTime(_) | EventError::MissingTarget => {
                debug!("rejected submission: {value}");
                HttpError::BadRequest(value.to_string())
            }
            EventError::IllegalTransition(_) => HttpError::Conflict(value.to_string()),
            EventError::PermissionDenied(msg) => HttpError::Forbidden(msg),
            EventError::NotFound(_) => HttpError::NotFound(value.to_string()),
            EventError::Network(ref err) => {
                error!("events API unreachable: {err}");
                HttpError::BadGateway("Events service is unavailable, please retry".into())
            }
            EventError::Api { status, ref message } => {
                warn!(?status, "events API returned an error: {message}");
                HttpError::BadGateway(message.clone())
            }
            EventError::Decode(ref err) => {
                error!("could not decode events API response: {err}");
                HttpError::BadGateway("Events service returned an unexpected response".into())
            }
        }
    }
}
