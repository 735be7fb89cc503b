use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Expected rejection of a lifecycle operation: the request conflicted with
/// who is already in (or not in) the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictReason {
    /// The user already holds a participant row in this session.
    #[error("user has already joined this session")]
    AlreadyJoined,
    /// Admitting the user would close the capacity gate.
    #[error("session is full")]
    SessionFull,
    /// An open session already exists system-wide.
    #[error("an active game session already exists")]
    ActiveSessionExists,
    /// Leave requested without a participant row.
    #[error("user has not joined this session")]
    NotJoined,
    /// Number pick requested without a participant row.
    #[error("user is not a participant of this session")]
    NotAParticipant,
}

impl ConflictReason {
    /// Stable machine-readable code carried in error responses.
    pub fn code(self) -> &'static str {
        match self {
            ConflictReason::AlreadyJoined => "already_joined",
            ConflictReason::SessionFull => "session_full",
            ConflictReason::ActiveSessionExists => "active_session_exists",
            ConflictReason::NotJoined => "not_joined",
            ConflictReason::NotAParticipant => "not_a_participant",
        }
    }
}

/// Expected rejection tied to the session's position in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateReason {
    /// The session has already been settled.
    #[error("session has already ended")]
    SessionEnded,
    /// The play window has not elapsed yet.
    #[error("session has not ended yet")]
    NotYetEnded,
}

impl StateReason {
    /// Stable machine-readable code carried in error responses.
    pub fn code(self) -> &'static str {
        match self {
            StateReason::SessionEnded => "session_ended",
            StateReason::NotYetEnded => "not_yet_ended",
        }
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation conflicts with existing membership or session state.
    #[error(transparent)]
    Conflict(ConflictReason),
    /// Operation cannot be performed at this point of the session lifecycle.
    #[error(transparent)]
    State(StateReason),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Catch-all for failures no caller can act on.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state, carrying a stable reason code.
    #[error("{message}")]
    Conflict {
        /// Machine-readable reason code.
        code: &'static str,
        /// Human readable description.
        message: String,
    },
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::Conflict(reason) => AppError::Conflict {
                code: reason.code(),
                message: reason.to_string(),
            },
            ServiceError::State(reason) => AppError::Conflict {
                code: reason.code(),
                message: reason.to_string(),
            },
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Unexpected(message) => AppError::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict { code, .. } => (StatusCode::CONFLICT, *code),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "unexpected_error"),
        };

        let payload = Json(ErrorBody {
            code,
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
