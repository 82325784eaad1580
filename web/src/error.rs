//! Error types for web handlers.
//!
//! [`AppError`] bridges engine errors and HTTP responses. Every engine error
//! carries an [`ErrorKind`] which picks the status code; the error's stable
//! code string goes into the body so clients can branch on it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use huddle_core::{EngineError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(
///     State(state): State<AppState<S>>,
///     CallerIdentity(caller): CallerIdentity,
///     Path(id): Path<SessionId>,
/// ) -> Result<Json<SessionSummary>, AppError> {
///     Ok(Json(state.service.session_summary(&caller, id).await?))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "bad_request".to_string())
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "unauthorized".to_string())
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "internal_error".to_string(),
        )
    }

    /// HTTP status of the response
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code of the response
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (for client error handling).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = status_for(err.kind());
        let code = err.code().to_string();

        // Driver details stay in the logs.
        if status.is_server_error() {
            return Self::new(status, "An internal error occurred".to_string(), code)
                .with_source(anyhow::Error::new(err));
        }

        Self::new(status, err.to_string(), code)
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::types::SessionStatus;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[bad_request] Invalid input");
    }

    #[test]
    fn test_engine_error_kinds_map_to_statuses() {
        let cases = [
            (EngineError::SessionNotFound, StatusCode::NOT_FOUND),
            (EngineError::SessionFull, StatusCode::BAD_REQUEST),
            (
                EngineError::SessionFrozen {
                    status: SessionStatus::Completed,
                },
                StatusCode::BAD_REQUEST,
            ),
            (EngineError::AdminRequired, StatusCode::FORBIDDEN),
            (EngineError::Conflict, StatusCode::CONFLICT),
        ];

        for (err, expected) in cases {
            let code = err.code();
            let app = AppError::from(err);
            assert_eq!(app.status(), expected);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn test_database_error_message_is_hidden() {
        let app = AppError::from(EngineError::Database("connection reset by peer".into()));

        assert_eq!(app.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!app.to_string().contains("connection reset"));
        assert!(std::error::Error::source(&app).is_some());
    }
}
