//! Unified error handling for the web front-end.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::{ReconcileError, SessionError, StoreError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Row store operation failed.
    #[error("Row store error: {0}")]
    Store(#[from] StoreError),

    /// Session operation failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Server-side session storage failed.
    #[error("Session storage error: {0}")]
    SessionStorage(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::ReadOnly => Self::Forbidden("read-only session".to_string()),
            ReconcileError::Validation(e) => Self::BadRequest(e.to_string()),
            ReconcileError::Store(e) => Self::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(
            self,
            Self::SessionStorage(_) | Self::Internal(_) | Self::Store(StoreError::InvalidResponse(_))
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::SessionStorage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(_) => StatusCode::BAD_GATEWAY,
            Self::Session(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::SessionStorage(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Store(StoreError::Unavailable(_) | StoreError::InvalidResponse(_)) => {
                "External service error".to_string()
            }
            _ => self.to_string(),
        };

        (status, message).into_response()
    }
}

/// Set the Sentry user context from the signed-in account.
pub fn set_sentry_user(account_id: &str, email: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(account_id.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ValidationError;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("row 42".to_string());
        assert_eq!(err.to_string(), "Not found: row 42");

        let err = AppError::Store(StoreError::Rejected("permission denied".to_string()));
        assert_eq!(err.to_string(), "Row store error: permission denied");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Forbidden("test".to_string())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Session(SessionError::NotSignedIn)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Store(StoreError::Unavailable("x".to_string()))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_reconcile_errors_map_to_client_errors() {
        assert_eq!(
            get_status(ReconcileError::ReadOnly.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(ReconcileError::Validation(ValidationError::MissingFields).into()),
            StatusCode::BAD_REQUEST
        );
    }
}
