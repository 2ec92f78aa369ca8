use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ratelimit::types::StoreError;

/// Result type for admission control operations
pub type Result<T> = std::result::Result<T, GuardError>;

/// Admission control error types
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limit store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("No rate limit policy for endpoint class: {0}")]
    PolicyNotFound(String),

    #[error("Rate limit exceeded for endpoint class: {0}")]
    RateLimitExceeded(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GuardError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GuardError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GuardError::PolicyNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            GuardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GuardError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GuardError::RateLimitExceeded("users".to_string()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GuardError::StoreUnavailable(StoreError::Reply("bad reply".to_string())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GuardError::Config("missing file".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_display() {
        let err = GuardError::RateLimitExceeded("users".to_string());
        assert_eq!(err.to_string(), "Rate limit exceeded for endpoint class: users");
    }

    #[test]
    fn test_store_error_converts() {
        let err = GuardError::from(StoreError::Reply("unexpected".to_string()));
        assert!(matches!(err, GuardError::StoreUnavailable(_)));
    }
}
