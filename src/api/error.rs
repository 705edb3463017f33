//! Session API error types

use thiserror::Error;

/// Result alias for session API calls
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the session backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Required input missing or malformed
    #[error("validation error: {0}")]
    Validation(String),

    /// Organization session quota exceeded (HTTP 409 on create)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend has not generated a QR code yet
    #[error("QR code not ready: {0}")]
    NotReady(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or rejected auth token
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Transport failure or timeout
    #[error("network error: {0}")]
    Network(String),

    /// Any other non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Expected transient state that callers re-poll instead of surfacing.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, ApiError::NotReady(_))
    }

    /// Map a non-success HTTP status to the matching variant.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 | 422 => ApiError::Validation(message),
            401 | 403 => ApiError::Unauthorized(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            425 => ApiError::NotReady(message),
            _ => ApiError::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::from_status(status.as_u16(), err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
