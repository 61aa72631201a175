//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur when talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Server unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited, retry after {0}ms")]
    RateLimited(u64),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Map an HTTP status code and body to an error variant.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::AuthError(message),
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 => Self::AlreadyExists(message),
            412 => Self::PreconditionFailed(message),
            429 => Self::RateLimited(1000),
            500..=599 => Self::Unavailable(message),
            _ => Self::RequestFailed(message),
        }
    }

    /// HTTP status the error corresponds to, for metrics labels.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::AuthError(_) => Some(401),
            Self::PermissionDenied(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::AlreadyExists(_) => Some(409),
            Self::PreconditionFailed(_) => Some(412),
            Self::RateLimited(_) => Some(429),
            Self::Unavailable(_) => Some(503),
            _ => None,
        }
    }

    /// Suggested delay before retrying, when the server told us one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited(_) | Self::Unavailable(_)
        )
    }

    /// True if the error was caused by a failed precondition (updateTime mismatch).
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert!(matches!(
            StoreError::from_http_status(404, "x"),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            StoreError::from_http_status(409, "x"),
            StoreError::AlreadyExists(_)
        ));
        assert!(matches!(
            StoreError::from_http_status(412, "x"),
            StoreError::PreconditionFailed(_)
        ));
        assert!(matches!(
            StoreError::from_http_status(429, "x"),
            StoreError::RateLimited(_)
        ));
        assert!(matches!(
            StoreError::from_http_status(503, "x"),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn retryability() {
        assert!(StoreError::from_http_status(429, "x").is_retryable());
        assert!(StoreError::from_http_status(500, "x").is_retryable());
        assert!(!StoreError::from_http_status(400, "x").is_retryable());
        assert!(!StoreError::from_http_status(404, "x").is_retryable());
        assert!(!StoreError::from_http_status(412, "x").is_retryable());
    }

    #[test]
    fn precondition_detection() {
        assert!(StoreError::from_http_status(412, "x").is_precondition_failed());
        assert!(!StoreError::from_http_status(409, "x").is_precondition_failed());
    }
}
