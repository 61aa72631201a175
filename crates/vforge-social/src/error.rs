//! Publish protocol errors.
//!
//! Every variant maps to a stable error code that ends up on the publish
//! log, so operators can tell an expired token from a platform outage
//! without reading stack traces.

use thiserror::Error;

pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream platform error: {0}")]
    UpstreamError(String),

    #[error("Platform did not finish processing the video in time")]
    VideoProcessingTimeout,

    #[error("Platform reported a video processing error: {0}")]
    VideoProcessingError(String),

    #[error("Chunk {index} upload failed: {message}")]
    ChunkUploadFailed { index: u32, message: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Token sealing error: {0}")]
    Sealing(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed platform response: {0}")]
    MalformedResponse(String),
}

impl PublishError {
    /// Stable error code recorded on the publish log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthFailed(_) => "AUTH_FAILED",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::UpstreamError(_) => "UPSTREAM_ERROR",
            Self::VideoProcessingTimeout => "VIDEO_PROCESSING_TIMEOUT",
            Self::VideoProcessingError(_) => "VIDEO_PROCESSING_ERROR",
            Self::ChunkUploadFailed { .. } => "CHUNK_UPLOAD_FAILED",
            Self::TokenRefreshFailed(_) => "TOKEN_REFRESH_FAILED",
            Self::Sealing(_) => "SEALING_ERROR",
            Self::Transport(_) => "TRANSPORT",
            Self::MalformedResponse(_) => "UPSTREAM_ERROR",
        }
    }

    /// Map a non-success HTTP response status to an error variant.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::AuthFailed(body),
            429 => Self::RateLimited(body),
            400..=499 => Self::InvalidRequest(body),
            _ => Self::UpstreamError(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            PublishError::from_status(401, "x"),
            PublishError::AuthFailed(_)
        ));
        assert!(matches!(
            PublishError::from_status(429, "x"),
            PublishError::RateLimited(_)
        ));
        assert!(matches!(
            PublishError::from_status(400, "x"),
            PublishError::InvalidRequest(_)
        ));
        assert!(matches!(
            PublishError::from_status(502, "x"),
            PublishError::UpstreamError(_)
        ));
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(PublishError::VideoProcessingTimeout.code(), "VIDEO_PROCESSING_TIMEOUT");
        assert_eq!(
            PublishError::ChunkUploadFailed { index: 2, message: "boom".into() }.code(),
            "CHUNK_UPLOAD_FAILED"
        );
        assert_eq!(PublishError::AuthFailed("x".into()).code(), "AUTH_FAILED");
    }
}
