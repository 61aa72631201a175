//! Error classifier.
//!
//! Pure mapping from a [`WorkerError`] to a retriable/terminal verdict and
//! a stable error code. The executor uses the verdict to pick between a
//! queue retry and a terminal FAILED write; the code ends up on the entity.
//! Unknown errors classify terminal so an unrecognized failure mode can
//! never loop forever.

use vforge_social::PublishError;
use vforge_storage::StorageError;
use vforge_store::StoreError;

use crate::error::WorkerError;

/// Classification verdict for one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub retriable: bool,
    pub code: &'static str,
}

impl Classification {
    const fn retriable(code: &'static str) -> Self {
        Self { retriable: true, code }
    }

    const fn terminal(code: &'static str) -> Self {
        Self { retriable: false, code }
    }
}

/// Classify a worker error. Deterministic: the same error always yields
/// the same verdict.
pub fn classify(error: &WorkerError) -> Classification {
    match error {
        WorkerError::AuthFailed(_) => Classification::terminal("AUTH_FAILED"),
        WorkerError::InvalidRequest(_) => Classification::terminal("INVALID_REQUEST"),
        WorkerError::SourceGone(_) => Classification::terminal("SOURCE_GONE"),
        WorkerError::RateLimited(_) => Classification::retriable("RATE_LIMITED"),
        WorkerError::Upstream(_) => Classification::retriable("UPSTREAM_ERROR"),
        WorkerError::Transport(_) => Classification::retriable("TRANSPORT"),
        // Model calls fail mostly from load shedding; worth another attempt.
        WorkerError::ModelFailed(_) => Classification::retriable("UPSTREAM_ERROR"),
        WorkerError::SchemaParseFailed(_) => Classification::terminal("SCHEMA_PARSE_FAILED"),
        WorkerError::SchemaValidationFailed(_) => {
            Classification::terminal("SCHEMA_VALIDATION_FAILED")
        }
        WorkerError::RenderTimeout(_) => Classification::terminal("RENDER_TIMEOUT"),
        WorkerError::ComponentNotFound(_) => Classification::terminal("COMPONENT_NOT_FOUND"),
        WorkerError::InvalidProps(_) => Classification::terminal("INVALID_PROPS"),
        WorkerError::RenderCliFailed(_) => Classification::retriable("RENDER_CLI_FAILED"),
        WorkerError::JobFailed(_) => Classification::terminal("UNCLASSIFIED"),
        WorkerError::ConfigError(_) => Classification::terminal("UNCLASSIFIED"),
        WorkerError::Store(e) => classify_store(e),
        WorkerError::Storage(e) => classify_storage(e),
        WorkerError::Queue(_) => Classification::retriable("TRANSPORT"),
        WorkerError::Publish(e) => classify_publish(e),
        WorkerError::Io(_) => Classification::terminal("UNCLASSIFIED"),
    }
}

fn classify_store(error: &StoreError) -> Classification {
    match error {
        StoreError::AuthError(_) => Classification::terminal("AUTH_FAILED"),
        StoreError::RateLimited(_) => Classification::retriable("RATE_LIMITED"),
        StoreError::Unavailable(_) => Classification::retriable("UPSTREAM_ERROR"),
        StoreError::Network(_) => Classification::retriable("TRANSPORT"),
        _ => Classification::terminal("UNCLASSIFIED"),
    }
}

fn classify_storage(error: &StorageError) -> Classification {
    match error {
        // A missing source object cannot reappear on retry
        StorageError::NotFound(_) => Classification::terminal("SOURCE_GONE"),
        StorageError::ConfigError(_) => Classification::terminal("UNCLASSIFIED"),
        _ => Classification::retriable("UPSTREAM_ERROR"),
    }
}

fn classify_publish(error: &PublishError) -> Classification {
    match error {
        PublishError::AuthFailed(_) => Classification::terminal("AUTH_FAILED"),
        PublishError::InvalidRequest(_) => Classification::terminal("INVALID_REQUEST"),
        PublishError::RateLimited(_) => Classification::retriable("RATE_LIMITED"),
        PublishError::UpstreamError(_) | PublishError::MalformedResponse(_) => {
            Classification::retriable("UPSTREAM_ERROR")
        }
        PublishError::Transport(_) => Classification::retriable("TRANSPORT"),
        // The platform may simply have been slow; a retry re-uploads.
        PublishError::VideoProcessingTimeout => {
            Classification::retriable("VIDEO_PROCESSING_TIMEOUT")
        }
        PublishError::VideoProcessingError(_) => {
            Classification::terminal("VIDEO_PROCESSING_ERROR")
        }
        PublishError::ChunkUploadFailed { .. } => Classification::retriable("CHUNK_UPLOAD_FAILED"),
        // An unrefreshable token needs the user to relink the account
        PublishError::TokenRefreshFailed(_) => Classification::terminal("TOKEN_REFRESH_FAILED"),
        PublishError::Sealing(_) => Classification::terminal("SEALING_ERROR"),
    }
}

/// Message heuristics for permanently unavailable sources, applied to
/// fetcher diagnostics.
pub fn is_source_gone_message(message: &str) -> bool {
    let msg = message.to_lowercase();

    msg.contains("private video")
        || msg.contains("video is private")
        || msg.contains("video unavailable")
        || msg.contains("video is unavailable")
        || msg.contains("video has been removed")
        || msg.contains("video was deleted")
        || msg.contains("account has been terminated")
        || msg.contains("invalid url")
        || msg.contains("unsupported url")
        || msg.contains("404")
        || (msg.contains("age") && msg.contains("restrict"))
}
