//! Worker error types.
//!
//! Variants map one-to-one onto the classifier's error codes; keep them
//! specific so a failure lands on the entity with a meaningful code
//! instead of a generic message.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Source unavailable: {0}")]
    SourceGone(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Model call failed: {0}")]
    ModelFailed(String),

    #[error("Schema parse failed: {0}")]
    SchemaParseFailed(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidationFailed(String),

    #[error("Render timed out after {0}s")]
    RenderTimeout(u64),

    #[error("Render component not found: {0}")]
    ComponentNotFound(String),

    #[error("Invalid render props: {0}")]
    InvalidProps(String),

    #[error("Render CLI failed: {0}")]
    RenderCliFailed(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] vforge_store::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] vforge_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] vforge_queue::QueueError),

    #[error("Publish error: {0}")]
    Publish(#[from] vforge_social::PublishError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn model_failed(msg: impl Into<String>) -> Self {
        Self::ModelFailed(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Map a non-success HTTP status from the model API to an error.
    pub fn from_model_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Self::AuthFailed(body),
            429 => Self::RateLimited(body),
            400..=499 => Self::InvalidRequest(body),
            _ => Self::Upstream(body),
        }
    }
}
