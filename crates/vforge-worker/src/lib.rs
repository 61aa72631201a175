//! Background worker for the vforge pipeline.
//!
//! Consumes jobs from the Redis-backed lanes and advances videos,
//! templates, renders, and publish logs through their lifecycles.

pub mod analysis_job;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod extraction_job;
pub mod fetch;
pub mod frames;
pub mod intake_job;
pub mod logging;
pub mod model;
pub mod publish_job;
pub mod rate_limit;
pub mod render_job;
pub mod retry;

pub use classifier::{classify, Classification};
pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
