//! Redis Streams job queue.
//!
//! Each pipeline stage has its own lane (stream) so that per-stage
//! concurrency limits hold under load. Delayed deliveries (retry backoff,
//! scheduled publishes) stage in a sorted set and are promoted into their
//! lane stream when due.

pub mod dispatcher;
pub mod error;
pub mod job;
pub mod queue;

pub use dispatcher::{Dispatcher, LanePolicy};
pub use error::{QueueError, QueueResult};
pub use job::{
    AnalysisJob, ExtractionJob, IntakeJob, JobEnvelope, Lane, PublishJob, QueueJob, RenderJob,
};
pub use queue::{JobQueue, QueueConfig};
