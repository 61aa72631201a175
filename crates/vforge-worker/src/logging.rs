//! Structured job logging.

use tracing::{error, info, warn, Span};
use vforge_models::JobId;
use vforge_queue::Lane;

/// Job logger with consistent contextual fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    lane: Lane,
}

impl JobLogger {
    pub fn new(job_id: &JobId, lane: Lane) -> Self {
        Self {
            job_id: job_id.to_string(),
            lane,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, lane = %self.lane, "Job started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(job_id = %self.job_id, lane = %self.lane, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, lane = %self.lane, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, lane = %self.lane, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, lane = %self.lane, "Job completed: {}", message);
    }

    /// Tracing span carrying the job context.
    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, lane = %self.lane)
    }
}
