//! High-level job submission with per-lane retry policies.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{QueueError, QueueResult};
use crate::job::{
    AnalysisJob, ExtractionJob, IntakeJob, JobEnvelope, Lane, PublishJob, QueueJob, RenderJob,
};
use crate::queue::JobQueue;

/// Retry policy for one lane.
#[derive(Debug, Clone, Copy)]
pub struct LanePolicy {
    /// Total delivery attempts, including the first
    pub max_attempts: u32,
    /// Initial backoff, doubled per failed attempt
    pub backoff_initial_ms: u64,
}

impl LanePolicy {
    /// Policy for a lane.
    ///
    /// Renders get fewer attempts because a failed render is expensive to
    /// repeat; publishes back off longer because platform rate limits are
    /// the dominant failure there.
    pub fn for_lane(lane: Lane) -> Self {
        match lane {
            Lane::Intake => Self {
                max_attempts: 3,
                backoff_initial_ms: 1000,
            },
            Lane::Analysis => Self {
                max_attempts: 3,
                backoff_initial_ms: 1000,
            },
            Lane::Extraction => Self {
                max_attempts: 3,
                backoff_initial_ms: 1000,
            },
            Lane::Render => Self {
                max_attempts: 2,
                backoff_initial_ms: 5000,
            },
            Lane::Publish => Self {
                max_attempts: 3,
                backoff_initial_ms: 2000,
            },
        }
    }
}

/// Submits jobs to the queue with the right envelope for their lane.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<JobQueue>,
}

impl Dispatcher {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    fn envelope(job: QueueJob) -> JobEnvelope {
        let policy = LanePolicy::for_lane(job.lane());
        JobEnvelope::new(job, policy.max_attempts, policy.backoff_initial_ms)
    }

    /// Submit an intake job.
    pub async fn submit_intake(&self, job: IntakeJob) -> QueueResult<String> {
        self.queue.enqueue(Self::envelope(QueueJob::Intake(job))).await
    }

    /// Submit an analysis job.
    pub async fn submit_analysis(&self, job: AnalysisJob) -> QueueResult<String> {
        self.queue
            .enqueue(Self::envelope(QueueJob::Analysis(job)))
            .await
    }

    /// Submit an extraction job.
    pub async fn submit_extraction(&self, job: ExtractionJob) -> QueueResult<String> {
        self.queue
            .enqueue(Self::envelope(QueueJob::Extraction(job)))
            .await
    }

    /// Submit a render job, enforcing one active render per project.
    ///
    /// The project lock is taken before the job enters the queue and held
    /// until the render reaches a terminal status; a rejected submission
    /// returns `EnqueueFailed` without touching the stream.
    pub async fn submit_render(&self, job: RenderJob) -> QueueResult<String> {
        let project_id = job.project_id.to_string();

        if !self.queue.acquire_render_lock(&project_id).await? {
            return Err(QueueError::enqueue_failed(format!(
                "project {} already has an active render",
                project_id
            )));
        }

        match self.queue.enqueue(Self::envelope(QueueJob::Render(job))).await {
            Ok(id) => Ok(id),
            Err(e) => {
                // Do not hold the lock for a job that never enqueued
                self.queue.release_render_lock(&project_id).await.ok();
                Err(e)
            }
        }
    }

    /// Submit a publish job, optionally delayed until `scheduled_at`.
    pub async fn submit_publish(
        &self,
        job: PublishJob,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> QueueResult<()> {
        let envelope = Self::envelope(QueueJob::Publish(job));

        match scheduled_at {
            Some(at) if at > Utc::now() => {
                let delay = (at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::from_secs(0));
                info!(
                    "Scheduling publish job {} for {}",
                    envelope.job.job_id(),
                    at
                );
                self.queue.enqueue_delayed(envelope, delay).await
            }
            _ => {
                self.queue.enqueue(envelope).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_policies() {
        let publish = LanePolicy::for_lane(Lane::Publish);
        assert_eq!(publish.max_attempts, 3);
        assert_eq!(publish.backoff_initial_ms, 2000);

        let render = LanePolicy::for_lane(Lane::Render);
        assert_eq!(render.max_attempts, 2);

        let intake = LanePolicy::for_lane(Lane::Intake);
        assert_eq!(intake.max_attempts, 3);
        assert_eq!(intake.backoff_initial_ms, 1000);
    }
}
