//! Job types and the queue envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vforge_models::{
    JobId, Platform, ProjectId, PublishLogId, RenderId, SocialAccountId, TemplateId, VideoId,
};

/// Pipeline lane a job runs in. One Redis stream per lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Intake,
    Analysis,
    Extraction,
    Render,
    Publish,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Intake => "intake",
            Lane::Analysis => "analysis",
            Lane::Extraction => "extraction",
            Lane::Render => "render",
            Lane::Publish => "publish",
        }
    }

    /// All lanes, in pipeline order.
    pub const ALL: [Lane; 5] = [
        Lane::Intake,
        Lane::Analysis,
        Lane::Extraction,
        Lane::Render,
        Lane::Publish,
    ];
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job to fetch a source video and store it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    /// Source URL to fetch
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

impl IntakeJob {
    pub fn new(video_id: VideoId, source_url: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            source_url: source_url.into(),
            created_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("intake:{}", self.video_id)
    }
}

/// Job to sample frames and run vision analysis on a ready video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    pub created_at: DateTime<Utc>,
}

impl AnalysisJob {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            created_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("analysis:{}", self.video_id)
    }
}

/// Job to derive a template schema from a video's analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    /// Pre-created draft template to fill in
    pub template_id: TemplateId,
    /// Auto-publish the template when the quality score reaches this
    /// threshold (inclusive). None leaves it as a draft.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_seed_threshold: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ExtractionJob {
    pub fn new(video_id: VideoId, template_id: TemplateId) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            template_id,
            auto_seed_threshold: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_auto_seed_threshold(mut self, threshold: f64) -> Self {
        self.auto_seed_threshold = Some(threshold);
        self
    }

    pub fn idempotency_key(&self) -> String {
        format!("extraction:{}", self.template_id)
    }
}

/// Job to render a project through the external renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub job_id: JobId,
    pub render_id: RenderId,
    pub project_id: ProjectId,
    pub template_id: TemplateId,
    /// Filled slot values keyed by slot id; the render worker
    /// materializes the full prop document from these
    pub slot_fills: serde_json::Map<String, serde_json::Value>,
    pub duration_seconds: f64,
    pub fps: f64,
    pub created_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn new(
        render_id: RenderId,
        project_id: ProjectId,
        template_id: TemplateId,
        slot_fills: serde_json::Map<String, serde_json::Value>,
        duration_seconds: f64,
        fps: f64,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            render_id,
            project_id,
            template_id,
            slot_fills,
            duration_seconds,
            fps,
            created_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        format!("render:{}", self.render_id)
    }
}

/// Job to publish a finished render to a social platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishJob {
    pub job_id: JobId,
    pub publish_log_id: PublishLogId,
    pub render_id: RenderId,
    pub social_account_id: SocialAccountId,
    pub platform: Platform,
    /// Caption attached to the post
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PublishJob {
    pub fn new(
        publish_log_id: PublishLogId,
        render_id: RenderId,
        social_account_id: SocialAccountId,
        platform: Platform,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            publish_log_id,
            render_id,
            social_account_id,
            platform,
            caption: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn idempotency_key(&self) -> String {
        format!("publish:{}", self.publish_log_id)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    Intake(IntakeJob),
    Analysis(AnalysisJob),
    Extraction(ExtractionJob),
    Render(RenderJob),
    Publish(PublishJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::Intake(j) => &j.job_id,
            QueueJob::Analysis(j) => &j.job_id,
            QueueJob::Extraction(j) => &j.job_id,
            QueueJob::Render(j) => &j.job_id,
            QueueJob::Publish(j) => &j.job_id,
        }
    }

    /// Lane this job runs in.
    pub fn lane(&self) -> Lane {
        match self {
            QueueJob::Intake(_) => Lane::Intake,
            QueueJob::Analysis(_) => Lane::Analysis,
            QueueJob::Extraction(_) => Lane::Extraction,
            QueueJob::Render(_) => Lane::Render,
            QueueJob::Publish(_) => Lane::Publish,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::Intake(j) => j.idempotency_key(),
            QueueJob::Analysis(j) => j.idempotency_key(),
            QueueJob::Extraction(j) => j.idempotency_key(),
            QueueJob::Render(j) => j.idempotency_key(),
            QueueJob::Publish(j) => j.idempotency_key(),
        }
    }
}

/// Wire envelope around a job.
///
/// Carries the retry state so a redelivered job knows which attempt it is
/// without any out-of-band counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job: QueueJob,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    /// Initial backoff, doubled per failed attempt
    pub backoff_initial_ms: u64,
    pub enqueued_at: DateTime<Utc>,
}

impl JobEnvelope {
    pub fn new(job: QueueJob, max_attempts: u32, backoff_initial_ms: u64) -> Self {
        Self {
            job,
            attempt: 1,
            max_attempts,
            backoff_initial_ms,
            enqueued_at: Utc::now(),
        }
    }

    /// True when another retry is allowed after this attempt fails.
    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Backoff before the next attempt: initial * 2^(attempt-1).
    pub fn next_delay_ms(&self) -> u64 {
        self.backoff_initial_ms
            .saturating_mul(2u64.saturating_pow(self.attempt.saturating_sub(1)))
    }

    /// The envelope to enqueue for the retry.
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self.enqueued_at = Utc::now();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_backoff_doubles() {
        let job = QueueJob::Analysis(AnalysisJob::new(VideoId::new()));
        let env = JobEnvelope::new(job, 3, 1000);
        assert_eq!(env.attempt, 1);
        assert_eq!(env.next_delay_ms(), 1000);

        let env = env.next_attempt();
        assert_eq!(env.attempt, 2);
        assert_eq!(env.next_delay_ms(), 2000);

        let env = env.next_attempt();
        assert!(!env.has_attempts_left());
    }

    #[test]
    fn idempotency_keys_are_stable() {
        let video_id = VideoId::from_string("v-1");
        let a = AnalysisJob::new(video_id.clone());
        let b = AnalysisJob::new(video_id);
        // Different job_id, same dedup key
        assert_ne!(a.job_id, b.job_id);
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_eq!(a.idempotency_key(), "analysis:v-1");
    }

    #[test]
    fn envelope_serde_roundtrip() {
        let job = QueueJob::Publish(
            PublishJob::new(
                PublishLogId::new(),
                RenderId::new(),
                SocialAccountId::new(),
                Platform::Tiktok,
            )
            .with_caption("hello"),
        );
        let env = JobEnvelope::new(job, 3, 2000);

        let json = serde_json::to_string(&env).expect("serialize envelope");
        let decoded: JobEnvelope = serde_json::from_str(&json).expect("deserialize envelope");

        assert_eq!(decoded.attempt, 1);
        assert_eq!(decoded.max_attempts, 3);
        match decoded.job {
            QueueJob::Publish(j) => {
                assert_eq!(j.platform, Platform::Tiktok);
                assert_eq!(j.caption.as_deref(), Some("hello"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn jobs_map_to_their_lane() {
        let intake = QueueJob::Intake(IntakeJob::new(VideoId::new(), "https://example.com/v"));
        assert_eq!(intake.lane(), Lane::Intake);

        let render = QueueJob::Render(RenderJob::new(
            RenderId::new(),
            ProjectId::new(),
            TemplateId::new(),
            serde_json::Map::new(),
            15.0,
            30.0,
        ));
        assert_eq!(render.lane(), Lane::Render);
    }
}
