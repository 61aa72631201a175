//! Worker configuration.

use std::time::Duration;

use vforge_queue::Lane;

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent jobs per lane
    pub intake_concurrency: usize,
    pub analysis_concurrency: usize,
    pub extraction_concurrency: usize,
    /// Renders are serialized process-wide
    pub render_concurrency: usize,
    pub publish_concurrency: usize,
    /// Minimum interval between external fetch calls across all intake jobs
    pub fetch_min_interval: Duration,
    /// Maximum frames sampled per analysis job
    pub frame_cap: usize,
    /// Internal timeout handed to the render CLI
    pub render_timeout: Duration,
    /// Validity of presigned artifact URLs
    pub presign_ttl: Duration,
    /// Work directory for temporary files
    pub work_dir: String,
    /// How often delayed jobs are promoted into their lane stream
    pub promote_interval: Duration,
    /// How often to scan for stale in-flight jobs
    pub claim_interval: Duration,
    /// Minimum idle time before an in-flight job can be claimed
    pub claim_min_idle: Duration,
    /// Graceful shutdown drain timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            intake_concurrency: 3,
            analysis_concurrency: 2,
            extraction_concurrency: 2,
            render_concurrency: 1,
            publish_concurrency: 2,
            fetch_min_interval: Duration::from_secs(2),
            frame_cap: 20,
            render_timeout: Duration::from_secs(600),
            presign_ttl: Duration::from_secs(24 * 3600),
            work_dir: "/tmp/vforge".to_string(),
            promote_interval: Duration::from_secs(1),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            intake_concurrency: env_usize("WORKER_INTAKE_CONCURRENCY", 3),
            analysis_concurrency: env_usize("WORKER_ANALYSIS_CONCURRENCY", 2),
            extraction_concurrency: env_usize("WORKER_EXTRACTION_CONCURRENCY", 2),
            render_concurrency: env_usize("WORKER_RENDER_CONCURRENCY", 1),
            publish_concurrency: env_usize("WORKER_PUBLISH_CONCURRENCY", 2),
            fetch_min_interval: env_secs("WORKER_FETCH_MIN_INTERVAL_SECS", 2),
            frame_cap: env_usize("WORKER_FRAME_CAP", 20),
            render_timeout: env_secs("WORKER_RENDER_TIMEOUT_SECS", 600),
            presign_ttl: env_secs("WORKER_PRESIGN_TTL_SECS", 24 * 3600),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            promote_interval: env_secs("WORKER_PROMOTE_INTERVAL_SECS", 1),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS", 30),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS", 300),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT_SECS", 60),
        }
    }

    /// Pool size for a lane.
    pub fn concurrency(&self, lane: Lane) -> usize {
        match lane {
            Lane::Intake => self.intake_concurrency,
            Lane::Analysis => self.analysis_concurrency,
            Lane::Extraction => self.extraction_concurrency,
            Lane::Render => self.render_concurrency,
            Lane::Publish => self.publish_concurrency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lane_concurrency() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency(Lane::Intake), 3);
        assert_eq!(config.concurrency(Lane::Analysis), 2);
        assert_eq!(config.concurrency(Lane::Extraction), 2);
        assert_eq!(config.concurrency(Lane::Render), 1);
        assert_eq!(config.concurrency(Lane::Publish), 2);
    }
}
