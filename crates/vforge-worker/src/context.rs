//! Shared dependencies for job handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use vforge_queue::JobQueue;
use vforge_social::{InstagramClient, InstagramConfig, TikTokClient, TikTokConfig, TokenSealer};
use vforge_storage::BlobClient;
use vforge_store::Store;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::fetch::FetchClient;
use crate::model::ModelClient;
use crate::rate_limit::FetchThrottle;

/// TikTok app credentials used for token refresh.
#[derive(Debug, Clone)]
pub struct TikTokAppCredentials {
    pub client_key: String,
    pub client_secret: String,
}

impl TikTokAppCredentials {
    /// Load from `TIKTOK_CLIENT_KEY` / `TIKTOK_CLIENT_SECRET`. Absent
    /// credentials disable TikTok token refresh, not publishing.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            client_key: std::env::var("TIKTOK_CLIENT_KEY").ok()?,
            client_secret: std::env::var("TIKTOK_CLIENT_SECRET").ok()?,
        })
    }
}

/// Everything a job handler needs, built once at startup.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub store: Store,
    pub blobs: BlobClient,
    pub queue: Arc<JobQueue>,
    pub model: ModelClient,
    pub sealer: TokenSealer,
    pub instagram: InstagramClient,
    pub tiktok: TikTokClient,
    pub tiktok_app: Option<TikTokAppCredentials>,
    pub fetcher: FetchClient,
    pub throttle: FetchThrottle,
    /// Explicit process-wide render serialization, in addition to the
    /// render lane's concurrency of 1
    pub render_gate: Mutex<()>,
}

impl WorkerContext {
    /// Build the full context from the environment.
    pub async fn from_env(config: WorkerConfig) -> WorkerResult<Self> {
        let throttle = FetchThrottle::new(config.fetch_min_interval);
        // Generous fetch budget; short-form sources are small
        let fetcher = FetchClient::new(Duration::from_secs(300))?;

        Ok(Self {
            store: Store::from_env().await?,
            blobs: BlobClient::from_env()?,
            queue: Arc::new(JobQueue::from_env()?),
            model: ModelClient::from_env()?,
            sealer: TokenSealer::from_env()?,
            instagram: InstagramClient::new(InstagramConfig::default()),
            tiktok: TikTokClient::new(TikTokConfig::default()),
            tiktok_app: TikTokAppCredentials::from_env(),
            fetcher,
            throttle,
            render_gate: Mutex::new(()),
            config,
        })
    }

    /// Per-job scratch directory under the configured work dir.
    pub fn job_workdir(&self, name: &str) -> PathBuf {
        PathBuf::from(&self.config.work_dir).join(name)
    }
}
