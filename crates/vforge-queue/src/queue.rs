//! Job queue over Redis Streams with per-lane delivery.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{JobEnvelope, Lane};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Key prefix for all queue keys
    pub prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dedup key TTL
    pub dedup_ttl: Duration,
    /// TTL of the per-project render lock
    pub render_lock_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            prefix: "vforge".to_string(),
            consumer_group: "vforge:workers".to_string(),
            dedup_ttl: Duration::from_secs(3600),
            // Covers the longest plausible render plus scheduling slack
            render_lock_ttl: Duration::from_secs(2 * 3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            prefix: std::env::var("QUEUE_PREFIX").unwrap_or(defaults.prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dedup_ttl: Duration::from_secs(
                std::env::var("QUEUE_DEDUP_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            render_lock_ttl: Duration::from_secs(
                std::env::var("QUEUE_RENDER_LOCK_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2 * 3600),
            ),
        }
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    fn stream_key(&self, lane: Lane) -> String {
        format!("{}:jobs:{}", self.config.prefix, lane)
    }

    fn delayed_key(&self, lane: Lane) -> String {
        format!("{}:delayed:{}", self.config.prefix, lane)
    }

    fn dlq_key(&self) -> String {
        format!("{}:dlq", self.config.prefix)
    }

    fn dedup_key(&self, idempotency_key: &str) -> String {
        format!("{}:dedup:{}", self.config.prefix, idempotency_key)
    }

    fn render_lock_key(&self, project_id: &str) -> String {
        format!("{}:render_active:{}", self.config.prefix, project_id)
    }

    /// Initialize all lane streams and their consumer group.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for lane in Lane::ALL {
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(self.stream_key(lane))
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!("Created consumer group for lane {}", lane),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists for lane {}", lane);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Enqueue a fresh job, rejecting duplicates by idempotency key.
    pub async fn enqueue(&self, envelope: JobEnvelope) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let idempotency_key = envelope.job.idempotency_key();
        let dedup_key = self.dedup_key(&idempotency_key);
        let exists: bool = conn.exists(&dedup_key).await?;
        if exists {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let lane = envelope.job.lane();
        let payload = serde_json::to_string(&envelope)?;

        let message_id: String = redis::cmd("XADD")
            .arg(self.stream_key(lane))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        conn.set_ex::<_, _, ()>(&dedup_key, "1", self.config.dedup_ttl.as_secs())
            .await?;

        metrics::counter!("queue_enqueued_total", "lane" => lane.as_str()).increment(1);
        info!(
            "Enqueued job {} on lane {} with message ID {}",
            envelope.job.job_id(),
            lane,
            message_id
        );

        Ok(message_id)
    }

    /// Drop the dedup marker for a completed job so the same entity can be
    /// resubmitted without waiting out the TTL.
    pub async fn clear_dedup(&self, idempotency_key: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(self.dedup_key(idempotency_key)).await?;
        Ok(())
    }

    /// Stage a job for delivery after `delay`. Bypasses dedup, used for
    /// retries and scheduled publishes.
    pub async fn enqueue_delayed(
        &self,
        envelope: JobEnvelope,
        delay: Duration,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let lane = envelope.job.lane();
        let payload = serde_json::to_string(&envelope)?;
        let ready_at_ms = chrono::Utc::now().timestamp_millis() as u64 + delay.as_millis() as u64;

        conn.zadd::<_, _, _, ()>(self.delayed_key(lane), &payload, ready_at_ms)
            .await?;

        debug!(
            "Staged job {} on lane {} for delivery in {}ms",
            envelope.job.job_id(),
            lane,
            delay.as_millis()
        );
        Ok(())
    }

    /// Move due delayed jobs into their lane stream. Returns the number
    /// promoted.
    pub async fn promote_due(&self, lane: Lane, limit: usize) -> QueueResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        let delayed_key = self.delayed_key(lane);

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&delayed_key)
            .arg("-inf")
            .arg(now_ms)
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0;
        for payload in due {
            // Remove before XADD so two promoters cannot both deliver it
            let removed: u32 = conn.zrem(&delayed_key, &payload).await?;
            if removed == 0 {
                continue;
            }

            redis::cmd("XADD")
                .arg(self.stream_key(lane))
                .arg("*")
                .arg("job")
                .arg(&payload)
                .query_async::<()>(&mut conn)
                .await?;
            promoted += 1;
        }

        if promoted > 0 {
            metrics::counter!("queue_promoted_total", "lane" => lane.as_str())
                .increment(promoted as u64);
            debug!("Promoted {} delayed jobs on lane {}", promoted, lane);
        }
        Ok(promoted)
    }

    /// Acknowledge a job (mark as completed) and drop it from the stream.
    pub async fn ack(&self, lane: Lane, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = self.stream_key(lane);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job {} on lane {}", message_id, lane);
        Ok(())
    }

    /// Ack the failed delivery and stage the next attempt with backoff.
    /// Returns the delay applied.
    pub async fn retry(
        &self,
        lane: Lane,
        message_id: &str,
        envelope: JobEnvelope,
    ) -> QueueResult<Duration> {
        let delay = Duration::from_millis(envelope.next_delay_ms());
        let next = envelope.next_attempt();

        self.enqueue_delayed(next, delay).await?;
        self.ack(lane, message_id).await?;

        metrics::counter!("queue_retries_total", "lane" => lane.as_str()).increment(1);
        Ok(delay)
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(
        &self,
        lane: Lane,
        message_id: &str,
        envelope: &JobEnvelope,
        error: &str,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(envelope)?;

        redis::cmd("XADD")
            .arg(self.dlq_key())
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("lane")
            .arg(lane.as_str())
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(lane, message_id).await?;

        metrics::counter!("queue_dlq_total", "lane" => lane.as_str()).increment(1);
        warn!(
            "Moved job {} on lane {} to DLQ: {}",
            envelope.job.job_id(),
            lane,
            error
        );
        Ok(())
    }

    /// Consume jobs from a lane. Returns (message_id, envelope) pairs.
    pub async fn consume(
        &self,
        lane: Lane,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, JobEnvelope)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(self.stream_key(lane))
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<JobEnvelope>(&payload_str) {
                        Ok(envelope) => {
                            debug!("Consumed job {} from lane {}", envelope.job.job_id(), lane);
                            jobs.push((message_id, envelope));
                        }
                        Err(e) => {
                            warn!("Failed to parse job payload on lane {}: {}", lane, e);
                            // Ack the malformed message to prevent reprocessing
                            self.ack(lane, &message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Claim pending jobs idle longer than `min_idle_ms`, e.g. from a
    /// crashed worker.
    pub async fn claim_stale(
        &self,
        lane: Lane,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, JobEnvelope)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = self.stream_key(lane);

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let result: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for entry in result.ids {
            let message_id = entry.id.clone();

            if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                let payload_str = String::from_utf8_lossy(payload);
                match serde_json::from_str::<JobEnvelope>(&payload_str) {
                    Ok(envelope) => {
                        info!(
                            "Claimed stale job {} on lane {}",
                            envelope.job.job_id(),
                            lane
                        );
                        jobs.push((message_id, envelope));
                    }
                    Err(e) => {
                        warn!("Failed to parse claimed job payload: {}", e);
                        self.ack(lane, &message_id).await.ok();
                    }
                }
            }
        }

        Ok(jobs)
    }

    /// Lane stream length.
    pub async fn len(&self, lane: Lane) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.stream_key(lane)).await?;
        Ok(len)
    }

    /// Number of jobs staged for delayed delivery on a lane.
    pub async fn delayed_len(&self, lane: Lane) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.zcard(self.delayed_key(lane)).await?;
        Ok(len)
    }

    /// DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.dlq_key()).await?;
        Ok(len)
    }

    /// Try to take the single-flight render lock for a project.
    ///
    /// Returns false when another render for the project is already
    /// pending or processing. The TTL guards against a crashed worker
    /// leaking the lock forever.
    pub async fn acquire_render_lock(&self, project_id: &str) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let acquired: Option<String> = redis::cmd("SET")
            .arg(self.render_lock_key(project_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.render_lock_ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        Ok(acquired.is_some())
    }

    /// Release the render lock once the render reaches a terminal status.
    pub async fn release_render_lock(&self, project_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(self.render_lock_key(project_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let queue = JobQueue::new(QueueConfig::default()).unwrap();
        assert_eq!(queue.stream_key(Lane::Render), "vforge:jobs:render");
        assert_eq!(queue.delayed_key(Lane::Publish), "vforge:delayed:publish");
        assert_eq!(queue.dlq_key(), "vforge:dlq");
        assert_eq!(queue.dedup_key("intake:v-1"), "vforge:dedup:intake:v-1");
        assert_eq!(queue.render_lock_key("p-1"), "vforge:render_active:p-1");
    }

    #[test]
    fn default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.dedup_ttl, Duration::from_secs(3600));
        assert_eq!(config.render_lock_ttl, Duration::from_secs(7200));
    }
}
