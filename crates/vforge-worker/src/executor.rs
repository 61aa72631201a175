//! Job executor: lane consumer loops, outcome handling, and shutdown.
//!
//! Handlers only perform success-path writes. Every error lands here,
//! gets classified, and the executor alone decides between retry, dead
//! letter, and terminal persistence. That keeps the three-way outcome
//! in one place instead of scattered across handlers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vforge_queue::{JobEnvelope, Lane, QueueJob};

use crate::classifier::classify;
use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::{analysis_job, extraction_job, intake_job, publish_job, render_job};

const CONSUME_BLOCK_MS: u64 = 1000;
const CONSUME_BATCH: usize = 5;
const PROMOTE_BATCH: usize = 10;
const CLAIM_BATCH: usize = 5;

/// Drives the per-lane worker pools against the queue.
pub struct JobExecutor {
    ctx: Arc<WorkerContext>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self {
            ctx,
            consumer_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Run until `shutdown` flips, then drain in-flight jobs.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> WorkerResult<()> {
        self.ctx.queue.init().await?;
        info!("Worker {} starting", self.consumer_name);

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(promote_loop(
            self.ctx.clone(),
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(claim_loop(
            self.ctx.clone(),
            self.consumer_name.clone(),
            shutdown.clone(),
        )));

        for lane in Lane::ALL {
            tasks.push(tokio::spawn(lane_loop(
                self.ctx.clone(),
                lane,
                self.consumer_name.clone(),
                shutdown.clone(),
            )));
        }

        for task in tasks {
            if let Err(e) = task.await {
                error!("Worker task panicked: {}", e);
            }
        }

        info!("Worker {} stopped", self.consumer_name);
        Ok(())
    }
}

/// Periodically promote due delayed jobs into their lane streams.
async fn promote_loop(ctx: Arc<WorkerContext>, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(ctx.config.promote_interval);
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.changed() => return,
        }
        for lane in Lane::ALL {
            match ctx.queue.promote_due(lane, PROMOTE_BATCH).await {
                Ok(0) => {}
                Ok(n) => debug!("Promoted {} delayed jobs on lane {}", n, lane),
                Err(e) => warn!("Promotion failed on lane {}: {}", lane, e),
            }
        }
    }
}

/// Periodically steal in-flight jobs abandoned by crashed workers.
async fn claim_loop(
    ctx: Arc<WorkerContext>,
    consumer_name: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(ctx.config.claim_interval);
    let min_idle_ms = ctx.config.claim_min_idle.as_millis() as u64;
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.changed() => return,
        }
        for lane in Lane::ALL {
            let claimed = match ctx
                .queue
                .claim_stale(lane, &consumer_name, min_idle_ms, CLAIM_BATCH)
                .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    warn!("Stale claim failed on lane {}: {}", lane, e);
                    continue;
                }
            };
            for (message_id, envelope) in claimed {
                execute_job(ctx.clone(), lane, message_id, envelope).await;
            }
        }
    }
}

/// Consume one lane with a bounded pool until shutdown, then drain.
async fn lane_loop(
    ctx: Arc<WorkerContext>,
    lane: Lane,
    consumer_name: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let concurrency = ctx.config.concurrency(lane).max(1);
    let pool = Arc::new(Semaphore::new(concurrency));
    info!("Lane {} consuming with {} slots", lane, concurrency);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let permit = tokio::select! {
            permit = pool.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                // Closed only happens on teardown
                Err(_) => break,
            },
            _ = shutdown.changed() => break,
        };

        let batch = match ctx
            .queue
            .consume(lane, &consumer_name, CONSUME_BLOCK_MS, 1)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Consume failed on lane {}: {}", lane, e);
                drop(permit);
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let Some((message_id, envelope)) = batch.into_iter().next() else {
            drop(permit);
            continue;
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            execute_job(ctx, lane, message_id, envelope).await;
            drop(permit);
        });
    }

    // Drain: wait for in-flight jobs, bounded by the shutdown timeout
    let drained = tokio::time::timeout(
        ctx.config.shutdown_timeout,
        pool.acquire_many(concurrency as u32),
    )
    .await;
    match drained {
        Ok(_) => info!("Lane {} drained", lane),
        Err(_) => warn!(
            "Lane {} still had in-flight jobs after {}s, abandoning them",
            lane,
            ctx.config.shutdown_timeout.as_secs()
        ),
    }
}

/// Run one delivery to its outcome.
async fn execute_job(
    ctx: Arc<WorkerContext>,
    lane: Lane,
    message_id: String,
    envelope: JobEnvelope,
) {
    let job_id = envelope.job.job_id().to_string();
    let idempotency_key = envelope.job.idempotency_key();

    let result = dispatch(&ctx, &envelope.job).await;

    match result {
        Ok(()) => {
            metrics::counter!("worker_jobs_total", "lane" => lane.as_str(), "outcome" => "success")
                .increment(1);
            release_render_lock(&ctx, &envelope.job).await;
            finish_delivery(&ctx, lane, &message_id, &idempotency_key).await;
        }
        Err(e) => {
            let class = classify(&e);
            if class.retriable && envelope.has_attempts_left() {
                metrics::counter!("worker_jobs_total", "lane" => lane.as_str(), "outcome" => "retry")
                    .increment(1);
                match ctx.queue.retry(lane, &message_id, envelope).await {
                    Ok(delay) => warn!(
                        job_id = %job_id, lane = %lane, code = class.code,
                        "Job failed, retrying in {:?}: {}", delay, e
                    ),
                    Err(qe) => error!(
                        job_id = %job_id, lane = %lane,
                        "Failed to stage retry, delivery will go stale: {}", qe
                    ),
                }
            } else {
                let outcome = if class.retriable { "exhausted" } else { "terminal" };
                metrics::counter!("worker_jobs_total", "lane" => lane.as_str(), "outcome" => outcome)
                    .increment(1);
                error!(
                    job_id = %job_id, lane = %lane, code = class.code,
                    "Job failed terminally ({}): {}", outcome, e
                );

                persist_failure(&ctx, &envelope.job, class.code, &e).await;
                release_render_lock(&ctx, &envelope.job).await;

                if class.retriable {
                    // Attempts exhausted: park the delivery for an operator
                    if let Err(qe) = ctx.queue.dlq(lane, &message_id, &envelope, &e.to_string()).await
                    {
                        error!(job_id = %job_id, "Failed to dead letter job: {}", qe);
                    }
                    clear_dedup(&ctx, &idempotency_key).await;
                } else {
                    finish_delivery(&ctx, lane, &message_id, &idempotency_key).await;
                }
            }
        }
    }
}

async fn dispatch(ctx: &WorkerContext, job: &QueueJob) -> WorkerResult<()> {
    match job {
        QueueJob::Intake(j) => intake_job::run(ctx, j).await,
        QueueJob::Analysis(j) => analysis_job::run(ctx, j).await,
        QueueJob::Extraction(j) => extraction_job::run(ctx, j).await,
        QueueJob::Render(j) => render_job::run(ctx, j).await,
        QueueJob::Publish(j) => publish_job::run(ctx, j).await,
    }
}

/// Ack the delivery and release its dedup key.
async fn finish_delivery(ctx: &WorkerContext, lane: Lane, message_id: &str, idempotency_key: &str) {
    if let Err(e) = ctx.queue.ack(lane, message_id).await {
        warn!("Failed to ack {} on lane {}: {}", message_id, lane, e);
    }
    clear_dedup(ctx, idempotency_key).await;
}

async fn clear_dedup(ctx: &WorkerContext, idempotency_key: &str) {
    if let Err(e) = ctx.queue.clear_dedup(idempotency_key).await {
        // The key expires on its own, a resubmit is just delayed
        debug!("Failed to clear dedup key {}: {}", idempotency_key, e);
    }
}

/// Renders hold a per-project lock from submission; release it on any
/// final outcome. Deleting an already-released lock is harmless.
async fn release_render_lock(ctx: &WorkerContext, job: &QueueJob) {
    if let QueueJob::Render(j) = job {
        if let Err(e) = ctx.queue.release_render_lock(j.project_id.as_str()).await {
            warn!(
                "Failed to release render lock for project {}: {}",
                j.project_id, e
            );
        }
    }
}

/// Write the terminal failure onto the entity the job was advancing.
/// Repos skip writes against already-terminal rows, so a racing
/// duplicate delivery cannot clobber a finished record.
async fn persist_failure(ctx: &WorkerContext, job: &QueueJob, code: &str, error: &WorkerError) {
    let message = error.to_string();
    let result = match job {
        QueueJob::Intake(j) => ctx.store.videos.mark_failed(&j.video_id, &message).await,
        QueueJob::Analysis(j) => {
            ctx.store
                .videos
                .mark_analysis_failed(&j.video_id, &message)
                .await
        }
        QueueJob::Extraction(j) => {
            ctx.store
                .templates
                .mark_failed(&j.template_id, code, &message)
                .await
        }
        QueueJob::Render(j) => {
            let render = ctx
                .store
                .renders
                .mark_failed(&j.render_id, code, &message)
                .await;
            if render.is_ok() {
                if let Err(e) = ctx
                    .store
                    .projects
                    .set_status(&j.project_id, "render_failed")
                    .await
                {
                    warn!("Failed to flag project {} render failure: {}", j.project_id, e);
                }
            }
            render
        }
        QueueJob::Publish(j) => {
            ctx.store
                .publish_logs
                .mark_failed(&j.publish_log_id, code, &message)
                .await
        }
    };

    if let Err(e) = result {
        error!(
            job_id = %job.job_id(),
            "Failed to persist terminal failure ({}): {}",
            code, e
        );
    }
}
