//! Intake worker: fetch a source video and store it.

use vforge_models::VideoStatus;
use vforge_queue::{IntakeJob, Lane};
use vforge_storage::source_video_key;

use crate::context::WorkerContext;
use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Fixed keyword list tags are derived from.
const TAG_KEYWORDS: &[&str] = &[
    "dance", "food", "travel", "fitness", "fashion", "beauty", "funny", "music", "pets", "gaming",
    "diy", "sports", "recipe", "workout", "tutorial",
];

/// Case-insensitive substring match of the title against the keyword list.
pub fn derive_tags(title: &str) -> Vec<String> {
    let lower = title.to_lowercase();
    TAG_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .map(|kw| kw.to_string())
        .collect()
}

/// Run an intake job. On a retriable failure the video stays at Fetching
/// so the retry re-enters there; the executor persists terminal failures.
pub async fn run(ctx: &WorkerContext, job: &IntakeJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&job.job_id, Lane::Intake);
    logger.log_start(&format!("fetching {}", job.source_url));

    ctx.store
        .videos
        .set_status(&job.video_id, VideoStatus::Fetching)
        .await?;

    let workdir = ctx.job_workdir(&format!("intake_{}", job.video_id));
    tokio::fs::create_dir_all(&workdir).await?;

    let result = fetch_and_store(ctx, job, &logger, &workdir).await;

    // Scratch space must not leak across jobs
    if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
        logger.log_warning(&format!("workdir cleanup failed: {}", e));
    }

    result
}

async fn fetch_and_store(
    ctx: &WorkerContext,
    job: &IntakeJob,
    logger: &JobLogger,
    workdir: &std::path::Path,
) -> WorkerResult<()> {
    // One external fetch per window, across the whole pool
    ctx.throttle.acquire().await;

    let media_path = workdir.join("source.mp4");
    let metadata = ctx.fetcher.fetch(&job.source_url, &media_path).await?;
    logger.log_progress(&format!("fetched \"{}\"", metadata.title));

    let key = source_video_key(&job.video_id);
    ctx.blobs.upload_file(&media_path, &key).await?;
    logger.log_progress(&format!("stored source at {}", key));

    let tags = derive_tags(&metadata.title);

    ctx.store
        .videos
        .mark_ready(
            &job.video_id,
            &key,
            metadata.canonical_url.as_deref(),
            Some(&metadata.title),
            metadata.duration_seconds,
            &tags,
        )
        .await?;

    logger.log_completion(&format!("video {} ready ({} tags)", job.video_id, tags.len()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_case_insensitively() {
        let tags = derive_tags("Epic DANCE Workout Tutorial!!");
        assert_eq!(tags, vec!["dance", "workout", "tutorial"]);
    }

    #[test]
    fn tags_match_substrings() {
        // "food" inside "seafood" still counts; the list is a blunt filter
        assert_eq!(derive_tags("Best seafood in town"), vec!["food"]);
    }

    #[test]
    fn unmatched_title_yields_no_tags() {
        assert!(derive_tags("Quarterly earnings call").is_empty());
    }
}
