//! Publish worker: push a finished render to a linked social account.
//!
//! Preconditions are checked before any network call so a misconfigured
//! job fails terminally without burning platform rate limits.

use std::time::Duration;

use chrono::Utc;

use vforge_models::{Platform, RenderStatus, SocialAccount};
use vforge_queue::{Lane, PublishJob};

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Refresh the access token when it expires within this margin.
const REFRESH_MARGIN_SECS: i64 = 600;

/// Presign TTL for the URL handed to Instagram's ingest.
const INSTAGRAM_URL_TTL: Duration = Duration::from_secs(3600);

/// Run a publish job.
pub async fn run(ctx: &WorkerContext, job: &PublishJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&job.job_id, Lane::Publish);
    logger.log_start(&format!(
        "publishing render {} to {} account {}",
        job.render_id, job.platform, job.social_account_id
    ));

    let log = ctx
        .store
        .publish_logs
        .get(&job.publish_log_id)
        .await?
        .ok_or_else(|| {
            WorkerError::job_failed(format!("publish log {} not found", job.publish_log_id))
        })?;
    if log.status.is_terminal() {
        logger.log_warning("publish log already terminal, nothing to do");
        return Ok(());
    }

    let render = ctx
        .store
        .renders
        .get(&job.render_id)
        .await?
        .ok_or_else(|| WorkerError::job_failed(format!("render {} not found", job.render_id)))?;
    if render.status != RenderStatus::Done {
        return Err(WorkerError::InvalidRequest(format!(
            "render {} is {}, not publishable",
            job.render_id, render.status
        )));
    }
    let output_key = render.output_key.as_deref().ok_or_else(|| {
        WorkerError::InvalidRequest(format!("render {} has no stored output", job.render_id))
    })?;

    let account = ctx
        .store
        .social_accounts
        .get(&job.social_account_id)
        .await?
        .ok_or_else(|| {
            WorkerError::AuthFailed(format!("account {} not found", job.social_account_id))
        })?;
    if !account.is_active {
        return Err(WorkerError::AuthFailed(format!(
            "account {} is deactivated",
            job.social_account_id
        )));
    }

    ctx.store.publish_logs.mark_uploading(&job.publish_log_id).await?;

    let access_token = fresh_access_token(ctx, &logger, &account).await?;

    let external_id = match job.platform {
        Platform::Instagram => {
            // Instagram ingests by URL; hand it a time-limited one
            let url = ctx.blobs.presign_get(output_key, INSTAGRAM_URL_TTL).await?;
            ctx.instagram
                .publish(
                    &access_token,
                    &account.platform_user_id,
                    &url,
                    job.caption.as_deref(),
                )
                .await?
        }
        Platform::Tiktok => {
            let video = ctx.blobs.download_bytes(output_key).await?;
            logger.log_progress(&format!("uploading {} bytes to tiktok", video.len()));
            ctx.tiktok
                .publish(&access_token, &video, job.caption.as_deref())
                .await?
        }
    };

    ctx.store
        .publish_logs
        .mark_published(&job.publish_log_id, &external_id)
        .await?;

    logger.log_completion(&format!("published as {}", external_id));
    Ok(())
}

/// Unseal the account's access token, refreshing it first when it is
/// about to expire. Refreshed tokens are sealed and written back before
/// use, so a crash after refresh does not strand a stale token.
async fn fresh_access_token(
    ctx: &WorkerContext,
    logger: &JobLogger,
    account: &SocialAccount,
) -> WorkerResult<String> {
    let access_token = ctx.sealer.unseal(&account.access_token_sealed)?;

    if !account.token_needs_refresh(REFRESH_MARGIN_SECS) {
        return Ok(access_token);
    }
    logger.log_progress("access token near expiry, refreshing");

    match account.platform {
        Platform::Instagram => {
            let (new_token, expires_in) = ctx.instagram.refresh_token(&access_token).await?;
            let sealed = ctx.sealer.seal(&new_token)?;
            let expires_at = Utc::now() + chrono::Duration::seconds(expires_in);
            ctx.store
                .social_accounts
                .update_tokens(&account.id, &sealed, None, Some(expires_at))
                .await?;
            Ok(new_token)
        }
        Platform::Tiktok => {
            let app = ctx.tiktok_app.as_ref().ok_or_else(|| {
                vforge_social::PublishError::TokenRefreshFailed(
                    "tiktok app credentials not configured".into(),
                )
            })?;
            let refresh_sealed = account.refresh_token_sealed.as_deref().ok_or_else(|| {
                vforge_social::PublishError::TokenRefreshFailed(
                    "account has no refresh token".into(),
                )
            })?;
            let refresh_token = ctx.sealer.unseal(refresh_sealed)?;

            let (new_token, new_refresh, expires_in) = ctx
                .tiktok
                .refresh_token(&app.client_key, &app.client_secret, &refresh_token)
                .await?;

            let sealed = ctx.sealer.seal(&new_token)?;
            let refresh_sealed = ctx.sealer.seal(&new_refresh)?;
            let expires_at = Utc::now() + chrono::Duration::seconds(expires_in);
            ctx.store
                .social_accounts
                .update_tokens(&account.id, &sealed, Some(&refresh_sealed), Some(expires_at))
                .await?;
            Ok(new_token)
        }
    }
}
