//! Typed repositories for pipeline entities.
//!
//! Every status mutation goes through these repos. They enforce the entity
//! state machines: a write that would move a terminal record is dropped
//! with a warning instead of resurrecting it, so a late or duplicate job
//! completion can never undo a FAILED or DONE entity.

use chrono::Utc;
use tracing::{info, warn};

use vforge_models::{
    AnalysisStatus, CollectedVideo, ExtractionQuality, ExtractionStatus, ProjectId, PublishLog,
    PublishLogId, PublishStatus, Render, RenderId, RenderStatus, SocialAccount, SocialAccountId,
    Template, TemplateId, TemplateSchema, VideoAnalysis, VideoId, VideoStatus,
};

use crate::client::StoreClient;
use crate::error::{StoreError, StoreResult};
use crate::metrics::record_status_write;
use crate::value::{fields_from_pairs, from_document, to_fields};

const VIDEOS: &str = "videos";
const TEMPLATES: &str = "templates";
const RENDERS: &str = "renders";
const PUBLISH_LOGS: &str = "publish_logs";
const SOCIAL_ACCOUNTS: &str = "social_accounts";
const PROJECTS: &str = "projects";

fn now_json() -> serde_json::Value {
    serde_json::json!(Utc::now())
}

/// All entity repositories over one shared client.
#[derive(Clone)]
pub struct Store {
    pub videos: VideoRepo,
    pub templates: TemplateRepo,
    pub renders: RenderRepo,
    pub publish_logs: PublishLogRepo,
    pub social_accounts: SocialAccountRepo,
    pub projects: ProjectRepo,
}

impl Store {
    pub fn new(client: StoreClient) -> Self {
        Self {
            videos: VideoRepo::new(client.clone()),
            templates: TemplateRepo::new(client.clone()),
            renders: RenderRepo::new(client.clone()),
            publish_logs: PublishLogRepo::new(client.clone()),
            social_accounts: SocialAccountRepo::new(client.clone()),
            projects: ProjectRepo::new(client),
        }
    }

    pub async fn from_env() -> StoreResult<Self> {
        Ok(Self::new(StoreClient::from_env().await?))
    }
}

// =============================================================================
// Videos
// =============================================================================

/// Repository for collected video documents.
#[derive(Clone)]
pub struct VideoRepo {
    client: StoreClient,
}

impl VideoRepo {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, video: &CollectedVideo) -> StoreResult<()> {
        let fields = to_fields(video)?;
        self.client
            .create_document(VIDEOS, video.id.as_str(), fields)
            .await?;
        info!("Created video record: {}", video.id);
        Ok(())
    }

    pub async fn get(&self, id: &VideoId) -> StoreResult<Option<CollectedVideo>> {
        match self.client.get_document(VIDEOS, id.as_str()).await? {
            Some(doc) => Ok(Some(from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Move the fetch status, honoring the state machine.
    pub async fn set_status(&self, id: &VideoId, to: VideoStatus) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", VIDEOS, id)));
        };

        if !current.status.can_transition(to) {
            if current.status.is_terminal() {
                warn!(
                    video_id = %id,
                    from = %current.status,
                    to = %to,
                    "Skipping status write on terminal video"
                );
                return Ok(());
            }
            return Err(StoreError::InvalidTransition(format!(
                "video {} cannot move {} -> {}",
                id, current.status, to
            )));
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!(to)),
            ("updated_at", now_json()),
        ]);
        self.client
            .patch_document(VIDEOS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(VIDEOS, to.as_str());
        Ok(())
    }

    /// Record a successful fetch: source stored, metadata populated.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_ready(
        &self,
        id: &VideoId,
        video_key: &str,
        video_url: Option<&str>,
        title: Option<&str>,
        duration_seconds: Option<f64>,
        tags: &[String],
    ) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", VIDEOS, id)));
        };
        if !current.status.can_transition(VideoStatus::Ready) {
            warn!(video_id = %id, from = %current.status, "Skipping mark_ready");
            return Ok(());
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!(VideoStatus::Ready)),
            ("video_key", serde_json::json!(video_key)),
            ("video_url", serde_json::json!(video_url)),
            ("title", serde_json::json!(title)),
            ("duration_seconds", serde_json::json!(duration_seconds)),
            ("tags", serde_json::json!(tags)),
            ("updated_at", now_json()),
        ]);
        self.client
            .patch_document(VIDEOS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(VIDEOS, VideoStatus::Ready.as_str());
        Ok(())
    }

    /// Record a terminal fetch failure.
    pub async fn mark_failed(&self, id: &VideoId, message: &str) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", VIDEOS, id)));
        };
        if current.status.is_terminal() {
            warn!(video_id = %id, from = %current.status, "Skipping mark_failed on terminal video");
            return Ok(());
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!(VideoStatus::Failed)),
            ("error_message", serde_json::json!(message)),
            ("updated_at", now_json()),
        ]);
        self.client
            .patch_document(VIDEOS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(VIDEOS, VideoStatus::Failed.as_str());
        Ok(())
    }

    /// Move the analysis status, honoring the state machine.
    pub async fn set_analysis_status(&self, id: &VideoId, to: AnalysisStatus) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", VIDEOS, id)));
        };

        if !current.analysis_status.can_transition(to) {
            if current.analysis_status.is_terminal() {
                warn!(
                    video_id = %id,
                    from = %current.analysis_status,
                    to = %to,
                    "Skipping analysis status write on terminal state"
                );
                return Ok(());
            }
            return Err(StoreError::InvalidTransition(format!(
                "video {} analysis cannot move {} -> {}",
                id, current.analysis_status, to
            )));
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("analysis_status", serde_json::json!(to)),
            ("updated_at", now_json()),
        ]);
        self.client
            .patch_document(VIDEOS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(VIDEOS, to.as_str());
        Ok(())
    }

    /// Store the finished analysis document.
    pub async fn store_analysis(&self, id: &VideoId, analysis: &VideoAnalysis) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", VIDEOS, id)));
        };
        if !current
            .analysis_status
            .can_transition(AnalysisStatus::Analyzed)
        {
            warn!(video_id = %id, from = %current.analysis_status, "Skipping store_analysis");
            return Ok(());
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("analysis", serde_json::to_value(analysis)?),
            ("analysis_status", serde_json::json!(AnalysisStatus::Analyzed)),
            ("updated_at", now_json()),
        ]);
        self.client
            .patch_document(VIDEOS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(VIDEOS, AnalysisStatus::Analyzed.as_str());
        Ok(())
    }

    /// Record a terminal analysis failure.
    pub async fn mark_analysis_failed(&self, id: &VideoId, message: &str) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", VIDEOS, id)));
        };
        if current.analysis_status.is_terminal() {
            warn!(video_id = %id, "Skipping mark_analysis_failed on terminal state");
            return Ok(());
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("analysis_status", serde_json::json!(AnalysisStatus::Failed)),
            ("error_message", serde_json::json!(message)),
            ("updated_at", now_json()),
        ]);
        self.client
            .patch_document(VIDEOS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(VIDEOS, AnalysisStatus::Failed.as_str());
        Ok(())
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Repository for template documents.
#[derive(Clone)]
pub struct TemplateRepo {
    client: StoreClient,
}

impl TemplateRepo {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, template: &Template) -> StoreResult<()> {
        let fields = to_fields(template)?;
        self.client
            .create_document(TEMPLATES, template.id.as_str(), fields)
            .await?;
        info!("Created template record: {}", template.id);
        Ok(())
    }

    pub async fn get(&self, id: &TemplateId) -> StoreResult<Option<Template>> {
        Ok(self.get_with_meta(id).await?.map(|(t, _)| t))
    }

    /// Get a template along with its store update time, for preconditioned
    /// writes.
    pub async fn get_with_meta(
        &self,
        id: &TemplateId,
    ) -> StoreResult<Option<(Template, Option<String>)>> {
        match self.client.get_document(TEMPLATES, id.as_str()).await? {
            Some(doc) => {
                let template = from_document(&doc)?;
                Ok(Some((template, doc.update_time)))
            }
            None => Ok(None),
        }
    }

    /// Record a completed extraction: schema, quality and auto-seed flag.
    ///
    /// When `update_time` is given the write is conditional on the document
    /// not having changed since it was read, so a concurrent operator
    /// rejection wins over a late worker completion.
    pub async fn complete_extraction(
        &self,
        id: &TemplateId,
        schema: &TemplateSchema,
        quality: &ExtractionQuality,
        is_published: bool,
        update_time: Option<&str>,
    ) -> StoreResult<()> {
        let Some((current, _)) = self.get_with_meta(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", TEMPLATES, id)));
        };
        if let Some(status) = current.extraction_status {
            if status.is_terminal() {
                warn!(template_id = %id, from = %status, "Skipping complete_extraction on terminal template");
                return Ok(());
            }
        }

        let mut pairs = vec![
            ("schema", serde_json::to_value(schema)?),
            (
                "extraction_status",
                serde_json::json!(ExtractionStatus::Completed),
            ),
            ("extraction_quality", serde_json::to_value(quality)?),
            ("is_published", serde_json::json!(is_published)),
            ("updated_at", now_json()),
        ];
        if is_published {
            pairs.push(("published_at", now_json()));
        }

        let (fields, mask) = fields_from_pairs(pairs);
        self.client
            .patch_document(TEMPLATES, id.as_str(), fields, mask, update_time)
            .await?;
        record_status_write(TEMPLATES, ExtractionStatus::Completed.as_str());
        Ok(())
    }

    /// Record a terminal extraction failure with its code and message.
    pub async fn mark_failed(
        &self,
        id: &TemplateId,
        error_code: &str,
        message: &str,
    ) -> StoreResult<()> {
        let Some((current, _)) = self.get_with_meta(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", TEMPLATES, id)));
        };
        if let Some(status) = current.extraction_status {
            if status.is_terminal() {
                warn!(template_id = %id, from = %status, "Skipping mark_failed on terminal template");
                return Ok(());
            }
        }

        let (fields, mask) = fields_from_pairs(extraction_failure_pairs(error_code, message));
        self.client
            .patch_document(TEMPLATES, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(TEMPLATES, ExtractionStatus::Failed.as_str());
        Ok(())
    }
}

/// Field set written when an extraction fails terminally. Both the stable
/// code and the human-readable message land on the template so a failed
/// extraction stays queryable.
fn extraction_failure_pairs(
    error_code: &str,
    message: &str,
) -> Vec<(&'static str, serde_json::Value)> {
    vec![
        (
            "extraction_status",
            serde_json::json!(ExtractionStatus::Failed),
        ),
        ("extraction_error_code", serde_json::json!(error_code)),
        ("extraction_error_message", serde_json::json!(message)),
        ("updated_at", now_json()),
    ]
}

// =============================================================================
// Renders
// =============================================================================

/// Repository for render documents.
#[derive(Clone)]
pub struct RenderRepo {
    client: StoreClient,
}

impl RenderRepo {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, render: &Render) -> StoreResult<()> {
        let fields = to_fields(render)?;
        self.client
            .create_document(RENDERS, render.id.as_str(), fields)
            .await?;
        info!("Created render record: {}", render.id);
        Ok(())
    }

    pub async fn get(&self, id: &RenderId) -> StoreResult<Option<Render>> {
        match self.client.get_document(RENDERS, id.as_str()).await? {
            Some(doc) => Ok(Some(from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Mark the render as picked up by a worker.
    pub async fn mark_processing(&self, id: &RenderId) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", RENDERS, id)));
        };
        if !current.status.can_transition(RenderStatus::Processing) {
            if current.status.is_terminal() {
                warn!(render_id = %id, from = %current.status, "Skipping mark_processing on terminal render");
                return Ok(());
            }
            return Err(StoreError::InvalidTransition(format!(
                "render {} cannot move {} -> processing",
                id, current.status
            )));
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!(RenderStatus::Processing)),
            ("started_at", now_json()),
        ]);
        self.client
            .patch_document(RENDERS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(RENDERS, RenderStatus::Processing.as_str());
        Ok(())
    }

    /// Record a finished render with its artifact location.
    pub async fn mark_done(
        &self,
        id: &RenderId,
        output_key: &str,
        output_url: &str,
        file_size_bytes: u64,
    ) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", RENDERS, id)));
        };
        if !current.status.can_transition(RenderStatus::Done) {
            warn!(render_id = %id, from = %current.status, "Skipping mark_done");
            return Ok(());
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!(RenderStatus::Done)),
            ("output_key", serde_json::json!(output_key)),
            ("output_url", serde_json::json!(output_url)),
            ("file_size_bytes", serde_json::json!(file_size_bytes)),
            ("completed_at", now_json()),
        ]);
        self.client
            .patch_document(RENDERS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(RENDERS, RenderStatus::Done.as_str());
        Ok(())
    }

    /// Record a terminal render failure.
    pub async fn mark_failed(
        &self,
        id: &RenderId,
        error_code: &str,
        message: &str,
    ) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", RENDERS, id)));
        };
        if current.status.is_terminal() {
            warn!(render_id = %id, from = %current.status, "Skipping mark_failed on terminal render");
            return Ok(());
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!(RenderStatus::Failed)),
            ("error_code", serde_json::json!(error_code)),
            ("error_message", serde_json::json!(message)),
            ("completed_at", now_json()),
        ]);
        self.client
            .patch_document(RENDERS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(RENDERS, RenderStatus::Failed.as_str());
        Ok(())
    }
}

// =============================================================================
// Publish logs
// =============================================================================

/// Repository for publish log documents.
#[derive(Clone)]
pub struct PublishLogRepo {
    client: StoreClient,
}

impl PublishLogRepo {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, log: &PublishLog) -> StoreResult<()> {
        let fields = to_fields(log)?;
        self.client
            .create_document(PUBLISH_LOGS, log.id.as_str(), fields)
            .await?;
        info!("Created publish log: {}", log.id);
        Ok(())
    }

    pub async fn get(&self, id: &PublishLogId) -> StoreResult<Option<PublishLog>> {
        match self.client.get_document(PUBLISH_LOGS, id.as_str()).await? {
            Some(doc) => Ok(Some(from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Mark the log as uploading. Valid both on first pickup and on retry.
    pub async fn mark_uploading(&self, id: &PublishLogId) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", PUBLISH_LOGS, id)));
        };
        if !current.status.can_transition(PublishStatus::Uploading) {
            if current.status.is_terminal() {
                warn!(publish_log_id = %id, from = %current.status, "Skipping mark_uploading on terminal log");
                return Ok(());
            }
            return Err(StoreError::InvalidTransition(format!(
                "publish log {} cannot move {} -> uploading",
                id, current.status
            )));
        }

        let (fields, mask) =
            fields_from_pairs(vec![("status", serde_json::json!(PublishStatus::Uploading))]);
        self.client
            .patch_document(PUBLISH_LOGS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(PUBLISH_LOGS, PublishStatus::Uploading.as_str());
        Ok(())
    }

    /// Record a successful publish with the platform-side post ID.
    pub async fn mark_published(&self, id: &PublishLogId, external_id: &str) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", PUBLISH_LOGS, id)));
        };
        if !current.status.can_transition(PublishStatus::Published) {
            warn!(publish_log_id = %id, from = %current.status, "Skipping mark_published");
            return Ok(());
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!(PublishStatus::Published)),
            ("external_id", serde_json::json!(external_id)),
            ("published_at", now_json()),
        ]);
        self.client
            .patch_document(PUBLISH_LOGS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(PUBLISH_LOGS, PublishStatus::Published.as_str());
        Ok(())
    }

    /// Record a terminal publish failure.
    pub async fn mark_failed(
        &self,
        id: &PublishLogId,
        error_code: &str,
        message: &str,
    ) -> StoreResult<()> {
        let Some(current) = self.get(id).await? else {
            return Err(StoreError::not_found(format!("{}/{}", PUBLISH_LOGS, id)));
        };
        if current.status.is_terminal() {
            warn!(publish_log_id = %id, from = %current.status, "Skipping mark_failed on terminal log");
            return Ok(());
        }

        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!(PublishStatus::Failed)),
            ("error_code", serde_json::json!(error_code)),
            ("error_message", serde_json::json!(message)),
        ]);
        self.client
            .patch_document(PUBLISH_LOGS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(PUBLISH_LOGS, PublishStatus::Failed.as_str());
        Ok(())
    }
}

// =============================================================================
// Social accounts
// =============================================================================

/// Repository for linked social accounts.
#[derive(Clone)]
pub struct SocialAccountRepo {
    client: StoreClient,
}

impl SocialAccountRepo {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, id: &SocialAccountId) -> StoreResult<Option<SocialAccount>> {
        match self.client.get_document(SOCIAL_ACCOUNTS, id.as_str()).await? {
            Some(doc) => Ok(Some(from_document(&doc)?)),
            None => Ok(None),
        }
    }

    /// Store freshly sealed tokens after a refresh.
    pub async fn update_tokens(
        &self,
        id: &SocialAccountId,
        access_token_sealed: &str,
        refresh_token_sealed: Option<&str>,
        token_expires_at: Option<chrono::DateTime<Utc>>,
    ) -> StoreResult<()> {
        let (fields, mask) = fields_from_pairs(vec![
            ("access_token_sealed", serde_json::json!(access_token_sealed)),
            (
                "refresh_token_sealed",
                serde_json::json!(refresh_token_sealed),
            ),
            ("token_expires_at", serde_json::to_value(token_expires_at)?),
            ("updated_at", now_json()),
        ]);
        self.client
            .patch_document(SOCIAL_ACCOUNTS, id.as_str(), fields, mask, None)
            .await?;
        info!("Updated tokens for social account {}", id);
        Ok(())
    }

    /// Mark the account unusable after a non-recoverable auth failure.
    pub async fn deactivate(&self, id: &SocialAccountId) -> StoreResult<()> {
        let (fields, mask) = fields_from_pairs(vec![
            ("is_active", serde_json::json!(false)),
            ("updated_at", now_json()),
        ]);
        self.client
            .patch_document(SOCIAL_ACCOUNTS, id.as_str(), fields, mask, None)
            .await?;
        warn!("Deactivated social account {}", id);
        Ok(())
    }
}

// =============================================================================
// Projects
// =============================================================================

/// Minimal project repository.
///
/// Projects are owned by the CRUD layer; the pipeline only flips their
/// status when a render finishes, so this repo exposes nothing else.
#[derive(Clone)]
pub struct ProjectRepo {
    client: StoreClient,
}

impl ProjectRepo {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Flip the project status ("done", "render_failed").
    pub async fn set_status(&self, id: &ProjectId, status: &str) -> StoreResult<()> {
        let (fields, mask) = fields_from_pairs(vec![
            ("status", serde_json::json!(status)),
            ("updated_at", now_json()),
        ]);
        self.client
            .patch_document(PROJECTS, id.as_str(), fields, mask, None)
            .await?;
        record_status_write(PROJECTS, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn extraction_failure_writes_code_and_message() {
        let (fields, mask) =
            fields_from_pairs(extraction_failure_pairs("SCHEMA_PARSE_FAILED", "not json"));

        assert!(mask.contains(&"extraction_status".to_string()));
        assert!(mask.contains(&"extraction_error_code".to_string()));
        assert!(mask.contains(&"extraction_error_message".to_string()));

        match fields.get("extraction_error_code") {
            Some(Value::StringValue(s)) => assert_eq!(s, "SCHEMA_PARSE_FAILED"),
            other => panic!("expected StringValue, got {:?}", other),
        }
        match fields.get("extraction_error_message") {
            Some(Value::StringValue(s)) => assert_eq!(s, "not json"),
            other => panic!("expected StringValue, got {:?}", other),
        }
    }
}
