//! Render records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, RenderId, TemplateId};

/// Render lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Failed,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::Pending => "pending",
            RenderStatus::Processing => "processing",
            RenderStatus::Done => "done",
            RenderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderStatus::Done | RenderStatus::Failed)
    }

    /// True while the render counts against the one-active-per-project limit.
    pub fn is_active(&self) -> bool {
        matches!(self, RenderStatus::Pending | RenderStatus::Processing)
    }

    pub fn can_transition(&self, to: RenderStatus) -> bool {
        matches!(
            (self, to),
            (RenderStatus::Pending, RenderStatus::Processing)
                | (RenderStatus::Processing, RenderStatus::Done)
                | (RenderStatus::Processing, RenderStatus::Failed)
                | (RenderStatus::Processing, RenderStatus::Processing)
        )
    }
}

impl std::fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A render of a project through the external renderer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Render {
    pub id: RenderId,
    pub project_id: ProjectId,
    pub template_id: TemplateId,

    #[serde(default)]
    pub status: RenderStatus,

    /// Blob key of the rendered artifact (set on Done)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    /// Time-limited download URL (set on Done)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Render {
    pub fn new(id: RenderId, project_id: ProjectId, template_id: TemplateId) -> Self {
        Self {
            id,
            project_id,
            template_id,
            status: RenderStatus::Pending,
            output_key: None,
            output_url: None,
            file_size_bytes: None,
            error_code: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_status_machine() {
        assert!(RenderStatus::Pending.can_transition(RenderStatus::Processing));
        assert!(RenderStatus::Processing.can_transition(RenderStatus::Done));
        assert!(RenderStatus::Processing.can_transition(RenderStatus::Failed));
        assert!(!RenderStatus::Done.can_transition(RenderStatus::Processing));
        assert!(!RenderStatus::Pending.can_transition(RenderStatus::Done));
    }

    #[test]
    fn active_states() {
        assert!(RenderStatus::Pending.is_active());
        assert!(RenderStatus::Processing.is_active());
        assert!(!RenderStatus::Done.is_active());
        assert!(!RenderStatus::Failed.is_active());
    }
}
