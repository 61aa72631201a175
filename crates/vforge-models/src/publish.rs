//! Publish logs and social accounts.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{ProjectId, PublishLogId, RenderId, SocialAccountId};
use crate::platform::Platform;

/// Publish lifecycle status.
///
/// Terminal rows are never reused: a re-publish creates a fresh PublishLog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    #[default]
    Pending,
    Uploading,
    Published,
    Failed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Pending => "pending",
            PublishStatus::Uploading => "uploading",
            PublishStatus::Published => "published",
            PublishStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishStatus::Published | PublishStatus::Failed)
    }

    pub fn can_transition(&self, to: PublishStatus) -> bool {
        matches!(
            (self, to),
            (PublishStatus::Pending, PublishStatus::Uploading)
                | (PublishStatus::Uploading, PublishStatus::Published)
                | (PublishStatus::Uploading, PublishStatus::Failed)
                // A queue retry re-enters at Uploading
                | (PublishStatus::Uploading, PublishStatus::Uploading)
        )
    }
}

impl std::fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempt to publish a render to a social platform.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PublishLog {
    pub id: PublishLogId,
    pub project_id: ProjectId,
    pub render_id: RenderId,
    pub social_account_id: SocialAccountId,
    pub platform: Platform,

    #[serde(default)]
    pub status: PublishStatus,

    /// Platform-side ID of the published post
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Caption attached to the post
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// Requested publish time for scheduled posts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl PublishLog {
    pub fn new(
        id: PublishLogId,
        project_id: ProjectId,
        render_id: RenderId,
        social_account_id: SocialAccountId,
        platform: Platform,
    ) -> Self {
        Self {
            id,
            project_id,
            render_id,
            social_account_id,
            platform,
            status: PublishStatus::Pending,
            external_id: None,
            error_code: None,
            error_message: None,
            caption: None,
            scheduled_at: None,
            published_at: None,
            created_at: Utc::now(),
        }
    }
}

/// A linked social account with sealed OAuth tokens.
///
/// Token fields hold AES-256-GCM sealed values (`nonce:ciphertext`, both
/// base64); the plaintext never reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SocialAccount {
    pub id: SocialAccountId,
    pub user_id: String,
    pub platform: Platform,

    /// Platform-side user/account identifier
    pub platform_user_id: String,

    /// Sealed access token
    pub access_token_sealed: String,

    /// Sealed refresh token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_sealed: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl SocialAccount {
    /// True when the access token expires within `margin_secs` (or already did).
    pub fn token_needs_refresh(&self, margin_secs: i64) -> bool {
        match self.token_expires_at {
            Some(expires) => (expires - Utc::now()).num_seconds() <= margin_secs,
            // No recorded expiry: assume the token is long-lived.
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(expires_at: Option<DateTime<Utc>>) -> SocialAccount {
        SocialAccount {
            id: SocialAccountId::new(),
            user_id: "user_1".into(),
            platform: Platform::Instagram,
            platform_user_id: "ig_1".into(),
            access_token_sealed: "sealed".into(),
            refresh_token_sealed: None,
            token_expires_at: expires_at,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn publish_status_machine() {
        assert!(PublishStatus::Pending.can_transition(PublishStatus::Uploading));
        assert!(PublishStatus::Uploading.can_transition(PublishStatus::Published));
        assert!(!PublishStatus::Published.can_transition(PublishStatus::Uploading));
        assert!(!PublishStatus::Failed.can_transition(PublishStatus::Uploading));
    }

    #[test]
    fn token_refresh_margin() {
        let soon = account(Some(Utc::now() + Duration::seconds(60)));
        assert!(soon.token_needs_refresh(300));
        assert!(!soon.token_needs_refresh(10));

        let none = account(None);
        assert!(!none.token_needs_refresh(300));
    }
}
