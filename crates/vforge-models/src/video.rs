//! Collected video records and their fetch/analysis lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::analysis::VideoAnalysis;
use crate::ids::VideoId;
use crate::platform::Platform;

/// Fetch status of a collected video.
///
/// `Ready` and `Failed` are terminal: only an explicit operator action
/// may move the record afterwards, never a worker retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Intake requested, job not picked up yet
    #[default]
    Pending,
    /// A worker is fetching the source
    Fetching,
    /// Source stored and metadata populated
    Ready,
    /// Fetch failed terminally
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Fetching => "fetching",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Ready | VideoStatus::Failed)
    }

    /// Whether a worker may move the record from `self` to `to`.
    pub fn can_transition(&self, to: VideoStatus) -> bool {
        matches!(
            (self, to),
            (VideoStatus::Pending, VideoStatus::Fetching)
                | (VideoStatus::Fetching, VideoStatus::Ready)
                | (VideoStatus::Fetching, VideoStatus::Failed)
                // A retried job re-enters at Fetching
                | (VideoStatus::Fetching, VideoStatus::Fetching)
        )
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Analysis status of a collected video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    #[default]
    Unanalyzed,
    Analyzing,
    Analyzed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Unanalyzed => "unanalyzed",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Analyzed => "analyzed",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Analyzed | AnalysisStatus::Failed)
    }

    pub fn can_transition(&self, to: AnalysisStatus) -> bool {
        matches!(
            (self, to),
            (AnalysisStatus::Unanalyzed, AnalysisStatus::Analyzing)
                | (AnalysisStatus::Analyzing, AnalysisStatus::Analyzed)
                | (AnalysisStatus::Analyzing, AnalysisStatus::Failed)
                | (AnalysisStatus::Analyzing, AnalysisStatus::Analyzing)
        )
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A source video collected for template extraction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CollectedVideo {
    /// Unique video ID
    pub id: VideoId,

    /// Original source URL
    pub source_url: String,

    /// Platform the source came from
    pub platform: Platform,

    /// Fetch status
    #[serde(default)]
    pub status: VideoStatus,

    /// Blob key of the stored source (set on Ready)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_key: Option<String>,

    /// Canonical public URL reported by the fetcher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Source title reported by the fetcher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Source duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    /// Keyword tags derived from the title
    #[serde(default)]
    pub tags: Vec<String>,

    /// Analysis status
    #[serde(default)]
    pub analysis_status: AnalysisStatus,

    /// Analysis document (set when analyzed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<VideoAnalysis>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl CollectedVideo {
    /// Create a new pending record for an intake request.
    pub fn new(id: VideoId, source_url: impl Into<String>, platform: Platform) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_url: source_url.into(),
            platform,
            status: VideoStatus::Pending,
            video_key: None,
            video_url: None,
            title: None,
            duration_seconds: None,
            tags: Vec::new(),
            analysis_status: AnalysisStatus::Unanalyzed,
            analysis: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_video_status_rejects_worker_transitions() {
        assert!(!VideoStatus::Ready.can_transition(VideoStatus::Fetching));
        assert!(!VideoStatus::Failed.can_transition(VideoStatus::Fetching));
        assert!(VideoStatus::Pending.can_transition(VideoStatus::Fetching));
        assert!(VideoStatus::Fetching.can_transition(VideoStatus::Ready));
    }

    #[test]
    fn retried_fetch_reenters_at_fetching() {
        // A retriable failure leaves the row at Fetching; the retry sets
        // Fetching again before calling out.
        assert!(VideoStatus::Fetching.can_transition(VideoStatus::Fetching));
    }

    #[test]
    fn analysis_status_machine() {
        assert!(AnalysisStatus::Unanalyzed.can_transition(AnalysisStatus::Analyzing));
        assert!(AnalysisStatus::Analyzing.can_transition(AnalysisStatus::Analyzed));
        assert!(!AnalysisStatus::Analyzed.can_transition(AnalysisStatus::Analyzing));
        assert!(AnalysisStatus::Failed.is_terminal());
    }
}
