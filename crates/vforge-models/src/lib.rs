//! Shared data models for the VidForge pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Collected videos and their fetch/analysis lifecycle
//! - Templates, template schemas and extraction quality
//! - Renders and publish logs
//! - Social accounts
//! - Queue job identifiers

pub mod analysis;
pub mod ids;
pub mod platform;
pub mod publish;
pub mod render;
pub mod template;
pub mod video;

// Re-export common types
pub use analysis::{AnimationCue, BackgroundKind, Resolution, SceneAnalysis, TextOverlay, VideoAnalysis};
pub use ids::{JobId, ProjectId, PublishLogId, RenderId, SocialAccountId, TemplateId, VideoId};
pub use platform::Platform;
pub use publish::{PublishLog, PublishStatus, SocialAccount};
pub use render::{Render, RenderStatus};
pub use template::{
    ExtractionQuality, ExtractionStatus, Slot, SlotKind, Template, TemplateScene, TemplateSchema,
    SchemaValidationError,
};
pub use video::{AnalysisStatus, CollectedVideo, VideoStatus};
