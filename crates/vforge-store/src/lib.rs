//! Firestore REST persistence for pipeline entities.
//!
//! One collection per entity type: `videos`, `templates`, `renders`,
//! `publish_logs`, `social_accounts` and `projects`. All status mutations
//! go through the typed repositories, which enforce the entity state
//! machines and never overwrite a terminal status.

pub mod client;
pub mod error;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod token_cache;
pub mod value;

pub use client::{StoreClient, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use repos::{
    ProjectRepo, PublishLogRepo, RenderRepo, SocialAccountRepo, Store, TemplateRepo, VideoRepo,
};
pub use retry::RetryConfig;
