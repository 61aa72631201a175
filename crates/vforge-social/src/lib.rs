//! Social platform publishing.
//!
//! Protocol clients for Instagram (container create, processing poll,
//! publish) and TikTok (chunked upload, publish), plus AES-256-GCM
//! sealing for OAuth tokens at rest. The clients are pure protocol: they
//! take an unsealed access token and a video location and return the
//! platform-side post ID.

pub mod error;
pub mod instagram;
pub mod tiktok;
pub mod token;

pub use error::{PublishError, PublishResult};
pub use instagram::{InstagramClient, InstagramConfig};
pub use tiktok::{TikTokClient, TikTokConfig, CHUNK_SIZE_BYTES};
pub use token::TokenSealer;
