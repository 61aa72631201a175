//! S3-compatible blob store client.
//!
//! All pipeline artifacts live in one bucket under deterministic keys:
//! source videos, analysis frame thumbnails and render outputs. Workers
//! re-upload to the same key on retry, so writes are idempotent at the
//! key level.

pub mod client;
pub mod error;
pub mod keys;

pub use client::{BlobClient, BlobConfig};
pub use error::{StorageError, StorageResult};
pub use keys::{frame_key, render_output_key, source_video_key};
