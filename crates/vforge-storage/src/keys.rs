//! Deterministic blob key helpers.
//!
//! Keys are stable for a given entity so that worker retries overwrite
//! rather than accumulate objects.

use vforge_models::{RenderId, VideoId};

/// Key for a fetched source video.
pub fn source_video_key(video_id: &VideoId) -> String {
    format!("sources/{}/source.mp4", video_id)
}

/// Key for an analysis frame thumbnail.
pub fn frame_key(video_id: &VideoId, frame_index: u32) -> String {
    format!("analysis/{}/frame_{:02}.jpg", video_id, frame_index)
}

/// Key for a render output artifact.
pub fn render_output_key(render_id: &RenderId) -> String {
    format!("renders/{}/output.mp4", render_id)
}

/// Guess a content type from a key's extension.
pub fn content_type_for_key(key: &str) -> &'static str {
    if key.ends_with(".mp4") {
        "video/mp4"
    } else if key.ends_with(".jpg") || key.ends_with(".jpeg") {
        "image/jpeg"
    } else if key.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deterministic() {
        let video = VideoId::from_string("v-1");
        assert_eq!(source_video_key(&video), "sources/v-1/source.mp4");
        assert_eq!(frame_key(&video, 3), "analysis/v-1/frame_03.jpg");

        let render = RenderId::from_string("r-9");
        assert_eq!(render_output_key(&render), "renders/r-9/output.mp4");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for_key("a/b.mp4"), "video/mp4");
        assert_eq!(content_type_for_key("a/b.jpg"), "image/jpeg");
        assert_eq!(content_type_for_key("a/b.json"), "application/json");
        assert_eq!(content_type_for_key("a/b.bin"), "application/octet-stream");
    }
}
