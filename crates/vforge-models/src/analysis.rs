//! Scene analysis documents produced by the analysis worker.
//!
//! The vision model returns one record per sampled frame; the worker
//! assembles them into a [`VideoAnalysis`] that the extraction worker
//! consumes. Documents are typed and validated at the boundary rather
//! than carried around as loose JSON.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output dimensions of the analyzed video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Kind of background detected in a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundKind {
    /// Flat or gradient color
    Color,
    /// Static image
    Image,
    /// Moving footage
    Video,
}

/// A text overlay detected in a frame.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TextOverlay {
    /// Recognized text content
    pub content: String,
    /// Normalized position of the text block center, 0.0..=1.0
    pub x: f64,
    pub y: f64,
    /// Approximate font size in pixels
    pub font_size: u32,
    /// Dominant text color as a hex string ("#ffffff")
    pub color: String,
    /// Model confidence for this detection, 0.0..=1.0
    pub confidence: f64,
}

/// An animation cue detected for a scene (e.g. "fade_in", "slide_left").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnimationCue {
    pub name: String,
    /// Element the cue applies to ("text", "background", "sticker")
    #[serde(default)]
    pub target: Option<String>,
}

/// Per-scene analysis record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SceneAnalysis {
    /// Zero-based scene index
    pub index: u32,
    /// Scene boundaries in seconds from video start
    pub start_seconds: f64,
    pub end_seconds: f64,
    /// Blob key of the stored frame thumbnail
    pub frame_key: String,
    /// Detected background kind
    pub background: BackgroundKind,
    /// Dominant colors as hex strings, most dominant first
    #[serde(default)]
    pub dominant_colors: Vec<String>,
    /// Detected text overlays
    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,
    /// Detected animation cues
    #[serde(default)]
    pub animation_cues: Vec<AnimationCue>,
    /// Overall model confidence for the scene, 0.0..=1.0
    pub confidence: f64,
}

/// Complete analysis document for a collected video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoAnalysis {
    /// Source duration in seconds
    pub duration_seconds: f64,
    /// Frames per second of the source
    pub fps: f64,
    /// Source resolution
    pub resolution: Resolution,
    /// Per-scene records, ordered by index
    pub scenes: Vec<SceneAnalysis>,
}

impl VideoAnalysis {
    /// Number of analyzed scenes.
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// True if any scene carries a detected text overlay.
    pub fn has_text_overlays(&self) -> bool {
        self.scenes.iter().any(|s| !s.text_overlays.is_empty())
    }

    /// True if any scene has an image background.
    pub fn has_image_backgrounds(&self) -> bool {
        self.scenes
            .iter()
            .any(|s| s.background == BackgroundKind::Image)
    }

    /// True if any scene carries animation cues.
    pub fn has_animation_cues(&self) -> bool {
        self.scenes.iter().any(|s| !s.animation_cues.is_empty())
    }

    /// Mean of per-scene confidences; 0.0 when there are no scenes.
    pub fn average_confidence(&self) -> f64 {
        if self.scenes.is_empty() {
            return 0.0;
        }
        self.scenes.iter().map(|s| s.confidence).sum::<f64>() / self.scenes.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(index: u32, confidence: f64) -> SceneAnalysis {
        SceneAnalysis {
            index,
            start_seconds: index as f64,
            end_seconds: index as f64 + 1.0,
            frame_key: format!("analysis/v/frame_{index}.jpg"),
            background: BackgroundKind::Color,
            dominant_colors: vec!["#000000".into()],
            text_overlays: Vec::new(),
            animation_cues: Vec::new(),
            confidence,
        }
    }

    #[test]
    fn average_confidence_over_scenes() {
        let analysis = VideoAnalysis {
            duration_seconds: 3.0,
            fps: 30.0,
            resolution: Resolution { width: 1080, height: 1920 },
            scenes: vec![scene(0, 0.8), scene(1, 0.4)],
        };
        assert!((analysis.average_confidence() - 0.6).abs() < f64::EPSILON);
        assert!(!analysis.has_text_overlays());
        assert!(!analysis.has_image_backgrounds());
    }

    #[test]
    fn average_confidence_empty_is_zero() {
        let analysis = VideoAnalysis {
            duration_seconds: 0.0,
            fps: 0.0,
            resolution: Resolution { width: 0, height: 0 },
            scenes: Vec::new(),
        };
        assert_eq!(analysis.average_confidence(), 0.0);
    }
}
