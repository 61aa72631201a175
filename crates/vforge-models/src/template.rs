//! Template records, schemas and extraction quality.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::BackgroundKind;
use crate::ids::{TemplateId, VideoId};

/// Extraction status of a template.
///
/// `Completed`, `Failed` and `Rejected` are terminal. `Rejected` is only
/// ever set by an operator review action, never by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Extracting,
    Completed,
    Failed,
    Rejected,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Extracting => "extracting",
            ExtractionStatus::Completed => "completed",
            ExtractionStatus::Failed => "failed",
            ExtractionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExtractionStatus::Extracting)
    }
}

impl std::fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of content a slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Text,
    Image,
    Video,
}

/// A user-fillable slot in a template.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Slot {
    /// Stable slot identifier referenced by scenes and prop fills
    pub id: String,
    pub kind: SlotKind,
    /// Human-readable label shown in the editor
    pub label: String,
    /// Default value rendered when the slot is left unfilled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Free-form constraints ("max_length:40")
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// One scene of a template.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TemplateScene {
    /// Zero-based scene index
    pub index: u32,
    pub duration_seconds: f64,
    /// Slots rendered in this scene, by slot id
    #[serde(default)]
    pub slot_ids: Vec<String>,
    pub background: BackgroundKind,
    /// Transition names applied when entering this scene
    #[serde(default)]
    pub transitions: Vec<String>,
}

/// Reasons a derived schema can fail structural validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaValidationError {
    #[error("schema has no scenes")]
    NoScenes,
    #[error("slot {0} has an empty id")]
    EmptySlotId(usize),
    #[error("duplicate slot id: {0}")]
    DuplicateSlotId(String),
    #[error("scene {scene} references unknown slot {slot}")]
    UnknownSlotRef { scene: u32, slot: String },
    #[error("scene {0} has non-positive duration")]
    NonPositiveDuration(u32),
}

/// The slots + scenes document derived from an analysis.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TemplateSchema {
    /// Schema format version
    #[serde(default = "default_schema_version")]
    pub version: u32,
    #[serde(default)]
    pub slots: Vec<Slot>,
    pub scenes: Vec<TemplateScene>,
}

fn default_schema_version() -> u32 {
    1
}

impl TemplateSchema {
    /// Validate the structural invariants of a derived schema.
    ///
    /// Runs at the extraction boundary; downstream code trusts a schema
    /// that passed here.
    pub fn validate(&self) -> Result<(), SchemaValidationError> {
        if self.scenes.is_empty() {
            return Err(SchemaValidationError::NoScenes);
        }

        let mut seen = std::collections::HashSet::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.id.trim().is_empty() {
                return Err(SchemaValidationError::EmptySlotId(i));
            }
            if !seen.insert(slot.id.as_str()) {
                return Err(SchemaValidationError::DuplicateSlotId(slot.id.clone()));
            }
        }

        for scene in &self.scenes {
            if scene.duration_seconds <= 0.0 {
                return Err(SchemaValidationError::NonPositiveDuration(scene.index));
            }
            for slot_id in &scene.slot_ids {
                if !seen.contains(slot_id.as_str()) {
                    return Err(SchemaValidationError::UnknownSlotRef {
                        scene: scene.index,
                        slot: slot_id.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// True if any slot is of the given kind.
    pub fn has_slot_kind(&self, kind: SlotKind) -> bool {
        self.slots.iter().any(|s| s.kind == kind)
    }

    /// True if any scene declares a transition.
    pub fn has_transitions(&self) -> bool {
        self.scenes.iter().any(|s| !s.transitions.is_empty())
    }
}

/// Quality report computed for a completed extraction.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionQuality {
    /// Score in 0.0..=1.0, higher is better
    pub score: f64,
    /// One human-readable issue per deduction taken
    #[serde(default)]
    pub issues: Vec<String>,
}

/// A reusable template extracted from a collected video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Template {
    pub id: TemplateId,

    /// Display name
    pub name: String,

    /// Derived slots + scenes document (set when extraction completes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<TemplateSchema>,

    /// Extraction status; None for hand-authored templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_status: Option<ExtractionStatus>,

    /// Quality report for the last completed extraction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_quality: Option<ExtractionQuality>,

    /// Failure code when extraction failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error_code: Option<String>,

    /// Human-readable description of the extraction failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error_message: Option<String>,

    /// Whether the template is visible in the public library
    #[serde(default)]
    pub is_published: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    /// Source video this template was extracted from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_from_video_id: Option<VideoId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Create a draft template awaiting extraction from a video.
    pub fn new_extraction_draft(
        id: TemplateId,
        name: impl Into<String>,
        video_id: VideoId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            schema: None,
            extraction_status: Some(ExtractionStatus::Extracting),
            extraction_quality: None,
            extraction_error_code: None,
            extraction_error_message: None,
            is_published: false,
            published_at: None,
            extracted_from_video_id: Some(video_id),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_with(slots: Vec<Slot>, scenes: Vec<TemplateScene>) -> TemplateSchema {
        TemplateSchema { version: 1, slots, scenes }
    }

    fn text_slot(id: &str) -> Slot {
        Slot {
            id: id.to_string(),
            kind: SlotKind::Text,
            label: "Headline".to_string(),
            default_value: None,
            constraints: Vec::new(),
        }
    }

    fn scene(index: u32, slot_ids: Vec<&str>) -> TemplateScene {
        TemplateScene {
            index,
            duration_seconds: 2.5,
            slot_ids: slot_ids.into_iter().map(String::from).collect(),
            background: BackgroundKind::Color,
            transitions: Vec::new(),
        }
    }

    #[test]
    fn valid_schema_passes() {
        let schema = schema_with(vec![text_slot("t1")], vec![scene(0, vec!["t1"])]);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn empty_scenes_rejected() {
        let schema = schema_with(vec![text_slot("t1")], Vec::new());
        assert_eq!(schema.validate(), Err(SchemaValidationError::NoScenes));
    }

    #[test]
    fn duplicate_slot_ids_rejected() {
        let schema = schema_with(
            vec![text_slot("t1"), text_slot("t1")],
            vec![scene(0, vec![])],
        );
        assert_eq!(
            schema.validate(),
            Err(SchemaValidationError::DuplicateSlotId("t1".into()))
        );
    }

    #[test]
    fn unknown_slot_reference_rejected() {
        let schema = schema_with(vec![text_slot("t1")], vec![scene(0, vec!["nope"])]);
        assert_eq!(
            schema.validate(),
            Err(SchemaValidationError::UnknownSlotRef { scene: 0, slot: "nope".into() })
        );
    }

    #[test]
    fn non_positive_duration_rejected() {
        let mut s = scene(0, vec![]);
        s.duration_seconds = 0.0;
        let schema = schema_with(Vec::new(), vec![s]);
        assert_eq!(schema.validate(), Err(SchemaValidationError::NonPositiveDuration(0)));
    }

    #[test]
    fn extraction_status_terminality() {
        assert!(!ExtractionStatus::Extracting.is_terminal());
        assert!(ExtractionStatus::Completed.is_terminal());
        assert!(ExtractionStatus::Rejected.is_terminal());
    }
}
