//! Extraction worker: derive a template schema from a video analysis,
//! score it, and optionally auto-publish.

use vforge_models::{ExtractionQuality, SlotKind, TemplateSchema, VideoAnalysis};
use vforge_queue::{ExtractionJob, Lane};
use vforge_store::StoreError;

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::model::extract_json_object;

/// Run an extraction job.
pub async fn run(ctx: &WorkerContext, job: &ExtractionJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&job.job_id, Lane::Extraction);
    logger.log_start(&format!(
        "extracting template {} from video {}",
        job.template_id, job.video_id
    ));

    let video = ctx
        .store
        .videos
        .get(&job.video_id)
        .await?
        .ok_or_else(|| WorkerError::job_failed(format!("video {} not found", job.video_id)))?;
    let analysis = video.analysis.as_ref().ok_or_else(|| {
        WorkerError::job_failed(format!("video {} has no analysis document", job.video_id))
    })?;

    // Read the template now so the completion write can carry an
    // update-time precondition; a concurrent operator rejection wins.
    let Some((_, update_time)) = ctx.store.templates.get_with_meta(&job.template_id).await? else {
        return Err(WorkerError::job_failed(format!(
            "template {} not found",
            job.template_id
        )));
    };

    let raw = ctx.model.generate(&build_prompt(analysis)).await?;

    let schema = parse_schema(&raw)?;
    schema
        .validate()
        .map_err(|e| WorkerError::SchemaValidationFailed(e.to_string()))?;

    let quality = score_quality(analysis, &schema);
    let auto_seed = should_auto_seed(&quality, job.auto_seed_threshold);
    logger.log_progress(&format!(
        "schema derived: {} slots, {} scenes, quality {:.2} ({} issues)",
        schema.slots.len(),
        schema.scenes.len(),
        quality.score,
        quality.issues.len()
    ));

    match ctx
        .store
        .templates
        .complete_extraction(
            &job.template_id,
            &schema,
            &quality,
            auto_seed,
            update_time.as_deref(),
        )
        .await
    {
        Ok(()) => {}
        Err(e @ StoreError::PreconditionFailed(_)) => {
            // The template changed under us; whatever changed it wins
            logger.log_warning(&format!("completion write lost a race: {}", e));
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    logger.log_completion(&format!(
        "template {} completed{}",
        job.template_id,
        if auto_seed { ", auto-published" } else { "" }
    ));
    Ok(())
}

fn build_prompt(analysis: &VideoAnalysis) -> String {
    let analysis_json = serde_json::to_string_pretty(analysis).unwrap_or_default();
    format!(
        r#"Derive a reusable video template from this scene analysis.
Return ONLY one JSON object with this exact shape:
{{
  "version": 1,
  "slots": [
    {{"id": "headline", "kind": "text" | "image" | "video", "label": "...", "default_value": "...", "constraints": []}}
  ],
  "scenes": [
    {{"index": 0, "duration_seconds": 2.5, "slot_ids": ["headline"], "background": "color" | "image" | "video", "transitions": ["fade_in"]}}
  ]
}}
Rules:
- One template scene per analyzed scene, same order.
- Create a slot for every replaceable element: detected text overlays
  become text slots, image backgrounds become image slots.
- Declare transitions for scenes whose analysis carries animation cues.
- Every slot_ids entry must reference a declared slot id.

ANALYSIS:
{analysis_json}
"#
    )
}

fn parse_schema(raw: &str) -> WorkerResult<TemplateSchema> {
    let json = extract_json_object(raw)
        .ok_or_else(|| WorkerError::SchemaParseFailed("response contained no JSON object".into()))?;
    serde_json::from_str(json).map_err(|e| WorkerError::SchemaParseFailed(e.to_string()))
}

/// Quality score: start at 1.0, subtract a fixed penalty per defect, clamp
/// to [0, 1]. One issue string per deduction taken.
pub fn score_quality(analysis: &VideoAnalysis, schema: &TemplateSchema) -> ExtractionQuality {
    let mut score: f64 = 1.0;
    let mut issues = Vec::new();

    if schema.scenes.len() != analysis.scene_count() {
        score -= 0.1;
        issues.push(format!(
            "scene count mismatch: schema has {}, analysis has {}",
            schema.scenes.len(),
            analysis.scene_count()
        ));
    }

    if schema.slots.is_empty() {
        score -= 0.3;
        issues.push("no slots generated".to_string());
    }

    if analysis.has_text_overlays() && !schema.has_slot_kind(SlotKind::Text) {
        score -= 0.15;
        issues.push("text overlays detected but no text slot produced".to_string());
    }

    if analysis.has_image_backgrounds() && !schema.has_slot_kind(SlotKind::Image) {
        score -= 0.15;
        issues.push("image backgrounds detected but no image slot produced".to_string());
    }

    if analysis.average_confidence() < 0.5 {
        score -= 0.1;
        issues.push(format!(
            "low average scene confidence ({:.2})",
            analysis.average_confidence()
        ));
    }

    if analysis.has_animation_cues() && !schema.has_transitions() {
        score -= 0.05;
        issues.push("animation cues present but no transitions declared".to_string());
    }

    ExtractionQuality {
        score: score.clamp(0.0, 1.0),
        issues,
    }
}

/// The auto-seeding gate. The threshold must be inside [0, 1] and the
/// comparison is inclusive.
pub fn should_auto_seed(quality: &ExtractionQuality, threshold: Option<f64>) -> bool {
    match threshold {
        Some(t) if (0.0..=1.0).contains(&t) => quality.score >= t,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vforge_models::{
        AnimationCue, BackgroundKind, Resolution, SceneAnalysis, Slot, TemplateScene, TextOverlay,
    };

    fn scene(index: u32, confidence: f64) -> SceneAnalysis {
        SceneAnalysis {
            index,
            start_seconds: index as f64,
            end_seconds: index as f64 + 1.0,
            frame_key: format!("analysis/v/frame_{index:02}.jpg"),
            background: BackgroundKind::Color,
            dominant_colors: Vec::new(),
            text_overlays: Vec::new(),
            animation_cues: Vec::new(),
            confidence,
        }
    }

    fn analysis_with(scenes: Vec<SceneAnalysis>) -> VideoAnalysis {
        VideoAnalysis {
            duration_seconds: scenes.len() as f64,
            fps: 30.0,
            resolution: Resolution { width: 1080, height: 1920 },
            scenes,
        }
    }

    fn text_slot() -> Slot {
        Slot {
            id: "t1".into(),
            kind: SlotKind::Text,
            label: "Headline".into(),
            default_value: None,
            constraints: Vec::new(),
        }
    }

    fn template_scene(index: u32) -> TemplateScene {
        TemplateScene {
            index,
            duration_seconds: 1.0,
            slot_ids: vec!["t1".into()],
            background: BackgroundKind::Color,
            transitions: Vec::new(),
        }
    }

    fn clean_schema(scene_count: u32) -> TemplateSchema {
        TemplateSchema {
            version: 1,
            slots: vec![text_slot()],
            scenes: (0..scene_count).map(template_scene).collect(),
        }
    }

    #[test]
    fn clean_extraction_scores_one() {
        let analysis = analysis_with(vec![scene(0, 0.9), scene(1, 0.8)]);
        let quality = score_quality(&analysis, &clean_schema(2));
        assert_eq!(quality.score, 1.0);
        assert!(quality.issues.is_empty());
    }

    #[test]
    fn one_issue_per_deduction() {
        let mut analysis = analysis_with(vec![scene(0, 0.3), scene(1, 0.3)]);
        analysis.scenes[0].text_overlays.push(TextOverlay {
            content: "HI".into(),
            x: 0.5,
            y: 0.5,
            font_size: 40,
            color: "#fff".into(),
            confidence: 0.9,
        });
        analysis.scenes[1].background = BackgroundKind::Image;
        analysis.scenes[1].animation_cues.push(AnimationCue {
            name: "fade_in".into(),
            target: None,
        });

        // Schema with zero slots and wrong scene count triggers everything
        let schema = TemplateSchema {
            version: 1,
            slots: Vec::new(),
            scenes: vec![TemplateScene {
                index: 0,
                duration_seconds: 1.0,
                slot_ids: Vec::new(),
                background: BackgroundKind::Color,
                transitions: Vec::new(),
            }],
        };

        let quality = score_quality(&analysis, &schema);
        // 1.0 - 0.1 - 0.3 - 0.15 - 0.15 - 0.1 - 0.05
        assert!((quality.score - 0.15).abs() < 1e-9);
        assert_eq!(quality.issues.len(), 6);
    }

    #[test]
    fn score_decreases_monotonically_with_defects() {
        let analysis = analysis_with(vec![scene(0, 0.9), scene(1, 0.9)]);

        let q_clean = score_quality(&analysis, &clean_schema(2));
        let q_mismatch = score_quality(&analysis, &clean_schema(1));
        let mut no_slots = clean_schema(1);
        no_slots.slots.clear();
        no_slots.scenes[0].slot_ids.clear();
        let q_worse = score_quality(&analysis, &no_slots);

        assert!(q_clean.score > q_mismatch.score);
        assert!(q_mismatch.score > q_worse.score);
    }

    #[test]
    fn score_clamps_at_zero() {
        let quality = ExtractionQuality { score: 0.0, issues: Vec::new() };
        // clamp is exercised through score_quality; construct directly to
        // assert the boundary predicate too
        assert!(!should_auto_seed(&quality, Some(0.1)));
        assert!(should_auto_seed(&quality, Some(0.0)));
    }

    #[test]
    fn auto_seed_boundary_is_inclusive() {
        let quality = ExtractionQuality { score: 0.75, issues: Vec::new() };
        assert!(should_auto_seed(&quality, Some(0.75)));

        let just_below = ExtractionQuality { score: 0.749, issues: Vec::new() };
        assert!(!should_auto_seed(&just_below, Some(0.75)));
    }

    #[test]
    fn auto_seed_rejects_out_of_range_thresholds() {
        let quality = ExtractionQuality { score: 1.0, issues: Vec::new() };
        assert!(!should_auto_seed(&quality, None));
        assert!(!should_auto_seed(&quality, Some(1.5)));
        assert!(!should_auto_seed(&quality, Some(-0.1)));
    }

    #[test]
    fn low_confidence_boundary_is_strict() {
        // Exactly 0.5 does not trigger the deduction
        let analysis = analysis_with(vec![scene(0, 0.5), scene(1, 0.5)]);
        let quality = score_quality(&analysis, &clean_schema(2));
        assert_eq!(quality.score, 1.0);
    }

    #[test]
    fn schema_parse_failure_code() {
        let err = parse_schema("sorry, I cannot help with that").unwrap_err();
        assert!(matches!(err, WorkerError::SchemaParseFailed(_)));
    }

    #[test]
    fn schema_parses_from_fenced_output() {
        let raw = "```json\n{\"version\":1,\"slots\":[],\"scenes\":[{\"index\":0,\"duration_seconds\":2.0,\"background\":\"color\"}]}\n```";
        let schema = parse_schema(raw).unwrap();
        assert_eq!(schema.scenes.len(), 1);
    }
}
