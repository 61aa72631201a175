//! Analysis worker: sample frames, run vision analysis, persist the
//! document.
//!
//! Per-frame failures are tolerated; the job only fails when no frame at
//! all produced an observation.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use vforge_models::{
    AnalysisStatus, BackgroundKind, SceneAnalysis, TextOverlay, VideoAnalysis, VideoStatus,
};
use vforge_queue::{AnalysisJob, Lane};
use vforge_storage::frame_key;

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::frames::{self, ExtractedFrame};
use crate::logging::JobLogger;
use crate::model::extract_json_object;
use crate::retry::retry_async;

const FRAME_RETRIES: u32 = 2;
const FRAME_RETRY_BASE: Duration = Duration::from_millis(500);

const FRAME_PROMPT: &str = r##"Analyze this single video frame for template extraction.
Return ONLY one JSON object with this exact shape:
{
  "background": "color" | "image" | "video",
  "dominant_colors": ["#rrggbb", ...],
  "text_overlays": [
    {"content": "...", "x": 0.5, "y": 0.2, "font_size": 48, "color": "#ffffff", "confidence": 0.9}
  ],
  "animation_cues": [{"name": "fade_in", "target": "text"}],
  "confidence": 0.8
}
Positions are normalized to 0..1. Report only text that is an overlay, not
text embedded in the footage. confidence is your overall certainty for
this frame."##;

/// What the vision model reports for one frame.
#[derive(Debug, Deserialize)]
struct FrameObservation {
    background: BackgroundKind,
    #[serde(default)]
    dominant_colors: Vec<String>,
    #[serde(default)]
    text_overlays: Vec<TextOverlay>,
    #[serde(default)]
    animation_cues: Vec<vforge_models::AnimationCue>,
    confidence: f64,
}

/// Run an analysis job.
pub async fn run(ctx: &WorkerContext, job: &AnalysisJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&job.job_id, Lane::Analysis);
    logger.log_start(&format!("analyzing video {}", job.video_id));

    let video = ctx
        .store
        .videos
        .get(&job.video_id)
        .await?
        .ok_or_else(|| WorkerError::job_failed(format!("video {} not found", job.video_id)))?;

    if video.status != VideoStatus::Ready {
        return Err(WorkerError::job_failed(format!(
            "video {} is {}, not ready for analysis",
            job.video_id, video.status
        )));
    }
    let video_key = video
        .video_key
        .as_deref()
        .ok_or_else(|| WorkerError::job_failed(format!("video {} has no stored source", job.video_id)))?;

    ctx.store
        .videos
        .set_analysis_status(&job.video_id, AnalysisStatus::Analyzing)
        .await?;

    let workdir = ctx.job_workdir(&format!("analysis_{}", job.video_id));
    tokio::fs::create_dir_all(&workdir).await?;

    let result = analyze(ctx, job, &logger, video_key, &workdir).await;

    if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
        logger.log_warning(&format!("workdir cleanup failed: {}", e));
    }

    result
}

async fn analyze(
    ctx: &WorkerContext,
    job: &AnalysisJob,
    logger: &JobLogger,
    video_key: &str,
    workdir: &Path,
) -> WorkerResult<()> {
    let source = workdir.join("source.mp4");
    ctx.blobs.download_file(video_key, &source).await?;

    let probed = frames::probe(&source).await?;
    let timestamps = frames::sample_timestamps(probed.duration_seconds, ctx.config.frame_cap);
    if timestamps.is_empty() {
        return Err(WorkerError::job_failed(format!(
            "video {} has no sampleable duration",
            job.video_id
        )));
    }

    let slice = probed.duration_seconds / timestamps.len() as f64;
    let extracted = frames::extract_frames(&source, workdir, &timestamps).await?;
    logger.log_progress(&format!(
        "extracted {}/{} frames",
        extracted.len(),
        timestamps.len()
    ));

    let mut scenes = Vec::with_capacity(extracted.len());
    let mut failures = 0usize;

    for frame in &extracted {
        match analyze_frame(ctx, job, frame, slice, probed.duration_seconds).await {
            Ok(scene) => scenes.push(scene),
            Err(e) => {
                failures += 1;
                logger.log_warning(&format!("frame {} analysis failed: {}", frame.index, e));
            }
        }
    }

    if scenes.is_empty() {
        return Err(WorkerError::model_failed(format!(
            "all {} frames failed analysis",
            extracted.len().max(failures)
        )));
    }

    let analysis = VideoAnalysis {
        duration_seconds: probed.duration_seconds,
        fps: probed.fps,
        resolution: probed.resolution,
        scenes,
    };

    ctx.store.videos.store_analysis(&job.video_id, &analysis).await?;
    logger.log_completion(&format!(
        "analyzed video {}: {} scenes, {} frame failures",
        job.video_id,
        analysis.scene_count(),
        failures
    ));
    Ok(())
}

/// Upload the thumbnail and run the vision call for one frame, with
/// bounded retry.
async fn analyze_frame(
    ctx: &WorkerContext,
    job: &AnalysisJob,
    frame: &ExtractedFrame,
    slice_seconds: f64,
    duration_seconds: f64,
) -> WorkerResult<SceneAnalysis> {
    let jpeg = tokio::fs::read(&frame.path).await?;

    let key = frame_key(&job.video_id, frame.index);
    ctx.blobs.upload_bytes(jpeg.clone(), &key).await?;

    let raw = retry_async("frame_analysis", FRAME_RETRIES, FRAME_RETRY_BASE, || {
        ctx.model.analyze_image(FRAME_PROMPT, &jpeg)
    })
    .await?;

    let observation = parse_observation(&raw)?;

    let start = (frame.timestamp_seconds - slice_seconds / 2.0).max(0.0);
    let end = (frame.timestamp_seconds + slice_seconds / 2.0).min(duration_seconds);

    Ok(SceneAnalysis {
        index: frame.index,
        start_seconds: start,
        end_seconds: end,
        frame_key: key,
        background: observation.background,
        dominant_colors: observation.dominant_colors,
        text_overlays: observation.text_overlays,
        animation_cues: observation.animation_cues,
        confidence: observation.confidence,
    })
}

fn parse_observation(raw: &str) -> WorkerResult<FrameObservation> {
    let json = extract_json_object(raw)
        .ok_or_else(|| WorkerError::model_failed("vision response contained no JSON object"))?;
    serde_json::from_str(json)
        .map_err(|e| WorkerError::model_failed(format!("Malformed frame observation: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_parses_from_fenced_response() {
        let raw = "```json\n{\"background\":\"color\",\"dominant_colors\":[\"#112233\"],\"confidence\":0.7}\n```";
        let obs = parse_observation(raw).unwrap();
        assert_eq!(obs.background, BackgroundKind::Color);
        assert_eq!(obs.dominant_colors, vec!["#112233"]);
        assert!(obs.text_overlays.is_empty());
        assert!((obs.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn observation_with_overlays_and_cues() {
        let raw = r##"{"background":"image","text_overlays":[{"content":"SALE","x":0.5,"y":0.1,"font_size":64,"color":"#ff0000","confidence":0.95}],"animation_cues":[{"name":"slide_left"}],"confidence":0.9}"##;
        let obs = parse_observation(raw).unwrap();
        assert_eq!(obs.background, BackgroundKind::Image);
        assert_eq!(obs.text_overlays.len(), 1);
        assert_eq!(obs.text_overlays[0].content, "SALE");
        assert_eq!(obs.animation_cues[0].name, "slide_left");
    }

    #[test]
    fn non_json_response_is_rejected() {
        assert!(parse_observation("I could not analyze this frame").is_err());
    }
}
