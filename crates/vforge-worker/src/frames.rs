//! Frame sampling for analysis.
//!
//! Probes the source with ffprobe, picks evenly spaced timestamps capped
//! at the configured maximum, and extracts a 512px-wide JPEG thumbnail per
//! timestamp with ffmpeg. A single frame failing to extract is tolerated;
//! the caller decides what an empty result means.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use vforge_models::Resolution;

use crate::error::{WorkerError, WorkerResult};

/// Thumbnail width handed to the vision model.
const THUMBNAIL_WIDTH: u32 = 512;

/// Probed source properties.
#[derive(Debug, Clone)]
pub struct ProbedVideo {
    pub duration_seconds: f64,
    pub fps: f64,
    pub resolution: Resolution,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

/// One extracted frame on disk.
#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    pub index: u32,
    pub timestamp_seconds: f64,
    pub path: PathBuf,
}

/// Probe duration, frame rate and resolution of a video file.
pub async fn probe(path: &Path) -> WorkerResult<ProbedVideo> {
    which::which("ffprobe")
        .map_err(|_| WorkerError::config_error("ffprobe not found on PATH"))?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WorkerError::job_failed(format!(
            "ffprobe failed: {}",
            stderr.trim()
        )));
    }

    parse_probe_output(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_output(json: &str) -> WorkerResult<ProbedVideo> {
    let parsed: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| WorkerError::job_failed(format!("Malformed ffprobe output: {}", e)))?;

    let duration_seconds = parsed
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| WorkerError::job_failed("ffprobe reported no duration"))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| WorkerError::job_failed("source has no video stream"))?;

    Ok(ProbedVideo {
        duration_seconds,
        fps: video
            .r_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .unwrap_or(0.0),
        resolution: Resolution {
            width: video.width.unwrap_or(0),
            height: video.height.unwrap_or(0),
        },
    })
}

/// Parse an ffprobe rational frame rate ("30000/1001").
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Evenly spaced sample timestamps, at most `cap`, one per second at most.
///
/// Midpoint placement keeps samples away from the hard cuts at 0 and the
/// very end of the file.
pub fn sample_timestamps(duration_seconds: f64, cap: usize) -> Vec<f64> {
    if duration_seconds <= 0.0 || cap == 0 {
        return Vec::new();
    }

    let count = (duration_seconds.ceil() as usize).clamp(1, cap);
    let step = duration_seconds / count as f64;

    (0..count).map(|i| (i as f64 + 0.5) * step).collect()
}

/// Extract thumbnails at the given timestamps. Frames that fail to
/// extract are skipped with a warning.
pub async fn extract_frames(
    source: &Path,
    workdir: &Path,
    timestamps: &[f64],
) -> WorkerResult<Vec<ExtractedFrame>> {
    which::which("ffmpeg")
        .map_err(|_| WorkerError::config_error("ffmpeg not found on PATH"))?;

    let mut frames = Vec::with_capacity(timestamps.len());

    for (index, &timestamp) in timestamps.iter().enumerate() {
        let index = index as u32;
        let path = workdir.join(format!("frame_{:02}.jpg", index));

        match extract_one(source, &path, timestamp).await {
            Ok(()) => {
                debug!("Extracted frame {} at {:.2}s", index, timestamp);
                frames.push(ExtractedFrame {
                    index,
                    timestamp_seconds: timestamp,
                    path,
                });
            }
            Err(e) => {
                warn!("Frame {} at {:.2}s failed to extract: {}", index, timestamp, e);
            }
        }
    }

    Ok(frames)
}

async fn extract_one(source: &Path, output: &Path, timestamp: f64) -> WorkerResult<()> {
    let status_output = Command::new("ffmpeg")
        .arg("-y")
        .arg("-v")
        .arg("error")
        .arg("-ss")
        .arg(format!("{:.3}", timestamp))
        .arg("-i")
        .arg(source)
        .arg("-vframes")
        .arg("1")
        .arg("-vf")
        .arg(format!("scale={}:-2", THUMBNAIL_WIDTH))
        .arg(output)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !status_output.status.success() {
        let stderr = String::from_utf8_lossy(&status_output.stderr);
        return Err(WorkerError::job_failed(format!(
            "ffmpeg frame extraction failed: {}",
            stderr.trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_cap_at_limit() {
        let ts = sample_timestamps(120.0, 20);
        assert_eq!(ts.len(), 20);
        // Evenly spaced, 6s apart, starting at the midpoint of each slice
        assert!((ts[0] - 3.0).abs() < 1e-9);
        assert!((ts[1] - 9.0).abs() < 1e-9);
        assert!(*ts.last().unwrap() < 120.0);
    }

    #[test]
    fn short_video_samples_once_per_second() {
        let ts = sample_timestamps(4.0, 20);
        assert_eq!(ts.len(), 4);
        assert!((ts[0] - 0.5).abs() < 1e-9);
        assert!((ts[3] - 3.5).abs() < 1e-9);
    }

    #[test]
    fn sub_second_video_yields_one_sample() {
        let ts = sample_timestamps(0.8, 20);
        assert_eq!(ts.len(), 1);
        assert!((ts[0] - 0.4).abs() < 1e-9);
    }

    #[test]
    fn degenerate_inputs_yield_nothing() {
        assert!(sample_timestamps(0.0, 20).is_empty());
        assert!(sample_timestamps(-1.0, 20).is_empty());
        assert!(sample_timestamps(10.0, 0).is_empty());
    }

    #[test]
    fn frame_rate_rational_parsing() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("30/0"), None);
        assert_eq!(parse_frame_rate("thirty"), None);
    }

    #[test]
    fn probe_output_parsing() {
        let json = r#"{
            "format": {"duration": "14.500000"},
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1080, "height": 1920, "r_frame_rate": "30/1"}
            ]
        }"#;
        let probed = parse_probe_output(json).unwrap();
        assert!((probed.duration_seconds - 14.5).abs() < 1e-9);
        assert_eq!(probed.fps, 30.0);
        assert_eq!(probed.resolution.width, 1080);
        assert_eq!(probed.resolution.height, 1920);
    }

    #[test]
    fn probe_without_video_stream_fails() {
        let json = r#"{"format": {"duration": "3.0"}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(parse_probe_output(json).is_err());
    }
}
