//! Render worker: drive the `vf-render` CLI and store its output.
//!
//! Renders are heavy; in addition to the lane's concurrency of 1 the
//! context carries a process-wide gate so a claimed stale render never
//! runs beside a fresh one.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use vforge_queue::{Lane, RenderJob};
use vforge_storage::render_output_key;

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Extra wall-clock allowance over the CLI's own timeout, so the CLI gets
/// to report its timeout before we kill it.
const KILL_GRACE: Duration = Duration::from_secs(30);

/// Run a render job.
pub async fn run(ctx: &WorkerContext, job: &RenderJob) -> WorkerResult<()> {
    let logger = JobLogger::new(&job.job_id, Lane::Render);

    let _gate = ctx.render_gate.lock().await;
    logger.log_start(&format!(
        "rendering {} from template {}",
        job.render_id, job.template_id
    ));

    ctx.store.renders.mark_processing(&job.render_id).await?;

    let workdir = ctx.job_workdir(&format!("render_{}", job.render_id));
    tokio::fs::create_dir_all(&workdir).await?;

    let result = render_and_store(ctx, job, &logger, &workdir).await;

    if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
        logger.log_warning(&format!("workdir cleanup failed: {}", e));
    }

    result
}

async fn render_and_store(
    ctx: &WorkerContext,
    job: &RenderJob,
    logger: &JobLogger,
    workdir: &Path,
) -> WorkerResult<()> {
    let props_path = workdir.join("props.json");
    let props = serde_json::to_vec_pretty(&materialize_props(job))
        .map_err(|e| WorkerError::InvalidProps(e.to_string()))?;
    tokio::fs::write(&props_path, props).await?;

    let output_path = workdir.join("output.mp4");
    let timeout_secs = ctx.config.render_timeout.as_secs();

    let runner = RenderRunner::from_path()?;
    runner
        .render(&props_path, &output_path, timeout_secs)
        .await?;

    let key = render_output_key(&job.render_id);
    ctx.blobs.upload_file(&output_path, &key).await?;
    let size = ctx.blobs.object_size(&key).await?;
    let url = ctx.blobs.presign_get(&key, ctx.config.presign_ttl).await?;
    logger.log_progress(&format!("stored output at {} ({} bytes)", key, size));

    ctx.store
        .renders
        .mark_done(&job.render_id, &key, &url, size)
        .await?;

    // The parent project tracks only whether its render finished
    ctx.store
        .projects
        .set_status(&job.project_id, "done")
        .await?;

    logger.log_completion(&format!("render {} done", job.render_id));
    Ok(())
}

/// Build the prop document the render CLI consumes from the job's slot
/// fills and timing parameters.
fn materialize_props(job: &RenderJob) -> serde_json::Value {
    serde_json::json!({
        "templateId": job.template_id.as_str(),
        "durationSeconds": job.duration_seconds,
        "fps": job.fps,
        "slots": job.slot_fills,
    })
}

/// Driver for the external render CLI.
pub struct RenderRunner {
    binary: PathBuf,
}

impl RenderRunner {
    /// Locate `vf-render` on PATH.
    pub fn from_path() -> WorkerResult<Self> {
        let binary = which::which("vf-render")
            .map_err(|_| WorkerError::config_error("vf-render not found on PATH"))?;
        Ok(Self { binary })
    }

    #[cfg(test)]
    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Render `props` into `output`, enforcing `timeout_secs` plus a
    /// kill grace period.
    pub async fn render(
        &self,
        props: &Path,
        output: &Path,
        timeout_secs: u64,
    ) -> WorkerResult<()> {
        let child = Command::new(&self.binary)
            .arg("--props")
            .arg(props)
            .arg("--output")
            .arg(output)
            .arg("--timeout")
            .arg(timeout_secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let budget = Duration::from_secs(timeout_secs) + KILL_GRACE;
        let output_data = match tokio::time::timeout(budget, child.wait_with_output()).await {
            Ok(output_data) => output_data?,
            Err(_) => {
                warn!("vf-render killed after {}s", budget.as_secs());
                return Err(WorkerError::RenderTimeout(timeout_secs));
            }
        };

        if !output_data.status.success() {
            let stderr = String::from_utf8_lossy(&output_data.stderr);
            let stdout = String::from_utf8_lossy(&output_data.stdout);
            return Err(classify_render_failure(&stderr, &stdout, timeout_secs));
        }

        Ok(())
    }
}

/// Map the CLI's diagnostics to a specific error.
fn classify_render_failure(stderr: &str, stdout: &str, timeout_secs: u64) -> WorkerError {
    let diagnostics = format!("{}\n{}", stderr, stdout).to_lowercase();
    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("render failed")
        .to_string();

    if diagnostics.contains("timed out") || diagnostics.contains("timeout") {
        WorkerError::RenderTimeout(timeout_secs)
    } else if diagnostics.contains("component not found") {
        WorkerError::ComponentNotFound(message)
    } else if diagnostics.contains("invalid props") || diagnostics.contains("prop ") {
        WorkerError::InvalidProps(message)
    } else {
        WorkerError::RenderCliFailed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vforge_models::{JobId, ProjectId, RenderId, TemplateId};

    #[test]
    fn props_document_carries_fills_and_timing() {
        let mut fills = serde_json::Map::new();
        fills.insert("headline".into(), serde_json::json!("Big Sale"));
        fills.insert("hero_image".into(), serde_json::json!("https://cdn.example/a.jpg"));

        let job = RenderJob {
            job_id: JobId::new(),
            render_id: RenderId::new(),
            project_id: ProjectId::new(),
            template_id: TemplateId::from_string("tpl_1".to_string()),
            slot_fills: fills,
            duration_seconds: 12.5,
            fps: 30.0,
            created_at: chrono::Utc::now(),
        };

        let props = materialize_props(&job);
        assert_eq!(props["templateId"], "tpl_1");
        assert_eq!(props["durationSeconds"], 12.5);
        assert_eq!(props["fps"], 30.0);
        assert_eq!(props["slots"]["headline"], "Big Sale");
    }

    #[test]
    fn timeout_diagnostics_win() {
        let err = classify_render_failure("render timed out after 600s", "", 600);
        assert!(matches!(err, WorkerError::RenderTimeout(600)));
    }

    #[test]
    fn missing_component_is_terminal_specific() {
        let err = classify_render_failure("Error: component not found: HeroScene", "", 600);
        assert!(matches!(err, WorkerError::ComponentNotFound(_)));
    }

    #[test]
    fn bad_props_detected_from_stdout_too() {
        let err = classify_render_failure("", "invalid props: headline must be a string", 600);
        assert!(matches!(err, WorkerError::InvalidProps(_)));
    }

    #[test]
    fn unknown_failures_fall_back_to_cli_error() {
        let err = classify_render_failure("segfault in encoder", "", 600);
        match err {
            WorkerError::RenderCliFailed(msg) => assert_eq!(msg, "segfault in encoder"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn last_stderr_line_becomes_the_message() {
        let err = classify_render_failure("frame 1 ok\nframe 2 ok\nencoder exploded\n", "", 600);
        match err {
            WorkerError::RenderCliFailed(msg) => assert_eq!(msg, "encoder exploded"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
