//! External source fetcher driver.
//!
//! Wraps the `vf-fetch` CLI (yt-dlp compatible contract): given a source
//! URL and an output path it downloads the media file and prints a single
//! JSON metadata object on stdout. Non-zero exit puts diagnostics on
//! stderr, which we sift for permanently-unavailable sources.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::classifier::is_source_gone_message;
use crate::error::{WorkerError, WorkerResult};

/// Metadata printed by the fetcher.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchedMetadata {
    pub title: String,
    /// Canonical public URL of the source
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

/// Driver for the external fetch CLI.
pub struct FetchClient {
    binary: PathBuf,
    timeout: Duration,
}

impl FetchClient {
    /// Locate `vf-fetch` on PATH.
    pub fn new(timeout: Duration) -> WorkerResult<Self> {
        let binary = which::which("vf-fetch")
            .map_err(|_| WorkerError::config_error("vf-fetch not found on PATH"))?;
        Ok(Self { binary, timeout })
    }

    #[cfg(test)]
    pub fn with_binary(binary: PathBuf, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    /// Fetch `source_url` into `output`, returning the source metadata.
    pub async fn fetch(&self, source_url: &str, output: &Path) -> WorkerResult<FetchedMetadata> {
        debug!("Fetching {} to {}", source_url, output.display());

        let mut child = Command::new(&self.binary)
            .arg("--url")
            .arg(source_url)
            .arg("--output")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        let output_data = match result {
            Ok(output_data) => output_data?,
            Err(_) => {
                // Dropping the wait future kills the process (kill_on_drop)
                warn!(
                    "vf-fetch timed out after {}s for {}",
                    self.timeout.as_secs(),
                    source_url
                );
                return Err(WorkerError::transport(format!(
                    "fetch timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output_data.status.success() {
            let stderr = String::from_utf8_lossy(&output_data.stderr);
            let message = stderr.lines().last().unwrap_or("fetch failed").to_string();
            if is_source_gone_message(&stderr) {
                return Err(WorkerError::SourceGone(message));
            }
            return Err(WorkerError::upstream(format!(
                "vf-fetch exited with {}: {}",
                output_data.status, message
            )));
        }

        let stdout = String::from_utf8_lossy(&output_data.stdout);
        parse_metadata(&stdout)
    }
}

/// Parse the metadata object from fetcher stdout. The fetcher may print
/// progress lines first; the JSON object is the last non-empty line.
fn parse_metadata(stdout: &str) -> WorkerResult<FetchedMetadata> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| WorkerError::upstream("vf-fetch printed no metadata"))?;

    serde_json::from_str(line.trim())
        .map_err(|e| WorkerError::upstream(format!("Malformed fetch metadata: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_last_nonempty_line() {
        let stdout = "downloading 10%\ndownloading 100%\n\n{\"title\":\"Dance\",\"canonical_url\":\"https://t.example/v/1\",\"duration_seconds\":14.5}\n";
        let meta = parse_metadata(stdout).unwrap();
        assert_eq!(meta.title, "Dance");
        assert_eq!(meta.canonical_url.as_deref(), Some("https://t.example/v/1"));
        assert_eq!(meta.duration_seconds, Some(14.5));
    }

    #[test]
    fn missing_optional_fields_tolerated() {
        let meta = parse_metadata("{\"title\":\"x\"}").unwrap();
        assert!(meta.canonical_url.is_none());
        assert!(meta.duration_seconds.is_none());
    }

    #[test]
    fn empty_stdout_is_an_error() {
        assert!(parse_metadata("\n\n").is_err());
    }

    #[test]
    fn garbage_stdout_is_an_error() {
        assert!(parse_metadata("not json").is_err());
    }
}
