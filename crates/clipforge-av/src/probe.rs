//! FFprobe-based duration probing.

use crate::command::ToolCommand;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Duration of a probed media file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    /// Container duration in seconds; always finite and positive.
    pub duration_seconds: f64,
}

impl ProbeResult {
    /// The duration as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds)
    }
}

/// Runs ffprobe to read container durations.
#[derive(Debug, Clone)]
pub struct Prober {
    ffprobe: PathBuf,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Prober {
    pub fn new(ffprobe: PathBuf, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            ffprobe,
            timeout,
            cancel,
        }
    }

    /// Probe `path` once. Any failure is reported as [`Error::Probe`].
    pub async fn probe(&self, path: &Path) -> Result<ProbeResult> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Error::probe(path, "file not found"));
        }

        let output = ToolCommand::new(self.ffprobe.clone())
            .stage("probe")
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path.to_string_lossy())
            .timeout(self.timeout)
            .cancel_on(self.cancel.clone())
            .execute()
            .await
            .map_err(|e| Error::probe(path, e.to_string()))?;

        parse_duration(path, &output.stdout)
    }
}

fn parse_duration(path: &Path, json: &str) -> Result<ProbeResult> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::probe(path, format!("malformed ffprobe output: {e}")))?;

    let raw = output
        .format
        .duration
        .ok_or_else(|| Error::probe(path, "no duration in container metadata"))?;

    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::probe(path, format!("unparseable duration {raw:?}")))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(Error::probe(path, format!("invalid duration {seconds}")));
    }

    Ok(ProbeResult {
        duration_seconds: seconds,
    })
}
