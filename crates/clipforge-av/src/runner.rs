//! Job execution against the ffmpeg engine.

use crate::command::ToolCommand;
use crate::job::{JobKind, JobSpec};
use crate::probe::{ProbeResult, Prober};
use crate::Result;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Arguments placed before every stage's own arguments.
pub const ENGINE_FLAGS: [&str; 6] = [
    "-hide_banner",
    "-nostdin",
    "-nostats",
    "-y",
    "-loglevel",
    "error",
];

/// Result of a successful job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub kind: JobKind,
    /// The file the last stage produced.
    pub output: PathBuf,
    /// Number of engine invocations that ran.
    pub stages: usize,
    pub elapsed: Duration,
}

/// Handle to the external media engine.
///
/// Cheap to clone; all clones share the same cancellation token, so
/// cancelling it kills every running stage and probe.
#[derive(Debug, Clone)]
pub struct Engine {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    stage_timeout: Duration,
    probe_timeout: Duration,
    cancel: CancellationToken,
}

impl Engine {
    /// Create an engine using the given ffmpeg and ffprobe executables.
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            stage_timeout: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the time budget of each ffmpeg stage.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Set the time budget of each ffprobe call.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Kill running subprocesses when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe(&self) -> &Path {
        &self.ffprobe
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Read the duration of a media file.
    pub async fn probe(&self, path: &Path) -> Result<ProbeResult> {
        Prober::new(self.ffprobe.clone(), self.probe_timeout, self.cancel.clone())
            .probe(path)
            .await
    }

    /// Run every stage of `spec` in order.
    ///
    /// A stage starts only after the previous one exited successfully; the
    /// first failure ends the job.
    pub async fn run(&self, spec: JobSpec) -> Result<JobOutcome> {
        let started = Instant::now();
        let stages = spec.stages();
        let total = stages.len();

        tracing::info!(job = %spec.kind(), stages = total, "Starting job");

        for (i, stage) in stages.iter().enumerate() {
            let stage_started = Instant::now();
            tracing::debug!(
                job = %spec.kind(),
                stage = stage.name,
                "Running stage {}/{}",
                i + 1,
                total
            );

            ToolCommand::new(self.ffmpeg.clone())
                .stage(stage.name)
                .args(ENGINE_FLAGS)
                .args(stage.args.iter().cloned())
                .timeout(self.stage_timeout)
                .cancel_on(self.cancel.clone())
                .execute()
                .await
                .inspect_err(|e| {
                    tracing::warn!(job = %spec.kind(), stage = stage.name, error = %e, "Stage failed");
                })?;

            tracing::debug!(
                job = %spec.kind(),
                stage = stage.name,
                elapsed = ?stage_started.elapsed(),
                "Stage finished"
            );
        }

        let outcome = JobOutcome {
            kind: spec.kind(),
            output: spec.output().to_path_buf(),
            stages: total,
            elapsed: started.elapsed(),
        };

        tracing::info!(job = %outcome.kind, elapsed = ?outcome.elapsed, "Job finished");

        Ok(outcome)
    }
}
