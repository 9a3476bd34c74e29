//! Builder for executing external tool commands with timeout and cancellation.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Default command timeout: 10 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// How much of stderr is kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// The child is spawned with `kill_on_drop`, so when the timeout elapses or the
/// cancellation token fires the pending wait is dropped and the process is
/// killed rather than left running.
///
/// # Example
///
/// ```no_run
/// use clipforge_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> clipforge_av::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .stage("probe")
///     .args(["-v", "quiet", "-print_format", "json", "-show_format"])
///     .arg("/path/to/video.mp4")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    stage: String,
    timeout: Duration,
    cancel: Option<CancellationToken>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            stage: "run".to_string(),
            timeout: DEFAULT_TIMEOUT,
            cancel: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Label used in errors and logs.
    pub fn stage(&mut self, stage: impl Into<String>) -> &mut Self {
        self.stage = stage.into();
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Kill the process when `token` is cancelled.
    pub fn cancel_on(&mut self, token: CancellationToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the program does not exist.
    /// - [`Error::ToolFailed`] if it exits non-zero (message is the stderr tail).
    /// - [`Error::Timeout`] if it outlives the timeout; the process is killed.
    /// - [`Error::Cancelled`] if the cancellation token fires; the process is killed.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            tool = %program_name,
            stage = %self.stage,
            args = ?self.args,
            "Spawning external tool"
        );

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found(program_name.clone())
            } else {
                Error::tool_failed(&program_name, &self.stage, format!("failed to spawn: {e}"))
            }
        })?;

        let cancel = self.cancel.clone().unwrap_or_default();
        let wait = tokio::time::timeout(self.timeout, child.wait_with_output());

        // Dropping `wait` drops the child, and kill_on_drop terminates it.
        let result = tokio::select! {
            result = wait => result,
            _ = cancel.cancelled() => {
                tracing::warn!(tool = %program_name, stage = %self.stage, "Killing tool on shutdown");
                return Err(Error::Cancelled {
                    tool: program_name,
                    stage: self.stage.clone(),
                });
            }
        };

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(Error::tool_failed(
                        program_name,
                        &self.stage,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            stderr_tail(&tool_output.stderr)
                        ),
                    ));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(Error::tool_failed(
                program_name,
                &self.stage,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => {
                tracing::warn!(
                    tool = %program_name,
                    stage = %self.stage,
                    timeout = ?self.timeout,
                    "Killing tool after timeout"
                );
                Err(Error::Timeout {
                    tool: program_name,
                    stage: self.stage.clone(),
                    after: self.timeout,
                })
            }
        }
    }
}

/// Last few non-empty lines of a tool's stderr.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
