//! External tool detection.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available by running it with `version_arg`.
///
/// `program` may be a bare name resolved through `PATH` or an absolute path.
///
/// # Example
///
/// ```no_run
/// use clipforge_av::tools::check_tool_with_arg;
/// use std::path::Path;
///
/// let info = check_tool_with_arg("ffprobe", Path::new("ffprobe"), "-version");
/// if info.available {
///     println!("ffprobe version: {:?}", info.version);
/// }
/// ```
pub fn check_tool_with_arg(name: &str, program: &Path, version_arg: &str) -> ToolInfo {
    let result = Command::new(program).arg(version_arg).output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = which::which(program).ok();

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check ffmpeg and ffprobe, honoring configured paths.
pub fn check_tools(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> Vec<ToolInfo> {
    vec![
        check_tool_with_arg("ffmpeg", ffmpeg.unwrap_or(Path::new("ffmpeg")), "-version"),
        check_tool_with_arg("ffprobe", ffprobe.unwrap_or(Path::new("ffprobe")), "-version"),
    ]
}

/// Require that a tool is available on `PATH`, returning its path.
///
/// # Errors
///
/// Returns an error if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
pub fn get_tool_path(name: &str, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            "Configured {} path {:?} does not exist, falling back to PATH",
            name,
            path
        );
    }

    require_tool(name)
}
