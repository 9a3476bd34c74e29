//! # clipforge-av
//!
//! ffmpeg job building, execution and artifact staging.
//!
//! This crate provides:
//! - [`JobSpec`]: validated descriptions of the five supported media jobs,
//!   rendered into ffmpeg argument lists
//! - [`Engine`]: runs jobs stage by stage with per-stage timeouts and
//!   shutdown cancellation, and probes durations through ffprobe
//! - [`Staging`] / [`ArtifactSet`]: unique temp paths with guaranteed cleanup
//! - [`tools`]: ffmpeg/ffprobe discovery
//!
//! ## Example
//!
//! ```no_run
//! use clipforge_av::{Engine, JobSpec, Staging, ArtifactKind};
//! use std::path::PathBuf;
//!
//! # async fn example() -> clipforge_av::Result<()> {
//! let engine = Engine::new(PathBuf::from("ffmpeg"), PathBuf::from("ffprobe"));
//! let staging = Staging::new("uploads", "merged");
//! let mut artifacts = staging.artifact_set();
//!
//! let output = artifacts.allocate(ArtifactKind::Output, "trimmed", "mp4").await?;
//! let spec = JobSpec::trim(PathBuf::from("clip.mp4"), "5", "10", output)?;
//! let outcome = engine.run(spec).await?;
//! println!("wrote {}", outcome.output.display());
//! # Ok(())
//! # }
//! ```

pub mod command;
mod error;
pub mod job;
pub mod probe;
pub mod runner;
pub mod tools;
pub mod workspace;

// Re-exports
pub use command::{ToolCommand, ToolOutput};
pub use error::{Error, Result};
pub use job::{JobKind, JobParams, JobSpec, Stage};
pub use probe::ProbeResult;
pub use runner::{Engine, JobOutcome};
pub use tools::{check_tools, get_tool_path, require_tool, ToolInfo};
pub use workspace::{release, Artifact, ArtifactKind, ArtifactSet, Staging};
