use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// How long in-flight requests may keep running after a shutdown signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_max_upload_bytes() -> usize {
    1024 * 1024 * 1024
}
fn default_shutdown_grace() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Staged uploads and intermediate files
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Finished outputs awaiting download
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Delete leftover files in both directories at startup
    #[serde(default)]
    pub purge_on_start: bool,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("merged")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
            purge_on_start: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Time budget for a single ffmpeg invocation
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Time budget for a single ffprobe invocation
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_stage_timeout() -> u64 {
    600
}
fn default_probe_timeout() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl EngineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}
