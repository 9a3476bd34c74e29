mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    parse_config(&content).with_context(|| format!("Invalid config file: {:?}", path))
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./clipforge.toml",
        "~/.config/clipforge/config.toml",
        "/etc/clipforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.server.max_upload_bytes == 0 {
        anyhow::bail!("server.max_upload_bytes must be greater than 0");
    }

    if config.engine.stage_timeout_secs == 0 {
        anyhow::bail!("engine.stage_timeout_secs must be greater than 0");
    }

    if config.engine.probe_timeout_secs == 0 {
        anyhow::bail!("engine.probe_timeout_secs must be greater than 0");
    }

    for (name, path) in [
        ("ffmpeg_path", &config.tools.ffmpeg_path),
        ("ffprobe_path", &config.tools.ffprobe_path),
    ] {
        if let Some(path) = path {
            if !path.exists() {
                tracing::warn!("Configured tools.{} does not exist: {:?}", name, path);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.max_upload_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.storage.upload_dir, Path::new("uploads"));
        assert_eq!(config.storage.output_dir, Path::new("merged"));
        assert!(!config.storage.purge_on_start);
        assert!(config.tools.ffmpeg_path.is_none());
        assert_eq!(config.engine.stage_timeout().as_secs(), 600);
        assert_eq!(config.engine.probe_timeout().as_secs(), 30);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse_config(
            r#"
[server]
port = 8088

[engine]
stage_timeout_secs = 60
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.shutdown_grace().as_secs(), 30);
        assert_eq!(config.engine.stage_timeout_secs, 60);
        assert_eq!(config.engine.probe_timeout_secs, 30);
    }

    #[test]
    fn rejects_zero_port() {
        let err = parse_config("[server]\nport = 0\n").unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn rejects_zero_timeouts() {
        assert!(parse_config("[engine]\nstage_timeout_secs = 0\n").is_err());
        assert!(parse_config("[engine]\nprobe_timeout_secs = 0\n").is_err());
    }

    #[test]
    fn rejects_zero_upload_cap() {
        assert!(parse_config("[server]\nmax_upload_bytes = 0\n").is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(parse_config("[server\nport = 1").is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load_config(Path::new("/definitely/not/clipforge.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config file"));
    }
}
