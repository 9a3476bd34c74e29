//! Integration tests for configuration loading.

use clipforge::config::{load_config, load_config_or_default, Config};
use clipforge::server::AppContext;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[test]
fn full_config_round_trips_through_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("clipforge.toml");
    fs::write(
        &path,
        r#"
[server]
host = "127.0.0.1"
port = 9000
max_upload_bytes = 52428800
shutdown_grace_secs = 5

[storage]
upload_dir = "/srv/clipforge/uploads"
output_dir = "/srv/clipforge/merged"
purge_on_start = true

[tools]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[engine]
stage_timeout_secs = 120
probe_timeout_secs = 10
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.max_upload_bytes, 50 * 1024 * 1024);
    assert_eq!(config.server.shutdown_grace_secs, 5);
    assert_eq!(config.storage.upload_dir, Path::new("/srv/clipforge/uploads"));
    assert_eq!(config.storage.output_dir, Path::new("/srv/clipforge/merged"));
    assert!(config.storage.purge_on_start);
    assert_eq!(
        config.tools.ffmpeg_path.as_deref(),
        Some(Path::new("/opt/ffmpeg/bin/ffmpeg"))
    );
    assert!(config.tools.ffprobe_path.is_none());
    assert_eq!(config.engine.stage_timeout_secs, 120);
    assert_eq!(config.engine.probe_timeout_secs, 10);
}

#[test]
fn explicit_path_wins_over_defaults() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("custom.toml");
    fs::write(&path, "[server]\nport = 7000\n").unwrap();

    let config = load_config_or_default(Some(&path)).unwrap();
    assert_eq!(config.server.port, 7000);
}

#[test]
fn explicit_missing_path_is_an_error() {
    let temp = tempdir().unwrap();
    let result = load_config_or_default(Some(&temp.path().join("missing.toml")));
    assert!(result.is_err());
}

#[test]
fn unknown_sections_are_ignored() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "[metrics]\nenabled = true\n\n[server]\nport = 5001\n").unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.server.port, 5001);
}

#[test]
fn wrong_types_are_rejected() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "[server]\nport = \"five thousand\"\n").unwrap();

    let err = load_config(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config"));
}

// ---------------------------------------------------------------------------
// Context construction
// ---------------------------------------------------------------------------

#[test]
fn context_applies_engine_and_storage_settings() {
    let mut config = Config::default();
    config.storage.upload_dir = PathBuf::from("/data/in");
    config.storage.output_dir = PathBuf::from("/data/out");

    let ctx = AppContext::new(
        config,
        PathBuf::from("/usr/bin/ffmpeg"),
        PathBuf::from("/usr/bin/ffprobe"),
    );
    assert_eq!(ctx.engine.ffmpeg(), Path::new("/usr/bin/ffmpeg"));
    assert_eq!(ctx.engine.ffprobe(), Path::new("/usr/bin/ffprobe"));
    assert_eq!(ctx.staging.upload_dir(), Path::new("/data/in"));
    assert_eq!(ctx.staging.output_dir(), Path::new("/data/out"));
    assert!(!ctx.engine.cancellation().is_cancelled());
}

#[test]
fn context_with_missing_tools_fails() {
    let mut config = Config::default();
    config.tools.ffmpeg_path = Some(PathBuf::from("/nonexistent/ffmpeg"));

    // Falls back to PATH; only fails where ffmpeg is not installed at all.
    if which_ffmpeg_missing() {
        assert!(AppContext::from_config(config).is_err());
    }
}

fn which_ffmpeg_missing() -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            !std::env::split_paths(&paths).any(|dir| dir.join("ffmpeg").is_file())
        })
        .unwrap_or(true)
}
