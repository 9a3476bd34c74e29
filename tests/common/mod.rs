//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] whose staging
//! directories live in a fresh temp dir and whose engine is a pair of fake
//! `ffmpeg`/`ffprobe` shell scripts, plus [`MultipartBody`] for building
//! upload requests by hand.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use tempfile::TempDir;

use clipforge::config::Config;
use clipforge::server::{create_router, AppContext};

/// Fake ffmpeg.
///
/// Appends its arguments to `calls.log` in the harness root (two levels
/// above the file it writes), fails if the arguments contain the pattern in
/// `fail_on`, and otherwise writes a small file at its last argument.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
for last; do :; done
root=$(dirname "$(dirname "$last")")
echo "$@" >> "$root/calls.log"
if [ -f "$root/fail_on" ]; then
  pattern=$(cat "$root/fail_on")
  case "$*" in
    *"$pattern"*) echo "simulated engine failure" >&2; exit 1 ;;
  esac
fi
printf 'rendered by fake ffmpeg' > "$last"
"#;

/// Fake ffprobe: the probed file's content is its duration in seconds.
const FAKE_FFPROBE: &str = r#"#!/bin/sh
for last; do :; done
d=$(cat "$last")
case "$d" in
  ''|*[!0-9.]*) exit 1 ;;
esac
printf '{"format":{"filename":"%s","duration":"%s"}}\n' "$last" "$d"
"#;

struct FakeTools {
    _dir: TempDir,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

/// Scripts are written once per test binary and only executed afterwards.
fn fake_tools() -> &'static FakeTools {
    static TOOLS: OnceLock<FakeTools> = OnceLock::new();
    TOOLS.get_or_init(|| {
        let dir = tempfile::tempdir().expect("failed to create tools dir");
        let write = |name: &str, body: &str| {
            let path = dir.path().join(name);
            fs::write(&path, body).expect("failed to write fake tool");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("failed to chmod fake tool");
            path
        };
        let ffmpeg = write("ffmpeg", FAKE_FFMPEG);
        let ffprobe = write("ffprobe", FAKE_FFPROBE);
        FakeTools {
            _dir: dir,
            ffmpeg,
            ffprobe,
        }
    })
}

/// Test harness wrapping an [`AppContext`] backed by a temp dir.
pub struct TestHarness {
    pub dir: TempDir,
    pub ctx: AppContext,
}

impl TestHarness {
    /// Create a harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a harness with a custom configuration; storage paths are
    /// always redirected into the harness temp dir.
    pub fn with_config(mut config: Config) -> Self {
        let dir = tempfile::tempdir().expect("failed to create harness dir");
        config.storage.upload_dir = dir.path().join("uploads");
        config.storage.output_dir = dir.path().join("merged");

        let tools = fake_tools();
        let ctx = AppContext::new(config, tools.ffmpeg.clone(), tools.ffprobe.clone());

        Self { dir, ctx }
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    /// Make every engine invocation whose arguments contain `pattern` fail.
    pub fn fail_on(&self, pattern: &str) {
        fs::write(self.dir.path().join("fail_on"), pattern).unwrap();
    }

    /// Argument lines of every engine invocation so far, in order.
    pub fn engine_calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    /// Every file left in the upload and output directories.
    pub fn leftover_files(&self) -> Vec<PathBuf> {
        ["uploads", "merged"]
            .iter()
            .flat_map(|d| list_files(&self.dir.path().join(d)))
            .collect()
    }
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Hand-built `multipart/form-data` body.
pub struct MultipartBody {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: "----clipforge-test-boundary-7MA4YWxkTrZu0gW".to_string(),
            body: Vec::new(),
        }
    }

    pub fn file(mut self, field: &str, filename: &str, content: impl AsRef<[u8]>) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                self.boundary, field, filename
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(content.as_ref());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, field: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, field, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", self.boundary),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}
