//! Streaming finished outputs back to the client.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use clipforge_av::Artifact;
use futures::StreamExt;
use std::path::Path;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

const CHUNK_SIZE: usize = 64 * 1024;

/// How the browser should treat the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Offer the file as a download.
    Attachment,
    /// Let the browser play the file in place.
    Inline,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

/// Stream `artifact` as the response body under `filename`.
///
/// The artifact is owned by the body stream and released once the stream is
/// dropped, whether the transfer completed, failed, or the client went away.
/// If the file cannot be opened the artifact is released before returning.
pub async fn deliver(
    artifact: Artifact,
    filename: &str,
    disposition: Disposition,
) -> std::io::Result<Response> {
    let file = File::open(artifact.path()).await?;
    let size = file.metadata().await?.len();
    let content_type = determine_content_type(artifact.path());

    tracing::debug!(
        "Streaming {:?} ({} bytes) as {:?}",
        artifact.path(),
        size,
        filename
    );

    // The closure owns the artifact, tying its lifetime to the body.
    let stream = ReaderStream::with_capacity(file, CHUNK_SIZE).map(move |chunk| {
        chunk.inspect_err(|e| {
            tracing::warn!("Aborting transfer of {:?}: {}", artifact.path(), e);
        })
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "{}; filename=\"{}\"",
                disposition.as_str(),
                sanitize_filename(filename)
            ),
        )
        .body(Body::from_stream(stream))
        .map_err(std::io::Error::other)
}

fn determine_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext.to_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" | "m2ts" => "video/mp2t",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Make a client-supplied name safe for a quoted header parameter.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_control() || !c.is_ascii() => '_',
            c => c,
        })
        .collect();
    if cleaned.trim().is_empty() {
        "output".to_string()
    } else {
        cleaned
    }
}
