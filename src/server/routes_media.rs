//! Media processing endpoints.
//!
//! Every handler follows the same shape: stage the multipart upload into a
//! per-request [`ArtifactSet`], validate that the required parts are present,
//! build a [`JobSpec`], run it, and stream the output back. The artifact set
//! is released before the response is returned; only the output outlives the
//! handler, owned by the response body until the transfer ends.
//!
//! `POST /trim-video` treats `endTime` as a *duration* counted from
//! `startTime`, not an absolute end position: `startTime=5, endTime=10` yields
//! the ten seconds from 0:05 to 0:15. `duration` is accepted as an alias.

use axum::{
    extract::{Multipart, State},
    response::Response,
    routing::post,
    Router,
};
use clipforge_av::job::{parse_audio_level, parse_offset};
use clipforge_av::{ArtifactKind, ArtifactSet, JobKind, JobSpec};
use std::path::PathBuf;

use super::deliver::{deliver, Disposition};
use super::error::{AppError, ProbeTarget};
use super::upload::{client_extension, UploadForm};
use super::AppContext;

pub fn media_routes() -> Router<AppContext> {
    Router::new()
        .route("/upload", post(concat_audio))
        .route("/merge-video-audio", post(merge_video_audio))
        .route("/merge-multiple-videos", post(merge_multiple_videos))
        .route("/trim-video", post(trim_video))
        .route(
            "/merge-video-background-audio",
            post(merge_video_background_audio),
        )
}

/// Concatenate every file sent as `files` into one mp3.
async fn concat_audio(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut artifacts = ctx.staging.artifact_set();
    let form = UploadForm::receive(multipart, &mut artifacts).await?;

    let inputs: Vec<PathBuf> = form.files("files").map(|f| f.staged_path.clone()).collect();
    if inputs.is_empty() {
        return Err(AppError::validation("No files uploaded"));
    }

    tracing::info!("Concatenating {} audio files", inputs.len());

    let output = artifacts.allocate(ArtifactKind::Output, "merged", "mp3").await?;
    let spec = JobSpec::concat_audio(inputs, output).map_err(invalid)?;

    run_and_deliver(
        &ctx,
        artifacts,
        spec,
        "merged_output.mp3",
        Disposition::Attachment,
    )
    .await
}

/// Mix `audio` into the soundtrack of `video`, optionally delayed by
/// `audioOffset` seconds. The result is served inline.
async fn merge_video_audio(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut artifacts = ctx.staging.artifact_set();
    let form = UploadForm::receive(multipart, &mut artifacts).await?;

    let (Some(video), Some(audio)) = (form.file("video"), form.file("audio")) else {
        return Err(AppError::validation(
            "Both video and audio files are required.",
        ));
    };
    let offset = parse_offset(form.text("audioOffset"));

    tracing::info!(
        "Mixing {:?} into {:?} (offset {:?})",
        audio.original_name,
        video.original_name,
        offset
    );

    let output = artifacts.allocate(ArtifactKind::Output, "merged", "mp4").await?;
    let spec = JobSpec::merge_video_audio(
        video.staged_path.clone(),
        audio.staged_path.clone(),
        offset,
        output,
    );

    run_and_deliver(
        &ctx,
        artifacts,
        spec,
        "merged_video.mp4",
        Disposition::Inline,
    )
    .await
}

/// Concatenate two or more `videos` in upload order.
async fn merge_multiple_videos(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut artifacts = ctx.staging.artifact_set();
    let form = UploadForm::receive(multipart, &mut artifacts).await?;

    let inputs: Vec<PathBuf> = form.files("videos").map(|f| f.staged_path.clone()).collect();
    if inputs.len() < 2 {
        return Err(AppError::validation("At least two video files required"));
    }

    tracing::info!("Concatenating {} videos", inputs.len());

    let output = artifacts.allocate(ArtifactKind::Output, "merged", "mp4").await?;
    let spec = JobSpec::concat_videos(inputs, output).map_err(invalid)?;

    run_and_deliver(
        &ctx,
        artifacts,
        spec,
        "merged_videos.mp4",
        Disposition::Attachment,
    )
    .await
}

/// Cut `endTime` (or `duration`) seconds starting at `startTime` out of `video`.
async fn trim_video(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let mut artifacts = ctx.staging.artifact_set();
    let form = UploadForm::receive(multipart, &mut artifacts).await?;

    let Some(video) = form.file("video") else {
        return Err(AppError::validation("No video file uploaded"));
    };
    let (Some(start), Some(duration)) = (
        form.text("startTime"),
        form.text("endTime").or_else(|| form.text("duration")),
    ) else {
        return Err(AppError::validation("startTime and endTime are required"));
    };

    tracing::info!(
        "Trimming {:?}: start {} duration {}",
        video.original_name,
        start,
        duration
    );

    let ext = client_extension(&video.original_name).unwrap_or("mp4");
    let output = artifacts.allocate(ArtifactKind::Output, "trimmed", ext).await?;
    let spec = JobSpec::trim(video.staged_path.clone(), start, duration, output).map_err(invalid)?;

    let filename = format!("trimmed_{}", base_name(&video.original_name));
    run_and_deliver(&ctx, artifacts, spec, &filename, Disposition::Attachment).await
}

/// Loop `audio` to the length of `video` and mix it in at `audioLevel` percent.
async fn merge_video_background_audio(
    State(ctx): State<AppContext>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    const JOB: JobKind = JobKind::MergeVideoBackgroundAudio;

    let mut artifacts = ctx.staging.artifact_set();
    let form = UploadForm::receive(multipart, &mut artifacts).await?;

    let (Some(video), Some(audio)) = (form.file("video"), form.file("audio")) else {
        return Err(AppError::validation(
            "Both video and audio files are required.",
        ));
    };
    let level = parse_audio_level(form.text("audioLevel"));

    let video_probe = ctx
        .engine
        .probe(&video.staged_path)
        .await
        .map_err(|e| AppError::probe(JOB, ProbeTarget::Video, e))?;
    let audio_probe = ctx
        .engine
        .probe(&audio.staged_path)
        .await
        .map_err(|e| AppError::probe(JOB, ProbeTarget::Audio, e))?;

    tracing::info!(
        video_duration = video_probe.duration_seconds,
        audio_duration = audio_probe.duration_seconds,
        level,
        "Adding background audio {:?} to {:?}",
        audio.original_name,
        video.original_name
    );

    let looped = artifacts
        .allocate(ArtifactKind::Intermediate, "looped", "mp3")
        .await?;
    let output = artifacts.allocate(ArtifactKind::Output, "merged", "mp4").await?;
    let spec = JobSpec::merge_background_audio(
        video.staged_path.clone(),
        audio.staged_path.clone(),
        video_probe,
        audio_probe,
        level,
        looped,
        output,
    )
    .map_err(|e| AppError::probe(JOB, ProbeTarget::Audio, e))?;

    run_and_deliver(
        &ctx,
        artifacts,
        spec,
        "merged_output.mp4",
        Disposition::Attachment,
    )
    .await
}

/// Run `spec`, hand its output to the response body and release everything else.
async fn run_and_deliver(
    ctx: &AppContext,
    mut artifacts: ArtifactSet,
    spec: JobSpec,
    filename: &str,
    disposition: Disposition,
) -> Result<Response, AppError> {
    let job = spec.kind();
    let outcome = ctx
        .engine
        .run(spec)
        .await
        .map_err(|e| AppError::engine(job, e))?;

    let output = artifacts.detach(&outcome.output).ok_or_else(|| {
        AppError::Io(clipforge_av::Error::Workspace(format!(
            "output {:?} is not owned by the request",
            outcome.output
        )))
    })?;
    artifacts.release_all();

    deliver(output, filename, disposition)
        .await
        .map_err(|e| AppError::transfer(job, e))
}

fn invalid(e: clipforge_av::Error) -> AppError {
    AppError::validation(e.to_string())
}

/// Final path component of a client-supplied file name.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}
