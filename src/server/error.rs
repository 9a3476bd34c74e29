//! Error-to-HTTP response conversion for the media routes.
//!
//! Every handler returns `Result<Response, AppError>`. The JSON body carries a
//! short client-facing message chosen per job and stage; engine diagnostics
//! only ever reach the log.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clipforge_av::JobKind;
use serde_json::json;

/// Which input of a job a probe was run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTarget {
    Video,
    Audio,
}

impl ProbeTarget {
    fn as_str(&self) -> &'static str {
        match self {
            ProbeTarget::Video => "video",
            ProbeTarget::Audio => "audio",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Required inputs missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The multipart body could not be read.
    #[error("upload failed: {message}")]
    Upload { status: StatusCode, message: String },

    #[error("{job}: probing {} failed: {source}", .target.as_str())]
    Probe {
        job: JobKind,
        target: ProbeTarget,
        source: clipforge_av::Error,
    },

    #[error("{job}: {source}")]
    Engine {
        job: JobKind,
        source: clipforge_av::Error,
    },

    /// The output could not be opened for streaming.
    #[error("{job}: failed to send output: {source}")]
    Transfer {
        job: JobKind,
        source: std::io::Error,
    },

    /// Staging directories could not be used.
    #[error("{0}")]
    Io(clipforge_av::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn probe(job: JobKind, target: ProbeTarget, source: clipforge_av::Error) -> Self {
        Self::Probe {
            job,
            target,
            source,
        }
    }

    pub fn engine(job: JobKind, source: clipforge_av::Error) -> Self {
        Self::Engine { job, source }
    }

    pub fn transfer(job: JobKind, source: std::io::Error) -> Self {
        Self::Transfer { job, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Upload { status, .. } => *status,
            AppError::Probe { .. }
            | AppError::Engine { .. }
            | AppError::Transfer { .. }
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Upload { .. } => "upload_error",
            AppError::Probe { .. } => "probe_error",
            AppError::Engine { .. } => "engine_error",
            AppError::Transfer { .. } => "transfer_error",
            AppError::Io(_) => "io_error",
        }
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(message) => message.clone(),
            AppError::Upload { message, .. } => message.clone(),
            AppError::Probe { target, .. } => match target {
                ProbeTarget::Video => "Error processing video file".to_string(),
                ProbeTarget::Audio => "Error processing audio file".to_string(),
            },
            AppError::Engine { job, source } => engine_message(*job, source.stage()).to_string(),
            AppError::Transfer { job, .. } => match job {
                JobKind::ConcatAudio => "Error sending merged file",
                JobKind::Trim => "Error downloading file.",
                _ => "Error sending output file",
            }
            .to_string(),
            AppError::Io(_) => "Internal server error".to_string(),
        }
    }

    fn job(&self) -> Option<JobKind> {
        match self {
            AppError::Probe { job, .. }
            | AppError::Engine { job, .. }
            | AppError::Transfer { job, .. } => Some(*job),
            _ => None,
        }
    }

    fn stage(&self) -> Option<&str> {
        match self {
            AppError::Probe { target, .. } => Some(target.as_str()),
            AppError::Engine { source, .. } => source.stage(),
            AppError::Transfer { .. } => Some("transfer"),
            _ => None,
        }
    }
}

fn engine_message(job: JobKind, stage: Option<&str>) -> &'static str {
    match job {
        JobKind::ConcatAudio => "Error merging files",
        JobKind::MergeVideoAudioMix => "An error occurred while merging files.",
        JobKind::ConcatVideos => "Error merging video files",
        JobKind::Trim => "Error trimming video.",
        JobKind::MergeVideoBackgroundAudio => match stage {
            Some("loop") => "Error processing audio file",
            _ => "Error merging video and background audio",
        },
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        let status = match e.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "Upload exceeds the maximum allowed size".to_string()
        } else {
            format!("Malformed upload: {}", e.body_text())
        };
        Self::Upload { status, message }
    }
}

impl From<clipforge_av::Error> for AppError {
    fn from(e: clipforge_av::Error) -> Self {
        Self::Io(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let job = self.job().map(|j| j.as_str()).unwrap_or("-");
        let stage = self.stage().unwrap_or("-");

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                job,
                stage,
                error = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }

        let body = json!({
            "error": self.public_message(),
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
