//! Multipart upload decoding.
//!
//! File parts are streamed chunk by chunk into the upload staging directory
//! and adopted by the request's [`ArtifactSet`] before the first byte is
//! written, so partially received files are cleaned up like any other.

use axum::extract::Multipart;
use clipforge_av::{ArtifactKind, ArtifactSet};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use super::error::AppError;

/// A file received from the client and staged on disk.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Form field the file arrived in, without any `[]` suffix.
    pub field: String,
    /// File name as sent by the client.
    pub original_name: String,
    pub staged_path: PathBuf,
    pub size_bytes: u64,
}

/// Decoded multipart form: staged files in arrival order plus text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    files: Vec<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Read every part of `multipart`, staging file parts through `artifacts`.
    pub async fn receive(
        mut multipart: Multipart,
        artifacts: &mut ArtifactSet,
    ) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = normalize_field_name(field.name().unwrap_or_default());

            let Some(original_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                form.fields.insert(name, value);
                continue;
            };

            let ext = client_extension(&original_name).unwrap_or("");
            let staged_path = artifacts.allocate(ArtifactKind::Upload, "upload", ext).await?;

            let mut file = tokio::fs::File::create(&staged_path)
                .await
                .map_err(|e| AppError::Io(e.into()))?;
            let mut size_bytes = 0u64;
            while let Some(chunk) = field.chunk().await? {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| AppError::Io(e.into()))?;
                size_bytes += chunk.len() as u64;
            }
            file.flush().await.map_err(|e| AppError::Io(e.into()))?;

            // Browsers send an empty, unnamed part for a file input left blank.
            if original_name.is_empty() && size_bytes == 0 {
                drop(artifacts.detach(&staged_path));
                continue;
            }

            tracing::debug!(
                field = %name,
                file = %original_name,
                size = size_bytes,
                "Staged upload {:?}",
                staged_path
            );

            form.files.push(UploadedFile {
                field: name,
                original_name,
                staged_path,
                size_bytes,
            });
        }

        Ok(form)
    }

    /// Every file uploaded under `field`, in arrival order.
    pub fn files<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == field)
    }

    /// The first file uploaded under `field`.
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// A non-blank text field.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// `videos[]` and `videos` name the same field.
fn normalize_field_name(name: &str) -> String {
    name.strip_suffix("[]").unwrap_or(name).to_string()
}

/// Extension of a client-supplied file name, if it is safe to reuse.
///
/// Only short alphanumeric extensions are kept.
pub(crate) fn client_extension(original_name: &str) -> Option<&str> {
    std::path::Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
}
