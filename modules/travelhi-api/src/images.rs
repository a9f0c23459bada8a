use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use travelhi_common::{TravelError, TravelResult};

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Image-storage collaborator. Returns the stored name, which is served
/// under `/uploads/{name}`.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn store(&self, upload: ImageUpload) -> TravelResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Identify by leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

/// Check declared type, actual bytes and size. Returns the detected kind.
pub fn validate_image(upload: &ImageUpload, max_bytes: usize) -> TravelResult<ImageKind> {
    if upload.bytes.is_empty() {
        return Err(TravelError::validation("Uploaded file is empty"));
    }
    if upload.bytes.len() > max_bytes {
        return Err(TravelError::validation(format!(
            "Uploaded file exceeds {max_bytes} bytes"
        )));
    }

    let unsupported = || TravelError::validation("Unsupported image type. Allowed: jpeg, png, webp");
    let declared = upload
        .content_type
        .as_deref()
        .map(|ct| ImageKind::from_content_type(ct).ok_or_else(unsupported))
        .transpose()?;
    let actual = ImageKind::sniff(&upload.bytes).ok_or_else(unsupported)?;

    match declared {
        Some(kind) if kind != actual => Err(TravelError::validation(
            "File content does not match its declared type",
        )),
        _ => Ok(actual),
    }
}

/// Stores images as `<uuid>.<ext>` in a local directory.
pub struct LocalImageStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl LocalImageStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn store(&self, upload: ImageUpload) -> TravelResult<String> {
        let kind = validate_image(&upload, self.max_bytes)?;
        let name = format!("{}.{}", Uuid::new_v4(), kind.extension());

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create upload dir {}", self.dir.display()))?;
        tokio::fs::write(self.dir.join(&name), &upload.bytes)
            .await
            .with_context(|| format!("failed to write upload {name}"))?;

        info!(name = %name, bytes = upload.bytes.len(), "Stored image");
        Ok(name)
    }
}
