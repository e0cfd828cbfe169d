use crate::config::MediaConfig;
use crate::error::{MediaError, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "webm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Image => IMAGE_EXTENSIONS,
            MediaKind::Video => VIDEO_EXTENSIONS,
        }
    }
}

/// Lower-cased extension of `file_name` if `kind` allows it
pub fn validate_extension(file_name: &str, kind: MediaKind) -> std::result::Result<String, MediaError> {
    if file_name.trim().is_empty() {
        return Err(MediaError::MissingFileName);
    }

    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if kind.allowed_extensions().contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(MediaError::UnsupportedExtension {
            kind: kind.as_str().to_string(),
            extension,
        })
    }
}

/// Base name with anything outside `[A-Za-z0-9._-]` replaced
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub id: Uuid,
    pub path: PathBuf,
    pub original_name: String,
    pub kind: MediaKind,
}

/// Writes validated uploads under the upload directory
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new<P: AsRef<Path>>(dir: P, max_upload_mb: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_bytes: max_upload_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(&config.upload_dir, config.max_upload_mb)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub async fn save(&self, file_name: &str, kind: MediaKind, data: &[u8]) -> Result<StoredUpload> {
        validate_extension(file_name, kind)?;

        if data.len() > self.max_bytes {
            return Err(MediaError::TooLarge {
                size: data.len(),
                limit: self.max_bytes,
            }
            .into());
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let id = Uuid::new_v4();
        let path = self
            .dir
            .join(format!("{}_{}", id.simple(), sanitize_file_name(file_name)));
        tokio::fs::write(&path, data).await?;

        info!(
            "Stored {} upload {} ({} bytes) at {}",
            kind.as_str(),
            file_name,
            data.len(),
            path.display()
        );

        Ok(StoredUpload {
            id,
            path,
            original_name: file_name.to_string(),
            kind,
        })
    }
}
