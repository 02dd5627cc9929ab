//! On-disk storage for images attached to complaints.

use crate::error::AppError;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

pub const PUBLIC_PREFIX: &str = "/uploads";
const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("only jpg, png, gif and webp images are accepted")]
    NotAnImage,
    #[error("image is empty")]
    Empty,
    #[error("image exceeds the {0} byte limit")]
    TooLarge(usize),
    #[error("failed to store image: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Io(e) => AppError::Internal(e.into()),
            other => AppError::invalid("image", other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: PathBuf,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Writes the image under a fresh name, keeping only a whitelisted extension.
    pub async fn save(
        &self,
        file_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredImage, UploadError> {
        if !content_type.is_some_and(|ct| ct.starts_with("image/")) {
            return Err(UploadError::NotAnImage);
        }
        let extension = file_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or(UploadError::NotAnImage)?;
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge(self.max_bytes));
        }

        let stored_name = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.dir.join(&stored_name);
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("Stored upload {} ({} bytes)", stored_name, bytes.len());

        Ok(StoredImage {
            path,
            url: format!("{PUBLIC_PREFIX}/{stored_name}"),
        })
    }

    /// Best-effort removal of an image whose complaint was never created.
    pub async fn remove(&self, image: &StoredImage) {
        if let Err(e) = tokio::fs::remove_file(&image.path).await {
            tracing::warn!("Failed to remove orphaned upload {}: {}", image.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), 1024);

        let stored = store
            .save(Some("Roof.JPG"), Some("image/jpeg"), b"\xff\xd8\xff")
            .await
            .unwrap();

        assert!(stored.url.starts_with("/uploads/"));
        assert!(stored.url.ends_with(".jpg"));
        assert_eq!(tokio::fs::read(&stored.path).await.unwrap(), b"\xff\xd8\xff");

        store.remove(&stored).await;
        assert!(!stored.path.exists());
    }

    #[tokio::test]
    async fn test_rejects_non_images() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), 1024);

        let err = store
            .save(Some("notes.txt"), Some("text/plain"), b"hello")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::NotAnImage));

        let err = store
            .save(Some("script.php"), Some("image/png"), b"<?php")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::NotAnImage));
    }

    #[tokio::test]
    async fn test_rejects_oversized_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), 4);

        let err = store
            .save(Some("a.png"), Some("image/png"), b"12345")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::TooLarge(4)));

        let err = store.save(Some("a.png"), Some("image/png"), b"").await.unwrap_err();
        assert!(matches!(err, UploadError::Empty));
    }

    #[test]
    fn test_upload_errors_map_to_image_field() {
        let err: AppError = UploadError::TooLarge(10).into();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors[0].field, "image");
    }
}
