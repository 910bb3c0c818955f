//! Root folder file layout
//!
//! Every stored file lives below the root folder. The database keeps paths
//! relative to the root (`uploads/inspect_....jpg`) so a root folder can be
//! moved as a whole.

use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Image extensions accepted for uploads
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Inspection images kept for review
pub const UPLOADS_DIR: &str = "uploads";
pub const REFERENCE_PHOTOS_DIR: &str = "reference_photos";
pub const TRAINING_IMAGES_DIR: &str = "training_images";
pub const MODELS_DIR: &str = "models";
/// Training partitions and dataset archives
pub const EXPORTS_DIR: &str = "exports";

#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the fixed sub-directories (idempotent)
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [
            UPLOADS_DIR,
            REFERENCE_PHOTOS_DIR,
            TRAINING_IMAGES_DIR,
            MODELS_DIR,
            EXPORTS_DIR,
        ] {
            std::fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join(EXPORTS_DIR)
    }

    /// Absolute path of a stored relative path
    ///
    /// Relative paths that would escape the root folder are rejected.
    pub fn resolve(&self, relative: &str) -> ApiResult<PathBuf> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ApiError::BadRequest(format!("Invalid stored path '{}'", relative)));
        }
        Ok(self.root.join(path))
    }

    /// Write bytes below `dir` (relative to root) and return the stored relative path
    pub async fn write_file(&self, dir: &str, file_name: &str, bytes: &[u8]) -> ApiResult<String> {
        let relative = format!("{}/{}", dir.trim_end_matches('/'), file_name);
        let absolute = self.resolve(&relative)?;
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&absolute, bytes).await?;
        debug!(path = %relative, bytes = bytes.len(), "Stored file");
        Ok(relative)
    }

    /// Remove a stored file; a file that is already gone is not an error
    pub async fn remove_file(&self, relative: &str) -> ApiResult<bool> {
        let absolute = self.resolve(relative)?;
        match tokio::fs::remove_file(&absolute).await {
            Ok(()) => {
                debug!(path = %relative, "Removed file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %relative, "File already removed");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn model_dir(workplace_id: Uuid) -> String {
        format!("{}/{}", MODELS_DIR, workplace_id)
    }

    pub fn training_image_dir(workplace_id: Uuid) -> String {
        format!("{}/{}", TRAINING_IMAGES_DIR, workplace_id)
    }
}

/// Lower-case extension of an uploaded file name
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Extension of an uploaded image, rejecting anything that is not an image
pub fn image_extension(file_name: Option<&str>) -> ApiResult<String> {
    match file_name.and_then(file_extension) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => Ok(ext),
        Some(ext) => Err(ApiError::BadRequest(format!(
            "Unsupported image type '.{}' (allowed: {})",
            ext,
            IMAGE_EXTENSIONS.join(", ")
        ))),
        None => Ok("jpg".to_string()),
    }
}

/// Unique file name `<prefix>_<timestamp>_<short id>.<ext>`
pub fn unique_file_name(prefix: &str, ext: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}.{}",
        prefix,
        Utc::now().format("%Y%m%d_%H%M%S"),
        &id[..8],
        ext
    )
}
