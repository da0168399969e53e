use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use sha2::{Digest, Sha256};

/// Local media directory for uploaded images, served back under `/media`.
#[derive(Clone, Debug)]
pub struct UploadStore {
    media_dir: PathBuf,
    max_upload_bytes: usize,
    persist: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid file format")]
    InvalidFormat,
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub path: PathBuf,
    pub url: String,
}

pub const MEDIA_URL: &str = "/media";

const STORED_EXTENSIONS: [&str; 6] = ["jpg", "png", "webp", "gif", "bmp", "tiff"];

impl UploadStore {
    pub fn new(media_dir: impl Into<PathBuf>, max_upload_bytes: usize, persist: bool) -> Self {
        Self {
            media_dir: media_dir.into(),
            max_upload_bytes,
            persist,
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn persist_enabled(&self) -> bool {
        self.persist
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    pub fn extract_file_extension(mime_type: &str) -> Result<&'static str, StorageError> {
        match mime_type {
            "image/jpeg" | "image/jpg" => Ok("jpg"),
            "image/png" => Ok("png"),
            "image/webp" => Ok("webp"),
            "image/gif" => Ok("gif"),
            "image/bmp" => Ok("bmp"),
            _ => Err(StorageError::InvalidFormat),
        }
    }

    /// Extension from the declared MIME type, falling back to sniffing the bytes.
    pub fn detect_extension(
        mime_type: Option<&str>,
        image_data: &[u8],
    ) -> Result<&'static str, StorageError> {
        if let Some(extension) = mime_type.and_then(|m| Self::extract_file_extension(m).ok()) {
            return Ok(extension);
        }
        image::guess_format(image_data)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .filter(|extension| STORED_EXTENSIONS.contains(extension))
            .ok_or(StorageError::InvalidFormat)
    }

    pub fn validate_image_size(&self, size: usize) -> Result<(), StorageError> {
        if size > self.max_upload_bytes {
            return Err(StorageError::FileTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Writes the image as `{hash}.{ext}`; identical uploads share one file.
    pub fn save(
        &self,
        image_hash: &str,
        mime_type: Option<&str>,
        image_data: &[u8],
    ) -> Result<StoredUpload, StorageError> {
        self.validate_image_size(image_data.len())?;
        let extension = Self::detect_extension(mime_type, image_data)?;
        let file_name = format!("{}.{}", image_hash, extension);
        let path = self.media_dir.join(&file_name);

        if path.exists() {
            debug!("Upload {} already stored", file_name);
        } else {
            fs::create_dir_all(&self.media_dir)?;
            fs::write(&path, image_data)?;
            debug!("Stored upload at {}", path.display());
        }

        Ok(StoredUpload {
            path,
            url: format!("{}/{}", MEDIA_URL, file_name),
        })
    }

    /// Removes every stored file for `image_hash`, returning how many were deleted.
    pub fn delete_by_hash(&self, image_hash: &str) -> Result<usize, StorageError> {
        if image_hash.is_empty() || !image_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidFormat);
        }
        let mut removed = 0;
        for extension in STORED_EXTENSIONS {
            let path = self.media_dir.join(format!("{}.{}", image_hash, extension));
            if path.exists() {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
