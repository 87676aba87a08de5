//! Uploaded image payloads and the checks run before a job is created.

use bytes::Bytes;
use thiserror::Error;

use crate::{Fingerprint, ProcessingMode};

/// Default cap on upload size: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Image encodings accepted at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    /// Map a MIME type to a supported format.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// File extension used when the asset is stored.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }
}

/// Size limits applied at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Reasons an upload is rejected before any job exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing image file")]
    Empty,

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },
}

/// An image submitted for processing.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub filename: String,
    pub mime_type: String,
    pub mode: ProcessingMode,
}

impl ImageUpload {
    pub fn new(
        bytes: impl Into<Bytes>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        mode: ProcessingMode,
    ) -> Self {
        let filename = filename.into();
        let filename = if filename.trim().is_empty() {
            "upload".to_string()
        } else {
            filename
        };
        Self {
            bytes: bytes.into(),
            filename,
            mime_type: mime_type.into(),
            mode,
        }
    }

    /// Check type and size, returning the detected format.
    pub fn validate(&self, limits: &UploadLimits) -> Result<ImageFormat, ValidationError> {
        if self.bytes.is_empty() {
            return Err(ValidationError::Empty);
        }
        let format = ImageFormat::from_mime(&self.mime_type)
            .ok_or_else(|| ValidationError::UnsupportedType(self.mime_type.clone()))?;
        if self.bytes.len() > limits.max_bytes {
            return Err(ValidationError::TooLarge {
                size: self.bytes.len(),
                limit: limits.max_bytes,
            });
        }
        Ok(format)
    }

    /// Cache key for this upload.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.bytes, self.mode)
    }
}
