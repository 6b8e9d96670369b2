//! Upload intake validation.

use crate::config::UploadConfig;
use crate::models::FileInfo;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{name}: file too large ({size} bytes, max {max} bytes)")]
    FileTooLarge { name: String, size: u64, max: u64 },

    #[error("{name}: unsupported content type '{content_type}'")]
    InvalidContentType { name: String, content_type: String },

    #[error("{name}: file is empty")]
    EmptyFile { name: String },
}

impl ValidationError {
    pub fn file_name(&self) -> &str {
        match self {
            ValidationError::FileTooLarge { name, .. }
            | ValidationError::InvalidContentType { name, .. }
            | ValidationError::EmptyFile { name } => name,
        }
    }
}

/// Checks files offered to the uploader against size and MIME limits.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_file_size: u64,
    allowed_content_types: Vec<String>,
}

impl UploadValidator {
    pub fn new(max_file_size: u64, allowed_content_types: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_content_types: allowed_content_types
                .into_iter()
                .map(|ct| ct.to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            config.max_file_size_bytes as u64,
            config.allowed_content_types.clone(),
        )
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn validate_file_size(&self, file: &FileInfo) -> Result<(), ValidationError> {
        if file.size == 0 {
            return Err(ValidationError::EmptyFile {
                name: file.name.clone(),
            });
        }

        if file.size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                name: file.name.clone(),
                size: file.size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    pub fn validate_content_type(&self, file: &FileInfo) -> Result<(), ValidationError> {
        // Ignore parameters such as "; charset=..."
        let normalized = file
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        if !self.allowed_content_types.iter().any(|ct| ct == &normalized) {
            return Err(ValidationError::InvalidContentType {
                name: file.name.clone(),
                content_type: file.content_type.clone(),
            });
        }

        Ok(())
    }

    pub fn validate(&self, file: &FileInfo) -> Result<(), ValidationError> {
        self.validate_content_type(file)?;
        self.validate_file_size(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> UploadValidator {
        UploadValidator::new(
            10 * 1024 * 1024,
            vec!["image/jpeg".to_string(), "image/PNG".to_string()],
        )
    }

    fn file(name: &str, size: u64, content_type: &str) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            size,
            content_type: content_type.to_string(),
        }
    }

    #[test]
    fn test_accepts_allowed_image() {
        assert!(validator().validate(&file("a.jpg", 1024, "image/jpeg")).is_ok());
        assert!(validator().validate(&file("b.png", 1024, "image/png")).is_ok());
        assert!(validator()
            .validate(&file("c.jpg", 1024, "Image/JPEG; charset=binary"))
            .is_ok());
    }

    #[test]
    fn test_rejects_oversize_with_file_name() {
        let err = validator()
            .validate(&file("huge.jpg", 10 * 1024 * 1024 + 1, "image/jpeg"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::FileTooLarge { .. }));
        assert!(err.to_string().contains("huge.jpg"));
    }

    #[test]
    fn test_exact_limit_is_allowed() {
        assert!(validator()
            .validate(&file("edge.jpg", 10 * 1024 * 1024, "image/jpeg"))
            .is_ok());
    }

    #[test]
    fn test_rejects_disallowed_type() {
        let err = validator()
            .validate(&file("clip.mp4", 10, "video/mp4"))
            .unwrap_err();
        assert_eq!(err.file_name(), "clip.mp4");
        assert!(err.to_string().contains("video/mp4"));
    }

    #[test]
    fn test_rejects_empty_file() {
        let err = validator().validate(&file("empty.jpg", 0, "image/jpeg")).unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmptyFile {
                name: "empty.jpg".to_string()
            }
        );
    }
}
