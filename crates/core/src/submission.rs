//! Submission validation.
//!
//! Checks applied before a job record is created. Kept here (not in the
//! HTTP layer) so the rules are unit-testable and shared with any future
//! submission surface.

use std::path::Path;

use crate::error::CoreError;

/// Video container extensions accepted for upload and analysis.
pub const ALLOWED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

/// Maximum length of a device type identifier.
const MAX_DEVICE_TYPE_LEN: usize = 64;

/// Validate a device type identifier.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_DEVICE_TYPE_LEN` characters.
/// - Must contain only alphanumeric, hyphen, underscore, or dot characters.
pub fn validate_device_type(device_type: &str) -> Result<(), CoreError> {
    if device_type.is_empty() {
        return Err(CoreError::Validation(
            "Device type must not be empty".to_string(),
        ));
    }
    if device_type.len() > MAX_DEVICE_TYPE_LEN {
        return Err(CoreError::Validation(format!(
            "Device type must not exceed {MAX_DEVICE_TYPE_LEN} characters"
        )));
    }
    if !device_type
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "Device type may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    Ok(())
}

/// Whether `path` carries an accepted video extension (case-insensitive).
pub fn has_allowed_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            ALLOWED_VIDEO_EXTENSIONS.iter().any(|a| *a == lower)
        })
        .unwrap_or(false)
}

/// Validate an uploaded file name's extension.
pub fn validate_video_extension(file_name: &str) -> Result<(), CoreError> {
    if has_allowed_video_extension(Path::new(file_name)) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported file format. Allowed formats: {}",
            ALLOWED_VIDEO_EXTENSIONS.join(", ")
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_device_types() {
        assert!(validate_device_type("pMDI").is_ok());
        assert!(validate_device_type("DPI_type1").is_ok());
        assert!(validate_device_type("smi-2.0").is_ok());
    }

    #[test]
    fn empty_device_type_rejected() {
        assert!(validate_device_type("").is_err());
    }

    #[test]
    fn device_type_with_spaces_rejected() {
        assert!(validate_device_type("soft mist").is_err());
    }

    #[test]
    fn device_type_too_long_rejected() {
        let name = "a".repeat(MAX_DEVICE_TYPE_LEN + 1);
        assert!(validate_device_type(&name).is_err());
    }

    #[test]
    fn allowed_extensions_case_insensitive() {
        assert!(has_allowed_video_extension(Path::new("clip.mp4")));
        assert!(has_allowed_video_extension(Path::new("clip.MOV")));
        assert!(has_allowed_video_extension(Path::new("clip.Mkv")));
    }

    #[test]
    fn disallowed_extensions_rejected() {
        assert!(!has_allowed_video_extension(Path::new("clip.wmv")));
        assert!(!has_allowed_video_extension(Path::new("clip")));
        assert!(!has_allowed_video_extension(Path::new("clip.mp4.exe")));
    }

    #[test]
    fn validate_video_extension_error_lists_formats() {
        let err = validate_video_extension("report.pdf").unwrap_err();
        assert!(err.to_string().contains("mp4"));
    }
}
