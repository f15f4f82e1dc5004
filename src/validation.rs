//! Input safety checks applied before any storage access.
//!
//! Artifact paths and attachment filenames come straight off the wire, so
//! everything that ends up joined onto a storage base directory is screened
//! here first.

use crate::error::{AppError, AppResult};

const MAX_PATH_LENGTH: usize = 1024;
const MAX_PACKAGE_NAME_LENGTH: usize = 214;

/// Validate a registry artifact path (with or without a leading slash).
///
/// Rejects traversal (`..`), null bytes, control characters, backslashes and
/// oversized paths. The path is otherwise taken as-is; it addresses backend
/// storage verbatim.
pub fn validate_artifact_path(path: &str) -> AppResult<()> {
    let trimmed = path.trim_start_matches('/');

    if trimmed.is_empty() {
        tracing::warn!("Empty artifact path provided");
        return Err(AppError::Validation(
            "Artifact path cannot be empty".to_string(),
        ));
    }

    if path.len() > MAX_PATH_LENGTH {
        tracing::warn!(length = %path.len(), "Artifact path too long");
        return Err(AppError::Validation(format!(
            "Artifact path too long: {} characters (max: {})",
            path.len(),
            MAX_PATH_LENGTH
        )));
    }

    if path.contains('\0') {
        tracing::warn!(path = %path, "Null byte detected in artifact path");
        return Err(AppError::Validation(
            "Artifact path contains null byte".to_string(),
        ));
    }

    if path.chars().any(|c| c.is_control()) {
        tracing::warn!(path = %path, "Control character detected in artifact path");
        return Err(AppError::Validation(
            "Artifact path contains control characters".to_string(),
        ));
    }

    if path.contains('\\') {
        tracing::warn!(path = %path, "Backslash detected in artifact path");
        return Err(AppError::Validation(
            "Artifact path contains backslash".to_string(),
        ));
    }

    // Reject any `..` segment, not just a leading one
    if trimmed.split('/').any(|segment| segment == "..") {
        tracing::warn!(path = %path, "Path traversal attempt detected (..)");
        return Err(AppError::Validation(
            "Artifact path contains parent directory reference (..)".to_string(),
        ));
    }

    Ok(())
}

/// Validate an attachment filename from a publish payload.
///
/// Attachment keys become single path segments under `{pkg}/-/`, so
/// separators are rejected outright.
pub fn validate_attachment_name(filename: &str) -> AppResult<()> {
    if filename.is_empty() {
        return Err(AppError::Validation(
            "Attachment filename cannot be empty".to_string(),
        ));
    }

    if filename.contains('/') || filename.contains('\\') {
        tracing::warn!(filename = %filename, "Separator detected in attachment filename");
        return Err(AppError::Validation(
            "Attachment filename cannot contain path separators".to_string(),
        ));
    }

    validate_artifact_path(filename)
}

/// Validate a package name captured from the URL.
pub fn validate_package_name(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::Validation(
            "Package name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_PACKAGE_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "Package name too long: {} characters (max: {})",
            name.len(),
            MAX_PACKAGE_NAME_LENGTH
        )));
    }

    // Scoped names carry exactly one separator after URL decoding
    if name.split('/').any(|segment| segment.is_empty() || segment == "..") {
        return Err(AppError::Validation(format!(
            "Invalid package name: {name}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_normal_artifact_paths() {
        assert!(validate_artifact_path("/pkg/-/pkg-1.0.0.tgz").is_ok());
        assert!(validate_artifact_path("@scope/pkg/-/pkg-1.0.0.tgz").is_ok());
    }

    #[test]
    fn rejects_traversal_and_junk() {
        assert!(validate_artifact_path("/../etc/passwd").is_err());
        assert!(validate_artifact_path("/pkg/../../x").is_err());
        assert!(validate_artifact_path("/pkg/\0").is_err());
        assert!(validate_artifact_path("").is_err());
        assert!(validate_artifact_path("a\\b").is_err());
    }

    #[test]
    fn attachment_names_are_single_segments() {
        assert!(validate_attachment_name("pkg-1.0.0.tgz").is_ok());
        assert!(validate_attachment_name("nested/pkg.tgz").is_err());
        assert!(validate_attachment_name("..").is_err());
    }

    #[test]
    fn package_names() {
        assert!(validate_package_name("express").is_ok());
        assert!(validate_package_name("@scope/pkg").is_ok());
        assert!(validate_package_name("").is_err());
        assert!(validate_package_name("a//b").is_err());
        assert!(validate_package_name("../x").is_err());
    }
}
