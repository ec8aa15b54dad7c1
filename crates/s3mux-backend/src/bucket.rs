//! Bucket naming rules

use crate::error::{BackendError, BackendErrorKind, Result};

/// Validate a bucket name against the S3 naming rules
pub fn validate_bucket_name(name: &str) -> Result<()> {
    if name.len() < 3 || name.len() > 63 {
        return Err(invalid("Bucket name must be between 3 and 63 characters"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid(
            "Bucket name can only contain lowercase letters, numbers, hyphens, and periods",
        ));
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("Bucket name cannot start or end with a hyphen"));
    }

    if name.contains("..") {
        return Err(invalid("Bucket name cannot contain consecutive periods"));
    }

    Ok(())
}

fn invalid(message: &str) -> BackendError {
    BackendError::new(BackendErrorKind::InvalidBucketName, message)
}
