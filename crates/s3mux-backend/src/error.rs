//! Error types for the s3mux-backend crate

use std::fmt;
use thiserror::Error;

/// Result type alias using `BackendError`
pub type Result<T> = std::result::Result<T, BackendError>;

/// Closed set of failure kinds a backend can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    BucketNotFound,
    BucketAlreadyExists,
    BucketAlreadyOwnedByYou,
    BucketNotEmpty,
    InvalidBucketName,
    ObjectNotFound,
    VersionNotFound,
    UploadNotFound,
    InvalidPart,
    InvalidPartOrder,
    CorsNotFound,
    InvalidArgument,
    AccessDenied,
    NotImplemented,
    Internal,
}

impl BackendErrorKind {
    /// Stable identifier for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BucketNotFound => "bucket_not_found",
            Self::BucketAlreadyExists => "bucket_already_exists",
            Self::BucketAlreadyOwnedByYou => "bucket_already_owned_by_you",
            Self::BucketNotEmpty => "bucket_not_empty",
            Self::InvalidBucketName => "invalid_bucket_name",
            Self::ObjectNotFound => "object_not_found",
            Self::VersionNotFound => "version_not_found",
            Self::UploadNotFound => "upload_not_found",
            Self::InvalidPart => "invalid_part",
            Self::InvalidPartOrder => "invalid_part_order",
            Self::CorsNotFound => "cors_not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::AccessDenied => "access_denied",
            Self::NotImplemented => "not_implemented",
            Self::Internal => "internal",
        }
    }

    /// Classify free-form vendor error text.
    ///
    /// Adapters wrapping SDKs that only surface a message use this to
    /// produce a structured error. Anything unrecognised is `Internal`.
    pub fn infer(message: &str) -> Self {
        let msg = message.to_ascii_lowercase();

        if msg.contains("not implemented") || msg.contains("unsupported") {
            return Self::NotImplemented;
        }
        if msg.contains("access denied") || msg.contains("forbidden") {
            return Self::AccessDenied;
        }
        if msg.contains("already owned") {
            return Self::BucketAlreadyOwnedByYou;
        }
        if msg.contains("already exists") {
            return Self::BucketAlreadyExists;
        }
        if msg.contains("not empty") {
            return Self::BucketNotEmpty;
        }
        if msg.contains("not found") || msg.contains("does not exist") || msg.contains("no such") {
            return if msg.contains("version") {
                Self::VersionNotFound
            } else if msg.contains("upload") {
                Self::UploadNotFound
            } else if msg.contains("cors") {
                Self::CorsNotFound
            } else if msg.contains("bucket") && !msg.contains("key") && !msg.contains("object") {
                Self::BucketNotFound
            } else {
                Self::ObjectNotFound
            };
        }
        if msg.contains("invalid bucket name") {
            return Self::InvalidBucketName;
        }
        if msg.contains("part order") {
            return Self::InvalidPartOrder;
        }
        if msg.contains("invalid part") {
            return Self::InvalidPart;
        }
        if msg.contains("invalid") {
            return Self::InvalidArgument;
        }
        Self::Internal
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by an [`ObjectBackend`](crate::ObjectBackend)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct BackendError {
    /// What went wrong
    pub kind: BackendErrorKind,
    /// Human-readable detail, surfaced to clients
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from vendor text, inferring its kind
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: BackendErrorKind::infer(&message),
            message,
        }
    }

    pub fn bucket_not_found(bucket: &str) -> Self {
        Self::new(
            BackendErrorKind::BucketNotFound,
            format!("The specified bucket does not exist: {}", bucket),
        )
    }

    pub fn object_not_found(bucket: &str, key: &str) -> Self {
        Self::new(
            BackendErrorKind::ObjectNotFound,
            format!("The specified key does not exist: {}/{}", bucket, key),
        )
    }

    pub fn version_not_found(key: &str, version_id: &str) -> Self {
        Self::new(
            BackendErrorKind::VersionNotFound,
            format!("The specified version does not exist: {} ({})", key, version_id),
        )
    }

    pub fn upload_not_found(upload_id: &str) -> Self {
        Self::new(
            BackendErrorKind::UploadNotFound,
            format!("The specified upload does not exist: {}", upload_id),
        )
    }

    pub fn not_implemented(operation: &str) -> Self {
        Self::new(
            BackendErrorKind::NotImplemented,
            format!("{} is not implemented by this backend", operation),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Internal, message)
    }

    /// Whether this error reports an unsupported primitive
    pub fn is_not_implemented(&self) -> bool {
        self.kind == BackendErrorKind::NotImplemented
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("stream error: {}", err))
    }
}
