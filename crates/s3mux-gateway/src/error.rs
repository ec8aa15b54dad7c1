//! Error types and S3 error codes

use crate::xml;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use s3mux_backend::{BackendError, BackendErrorKind};
use thiserror::Error;

/// S3 error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3ErrorCode {
    AccessDenied,
    BucketAlreadyExists,
    BucketAlreadyOwnedByYou,
    BucketNotEmpty,
    InternalError,
    InvalidArgument,
    InvalidBucketName,
    InvalidPart,
    InvalidPartOrder,
    InvalidRequest,
    MalformedPOSTRequest,
    MalformedXML,
    MethodNotAllowed,
    MissingFields,
    MissingParameter,
    NoSuchBucket,
    NoSuchCORSConfiguration,
    NoSuchKey,
    NoSuchUpload,
    NoSuchVersion,
    NotImplemented,
    SlowDown,
}

impl S3ErrorCode {
    /// Get the error code string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::BucketAlreadyExists => "BucketAlreadyExists",
            Self::BucketAlreadyOwnedByYou => "BucketAlreadyOwnedByYou",
            Self::BucketNotEmpty => "BucketNotEmpty",
            Self::InternalError => "InternalError",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidPart => "InvalidPart",
            Self::InvalidPartOrder => "InvalidPartOrder",
            Self::InvalidRequest => "InvalidRequest",
            Self::MalformedPOSTRequest => "MalformedPOSTRequest",
            Self::MalformedXML => "MalformedXML",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::MissingFields => "MissingFields",
            Self::MissingParameter => "MissingParameter",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchCORSConfiguration => "NoSuchCORSConfiguration",
            Self::NoSuchKey => "NoSuchKey",
            Self::NoSuchUpload => "NoSuchUpload",
            Self::NoSuchVersion => "NoSuchVersion",
            Self::NotImplemented => "NotImplemented",
            Self::SlowDown => "SlowDown",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::BucketAlreadyExists | Self::BucketAlreadyOwnedByYou => StatusCode::CONFLICT,
            Self::BucketNotEmpty => StatusCode::CONFLICT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidArgument
            | Self::InvalidBucketName
            | Self::InvalidPart
            | Self::InvalidPartOrder
            | Self::InvalidRequest
            | Self::MalformedPOSTRequest
            | Self::MalformedXML
            | Self::MissingFields
            | Self::MissingParameter => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NoSuchBucket
            | Self::NoSuchCORSConfiguration
            | Self::NoSuchKey
            | Self::NoSuchUpload
            | Self::NoSuchVersion => StatusCode::NOT_FOUND,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::SlowDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<BackendErrorKind> for S3ErrorCode {
    fn from(kind: BackendErrorKind) -> Self {
        match kind {
            BackendErrorKind::BucketNotFound => Self::NoSuchBucket,
            BackendErrorKind::BucketAlreadyExists => Self::BucketAlreadyExists,
            BackendErrorKind::BucketAlreadyOwnedByYou => Self::BucketAlreadyOwnedByYou,
            BackendErrorKind::BucketNotEmpty => Self::BucketNotEmpty,
            BackendErrorKind::InvalidBucketName => Self::InvalidBucketName,
            BackendErrorKind::ObjectNotFound => Self::NoSuchKey,
            BackendErrorKind::VersionNotFound => Self::NoSuchVersion,
            BackendErrorKind::UploadNotFound => Self::NoSuchUpload,
            BackendErrorKind::InvalidPart => Self::InvalidPart,
            BackendErrorKind::InvalidPartOrder => Self::InvalidPartOrder,
            BackendErrorKind::CorsNotFound => Self::NoSuchCORSConfiguration,
            BackendErrorKind::InvalidArgument => Self::InvalidArgument,
            BackendErrorKind::AccessDenied => Self::AccessDenied,
            BackendErrorKind::NotImplemented => Self::NotImplemented,
            BackendErrorKind::Internal => Self::InternalError,
        }
    }
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    S3Error {
        code: S3ErrorCode,
        message: String,
        resource: Option<String>,
        request_id: String,
    },

    #[error("{}", .0.message)]
    Backend(#[from] BackendError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Create a new S3 error
    pub fn s3(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self::S3Error {
            code,
            message: message.into(),
            resource: None,
            request_id: new_request_id(),
        }
    }

    /// Create with resource
    pub fn s3_with_resource(
        code: S3ErrorCode,
        message: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self::S3Error {
            code,
            message: message.into(),
            resource: Some(resource.into()),
            request_id: new_request_id(),
        }
    }

    /// Attach the resource the error refers to, keeping code and message
    pub fn with_resource(self, resource: impl Into<String>) -> Self {
        match self {
            Self::S3Error {
                code,
                message,
                request_id,
                ..
            } => Self::S3Error {
                code,
                message,
                resource: Some(resource.into()),
                request_id,
            },
            other => {
                let code = other.error_code();
                Self::s3_with_resource(code, other.to_string(), resource)
            }
        }
    }

    /// Get the error code
    pub fn error_code(&self) -> S3ErrorCode {
        match self {
            Self::S3Error { code, .. } => *code,
            Self::Backend(e) => e.kind.into(),
            Self::Internal(_) => S3ErrorCode::InternalError,
        }
    }

    fn parts(&self) -> (S3ErrorCode, Option<&str>, String) {
        match self {
            Self::S3Error {
                code,
                resource,
                request_id,
                ..
            } => (*code, resource.as_deref(), request_id.clone()),
            _ => (self.error_code(), None, new_request_id()),
        }
    }

    /// Status and headers only, for HEAD requests
    pub fn into_head_response(self) -> Response {
        let (code, _, request_id) = self.parts();
        let mut response = code.status_code().into_response();
        set_error_headers(&mut response, code, &request_id);
        response
    }
}

/// Extension for attaching a resource path to fallible results
pub trait ResourceContext<T> {
    fn for_resource(self, resource: impl Into<String>) -> Result<T, ApiError>;
}

impl<T, E: Into<ApiError>> ResourceContext<T> for Result<T, E> {
    fn for_resource(self, resource: impl Into<String>) -> Result<T, ApiError> {
        self.map_err(|e| e.into().with_resource(resource))
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn set_error_headers(response: &mut Response, code: S3ErrorCode, request_id: &str) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", value.clone());
        headers.insert("x-amz-id-2", value);
    }
    headers.insert("x-amz-error-code", HeaderValue::from_static(code.as_str()));
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, resource, request_id) = self.parts();
        let status = code.status_code();

        match status {
            s if s.is_server_error() => tracing::error!(code = code.as_str(), error = %self, "Request failed"),
            _ => tracing::debug!(code = code.as_str(), error = %self, "Request rejected"),
        }

        let envelope = xml::ErrorResponse {
            code: code.as_str().to_string(),
            message: self.to_string(),
            resource: resource.unwrap_or_default().to_string(),
            request_id: request_id.clone(),
        };
        let body = xml::to_xml(&envelope).unwrap_or_default();

        let mut response = (status, [("Content-Type", "application/xml")], body).into_response();
        set_error_headers(&mut response, code, &request_id);
        response
    }
}
