//! S3 API request handlers

pub mod batch;
pub mod bucket;
pub mod multipart;
pub mod object;
pub mod service;
#[cfg(test)]
pub(crate) mod test_support;

pub use batch::*;
pub use bucket::*;
pub use multipart::*;
pub use object::*;
pub use service::*;

use crate::router::QueryParams;
use crate::ApiError;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use s3mux_backend::{ByteStream, ObjectUpload};
use serde::Serialize;

/// Clients that need folder-marker special casing
const S3_BROWSER_AGENT: &str = "S3 Browser";

/// 200 response with an XML body
pub(crate) fn xml_response<T: Serialize>(value: &T) -> Result<Response, ApiError> {
    let body = crate::xml::to_xml(value)?;
    Ok((StatusCode::OK, [("Content-Type", "application/xml")], body).into_response())
}

/// Forward the request body to the backend without buffering it
pub(crate) fn body_stream(body: Body) -> ByteStream {
    Box::pin(body.into_data_stream().map_err(std::io::Error::other))
}

/// Object attributes carried in request headers
pub(crate) fn upload_from_headers(headers: &HeaderMap) -> ObjectUpload {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    // Extract user metadata (x-amz-meta-*)
    let user_metadata = headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix("x-amz-meta-")?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect();

    ObjectUpload {
        content_type,
        content_length,
        user_metadata,
    }
}

/// Insert a header, skipping values that are not valid header text.
/// `name` must be lowercase.
pub(crate) fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

/// `versionId` as sent by the client; empty and `undefined` mean none
pub(crate) fn requested_version(params: &QueryParams) -> Option<&str> {
    params.non_empty("versionId").filter(|v| *v != "undefined")
}

pub(crate) fn is_s3_browser(headers: &HeaderMap) -> bool {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| ua.contains(S3_BROWSER_AGENT))
}

pub(crate) fn object_resource(bucket: &str, key: &str) -> String {
    format!("/{}/{}", bucket, key)
}

pub(crate) fn bucket_resource(bucket: &str) -> String {
    format!("/{}", bucket)
}
