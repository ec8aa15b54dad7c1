//! Multipart upload handlers

use super::{body_stream, insert_header, object_resource, upload_from_headers, xml_response};
use crate::error::ResourceContext;
use crate::router::QueryParams;
use crate::state::Connection;
use crate::xml::{self, CompleteMultipartUpload, CompleteMultipartUploadResult, InitiateMultipartUploadResult};
use crate::{ApiError, S3ErrorCode};
use axum::{
    body::Body,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use s3mux_backend::{multipart::MAX_PART_NUMBER, CompletePart};
use tracing::{debug, info};

/// POST /{bucket}/{key}?uploads - Initiate multipart upload
///
/// Bucket-level requests carry the key in a `key` query parameter.
pub async fn initiate_multipart_upload(
    conn: &Connection,
    bucket: &str,
    key: Option<&str>,
    params: &QueryParams,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let key = target_key(bucket, key, params)?;
    let upload_id = conn
        .backend
        .initiate_multipart_upload(bucket, &key, upload_from_headers(headers))
        .await
        .for_resource(object_resource(bucket, &key))?;

    info!(connection = %conn.name(), bucket, key = %key, upload_id = %upload_id, "Multipart upload initiated");

    xml_response(&InitiateMultipartUploadResult {
        xmlns: xml::S3_NAMESPACE,
        bucket: bucket.to_string(),
        key,
        upload_id,
    })
}

/// PUT /{bucket}/{key}?partNumber=N&uploadId=X - Upload part
pub async fn upload_part(
    conn: &Connection,
    bucket: &str,
    key: &str,
    params: &QueryParams,
    body: Body,
) -> Result<Response, ApiError> {
    let resource = object_resource(bucket, key);
    let upload_id = upload_id(params, &resource)?;
    let part_number = part_number(params).map_err(|e| e.with_resource(&resource))?;

    let etag = conn
        .backend
        .upload_part(bucket, key, upload_id, part_number, body_stream(body))
        .await
        .for_resource(&resource)?;

    debug!(bucket, key, upload_id, part_number, etag = %etag, "Part uploaded");

    let mut response = StatusCode::OK.into_response();
    insert_header(response.headers_mut(), "etag", &xml::quote_etag(&etag));
    Ok(response)
}

/// POST /{bucket}/{key}?uploadId=X - Complete multipart upload
pub async fn complete_multipart_upload(
    conn: &Connection,
    bucket: &str,
    key: Option<&str>,
    params: &QueryParams,
    body: Bytes,
) -> Result<Response, ApiError> {
    let key = target_key(bucket, key, params)?;
    let resource = object_resource(bucket, &key);
    let upload_id = upload_id(params, &resource)?;

    let request: CompleteMultipartUpload =
        xml::from_xml(&body).map_err(|e| e.with_resource(&resource))?;
    let parts = request
        .parts
        .into_iter()
        .map(|p| CompletePart {
            part_number: p.part_number,
            etag: p.etag.trim().trim_matches('"').to_string(),
        })
        .collect::<Vec<_>>();

    let completed = conn
        .backend
        .complete_multipart_upload(bucket, &key, upload_id, parts)
        .await
        .for_resource(&resource)?;

    info!(
        connection = %conn.name(),
        bucket,
        key = %key,
        upload_id,
        size = completed.size,
        "Multipart upload completed"
    );

    let etag = xml::quote_etag(&completed.etag);
    let mut response = xml_response(&CompleteMultipartUploadResult {
        xmlns: xml::S3_NAMESPACE,
        location: completed.location,
        bucket: bucket.to_string(),
        key,
        etag: etag.clone(),
    })?;
    insert_header(response.headers_mut(), "etag", &etag);
    if let Some(version_id) = &completed.version_id {
        insert_header(response.headers_mut(), "x-amz-version-id", version_id);
    }
    Ok(response)
}

/// DELETE /{bucket}/{key}?uploadId=X - Abort multipart upload
pub async fn abort_multipart_upload(
    conn: &Connection,
    bucket: &str,
    key: &str,
    params: &QueryParams,
) -> Result<Response, ApiError> {
    let resource = object_resource(bucket, key);
    let upload_id = upload_id(params, &resource)?;

    conn.backend
        .abort_multipart_upload(bucket, key, upload_id)
        .await
        .for_resource(&resource)?;

    info!(connection = %conn.name(), bucket, key, upload_id, "Multipart upload aborted");
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn target_key(bucket: &str, key: Option<&str>, params: &QueryParams) -> Result<String, ApiError> {
    key.filter(|k| !k.is_empty())
        .or_else(|| params.non_empty("key"))
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError::s3_with_resource(
                S3ErrorCode::MissingParameter,
                "Object key is required",
                format!("/{}", bucket),
            )
        })
}

fn upload_id<'a>(params: &'a QueryParams, resource: &str) -> Result<&'a str, ApiError> {
    params.non_empty("uploadId").ok_or_else(|| {
        ApiError::s3_with_resource(S3ErrorCode::MissingParameter, "uploadId is required", resource)
    })
}

/// `partNumber` as an integer in `1..=10000`
fn part_number(params: &QueryParams) -> Result<u32, ApiError> {
    let raw = params.get("partNumber").unwrap_or_default();
    raw.parse::<u32>()
        .ok()
        .filter(|n| (1..=MAX_PART_NUMBER).contains(n))
        .ok_or_else(|| {
            ApiError::s3(
                S3ErrorCode::InvalidArgument,
                format!(
                    "Part number must be an integer between 1 and {}, got '{}'",
                    MAX_PART_NUMBER, raw
                ),
            )
        })
}
