//! Object operation handlers

use super::{
    body_stream, insert_header, is_s3_browser, object_resource, requested_version,
    upload_from_headers,
};
use crate::error::ResourceContext;
use crate::router::QueryParams;
use crate::state::Connection;
use crate::xml;
use crate::{ApiError, S3ErrorCode};
use axum::{
    body::Body,
    extract::{FromRequest, Multipart},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::DateTime;
use s3mux_backend::{stream_from_bytes, ObjectInfo, ObjectUpload, NULL_VERSION_ID};
use tracing::{debug, info, warn};

/// PUT /{bucket}/{key} - Put object, streaming the body to the backend
pub async fn put_object(
    conn: &Connection,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let upload = upload_from_headers(headers);

    // S3 Browser creates folders as empty objects without the trailing slash
    let mut key = key.to_string();
    if upload.content_length == Some(0) && is_s3_browser(headers) && !key.ends_with('/') {
        key.push('/');
        debug!(bucket, key = %key, "Treating empty S3 Browser upload as folder marker");
    }

    let info = conn
        .backend
        .put_object(bucket, &key, body_stream(body), upload)
        .await
        .for_resource(object_resource(bucket, &key))?;

    info!(connection = %conn.name(), bucket, key = %key, size = info.size, "Object stored");

    let mut response = StatusCode::OK.into_response();
    let response_headers = response.headers_mut();
    insert_header(response_headers, "etag", &xml::quote_etag(&info.etag));
    if let Some(version_id) = &info.version_id {
        insert_header(response_headers, "x-amz-version-id", version_id);
    }
    Ok(response)
}

/// GET /{bucket}/{key} - Download object with conditional request support
pub async fn get_object(
    conn: &Connection,
    bucket: &str,
    key: &str,
    params: &QueryParams,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let object = match requested_version(params) {
        Some(version_id) => {
            conn.backend
                .get_object_stream_version(bucket, key, version_id)
                .await
        }
        None => conn.backend.get_object_stream(bucket, key).await,
    };
    let object = object.for_resource(object_resource(bucket, key))?;

    if not_modified(&object.info, headers) {
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        let response_headers = response.headers_mut();
        insert_header(response_headers, "etag", &xml::quote_etag(&object.info.etag));
        insert_header(
            response_headers,
            "last-modified",
            &xml::format_http_date(&object.info.last_modified),
        );
        return Ok(response);
    }

    let mut response = Body::from_stream(object.body).into_response();
    *response.status_mut() = StatusCode::OK;
    let response_headers = response.headers_mut();
    apply_object_headers(response_headers, &object.info);
    insert_header(
        response_headers,
        "content-disposition",
        &content_disposition(key),
    );
    Ok(response)
}

/// HEAD /{bucket}/{key} - Object metadata
pub async fn head_object(
    conn: &Connection,
    bucket: &str,
    key: &str,
    params: &QueryParams,
) -> Result<Response, ApiError> {
    let info = match requested_version(params) {
        Some(version_id) => {
            conn.backend
                .get_object_info_version(bucket, key, version_id)
                .await
        }
        None => conn.backend.get_object_info(bucket, key).await,
    };
    let info = info.for_resource(object_resource(bucket, key))?;

    let mut response = StatusCode::OK.into_response();
    apply_object_headers(response.headers_mut(), &info);
    Ok(response)
}

/// DELETE /{bucket}/{key} - Delete object or a specific version
pub async fn delete_object(
    conn: &Connection,
    bucket: &str,
    key: &str,
    params: &QueryParams,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let mut key = key.to_string();
    if is_s3_browser(headers) && !key.ends_with('/') {
        let folder = format!("{}/", key);
        if conn.backend.get_object_info(bucket, &folder).await.is_ok() {
            debug!(bucket, key = %folder, "Deleting S3 Browser folder marker");
            key = folder;
        }
    }
    let resource = object_resource(bucket, &key);
    let version = requested_version(params);

    match version {
        Some(NULL_VERSION_ID) => {
            match conn.backend.delete_object_delete_marker(bucket, &key).await {
                Ok(()) => {}
                Err(e) if e.is_not_implemented() => {
                    warn!(bucket, key = %key, "Delete-marker removal unsupported, falling back to plain delete");
                    conn.backend
                        .delete_object(bucket, &key)
                        .await
                        .for_resource(&resource)?;
                }
                Err(e) => return Err(ApiError::from(e).with_resource(&resource)),
            }
        }
        Some(version_id) => conn
            .backend
            .delete_object_version(bucket, &key, version_id)
            .await
            .for_resource(&resource)?,
        None => conn
            .backend
            .delete_object(bucket, &key)
            .await
            .for_resource(&resource)?,
    }

    info!(connection = %conn.name(), bucket, key = %key, version = ?version, "Object deleted");

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Some(version_id) = version {
        insert_header(response.headers_mut(), "x-amz-version-id", version_id);
    }
    Ok(response)
}

/// POST /{bucket} with `multipart/form-data` - Browser form upload
pub async fn post_object(
    conn: &Connection,
    bucket: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let form = parse_form(headers, body).await?;

    let (Some(key), Some(file)) = (form.key, form.file) else {
        return Err(ApiError::s3_with_resource(
            S3ErrorCode::MissingFields,
            "Form upload requires both key and file fields",
            format!("/{}", bucket),
        ));
    };
    let key = key.replace("${filename}", file.file_name.as_deref().unwrap_or_default());

    let upload = ObjectUpload {
        content_type: form.content_type.or(file.content_type),
        content_length: Some(file.data.len() as u64),
        ..Default::default()
    };
    let info = conn
        .backend
        .put_object(bucket, &key, stream_from_bytes(file.data), upload)
        .await
        .for_resource(object_resource(bucket, &key))?;

    info!(connection = %conn.name(), bucket, key = %key, "Form upload stored");

    let mut response = match form.redirect.filter(|r| !r.is_empty()) {
        Some(location) => {
            let mut response = StatusCode::SEE_OTHER.into_response();
            insert_header(response.headers_mut(), "location", &location);
            response
        }
        None => StatusCode::NO_CONTENT.into_response(),
    };
    insert_header(response.headers_mut(), "etag", &xml::quote_etag(&info.etag));
    Ok(response)
}

struct UploadedFile {
    data: Bytes,
    file_name: Option<String>,
    content_type: Option<String>,
}

#[derive(Default)]
struct UploadForm {
    key: Option<String>,
    file: Option<UploadedFile>,
    content_type: Option<String>,
    redirect: Option<String>,
}

async fn parse_form(headers: &HeaderMap, body: Bytes) -> Result<UploadForm, ApiError> {
    let malformed = |detail: String| {
        ApiError::s3(
            S3ErrorCode::MalformedPOSTRequest,
            format!("The body of your POST request is not well-formed multipart/form-data: {}", detail),
        )
    };

    let mut request = Request::new(Body::from(body));
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.clone());
    }
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| malformed(e.body_text()))?;

    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| malformed(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_ascii_lowercase();
        match name.as_str() {
            "key" => form.key = Some(field.text().await.map_err(|e| malformed(e.body_text()))?),
            "content-type" => {
                form.content_type = Some(field.text().await.map_err(|e| malformed(e.body_text()))?)
            }
            "success_action_redirect" | "redirect" => {
                form.redirect = Some(field.text().await.map_err(|e| malformed(e.body_text()))?)
            }
            "file" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| malformed(e.body_text()))?;
                form.file = Some(UploadedFile {
                    data,
                    file_name,
                    content_type,
                });
            }
            // policy, signature and other fields are not enforced
            _ => {}
        }
    }
    Ok(form)
}

/// If-None-Match takes precedence over If-Modified-Since
fn not_modified(info: &ObjectInfo, headers: &HeaderMap) -> bool {
    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        return if_none_match
            .split(',')
            .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"'))
            .any(|tag| tag == "*" || tag == info.etag.trim_matches('"'));
    }

    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
        .is_some_and(|since| info.last_modified.timestamp() <= since.timestamp())
}

fn apply_object_headers(headers: &mut HeaderMap, info: &ObjectInfo) {
    let content_type = info
        .content_type
        .clone()
        .or_else(|| mime_guess::from_path(&info.key).first_raw().map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    insert_header(headers, "content-type", &content_type);
    insert_header(headers, "content-length", &info.size.to_string());
    insert_header(headers, "etag", &xml::quote_etag(&info.etag));
    insert_header(
        headers,
        "last-modified",
        &xml::format_http_date(&info.last_modified),
    );
    if let Some(version_id) = &info.version_id {
        insert_header(headers, "x-amz-version-id", version_id);
    }
    for (name, value) in &info.user_metadata {
        let header_name = format!("x-amz-meta-{}", name.to_ascii_lowercase());
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::try_from(header_name),
            header::HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
}

/// `attachment` disposition naming the last path segment of the key
fn content_disposition(key: &str) -> String {
    let file_name = key
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(key);
    let ascii: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::MinimalBackend;
    use crate::resolver::ConnectionIdentity;
    use axum::http::HeaderValue;
    use chrono::{TimeZone, Utc};
    use s3mux_backend::{MemoryBackend, ObjectBackend};
    use std::sync::Arc;

    fn info() -> ObjectInfo {
        ObjectInfo {
            key: "docs/report.pdf".into(),
            size: 42,
            etag: "abc123".into(),
            last_modified: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            content_type: None,
            version_id: Some("v1".into()),
            user_metadata: [("author".to_string(), "kim".to_string())].into(),
        }
    }

    #[test]
    fn test_not_modified_by_etag() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"abc123\""));
        assert!(not_modified(&info(), &headers));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"other\", W/\"x\""));
        assert!(!not_modified(&info(), &headers));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(not_modified(&info(), &headers));
    }

    #[test]
    fn test_not_modified_by_date() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Tue, 02 Jan 2024 03:04:05 GMT"),
        );
        assert!(not_modified(&info(), &headers));

        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Mon, 01 Jan 2024 00:00:00 GMT"),
        );
        assert!(!not_modified(&info(), &headers));
    }

    #[test]
    fn test_object_headers() {
        let mut headers = HeaderMap::new();
        apply_object_headers(&mut headers, &info());
        assert_eq!(headers["content-type"], "application/pdf");
        assert_eq!(headers["content-length"], "42");
        assert_eq!(headers["etag"], "\"abc123\"");
        assert_eq!(headers["last-modified"], "Tue, 02 Jan 2024 03:04:05 GMT");
        assert_eq!(headers["x-amz-version-id"], "v1");
        assert_eq!(headers["x-amz-meta-author"], "kim");
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("docs/report.pdf"),
            "attachment; filename=\"report.pdf\"; filename*=UTF-8''report.pdf"
        );
        assert!(content_disposition("música.mp3").starts_with("attachment; filename=\"m_sica.mp3\""));
    }

    async fn connection_with(backend: Arc<dyn ObjectBackend>) -> Connection {
        backend.create_bucket("docs", "us-east-1").await.unwrap();
        backend
            .put_object(
                "docs",
                "a.txt",
                stream_from_bytes(Bytes::from_static(b"data")),
                ObjectUpload::default(),
            )
            .await
            .unwrap();
        Connection {
            identity: ConnectionIdentity::new("test"),
            backend,
        }
    }

    fn null_version() -> QueryParams {
        QueryParams::parse(Some("versionId=null"))
    }

    #[tokio::test]
    async fn test_null_version_delete_removes_delete_marker() {
        let conn = connection_with(Arc::new(MemoryBackend::new())).await;
        conn.backend.enable_versioning("docs").await.unwrap();
        conn.backend
            .put_object(
                "docs",
                "b.txt",
                stream_from_bytes(Bytes::from_static(b"kept")),
                ObjectUpload::default(),
            )
            .await
            .unwrap();
        conn.backend.delete_object("docs", "b.txt").await.unwrap();
        assert!(conn.backend.get_object_info("docs", "b.txt").await.is_err());

        let response = delete_object(&conn, "docs", "b.txt", &null_version(), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["x-amz-version-id"], "null");

        let restored = conn.backend.get_object_info("docs", "b.txt").await.unwrap();
        assert_eq!(restored.size, 4);
    }

    #[tokio::test]
    async fn test_null_version_delete_prefers_null_version() {
        let conn = connection_with(Arc::new(MemoryBackend::new())).await;
        conn.backend.enable_versioning("docs").await.unwrap();

        delete_object(&conn, "docs", "a.txt", &null_version(), &HeaderMap::new())
            .await
            .unwrap();
        let versions = conn.backend.list_object_versions("docs", "a.txt").await.unwrap();
        assert!(versions.iter().all(|v| v.version_id != NULL_VERSION_ID));
    }

    #[tokio::test]
    async fn test_null_version_delete_falls_back_to_plain_delete() {
        let conn = connection_with(Arc::new(MinimalBackend::new())).await;

        let response = delete_object(&conn, "docs", "a.txt", &null_version(), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(conn.backend.get_object_info("docs", "a.txt").await.is_err());
    }
}
