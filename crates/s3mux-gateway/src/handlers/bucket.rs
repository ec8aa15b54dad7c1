//! Bucket operation handlers

use super::{bucket_resource, xml_response};
use crate::error::ResourceContext;
use crate::router::QueryParams;
use crate::state::Connection;
use crate::xml::{
    self, CommonPrefix, CorsConfiguration, CorsRuleXml, CreateBucketConfiguration,
    DeleteMarkerEntry, ListBucketResult, ListVersionsResult, LocationConstraint, ObjectEntry,
    Owner, VersionEntry, VersioningConfiguration,
};
use crate::{ApiError, S3ErrorCode};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use s3mux_backend::{BackendErrorKind, CorsRule, ObjectInfo, VersioningState, NULL_VERSION_ID};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Upper bound for `max-keys`
pub const MAX_KEYS: usize = 1000;

const DEFAULT_CORS_METHODS: &[&str] = &["GET", "PUT", "POST", "DELETE", "HEAD"];
const DEFAULT_CORS_EXPOSE_HEADERS: &[&str] = &[
    "ETag",
    "x-amz-server-side-encryption",
    "x-amz-request-id",
    "x-amz-id-2",
];
const DEFAULT_CORS_MAX_AGE: u32 = 3600;

/// PUT /{bucket} - Create bucket
pub async fn create_bucket(
    conn: &Connection,
    bucket: &str,
    body: Bytes,
    default_region: &str,
) -> Result<Response, ApiError> {
    let region = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        xml::from_xml::<CreateBucketConfiguration>(&body)?.location_constraint
    };
    let region = region
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| default_region.to_string());

    conn.backend
        .create_bucket(bucket, &region)
        .await
        .for_resource(bucket_resource(bucket))?;

    info!(connection = %conn.name(), bucket, region = %region, "Bucket created");

    Ok((
        StatusCode::OK,
        [("Location", bucket_resource(bucket))],
        "",
    )
        .into_response())
}

/// HEAD /{bucket} - Check if bucket exists
pub async fn head_bucket(conn: &Connection, bucket: &str) -> Result<Response, ApiError> {
    match conn.backend.get_bucket(bucket).await {
        Ok(info) => Ok((
            StatusCode::OK,
            [("x-amz-bucket-region", info.region.unwrap_or_default())],
        )
            .into_response()),
        Err(e) if e.kind == BackendErrorKind::BucketNotFound => {
            Err(ApiError::from(e).with_resource(bucket_resource(bucket)))
        }
        Err(e) => Err(ApiError::s3_with_resource(
            S3ErrorCode::AccessDenied,
            e.message,
            bucket_resource(bucket),
        )),
    }
}

/// DELETE /{bucket} - Delete bucket, honoring force/empty overrides
pub async fn delete_bucket(
    conn: &Connection,
    bucket: &str,
    params: &QueryParams,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let resource = bucket_resource(bucket);

    if params.has("force") || header_flag(headers, "x-force-delete") {
        conn.backend
            .force_empty_and_delete_bucket(bucket)
            .await
            .for_resource(&resource)?;
        info!(connection = %conn.name(), bucket, "Bucket force-deleted");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    if params.has("empty") || header_flag(headers, "x-force-empty") {
        conn.backend
            .force_empty_bucket(bucket)
            .await
            .for_resource(&resource)?;
        info!(connection = %conn.name(), bucket, "Bucket emptied");
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    conn.backend.get_bucket(bucket).await.for_resource(&resource)?;

    let not_empty = || {
        ApiError::s3_with_resource(
            S3ErrorCode::BucketNotEmpty,
            "The bucket you tried to delete is not empty",
            &resource,
        )
    };

    match conn.backend.list_objects(bucket, "").await {
        Ok(objects) if !objects.is_empty() => return Err(not_empty()),
        Ok(_) => {}
        Err(e) => warn!(bucket, error = %e, "Could not list objects before delete"),
    }

    match conn.backend.list_object_versions(bucket, "").await {
        Ok(versions) if !versions.is_empty() => return Err(not_empty()),
        Ok(_) => {}
        Err(e) => warn!(bucket, error = %e, "Could not list versions before delete"),
    }

    conn.backend.delete_bucket(bucket).await.for_resource(&resource)?;
    info!(connection = %conn.name(), bucket, "Bucket deleted");

    Ok(StatusCode::NO_CONTENT.into_response())
}

fn header_flag(headers: &HeaderMap, name: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty())
}

/// GET /{bucket}?location
pub async fn get_bucket_location(conn: &Connection, bucket: &str) -> Result<Response, ApiError> {
    let info = conn
        .backend
        .get_bucket(bucket)
        .await
        .for_resource(bucket_resource(bucket))?;

    xml_response(&LocationConstraint {
        xmlns: xml::S3_NAMESPACE,
        region: info.region.unwrap_or_default(),
    })
}

/// GET /{bucket}?versioning
pub async fn get_bucket_versioning(conn: &Connection, bucket: &str) -> Result<Response, ApiError> {
    let state = match conn.backend.get_versioning(bucket).await {
        Ok(state) => state,
        Err(e) if e.kind == BackendErrorKind::BucketNotFound => {
            return Err(ApiError::from(e).with_resource(bucket_resource(bucket)));
        }
        Err(e) => {
            warn!(bucket, error = %e, "Versioning status unreadable, reporting Suspended");
            VersioningState::Suspended
        }
    };

    // Never report a blank status
    let status = match state {
        VersioningState::Enabled => VersioningState::Enabled,
        VersioningState::Suspended | VersioningState::Unset => VersioningState::Suspended,
    };

    xml_response(&VersioningConfiguration {
        xmlns: xml::S3_NAMESPACE,
        status: Some(status.as_str().to_string()),
    })
}

/// PUT /{bucket}?versioning
pub async fn put_bucket_versioning(
    conn: &Connection,
    bucket: &str,
    body: Bytes,
) -> Result<Response, ApiError> {
    let resource = bucket_resource(bucket);
    conn.backend.get_bucket(bucket).await.for_resource(&resource)?;

    let config: VersioningConfiguration = xml::from_xml(&body)?;
    let requested = match config.status.as_deref().map(str::trim) {
        Some("Enabled") => VersioningState::Enabled,
        Some("Suspended") => VersioningState::Suspended,
        other => {
            return Err(ApiError::s3_with_resource(
                S3ErrorCode::InvalidArgument,
                format!(
                    "Versioning status must be Enabled or Suspended, got {:?}",
                    other.unwrap_or_default()
                ),
                resource,
            ));
        }
    };

    let applied = match requested {
        VersioningState::Enabled => conn.backend.enable_versioning(bucket).await,
        _ => conn.backend.suspend_versioning(bucket).await,
    };
    applied.for_resource(&resource)?;

    match conn.backend.get_versioning(bucket).await {
        Ok(applied) if applied == requested => {}
        Ok(applied) => warn!(
            bucket,
            requested = requested.as_str(),
            applied = applied.as_str(),
            "Backend reports a different versioning status after update"
        ),
        Err(e) => warn!(bucket, error = %e, "Could not verify versioning status"),
    }

    info!(connection = %conn.name(), bucket, status = requested.as_str(), "Versioning updated");
    Ok(StatusCode::OK.into_response())
}

/// GET /{bucket}?cors
pub async fn get_bucket_cors(conn: &Connection, bucket: &str) -> Result<Response, ApiError> {
    let rules = conn
        .backend
        .get_cors(bucket)
        .await
        .for_resource(bucket_resource(bucket))?;

    xml_response(&CorsConfiguration {
        xmlns: xml::S3_NAMESPACE,
        rules: rules.into_iter().map(cors_rule_to_xml).collect(),
    })
}

/// PUT /{bucket}?cors - only the first rule is kept
pub async fn put_bucket_cors(
    conn: &Connection,
    bucket: &str,
    body: Bytes,
) -> Result<Response, ApiError> {
    let resource = bucket_resource(bucket);
    let config: CorsConfiguration = xml::from_xml(&body)?;

    let submitted = config.rules.len();
    let rule = config.rules.into_iter().next().ok_or_else(|| {
        ApiError::s3_with_resource(
            S3ErrorCode::InvalidRequest,
            "CORS configuration must contain at least one rule",
            &resource,
        )
    })?;
    if submitted > 1 {
        warn!(bucket, submitted, "Only the first CORS rule is applied");
    }

    conn.backend
        .set_cors(bucket, vec![cors_rule_with_defaults(rule)])
        .await
        .for_resource(&resource)?;

    Ok(StatusCode::OK.into_response())
}

/// DELETE /{bucket}?cors
pub async fn delete_bucket_cors(conn: &Connection, bucket: &str) -> Result<Response, ApiError> {
    conn.backend
        .delete_cors(bucket)
        .await
        .for_resource(bucket_resource(bucket))?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Fill unset fields of a submitted rule
pub fn cors_rule_with_defaults(rule: CorsRuleXml) -> CorsRule {
    fn or_default(values: Vec<String>, default: &[&str]) -> Vec<String> {
        if values.is_empty() {
            default.iter().map(|s| s.to_string()).collect()
        } else {
            values
        }
    }

    CorsRule {
        allowed_origins: or_default(rule.allowed_origins, &["*"]),
        allowed_methods: or_default(rule.allowed_methods, DEFAULT_CORS_METHODS),
        allowed_headers: or_default(rule.allowed_headers, &["*"]),
        expose_headers: or_default(rule.expose_headers, DEFAULT_CORS_EXPOSE_HEADERS),
        max_age_seconds: Some(rule.max_age_seconds.unwrap_or(DEFAULT_CORS_MAX_AGE)),
    }
}

fn cors_rule_to_xml(rule: CorsRule) -> CorsRuleXml {
    CorsRuleXml {
        allowed_origins: rule.allowed_origins,
        allowed_methods: rule.allowed_methods,
        allowed_headers: rule.allowed_headers,
        expose_headers: rule.expose_headers,
        max_age_seconds: rule.max_age_seconds,
    }
}

/// PUT /{bucket}?<unknown> - 404 if the bucket is missing, otherwise 400
pub async fn put_bucket_unrecognized(
    conn: &Connection,
    bucket: &str,
) -> Result<Response, ApiError> {
    let resource = bucket_resource(bucket);
    conn.backend.get_bucket(bucket).await.for_resource(&resource)?;
    Err(ApiError::s3_with_resource(
        S3ErrorCode::InvalidRequest,
        "Bucket already exists and no recognized sub-resource was given",
        resource,
    ))
}

/// GET /{bucket} - List objects, optionally grouped by delimiter
///
/// Pages resume after `marker` (V1) or after `continuation-token`, falling
/// back to `start-after`, when `list-type=2`. The token is the last key or
/// common prefix of the previous page.
pub async fn list_objects(
    conn: &Connection,
    bucket: &str,
    params: &QueryParams,
) -> Result<Response, ApiError> {
    let prefix = params.get("prefix").unwrap_or_default();
    let delimiter = params.non_empty("delimiter");
    let max_keys = parse_max_keys(params)?;
    let list_v2 = params.get("list-type") == Some("2");
    let continuation_token = params.non_empty("continuation-token").filter(|_| list_v2);
    let start_after = params.non_empty("start-after").filter(|_| list_v2);
    let marker = params.get("marker").filter(|_| !list_v2);
    let after = if list_v2 {
        continuation_token.or(start_after)
    } else {
        marker.filter(|m| !m.is_empty())
    };

    let objects = conn
        .backend
        .list_objects(bucket, prefix)
        .await
        .for_resource(bucket_resource(bucket))?;

    let (contents, prefixes) = match delimiter {
        Some(delimiter) => group_by_delimiter(objects, prefix, delimiter),
        None => (objects, Vec::new()),
    };
    let page = paginate_listing(contents, prefixes, after, max_keys);
    let (contents, prefixes) = (page.contents, page.prefixes);

    let result = ListBucketResult {
        xmlns: xml::S3_NAMESPACE,
        name: bucket.to_string(),
        prefix: prefix.to_string(),
        marker: (!list_v2).then(|| marker.unwrap_or_default().to_string()),
        next_marker: page.next_marker.clone().filter(|_| !list_v2),
        continuation_token: continuation_token.map(str::to_string),
        next_continuation_token: page.next_marker.filter(|_| list_v2),
        start_after: start_after.map(str::to_string),
        delimiter: delimiter.map(str::to_string),
        max_keys,
        key_count: contents.len() + prefixes.len(),
        is_truncated: page.is_truncated,
        contents: contents
            .into_iter()
            .map(|o| ObjectEntry {
                last_modified: xml::format_timestamp(&o.last_modified),
                etag: xml::quote_etag(&o.etag),
                size: o.size,
                storage_class: "STANDARD",
                key: o.key,
            })
            .collect(),
        common_prefixes: prefixes
            .into_iter()
            .map(|prefix| CommonPrefix { prefix })
            .collect(),
    };

    xml_response(&result)
}

fn parse_max_keys(params: &QueryParams) -> Result<usize, ApiError> {
    match params.non_empty("max-keys") {
        None => Ok(MAX_KEYS),
        Some(raw) => raw
            .parse::<usize>()
            .map(|n| n.min(MAX_KEYS))
            .map_err(|_| ApiError::s3(S3ErrorCode::InvalidArgument, "max-keys must be an integer")),
    }
}

/// Split a flat listing into direct entries and common prefixes.
///
/// The part of each key after `prefix` is searched for `delimiter`; a match
/// past the first character folds the key into a common prefix ending at the
/// delimiter. Keys whose remainder starts with the delimiter stay entries.
pub fn group_by_delimiter(
    objects: Vec<ObjectInfo>,
    prefix: &str,
    delimiter: &str,
) -> (Vec<ObjectInfo>, Vec<String>) {
    let mut contents = Vec::new();
    let mut prefixes = BTreeSet::new();

    for object in objects {
        let Some(rest) = object.key.strip_prefix(prefix) else {
            continue;
        };
        match rest.find(delimiter) {
            Some(index) if index > 0 => {
                prefixes.insert(format!("{}{}", prefix, &rest[..index + delimiter.len()]));
            }
            _ => contents.push(object),
        }
    }

    (contents, prefixes.into_iter().collect())
}

/// One page of a listing
#[derive(Debug)]
pub struct ListingPage {
    pub contents: Vec<ObjectInfo>,
    pub prefixes: Vec<String>,
    pub is_truncated: bool,
    /// Last key or prefix of a truncated page, where the next page resumes
    pub next_marker: Option<String>,
}

/// Drop entries at or before `after`, then keep the first `max_keys` in key
/// order across both lists
pub fn paginate_listing(
    contents: Vec<ObjectInfo>,
    prefixes: Vec<String>,
    after: Option<&str>,
    max_keys: usize,
) -> ListingPage {
    let is_past = |key: &str| after.map_or(true, |after| key > after);
    let contents: Vec<ObjectInfo> = contents.into_iter().filter(|o| is_past(&o.key)).collect();
    let prefixes: Vec<String> = prefixes.into_iter().filter(|p| is_past(p)).collect();

    let mut keys: Vec<&str> = contents
        .iter()
        .map(|o| o.key.as_str())
        .chain(prefixes.iter().map(String::as_str))
        .collect();
    if keys.len() <= max_keys {
        return ListingPage {
            contents,
            prefixes,
            is_truncated: false,
            next_marker: None,
        };
    }

    keys.sort_unstable();
    // max-keys=0 answers an empty, untruncated page
    let Some(last) = max_keys.checked_sub(1).and_then(|i| keys.get(i)).map(|k| k.to_string())
    else {
        return ListingPage {
            contents: Vec::new(),
            prefixes: Vec::new(),
            is_truncated: false,
            next_marker: None,
        };
    };

    ListingPage {
        contents: contents.into_iter().filter(|o| o.key <= last).collect(),
        prefixes: prefixes.into_iter().filter(|p| *p <= last).collect(),
        is_truncated: true,
        next_marker: Some(last),
    }
}

/// GET /{bucket}?versions
pub async fn list_object_versions(
    conn: &Connection,
    bucket: &str,
    params: &QueryParams,
) -> Result<Response, ApiError> {
    let prefix = params.get("prefix").unwrap_or_default();
    let records = conn
        .backend
        .list_object_versions(bucket, prefix)
        .await
        .for_resource(bucket_resource(bucket))?;

    let mut result = ListVersionsResult {
        xmlns: xml::S3_NAMESPACE,
        name: bucket.to_string(),
        prefix: prefix.to_string(),
        key_marker: String::new(),
        version_id_marker: String::new(),
        max_keys: MAX_KEYS,
        is_truncated: false,
        versions: Vec::new(),
        delete_markers: Vec::new(),
    };

    for record in records {
        let version_id = if record.version_id.is_empty() {
            NULL_VERSION_ID.to_string()
        } else {
            record.version_id
        };
        let last_modified = xml::format_timestamp(&record.last_modified);

        if record.is_delete_marker {
            result.delete_markers.push(DeleteMarkerEntry {
                key: record.key,
                version_id,
                is_latest: record.is_latest,
                last_modified,
                owner: Owner::new(conn.name()),
            });
        } else {
            result.versions.push(VersionEntry {
                key: record.key,
                version_id,
                is_latest: record.is_latest,
                last_modified,
                etag: xml::quote_etag(&record.etag),
                size: record.size,
                storage_class: "STANDARD",
                owner: Owner::new(conn.name()),
            });
        }
    }

    xml_response(&result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::MinimalBackend;
    use crate::resolver::ConnectionIdentity;
    use axum::body::to_bytes;
    use chrono::Utc;
    use proptest::prelude::*;
    use rstest::rstest;
    use s3mux_backend::{stream_from_bytes, MemoryBackend, ObjectBackend, ObjectUpload};
    use std::sync::Arc;

    fn obj(key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size: 1,
            etag: "e".into(),
            last_modified: Utc::now(),
            content_type: None,
            version_id: None,
            user_metadata: Default::default(),
        }
    }

    fn keys(objects: &[ObjectInfo]) -> Vec<&str> {
        objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[test]
    fn test_group_by_delimiter() {
        let (contents, prefixes) =
            group_by_delimiter(vec![obj("a"), obj("b/c"), obj("b/d")], "", "/");
        assert_eq!(keys(&contents), vec!["a"]);
        assert_eq!(prefixes, vec!["b/"]);
    }

    #[test]
    fn test_group_with_prefix() {
        let objects = vec![obj("photos/2024/a.jpg"), obj("photos/2024/b/c.jpg"), obj("photos/x")];
        let (contents, prefixes) = group_by_delimiter(objects, "photos/2024/", "/");
        assert_eq!(keys(&contents), vec!["photos/2024/a.jpg"]);
        assert_eq!(prefixes, vec!["photos/2024/b/"]);
    }

    #[test]
    fn test_leading_delimiter_stays_entry() {
        let (contents, prefixes) = group_by_delimiter(vec![obj("dir//x")], "dir/", "/");
        assert_eq!(keys(&contents), vec!["dir//x"]);
        assert!(prefixes.is_empty());
    }

    #[test]
    fn test_paginate_listing() {
        let contents = vec![obj("a"), obj("c"), obj("e")];
        let prefixes = vec!["b/".to_string(), "d/".to_string()];
        let page = paginate_listing(contents, prefixes, None, 3);
        assert!(page.is_truncated);
        assert_eq!(keys(&page.contents), vec!["a", "c"]);
        assert_eq!(page.prefixes, vec!["b/"]);
        assert_eq!(page.next_marker.as_deref(), Some("c"));
    }

    #[test]
    fn test_paginate_resumes_after_marker() {
        let contents = vec![obj("a"), obj("c"), obj("e")];
        let prefixes = vec!["b/".to_string(), "d/".to_string()];
        let page = paginate_listing(contents, prefixes, Some("c"), 3);
        assert!(!page.is_truncated);
        assert_eq!(keys(&page.contents), vec!["e"]);
        assert_eq!(page.prefixes, vec!["d/"]);
        assert!(page.next_marker.is_none());
    }

    #[test]
    fn test_paginate_zero_max_keys() {
        let page = paginate_listing(vec![obj("a")], Vec::new(), None, 0);
        assert!(page.contents.is_empty());
        assert!(!page.is_truncated);
    }

    #[rstest]
    #[case("true", true)]
    #[case("1", true)]
    #[case("yes", true)]
    #[case("", false)]
    fn test_force_header_flag(#[case] value: &str, #[case] expected: bool) {
        let mut headers = HeaderMap::new();
        headers.insert("x-force-delete", value.parse().unwrap());
        assert_eq!(header_flag(&headers, "x-force-delete"), expected);
        assert!(!header_flag(&HeaderMap::new(), "x-force-delete"));
    }

    async fn connection_with(backend: Arc<dyn ObjectBackend>) -> Connection {
        backend.create_bucket("docs", "us-east-1").await.unwrap();
        Connection {
            identity: ConnectionIdentity::new("test"),
            backend,
        }
    }

    async fn put(conn: &Connection, key: &str) {
        conn.backend
            .put_object(
                "docs",
                key,
                stream_from_bytes(Bytes::from_static(b"x")),
                ObjectUpload::default(),
            )
            .await
            .unwrap();
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn list(conn: &Connection, query: &str) -> String {
        let params = QueryParams::parse(Some(query));
        body_text(list_objects(conn, "docs", &params).await.unwrap()).await
    }

    #[tokio::test]
    async fn test_listing_pages_past_max_keys() {
        let conn = connection_with(Arc::new(MemoryBackend::new())).await;
        for i in 0..1005 {
            put(&conn, &format!("k{:05}", i)).await;
        }

        let first = list(&conn, "").await;
        assert_eq!(first.matches("<Contents>").count(), MAX_KEYS);
        assert!(first.contains("<IsTruncated>true</IsTruncated>"));
        assert!(first.contains("<NextMarker>k00999</NextMarker>"));

        let second = list(&conn, "marker=k00999").await;
        assert_eq!(second.matches("<Contents>").count(), 5);
        assert!(second.contains("<Key>k01000</Key>"));
        assert!(second.contains("<Key>k01004</Key>"));
        assert!(second.contains("<IsTruncated>false</IsTruncated>"));
        assert!(!second.contains("<NextMarker>"));
    }

    #[tokio::test]
    async fn test_listing_v2_continuation() {
        let conn = connection_with(Arc::new(MemoryBackend::new())).await;
        for key in ["a", "b", "c", "d"] {
            put(&conn, key).await;
        }

        let first = list(&conn, "list-type=2&max-keys=3").await;
        assert!(first.contains("<NextContinuationToken>c</NextContinuationToken>"));
        assert!(!first.contains("<Marker>"));

        let second = list(&conn, "list-type=2&max-keys=3&continuation-token=c").await;
        assert!(second.contains("<ContinuationToken>c</ContinuationToken>"));
        assert!(second.contains("<Key>d</Key>"));
        assert!(!second.contains("<Key>c</Key>"));
        assert!(second.contains("<IsTruncated>false</IsTruncated>"));

        let started = list(&conn, "list-type=2&start-after=b").await;
        assert!(started.contains("<StartAfter>b</StartAfter>"));
        assert_eq!(started.matches("<Contents>").count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_versioning_status() {
        let conn = connection_with(Arc::new(MemoryBackend::new())).await;
        let body = Bytes::from_static(
            b"<VersioningConfiguration><Status>Paused</Status></VersioningConfiguration>",
        );

        let err = put_bucket_versioning(&conn, "docs", body).await.unwrap_err();
        assert_eq!(err.error_code(), S3ErrorCode::InvalidArgument);
        assert_eq!(err.error_code().status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            conn.backend.get_versioning("docs").await.unwrap(),
            VersioningState::Unset
        );
    }

    #[tokio::test]
    async fn test_force_header_deletes_non_empty_bucket() {
        let conn = connection_with(Arc::new(MemoryBackend::new())).await;
        put(&conn, "a").await;

        let mut headers = HeaderMap::new();
        headers.insert("x-force-delete", "yes".parse().unwrap());
        let response = delete_bucket(&conn, "docs", &QueryParams::default(), &headers)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(conn.backend.get_bucket("docs").await.is_err());
    }

    #[tokio::test]
    async fn test_blank_version_ids_list_as_null() {
        let conn = connection_with(Arc::new(MinimalBackend::with_blank_version_ids())).await;
        put(&conn, "a").await;

        let params = QueryParams::parse(Some("versions"));
        let body = body_text(list_object_versions(&conn, "docs", &params).await.unwrap()).await;
        assert!(body.contains("<Key>a</Key><VersionId>null</VersionId>"));
        assert!(!body.contains("<VersionId></VersionId>"));
    }

    #[test]
    fn test_cors_defaults() {
        let rule = cors_rule_with_defaults(CorsRuleXml {
            allowed_origins: vec!["https://app.example".into()],
            ..Default::default()
        });
        assert_eq!(rule.allowed_origins, vec!["https://app.example"]);
        assert_eq!(rule.allowed_methods, vec!["GET", "PUT", "POST", "DELETE", "HEAD"]);
        assert_eq!(rule.allowed_headers, vec!["*"]);
        assert_eq!(rule.expose_headers.len(), 4);
        assert_eq!(rule.max_age_seconds, Some(3600));
    }

    proptest! {
        #[test]
        fn prop_every_key_lands_once(
            key_set in proptest::collection::btree_set("[ab/]{1,6}", 0..20),
            prefix in "[ab/]{0,2}",
        ) {
            let objects: Vec<ObjectInfo> = key_set.iter().map(|k| obj(k)).collect();
            let (contents, prefixes) = group_by_delimiter(objects, &prefix, "/");

            for key in key_set.iter().filter(|k| k.starts_with(prefix.as_str())) {
                let as_entry = contents.iter().filter(|o| &o.key == key).count();
                let under_prefix = prefixes.iter().filter(|p| key.starts_with(p.as_str())).count();
                prop_assert_eq!(as_entry + under_prefix, 1);
            }
            for common in &prefixes {
                prop_assert!(common.starts_with(prefix.as_str()));
                prop_assert!(common.ends_with('/'));
                prop_assert!(common.len() > prefix.len() + 1);
            }
            for entry in &contents {
                let rest = &entry.key[prefix.len()..];
                prop_assert!(rest.find('/').map_or(true, |i| i == 0));
            }
        }
    }
}
