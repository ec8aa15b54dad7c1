//! Operation routing
//!
//! S3 multiplexes dozens of operations over two URL shapes. Which one a
//! request means depends on the HTTP method, whether a key is present, and
//! which sub-resource query parameters are *present*; their values are
//! ignored because clients routinely send `?versioning` or `?uploads=`.
//! [`RequestIntent::resolve`] centralizes that precedence as a pure function.

use axum::http::Method;
use std::collections::BTreeMap;

/// Query parameter naming the connection explicitly
pub const CONNECTION_PARAM: &str = "ConnectionName";

/// Parameters that never count as sub-resources
const NON_SUBRESOURCE_PARAMS: &[&str] = &[CONNECTION_PARAM, "x-id"];

/// Bucket sub-resources this gateway recognizes but does not serve
const UNSUPPORTED_SUBRESOURCES: &[&str] = &["policy", "lifecycle", "acl", "tagging", "uploads"];

/// Decoded query string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    /// Parse a raw query string; keys without `=` map to an empty value
    pub fn parse(raw: Option<&str>) -> Self {
        let mut params = BTreeMap::new();
        for pair in raw.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            params.insert(decode_component(key), decode_component(value));
        }
        Self(params)
    }

    /// Whether `key` is present, regardless of its value
    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value of `key` if present and non-empty
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Whether any parameter other than connection selectors is present
    pub fn has_subresources(&self) -> bool {
        self.0
            .keys()
            .any(|k| !NON_SUBRESOURCE_PARAMS.contains(&k.as_str()))
    }
}

fn decode_component(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    urlencoding::decode(&raw)
        .map(|s| s.into_owned())
        .unwrap_or(raw)
}

/// Shape of the request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// `/`
    Service,
    /// `/{bucket}`
    Bucket,
    /// `/{bucket}/{key...}`
    Object,
}

/// The single operation a request maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestIntent {
    ListBuckets,
    HealthCheck,

    CreateBucket,
    HeadBucket,
    DeleteBucket,
    ListObjects,
    ListObjectVersions,
    GetBucketLocation,
    GetBucketVersioning,
    PutBucketVersioning,
    GetBucketCors,
    PutBucketCors,
    DeleteBucketCors,
    /// PUT on a bucket with a sub-resource this gateway does not know
    PutBucketUnrecognized,

    /// Bucket POST whose meaning depends on the body, see [`classify_post_body`]
    InspectPostBody,
    DeleteObjects,
    PostObject,

    InitiateMultipartUpload,
    UploadPart,
    CompleteMultipartUpload,
    AbortMultipartUpload,

    PutObject,
    GetObject,
    HeadObject,
    DeleteObject,

    Unsupported(&'static str),
    InvalidPost,
    MethodNotAllowed,
}

impl RequestIntent {
    /// Compute the operation for `(method, path shape, present parameters)`
    pub fn resolve(method: &Method, path: PathKind, params: &QueryParams) -> Self {
        match path {
            PathKind::Service => Self::resolve_service(method),
            PathKind::Bucket => Self::resolve_bucket(method, params),
            PathKind::Object => Self::resolve_object(method, params),
        }
    }

    fn resolve_service(method: &Method) -> Self {
        match *method {
            Method::GET => Self::ListBuckets,
            Method::HEAD => Self::HealthCheck,
            _ => Self::MethodNotAllowed,
        }
    }

    fn resolve_bucket(method: &Method, params: &QueryParams) -> Self {
        match *method {
            Method::PUT => {
                if params.has("versioning") {
                    Self::PutBucketVersioning
                } else if params.has("cors") {
                    Self::PutBucketCors
                } else if !params.has_subresources() {
                    Self::CreateBucket
                } else {
                    Self::PutBucketUnrecognized
                }
            }
            Method::GET => {
                if params.has("location") {
                    Self::GetBucketLocation
                } else if params.has("versioning") {
                    Self::GetBucketVersioning
                } else if params.has("cors") {
                    Self::GetBucketCors
                } else if params.has("versions") {
                    Self::ListObjectVersions
                } else if let Some(sub) = unsupported_subresource(params) {
                    Self::Unsupported(sub)
                } else {
                    Self::ListObjects
                }
            }
            Method::DELETE => {
                if params.has("cors") {
                    Self::DeleteBucketCors
                } else if let Some(sub) = unsupported_subresource(params) {
                    Self::Unsupported(sub)
                } else {
                    Self::DeleteBucket
                }
            }
            Method::HEAD => Self::HeadBucket,
            Method::POST => {
                if params.has("uploads") {
                    Self::InitiateMultipartUpload
                } else if params.has("uploadId") && !params.has("partNumber") {
                    Self::CompleteMultipartUpload
                } else if params.has("delete") {
                    Self::DeleteObjects
                } else {
                    Self::InspectPostBody
                }
            }
            _ => Self::MethodNotAllowed,
        }
    }

    fn resolve_object(method: &Method, params: &QueryParams) -> Self {
        let is_part = params.has("uploadId") && params.has("partNumber");
        match *method {
            Method::PUT if is_part => Self::UploadPart,
            Method::GET if is_part => Self::UploadPart,
            Method::HEAD if is_part => Self::UploadPart,
            Method::DELETE if is_part => Self::UploadPart,
            Method::PUT => Self::PutObject,
            Method::GET => Self::GetObject,
            Method::HEAD => Self::HeadObject,
            Method::DELETE if params.has("uploadId") => Self::AbortMultipartUpload,
            Method::DELETE => Self::DeleteObject,
            Method::POST if params.has("uploads") => Self::InitiateMultipartUpload,
            Method::POST if params.has("uploadId") => Self::CompleteMultipartUpload,
            Method::POST => Self::InvalidPost,
            _ => Self::MethodNotAllowed,
        }
    }

    /// Whether the request body is streamed to the backend instead of buffered
    pub fn streams_body(&self) -> bool {
        matches!(self, Self::PutObject | Self::UploadPart)
    }
}

fn unsupported_subresource(params: &QueryParams) -> Option<&'static str> {
    UNSUPPORTED_SUBRESOURCES
        .iter()
        .copied()
        .find(|sub| params.has(sub))
}

/// Decide what a bucket POST without routing parameters is, by looking at its body
pub fn classify_post_body(content_type: Option<&str>, body: &[u8]) -> RequestIntent {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        return RequestIntent::PostObject;
    }

    let xml_candidate = content_type.is_empty() || content_type.contains("xml");
    if xml_candidate && crate::xml::root_element_name(body).as_deref() == Some("Delete") {
        return RequestIntent::DeleteObjects;
    }

    RequestIntent::InvalidPost
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn q(raw: &str) -> QueryParams {
        QueryParams::parse(Some(raw))
    }

    #[test]
    fn test_parse_query() {
        let params = q("versioning&prefix=photos%2F2024&ConnectionName=aws+main&empty=");
        assert!(params.has("versioning"));
        assert_eq!(params.get("versioning"), Some(""));
        assert_eq!(params.get("prefix"), Some("photos/2024"));
        assert_eq!(params.get("ConnectionName"), Some("aws main"));
        assert_eq!(params.non_empty("empty"), None);
        assert!(!QueryParams::parse(None).has_subresources());
    }

    #[rstest]
    #[case(Method::PUT, "", RequestIntent::CreateBucket)]
    #[case(Method::PUT, "ConnectionName=c1", RequestIntent::CreateBucket)]
    #[case(Method::PUT, "x-id=CreateBucket", RequestIntent::CreateBucket)]
    #[case(Method::PUT, "versioning", RequestIntent::PutBucketVersioning)]
    #[case(Method::PUT, "versioning&cors", RequestIntent::PutBucketVersioning)]
    #[case(Method::PUT, "cors=", RequestIntent::PutBucketCors)]
    #[case(Method::PUT, "acl", RequestIntent::PutBucketUnrecognized)]
    #[case(Method::GET, "", RequestIntent::ListObjects)]
    #[case(Method::GET, "prefix=a&delimiter=/", RequestIntent::ListObjects)]
    #[case(Method::GET, "list-type=2&continuation-token=k1", RequestIntent::ListObjects)]
    #[case(Method::GET, "marker=k1&max-keys=10", RequestIntent::ListObjects)]
    #[case(Method::GET, "location&versioning", RequestIntent::GetBucketLocation)]
    #[case(Method::GET, "versioning&cors", RequestIntent::GetBucketVersioning)]
    #[case(Method::GET, "cors&versions", RequestIntent::GetBucketCors)]
    #[case(Method::GET, "versions&prefix=a", RequestIntent::ListObjectVersions)]
    #[case(Method::GET, "policy", RequestIntent::Unsupported("policy"))]
    #[case(Method::GET, "lifecycle", RequestIntent::Unsupported("lifecycle"))]
    #[case(Method::DELETE, "", RequestIntent::DeleteBucket)]
    #[case(Method::DELETE, "force", RequestIntent::DeleteBucket)]
    #[case(Method::DELETE, "cors", RequestIntent::DeleteBucketCors)]
    #[case(Method::DELETE, "policy", RequestIntent::Unsupported("policy"))]
    #[case(Method::HEAD, "versioning", RequestIntent::HeadBucket)]
    #[case(Method::POST, "uploads&key=a", RequestIntent::InitiateMultipartUpload)]
    #[case(Method::POST, "uploadId=u1&key=a", RequestIntent::CompleteMultipartUpload)]
    #[case(Method::POST, "uploadId=u1&partNumber=1&delete", RequestIntent::DeleteObjects)]
    #[case(Method::POST, "delete", RequestIntent::DeleteObjects)]
    #[case(Method::POST, "", RequestIntent::InspectPostBody)]
    #[case(Method::PATCH, "", RequestIntent::MethodNotAllowed)]
    fn test_bucket_routing(
        #[case] method: Method,
        #[case] query: &str,
        #[case] expected: RequestIntent,
    ) {
        assert_eq!(RequestIntent::resolve(&method, PathKind::Bucket, &q(query)), expected);
    }

    #[rstest]
    #[case(Method::PUT, "", RequestIntent::PutObject)]
    #[case(Method::PUT, "uploadId=u1&partNumber=2", RequestIntent::UploadPart)]
    #[case(Method::PUT, "uploadId=u1", RequestIntent::PutObject)]
    #[case(Method::GET, "uploadId=u1&partNumber=2", RequestIntent::UploadPart)]
    #[case(Method::HEAD, "uploadId=u1&partNumber=2", RequestIntent::UploadPart)]
    #[case(Method::DELETE, "uploadId=u1&partNumber=2", RequestIntent::UploadPart)]
    #[case(Method::GET, "versionId=v1", RequestIntent::GetObject)]
    #[case(Method::HEAD, "", RequestIntent::HeadObject)]
    #[case(Method::DELETE, "versionId=null", RequestIntent::DeleteObject)]
    #[case(Method::DELETE, "uploadId=u1", RequestIntent::AbortMultipartUpload)]
    #[case(Method::POST, "uploads", RequestIntent::InitiateMultipartUpload)]
    #[case(Method::POST, "uploadId=u1", RequestIntent::CompleteMultipartUpload)]
    #[case(Method::POST, "", RequestIntent::InvalidPost)]
    #[case(Method::OPTIONS, "", RequestIntent::MethodNotAllowed)]
    fn test_object_routing(
        #[case] method: Method,
        #[case] query: &str,
        #[case] expected: RequestIntent,
    ) {
        assert_eq!(RequestIntent::resolve(&method, PathKind::Object, &q(query)), expected);
    }

    #[rstest]
    #[case(Method::GET, RequestIntent::ListBuckets)]
    #[case(Method::HEAD, RequestIntent::HealthCheck)]
    #[case(Method::PUT, RequestIntent::MethodNotAllowed)]
    fn test_service_routing(#[case] method: Method, #[case] expected: RequestIntent) {
        assert_eq!(
            RequestIntent::resolve(&method, PathKind::Service, &QueryParams::default()),
            expected
        );
    }

    #[rstest]
    #[case(None, "<Delete><Object><Key>a</Key></Object></Delete>", RequestIntent::DeleteObjects)]
    #[case(Some("application/xml"), "<Delete/>", RequestIntent::DeleteObjects)]
    #[case(Some("text/xml; charset=utf-8"), "<Delete/>", RequestIntent::DeleteObjects)]
    #[case(Some("application/xml"), "<Other/>", RequestIntent::InvalidPost)]
    #[case(Some("application/octet-stream"), "<Delete/>", RequestIntent::InvalidPost)]
    #[case(Some("multipart/form-data; boundary=x"), "--x", RequestIntent::PostObject)]
    #[case(None, "", RequestIntent::InvalidPost)]
    fn test_classify_post_body(
        #[case] content_type: Option<&str>,
        #[case] body: &str,
        #[case] expected: RequestIntent,
    ) {
        assert_eq!(classify_post_body(content_type, body.as_bytes()), expected);
    }
}
