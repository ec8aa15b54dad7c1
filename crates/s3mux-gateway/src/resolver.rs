//! Connection resolution
//!
//! Each request is served by the backend registered under a connection
//! name. The name comes from, in order: the access key embedded in a
//! SigV4 credential (header or presigned query), the `ConnectionName`
//! query parameter, or the `X-Connection-Name` header.

use crate::router::{QueryParams, CONNECTION_PARAM};
use axum::http::{header, HeaderMap};
use std::fmt;

/// Fallback header naming the connection
pub const CONNECTION_HEADER: &str = "x-connection-name";

const SIGV4_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Name selecting which backend serves a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity(String);

impl ConnectionIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the connection identity from request headers and query
pub fn resolve_connection(headers: &HeaderMap, params: &QueryParams) -> Option<ConnectionIdentity> {
    let from_signature = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(access_key_from_authorization)
        .or_else(|| {
            params
                .get("X-Amz-Credential")
                .and_then(access_key_from_credential)
        });

    from_signature
        .or_else(|| params.non_empty(CONNECTION_PARAM))
        .or_else(|| {
            headers
                .get(CONNECTION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(ConnectionIdentity::new)
}

/// `AWS4-HMAC-SHA256 Credential=AKID/20240101/us-east-1/s3/aws4_request, ...` -> `AKID`
fn access_key_from_authorization(value: &str) -> Option<&str> {
    let rest = value.trim().strip_prefix(SIGV4_ALGORITHM)?;
    rest.split(',')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("Credential="))
        .and_then(access_key_from_credential)
}

fn access_key_from_credential(credential: &str) -> Option<&str> {
    credential
        .split('/')
        .next()
        .map(str::trim)
        .filter(|key| !key.is_empty())
}
