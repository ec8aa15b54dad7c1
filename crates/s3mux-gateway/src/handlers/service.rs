//! Service-level handlers (ListBuckets)

use super::xml_response;
use crate::state::Connection;
use crate::xml::{self, BucketEntry, Buckets, ListAllMyBucketsResult, Owner};
use crate::ApiError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET / - List all buckets of the connection
pub async fn list_buckets(conn: &Connection) -> Result<Response, ApiError> {
    let buckets = conn.backend.list_buckets().await?;

    let result = ListAllMyBucketsResult {
        xmlns: xml::S3_NAMESPACE,
        owner: Owner::new(conn.name()),
        buckets: Buckets {
            bucket: buckets
                .into_iter()
                .map(|b| BucketEntry {
                    name: b.name,
                    creation_date: xml::format_timestamp(&b.creation_date),
                })
                .collect(),
        },
    };

    xml_response(&result)
}

/// HEAD / - Health check
pub async fn health_check() -> Response {
    (StatusCode::OK, "OK").into_response()
}
