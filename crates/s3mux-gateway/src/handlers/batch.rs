//! Multi-object delete

use super::{bucket_resource, xml_response};
use crate::state::Connection;
use crate::xml::{self, DeleteErrorEntry, DeleteRequest, DeleteResult, DeletedEntry};
use crate::{ApiError, S3ErrorCode};
use axum::response::Response;
use bytes::Bytes;
use futures::future::join_all;
use s3mux_backend::{BackendError, NULL_VERSION_ID};
use std::collections::{HashMap, VecDeque};
use tracing::{info, warn};

/// Keys accepted in a single delete request
pub const MAX_DELETE_KEYS: usize = 1000;

struct DeleteTarget {
    key: String,
    version_id: Option<String>,
}

impl DeleteTarget {
    /// Whether the key must go through a per-version delete
    fn is_versioned(&self) -> bool {
        self.version_id
            .as_deref()
            .is_some_and(|v| v != NULL_VERSION_ID)
    }
}

/// POST /{bucket}?delete - Delete multiple objects
///
/// Always answers 200; failures are reported per key.
pub async fn delete_objects(
    conn: &Connection,
    bucket: &str,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: DeleteRequest =
        xml::from_xml(&body).map_err(|e| e.with_resource(bucket_resource(bucket)))?;

    if request.objects.len() > MAX_DELETE_KEYS {
        return Err(ApiError::s3_with_resource(
            S3ErrorCode::InvalidArgument,
            format!("A delete request may name at most {} keys", MAX_DELETE_KEYS),
            bucket_resource(bucket),
        ));
    }

    let targets: Vec<DeleteTarget> = request
        .objects
        .into_iter()
        .filter(|o| !o.key.is_empty())
        .map(|o| DeleteTarget {
            key: o.key,
            version_id: o.version_id.filter(|v| !v.is_empty()),
        })
        .collect();

    let mut outcomes: Vec<Option<Result<(), BackendError>>> = vec![None; targets.len()];
    let (versioned, plain): (Vec<usize>, Vec<usize>) =
        (0..targets.len()).partition(|&i| targets[i].is_versioned());

    let plain_results = delete_plain(conn, bucket, &plain, &targets).await;
    let versioned_results = delete_versioned(conn, bucket, &versioned, &targets).await;
    for (i, outcome) in plain.into_iter().zip(plain_results) {
        outcomes[i] = Some(outcome);
    }
    for (i, outcome) in versioned.into_iter().zip(versioned_results) {
        outcomes[i] = Some(outcome);
    }

    let mut result = DeleteResult {
        xmlns: xml::S3_NAMESPACE,
        ..Default::default()
    };
    for (target, outcome) in targets.iter().zip(outcomes) {
        match outcome.unwrap_or_else(|| Err(BackendError::internal("Key was not processed"))) {
            Ok(()) => {
                if !request.quiet {
                    result.deleted.push(DeletedEntry {
                        key: target.key.clone(),
                        version_id: target.version_id.clone(),
                    });
                }
            }
            Err(e) => result.errors.push(error_entry(target, &e)),
        }
    }

    info!(
        connection = %conn.name(),
        bucket,
        requested = targets.len(),
        failed = result.errors.len(),
        "Batch delete finished"
    );

    xml_response(&result)
}

/// Bulk delete, falling back to one call per key when the backend lacks it
async fn delete_plain(
    conn: &Connection,
    bucket: &str,
    indices: &[usize],
    targets: &[DeleteTarget],
) -> Vec<Result<(), BackendError>> {
    if indices.is_empty() {
        return Vec::new();
    }
    let keys: Vec<String> = indices.iter().map(|&i| targets[i].key.clone()).collect();

    match conn.backend.delete_objects(bucket, &keys).await {
        Ok(results) => {
            // Repeated keys consume their outcomes in request order
            let mut pending: HashMap<String, VecDeque<Option<BackendError>>> = HashMap::new();
            for outcome in results {
                pending.entry(outcome.key).or_default().push_back(outcome.error);
            }
            keys.iter()
                .map(|key| match pending.get_mut(key).and_then(VecDeque::pop_front) {
                    Some(None) => Ok(()),
                    Some(Some(e)) => Err(e),
                    None => Err(BackendError::internal("Backend returned no result for key")),
                })
                .collect()
        }
        Err(e) if e.is_not_implemented() => {
            join_all(keys.iter().map(|key| conn.backend.delete_object(bucket, key))).await
        }
        Err(e) => {
            warn!(bucket, error = %e, "Bulk delete failed");
            keys.iter().map(|_| Err(e.clone())).collect()
        }
    }
}

async fn delete_versioned(
    conn: &Connection,
    bucket: &str,
    indices: &[usize],
    targets: &[DeleteTarget],
) -> Vec<Result<(), BackendError>> {
    join_all(indices.iter().map(|&i| {
        let target = &targets[i];
        conn.backend.delete_object_version(
            bucket,
            &target.key,
            target.version_id.as_deref().unwrap_or_default(),
        )
    }))
    .await
}

fn error_entry(target: &DeleteTarget, error: &BackendError) -> DeleteErrorEntry {
    DeleteErrorEntry {
        key: target.key.clone(),
        version_id: target.version_id.clone(),
        code: S3ErrorCode::from(error.kind).as_str().to_string(),
        message: error.message.clone(),
    }
}
