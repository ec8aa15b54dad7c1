//! Data types exchanged between the gateway and its backends

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;

/// Chunk size used when replaying buffered content as a stream
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Streaming object body
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Wrap buffered content as a [`ByteStream`], split into fixed-size chunks
pub fn stream_from_bytes(data: Bytes) -> ByteStream {
    let mut chunks = Vec::with_capacity(data.len() / STREAM_CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + STREAM_CHUNK_SIZE).min(data.len());
        chunks.push(Ok(data.slice(offset..end)));
        offset = end;
    }
    Box::pin(futures::stream::iter(chunks))
}

/// Drain a [`ByteStream`] into a single buffer
pub async fn collect_stream(stream: ByteStream) -> std::io::Result<Bytes> {
    let buf = stream
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buf.freeze())
}

/// Bucket versioning state.
///
/// Transitions only move forward: `Unset -> Enabled <-> Suspended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VersioningState {
    #[default]
    Unset,
    Enabled,
    Suspended,
}

impl VersioningState {
    /// Wire representation; `Unset` has none
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Enabled => "Enabled",
            Self::Suspended => "Suspended",
        }
    }

    /// Whether new writes get fresh version ids
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Bucket summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: DateTime<Utc>,
    /// Region reported by the backend, if known
    pub region: Option<String>,
}

/// Metadata for the current (or a specific) version of an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    /// Unquoted entity tag
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub content_type: Option<String>,
    pub version_id: Option<String>,
    pub user_metadata: BTreeMap<String, String>,
}

/// One entry of a version listing, either an object version or a delete marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectVersionRecord {
    pub key: String,
    /// May be empty for backends that do not name null versions
    pub version_id: String,
    pub is_latest: bool,
    pub is_delete_marker: bool,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub size: u64,
}

/// A single CORS rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsRule {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub max_age_seconds: Option<u32>,
}

/// Attributes supplied with an object write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectUpload {
    pub content_type: Option<String>,
    /// Declared length, if the client sent one
    pub content_length: Option<u64>,
    /// `x-amz-meta-*` values, keyed without the prefix
    pub user_metadata: BTreeMap<String, String>,
}

/// Result of a successful object write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub etag: String,
    pub version_id: Option<String>,
    pub size: u64,
}

/// Caller-declared part of a multipart completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletePart {
    pub part_number: u32,
    pub etag: String,
}

/// Result of a completed multipart upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub location: String,
    pub etag: String,
    pub version_id: Option<String>,
    pub size: u64,
}

/// Per-key result of a bulk delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub key: String,
    pub error: Option<crate::BackendError>,
}

impl DeleteOutcome {
    pub fn deleted(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: crate::BackendError) -> Self {
        Self {
            key: key.into(),
            error: Some(error),
        }
    }
}

/// Object metadata together with its content stream
pub struct ObjectStream {
    pub info: ObjectInfo,
    pub body: ByteStream,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
