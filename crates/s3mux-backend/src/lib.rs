//! # s3mux backend
//!
//! The storage collaborator interface consumed by the s3mux gateway.
//!
//! This crate provides:
//! - **`ObjectBackend`**: the uniform async interface every storage adapter implements
//! - **Structured errors**: a closed set of failure kinds the gateway maps to S3 codes
//! - **`MemoryBackend`**: an in-process backend for development and tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              s3mux gateway              │
//! ├─────────────────────────────────────────┤
//! │           ObjectBackend trait           │
//! ├─────────────┬─────────────┬─────────────┤
//! │  Memory     │  Vendor A   │  Vendor B   │
//! └─────────────┴─────────────┴─────────────┘
//! ```
//!
//! Multipart session state lives behind the trait, addressed solely by
//! upload id, so any gateway instance can serve any step of an upload.
//!
//! ## Example
//!
//! ```rust,ignore
//! use s3mux_backend::{MemoryBackend, ObjectBackend, ObjectUpload, stream_from_bytes};
//!
//! let backend = MemoryBackend::new();
//! backend.create_bucket("photos", "us-east-1").await?;
//! let info = backend
//!     .put_object("photos", "cat.jpg", stream_from_bytes(data), ObjectUpload::default())
//!     .await?;
//! ```

pub mod bucket;
pub mod error;
pub mod memory;
pub mod multipart;
pub mod types;

pub use bucket::validate_bucket_name;
pub use error::{BackendError, BackendErrorKind, Result};
pub use memory::MemoryBackend;
pub use multipart::{MultipartManager, MultipartSession, StoredPart};
pub use types::{
    collect_stream, stream_from_bytes, BucketInfo, ByteStream, CompletePart, CompletedUpload,
    CorsRule, DeleteOutcome, ObjectInfo, ObjectStream, ObjectUpload, ObjectVersionRecord,
    UploadInfo, VersioningState,
};

use async_trait::async_trait;

/// Version id used for objects written while versioning is not enabled
pub const NULL_VERSION_ID: &str = "null";

/// Storage operations the gateway needs from a backend
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Create a bucket in the given region
    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()>;

    /// List all buckets visible to this connection
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Look up a single bucket
    async fn get_bucket(&self, bucket: &str) -> Result<BucketInfo>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningState>;

    async fn enable_versioning(&self, bucket: &str) -> Result<()>;

    async fn suspend_versioning(&self, bucket: &str) -> Result<()>;

    /// Fails with `CorsNotFound` when no configuration is stored
    async fn get_cors(&self, bucket: &str) -> Result<Vec<CorsRule>>;

    async fn set_cors(&self, bucket: &str, rules: Vec<CorsRule>) -> Result<()>;

    async fn delete_cors(&self, bucket: &str) -> Result<()>;

    /// Current (non-deleted) objects whose key starts with `prefix`, in key order
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Every version and delete marker under `prefix`
    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectVersionRecord>>;

    /// Store an object from a stream
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        upload: ObjectUpload,
    ) -> Result<UploadInfo>;

    async fn get_object_stream(&self, bucket: &str, key: &str) -> Result<ObjectStream>;

    async fn get_object_stream_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<ObjectStream>;

    async fn get_object_info(&self, bucket: &str, key: &str) -> Result<ObjectInfo>;

    async fn get_object_info_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<ObjectInfo>;

    /// Default delete; on a versioned bucket this inserts a delete marker
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Permanently remove one version
    async fn delete_object_version(&self, bucket: &str, key: &str, version_id: &str)
        -> Result<()>;

    /// Remove the null version or the current delete marker of a key
    async fn delete_object_delete_marker(&self, _bucket: &str, _key: &str) -> Result<()> {
        Err(BackendError::not_implemented("DeleteObjectDeleteMarker"))
    }

    /// Bulk delete; one outcome per key
    async fn delete_objects(&self, _bucket: &str, _keys: &[String]) -> Result<Vec<DeleteOutcome>> {
        Err(BackendError::not_implemented("DeleteObjects"))
    }

    /// Start a multipart upload and return its id
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload: ObjectUpload,
    ) -> Result<String>;

    /// Store one part and return its ETag; re-uploading a part number replaces it
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: ByteStream,
    ) -> Result<String>;

    /// Assemble the declared parts into the final object
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletePart>,
    ) -> Result<CompletedUpload>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
        -> Result<()>;

    /// Remove every object, version and pending upload, keeping the bucket
    async fn force_empty_bucket(&self, bucket: &str) -> Result<()>;

    async fn force_empty_and_delete_bucket(&self, bucket: &str) -> Result<()>;
}
