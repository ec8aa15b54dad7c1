//! Test backends shared by the handler tests

use async_trait::async_trait;
use s3mux_backend::{
    BucketInfo, ByteStream, CompletePart, CompletedUpload, CorsRule, MemoryBackend,
    ObjectBackend, ObjectInfo, ObjectStream, ObjectUpload, ObjectVersionRecord, UploadInfo,
    VersioningState,
};

/// In-memory backend that only implements the required primitives, so the
/// bulk delete and delete-marker calls fall back to their defaults
pub struct MinimalBackend {
    inner: MemoryBackend,
    blank_version_ids: bool,
}

impl MinimalBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            blank_version_ids: false,
        }
    }

    /// Report every version with an empty id, like stores without null versions
    pub fn with_blank_version_ids() -> Self {
        Self {
            blank_version_ids: true,
            ..Self::new()
        }
    }
}


#[async_trait]
impl ObjectBackend for MinimalBackend {
    async fn create_bucket(&self, bucket: &str, region: &str) -> s3mux_backend::Result<()> {
        self.inner.create_bucket(bucket, region).await
    }
    async fn list_buckets(&self) -> s3mux_backend::Result<Vec<BucketInfo>> {
        self.inner.list_buckets().await
    }
    async fn get_bucket(&self, bucket: &str) -> s3mux_backend::Result<BucketInfo> {
        self.inner.get_bucket(bucket).await
    }
    async fn delete_bucket(&self, bucket: &str) -> s3mux_backend::Result<()> {
        self.inner.delete_bucket(bucket).await
    }
    async fn get_versioning(&self, bucket: &str) -> s3mux_backend::Result<VersioningState> {
        self.inner.get_versioning(bucket).await
    }
    async fn enable_versioning(&self, bucket: &str) -> s3mux_backend::Result<()> {
        self.inner.enable_versioning(bucket).await
    }
    async fn suspend_versioning(&self, bucket: &str) -> s3mux_backend::Result<()> {
        self.inner.suspend_versioning(bucket).await
    }
    async fn get_cors(&self, bucket: &str) -> s3mux_backend::Result<Vec<CorsRule>> {
        self.inner.get_cors(bucket).await
    }
    async fn set_cors(&self, bucket: &str, rules: Vec<CorsRule>) -> s3mux_backend::Result<()> {
        self.inner.set_cors(bucket, rules).await
    }
    async fn delete_cors(&self, bucket: &str) -> s3mux_backend::Result<()> {
        self.inner.delete_cors(bucket).await
    }
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> s3mux_backend::Result<Vec<ObjectInfo>> {
        self.inner.list_objects(bucket, prefix).await
    }
    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> s3mux_backend::Result<Vec<ObjectVersionRecord>> {
        let mut versions = self.inner.list_object_versions(bucket, prefix).await?;
        if self.blank_version_ids {
            for version in &mut versions {
                version.version_id.clear();
            }
        }
        Ok(versions)
    }
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        upload: ObjectUpload,
    ) -> s3mux_backend::Result<UploadInfo> {
        self.inner.put_object(bucket, key, body, upload).await
    }
    async fn get_object_stream(
        &self,
        bucket: &str,
        key: &str,
    ) -> s3mux_backend::Result<ObjectStream> {
        self.inner.get_object_stream(bucket, key).await
    }
    async fn get_object_stream_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> s3mux_backend::Result<ObjectStream> {
        self.inner.get_object_stream_version(bucket, key, version_id).await
    }
    async fn get_object_info(&self, bucket: &str, key: &str) -> s3mux_backend::Result<ObjectInfo> {
        self.inner.get_object_info(bucket, key).await
    }
    async fn get_object_info_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> s3mux_backend::Result<ObjectInfo> {
        self.inner.get_object_info_version(bucket, key, version_id).await
    }
    async fn delete_object(&self, bucket: &str, key: &str) -> s3mux_backend::Result<()> {
        self.inner.delete_object(bucket, key).await
    }
    async fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> s3mux_backend::Result<()> {
        self.inner.delete_object_version(bucket, key, version_id).await
    }
    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload: ObjectUpload,
    ) -> s3mux_backend::Result<String> {
        self.inner.initiate_multipart_upload(bucket, key, upload).await
    }
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: ByteStream,
    ) -> s3mux_backend::Result<String> {
        self.inner.upload_part(bucket, key, upload_id, part_number, body).await
    }
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletePart>,
    ) -> s3mux_backend::Result<CompletedUpload> {
        self.inner.complete_multipart_upload(bucket, key, upload_id, parts).await
    }
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> s3mux_backend::Result<()> {
        self.inner.abort_multipart_upload(bucket, key, upload_id).await
    }
    async fn force_empty_bucket(&self, bucket: &str) -> s3mux_backend::Result<()> {
        self.inner.force_empty_bucket(bucket).await
    }
    async fn force_empty_and_delete_bucket(&self, bucket: &str) -> s3mux_backend::Result<()> {
        self.inner.force_empty_and_delete_bucket(bucket).await
    }
}
