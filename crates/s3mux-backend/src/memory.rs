//! In-memory backend for development and testing

use crate::bucket::validate_bucket_name;
use crate::error::{BackendError, BackendErrorKind, Result};
use crate::multipart::MultipartManager;
use crate::types::*;
use crate::{ObjectBackend, NULL_VERSION_ID};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use tracing::debug;

/// Default multipart session lifetime (24 hours)
pub const DEFAULT_MULTIPART_EXPIRY_SECS: u64 = 24 * 60 * 60;

/// One stored version of a key; `data == None` marks a delete marker
#[derive(Clone, Debug)]
struct StoredVersion {
    version_id: String,
    data: Option<Bytes>,
    etag: String,
    last_modified: DateTime<Utc>,
    content_type: Option<String>,
    user_metadata: BTreeMap<String, String>,
}

impl StoredVersion {
    fn object(version_id: String, data: Bytes, etag: String, upload: ObjectUpload) -> Self {
        Self {
            version_id,
            data: Some(data),
            etag,
            last_modified: Utc::now(),
            content_type: upload.content_type,
            user_metadata: upload.user_metadata,
        }
    }

    fn delete_marker(version_id: String) -> Self {
        Self {
            version_id,
            data: None,
            etag: String::new(),
            last_modified: Utc::now(),
            content_type: None,
            user_metadata: BTreeMap::new(),
        }
    }

    fn is_delete_marker(&self) -> bool {
        self.data.is_none()
    }

    fn size(&self) -> u64 {
        self.data.as_ref().map(|d| d.len() as u64).unwrap_or(0)
    }

    fn info(&self, key: &str) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size: self.size(),
            etag: self.etag.clone(),
            last_modified: self.last_modified,
            content_type: self.content_type.clone(),
            version_id: Some(self.version_id.clone()),
            user_metadata: self.user_metadata.clone(),
        }
    }
}

#[derive(Debug)]
struct StoredBucket {
    info: BucketInfo,
    versioning: VersioningState,
    cors: Option<Vec<CorsRule>>,
    /// Version stacks per key, oldest first
    objects: BTreeMap<String, Vec<StoredVersion>>,
}

impl StoredBucket {
    fn new(name: &str, region: &str) -> Self {
        Self {
            info: BucketInfo {
                name: name.to_string(),
                creation_date: Utc::now(),
                region: Some(region.to_string()),
            },
            versioning: VersioningState::Unset,
            cors: None,
            objects: BTreeMap::new(),
        }
    }

    fn next_version_id(&self) -> String {
        if self.versioning.is_enabled() {
            uuid::Uuid::new_v4().to_string()
        } else {
            NULL_VERSION_ID.to_string()
        }
    }

    fn current(&self, key: &str) -> Option<&StoredVersion> {
        self.objects
            .get(key)
            .and_then(|versions| versions.last())
            .filter(|v| !v.is_delete_marker())
    }

    fn find_version(&self, key: &str, version_id: &str) -> Option<&StoredVersion> {
        self.objects
            .get(key)
            .and_then(|versions| versions.iter().find(|v| v.version_id == version_id))
    }

    /// Push a new current version, replacing the null version unless versioning is enabled
    fn push_version(&mut self, key: &str, version: StoredVersion) {
        let versions = self.objects.entry(key.to_string()).or_default();
        if version.version_id == NULL_VERSION_ID {
            versions.retain(|v| v.version_id != NULL_VERSION_ID);
        }
        versions.push(version);
    }

    fn delete_current(&mut self, key: &str) -> Result<()> {
        if self.current(key).is_none() {
            return Err(BackendError::object_not_found(&self.info.name, key));
        }

        match self.versioning {
            VersioningState::Unset => {
                self.objects.remove(key);
            }
            VersioningState::Enabled | VersioningState::Suspended => {
                let marker = StoredVersion::delete_marker(self.next_version_id());
                self.push_version(key, marker);
            }
        }
        Ok(())
    }

    fn delete_version(&mut self, key: &str, version_id: &str) -> Result<()> {
        let versions = self
            .objects
            .get_mut(key)
            .ok_or_else(|| BackendError::version_not_found(key, version_id))?;
        let index = versions
            .iter()
            .position(|v| v.version_id == version_id)
            .ok_or_else(|| BackendError::version_not_found(key, version_id))?;

        versions.remove(index);
        if versions.is_empty() {
            self.objects.remove(key);
        }
        Ok(())
    }

    fn delete_marker_or_null(&mut self, key: &str) -> Result<()> {
        let target = self.objects.get(key).and_then(|versions| {
            if versions.iter().any(|v| v.version_id == NULL_VERSION_ID) {
                Some(NULL_VERSION_ID.to_string())
            } else {
                versions
                    .last()
                    .filter(|v| v.is_delete_marker())
                    .map(|v| v.version_id.clone())
            }
        });

        match target {
            Some(version_id) => self.delete_version(key, &version_id),
            None => Err(BackendError::object_not_found(&self.info.name, key)),
        }
    }

    /// Object info as clients see it; unversioned buckets expose no version id
    fn describe(&self, key: &str, version: &StoredVersion) -> ObjectInfo {
        let mut info = version.info(key);
        if self.versioning == VersioningState::Unset {
            info.version_id = None;
        }
        info
    }

    fn is_empty(&self) -> bool {
        self.objects.values().all(|versions| versions.is_empty())
    }
}

/// In-memory backend storing buckets and object versions in a `DashMap`
pub struct MemoryBackend {
    buckets: DashMap<String, StoredBucket>,
    multipart: MultipartManager,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_multipart_expiry(DEFAULT_MULTIPART_EXPIRY_SECS)
    }

    /// Create a backend whose abandoned multipart sessions expire after `expiry_secs`
    pub fn with_multipart_expiry(expiry_secs: u64) -> Self {
        Self {
            buckets: DashMap::new(),
            multipart: MultipartManager::new(expiry_secs),
        }
    }

    /// Number of buckets held
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of pending multipart uploads
    pub fn pending_uploads(&self) -> usize {
        self.multipart.upload_count()
    }

    fn with_bucket<T>(&self, bucket: &str, f: impl FnOnce(&StoredBucket) -> Result<T>) -> Result<T> {
        let entry = self
            .buckets
            .get(bucket)
            .ok_or_else(|| BackendError::bucket_not_found(bucket))?;
        f(&entry)
    }

    fn with_bucket_mut<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut StoredBucket) -> Result<T>,
    ) -> Result<T> {
        let mut entry = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| BackendError::bucket_not_found(bucket))?;
        f(&mut entry)
    }

    fn store(&self, bucket: &str, key: &str, data: Bytes, etag: String, upload: ObjectUpload) -> Result<UploadInfo> {
        let size = data.len() as u64;
        self.with_bucket_mut(bucket, |b| {
            let version_id = b.next_version_id();
            let versioned = b.versioning != VersioningState::Unset;
            b.push_version(
                key,
                StoredVersion::object(version_id.clone(), data, etag.clone(), upload),
            );
            Ok(UploadInfo {
                etag,
                version_id: versioned.then_some(version_id),
                size,
            })
        })
    }

    fn stream(info: ObjectInfo, data: Option<Bytes>) -> ObjectStream {
        ObjectStream {
            info,
            body: stream_from_bytes(data.unwrap_or_default()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn create_bucket(&self, bucket: &str, region: &str) -> Result<()> {
        validate_bucket_name(bucket)?;

        match self.buckets.entry(bucket.to_string()) {
            Entry::Occupied(_) => Err(BackendError::new(
                BackendErrorKind::BucketAlreadyOwnedByYou,
                format!("Bucket already owned by you: {}", bucket),
            )),
            Entry::Vacant(slot) => {
                slot.insert(StoredBucket::new(bucket, region));
                debug!(bucket, region, "Created bucket");
                Ok(())
            }
        }
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let mut buckets: Vec<BucketInfo> = self.buckets.iter().map(|b| b.info.clone()).collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn get_bucket(&self, bucket: &str) -> Result<BucketInfo> {
        self.with_bucket(bucket, |b| Ok(b.info.clone()))
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let removed = self.buckets.remove_if(bucket, |_, b| b.is_empty());
        if removed.is_some() {
            self.multipart.remove_bucket(bucket);
            return Ok(());
        }

        if self.buckets.contains_key(bucket) {
            Err(BackendError::new(
                BackendErrorKind::BucketNotEmpty,
                format!("The bucket you tried to delete is not empty: {}", bucket),
            ))
        } else {
            Err(BackendError::bucket_not_found(bucket))
        }
    }

    async fn get_versioning(&self, bucket: &str) -> Result<VersioningState> {
        self.with_bucket(bucket, |b| Ok(b.versioning))
    }

    async fn enable_versioning(&self, bucket: &str) -> Result<()> {
        self.with_bucket_mut(bucket, |b| {
            b.versioning = VersioningState::Enabled;
            Ok(())
        })
    }

    async fn suspend_versioning(&self, bucket: &str) -> Result<()> {
        self.with_bucket_mut(bucket, |b| {
            b.versioning = VersioningState::Suspended;
            Ok(())
        })
    }

    async fn get_cors(&self, bucket: &str) -> Result<Vec<CorsRule>> {
        self.with_bucket(bucket, |b| {
            b.cors.clone().ok_or_else(|| {
                BackendError::new(
                    BackendErrorKind::CorsNotFound,
                    "The CORS configuration does not exist",
                )
            })
        })
    }

    async fn set_cors(&self, bucket: &str, rules: Vec<CorsRule>) -> Result<()> {
        self.with_bucket_mut(bucket, |b| {
            b.cors = Some(rules);
            Ok(())
        })
    }

    async fn delete_cors(&self, bucket: &str) -> Result<()> {
        self.with_bucket_mut(bucket, |b| {
            b.cors = None;
            Ok(())
        })
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.with_bucket(bucket, |b| {
            Ok(b.objects
                .range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .filter_map(|(key, _)| b.current(key).map(|v| b.describe(key, v)))
                .collect())
        })
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectVersionRecord>> {
        self.with_bucket(bucket, |b| {
            let mut records = Vec::new();
            for (key, versions) in b.objects.range(prefix.to_string()..) {
                if !key.starts_with(prefix) {
                    break;
                }
                let latest = versions.len().saturating_sub(1);
                for (index, version) in versions.iter().enumerate().rev() {
                    records.push(ObjectVersionRecord {
                        key: key.clone(),
                        version_id: version.version_id.clone(),
                        is_latest: index == latest,
                        is_delete_marker: version.is_delete_marker(),
                        last_modified: version.last_modified,
                        etag: version.etag.clone(),
                        size: version.size(),
                    });
                }
            }
            Ok(records)
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        upload: ObjectUpload,
    ) -> Result<UploadInfo> {
        // Fail before draining the body
        self.with_bucket(bucket, |_| Ok(()))?;

        let data = collect_stream(body).await?;
        let etag = hex::encode(Md5::digest(&data));
        self.store(bucket, key, data, etag, upload)
    }

    async fn get_object_stream(&self, bucket: &str, key: &str) -> Result<ObjectStream> {
        self.with_bucket(bucket, |b| {
            b.current(key)
                .map(|v| Self::stream(b.describe(key, v), v.data.clone()))
                .ok_or_else(|| BackendError::object_not_found(bucket, key))
        })
    }

    async fn get_object_stream_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<ObjectStream> {
        self.with_bucket(bucket, |b| match b.find_version(key, version_id) {
            Some(v) if v.is_delete_marker() => Err(BackendError::object_not_found(bucket, key)),
            Some(v) => Ok(Self::stream(b.describe(key, v), v.data.clone())),
            None => Err(BackendError::version_not_found(key, version_id)),
        })
    }

    async fn get_object_info(&self, bucket: &str, key: &str) -> Result<ObjectInfo> {
        self.with_bucket(bucket, |b| {
            b.current(key)
                .map(|v| b.describe(key, v))
                .ok_or_else(|| BackendError::object_not_found(bucket, key))
        })
    }

    async fn get_object_info_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<ObjectInfo> {
        self.with_bucket(bucket, |b| match b.find_version(key, version_id) {
            Some(v) if v.is_delete_marker() => Err(BackendError::object_not_found(bucket, key)),
            Some(v) => Ok(b.describe(key, v)),
            None => Err(BackendError::version_not_found(key, version_id)),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.with_bucket_mut(bucket, |b| b.delete_current(key))
    }

    async fn delete_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<()> {
        self.with_bucket_mut(bucket, |b| b.delete_version(key, version_id))
    }

    async fn delete_object_delete_marker(&self, bucket: &str, key: &str) -> Result<()> {
        self.with_bucket_mut(bucket, |b| b.delete_marker_or_null(key))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<Vec<DeleteOutcome>> {
        self.with_bucket_mut(bucket, |b| {
            Ok(keys
                .iter()
                .map(|key| match b.delete_current(key) {
                    Ok(()) => DeleteOutcome::deleted(key.as_str()),
                    Err(e) => DeleteOutcome::failed(key.as_str(), e),
                })
                .collect())
        })
    }

    async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload: ObjectUpload,
    ) -> Result<String> {
        self.with_bucket(bucket, |_| Ok(()))?;

        let expired = self.multipart.cleanup_expired();
        if expired > 0 {
            debug!(expired, "Discarded expired multipart uploads");
        }
        Ok(self.multipart.create_upload(bucket, key, upload))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: ByteStream,
    ) -> Result<String> {
        let data = collect_stream(body).await?;
        self.multipart.put_part(bucket, key, upload_id, part_number, data)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletePart>,
    ) -> Result<CompletedUpload> {
        self.with_bucket(bucket, |_| Ok(()))?;

        let assembled = self.multipart.complete(bucket, key, upload_id, &parts)?;
        let info = self.store(bucket, key, assembled.data, assembled.etag, assembled.upload)?;
        Ok(CompletedUpload {
            location: format!("/{}/{}", bucket, key),
            etag: info.etag,
            version_id: info.version_id,
            size: info.size,
        })
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.multipart.abort(bucket, key, upload_id)
    }

    async fn force_empty_bucket(&self, bucket: &str) -> Result<()> {
        self.with_bucket_mut(bucket, |b| {
            b.objects.clear();
            Ok(())
        })?;
        self.multipart.remove_bucket(bucket);
        Ok(())
    }

    async fn force_empty_and_delete_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets
            .remove(bucket)
            .ok_or_else(|| BackendError::bucket_not_found(bucket))?;
        self.multipart.remove_bucket(bucket);
        Ok(())
    }
}
