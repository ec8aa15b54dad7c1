//! Multipart upload session arena

use crate::error::{BackendError, BackendErrorKind, Result};
use crate::types::{CompletePart, ObjectUpload};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Highest part number S3 accepts
pub const MAX_PART_NUMBER: u32 = 10_000;

/// An in-progress multipart upload
#[derive(Clone, Debug)]
pub struct MultipartSession {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
    /// Attributes applied to the assembled object
    pub upload: ObjectUpload,
    pub parts: BTreeMap<u32, StoredPart>,
}

impl MultipartSession {
    fn new(bucket: &str, key: &str, upload: ObjectUpload) -> Self {
        Self {
            upload_id: Uuid::new_v4().to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            created_at: Utc::now(),
            upload,
            parts: BTreeMap::new(),
        }
    }

    fn belongs_to(&self, bucket: &str, key: &str) -> bool {
        self.bucket == bucket && self.key == key
    }

    /// Total size of all stored parts
    pub fn total_size(&self) -> u64 {
        self.parts.values().map(|p| p.size).sum()
    }
}

/// An uploaded part
#[derive(Clone, Debug)]
pub struct StoredPart {
    pub part_number: u32,
    /// Hex MD5 of the part content
    pub etag: String,
    pub size: u64,
    pub data: Bytes,
    pub uploaded_at: DateTime<Utc>,
}

impl StoredPart {
    pub fn new(part_number: u32, data: Bytes) -> Self {
        Self {
            part_number,
            etag: hex::encode(Md5::digest(&data)),
            size: data.len() as u64,
            data,
            uploaded_at: Utc::now(),
        }
    }
}

/// Parts stitched together by a successful completion
#[derive(Debug)]
pub struct AssembledObject {
    pub data: Bytes,
    /// `md5(concat(part md5s))-N`
    pub etag: String,
    pub upload: ObjectUpload,
}

/// Manager for multipart uploads, keyed by upload id
pub struct MultipartManager {
    uploads: DashMap<String, MultipartSession>,
    expiry_secs: u64,
}

impl MultipartManager {
    pub fn new(expiry_secs: u64) -> Self {
        Self {
            uploads: DashMap::new(),
            expiry_secs,
        }
    }

    /// Open a new session and return its upload id
    pub fn create_upload(&self, bucket: &str, key: &str, upload: ObjectUpload) -> String {
        let session = MultipartSession::new(bucket, key, upload);
        let upload_id = session.upload_id.clone();
        self.uploads.insert(upload_id.clone(), session);
        upload_id
    }

    /// Store a part, replacing any earlier part with the same number
    pub fn put_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        if part_number == 0 || part_number > MAX_PART_NUMBER {
            return Err(BackendError::new(
                BackendErrorKind::InvalidArgument,
                format!("Part number must be between 1 and {}", MAX_PART_NUMBER),
            ));
        }

        let mut session = self
            .uploads
            .get_mut(upload_id)
            .filter(|s| s.belongs_to(bucket, key))
            .ok_or_else(|| BackendError::upload_not_found(upload_id))?;

        let part = StoredPart::new(part_number, data);
        let etag = part.etag.clone();
        session.parts.insert(part_number, part);
        Ok(etag)
    }

    /// Validate the declared part list and, if it matches, consume the session.
    /// Validation and removal happen under the same shard lock, so a part
    /// cannot be replaced between its ETag check and assembly.
    pub fn complete(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        declared: &[CompletePart],
    ) -> Result<AssembledObject> {
        let mut rejected = None;
        let (_, session) = self
            .uploads
            .remove_if(upload_id, |_, s| {
                if !s.belongs_to(bucket, key) {
                    return false;
                }
                match validate_parts(s, declared) {
                    Ok(()) => true,
                    Err(e) => {
                        rejected = Some(e);
                        false
                    }
                }
            })
            .ok_or_else(|| {
                rejected
                    .take()
                    .unwrap_or_else(|| BackendError::upload_not_found(upload_id))
            })?;

        let mut data = BytesMut::new();
        let mut digests = Md5::new();
        for declared_part in declared {
            let part = session.parts.get(&declared_part.part_number).ok_or_else(|| {
                BackendError::new(
                    BackendErrorKind::InvalidPart,
                    format!("Part {} was not uploaded", declared_part.part_number),
                )
            })?;
            data.extend_from_slice(&part.data);
            digests.update(Md5::digest(&part.data));
        }

        Ok(AssembledObject {
            data: data.freeze(),
            etag: format!("{}-{}", hex::encode(digests.finalize()), declared.len()),
            upload: session.upload,
        })
    }

    /// Discard a session and its parts
    pub fn abort(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.uploads
            .remove_if(upload_id, |_, s| s.belongs_to(bucket, key))
            .map(|_| ())
            .ok_or_else(|| BackendError::upload_not_found(upload_id))
    }

    /// Drop every session targeting `bucket`
    pub fn remove_bucket(&self, bucket: &str) -> usize {
        let before = self.uploads.len();
        self.uploads.retain(|_, s| s.bucket != bucket);
        before - self.uploads.len()
    }

    /// Parts stored so far, in part-number order
    pub fn list_parts(&self, upload_id: &str) -> Option<Vec<StoredPart>> {
        self.uploads
            .get(upload_id)
            .map(|s| s.parts.values().cloned().collect())
    }

    /// Clean up expired uploads
    pub fn cleanup_expired(&self) -> usize {
        let threshold = i64::try_from(self.expiry_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
        let Some(threshold) = threshold else {
            return 0;
        };
        let before = self.uploads.len();
        self.uploads.retain(|_, s| s.created_at >= threshold);
        before - self.uploads.len()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.len()
    }
}

fn validate_parts(session: &MultipartSession, declared: &[CompletePart]) -> Result<()> {
    if declared.is_empty() {
        return Err(BackendError::new(
            BackendErrorKind::InvalidPart,
            "You must specify at least one part",
        ));
    }

    let mut previous = 0;
    for part in declared {
        if part.part_number <= previous {
            return Err(BackendError::new(
                BackendErrorKind::InvalidPartOrder,
                "The list of parts was not in ascending order",
            ));
        }
        previous = part.part_number;

        let stored = session.parts.get(&part.part_number).ok_or_else(|| {
            BackendError::new(
                BackendErrorKind::InvalidPart,
                format!("Part {} was not uploaded", part.part_number),
            )
        })?;
        if stored.etag != part.etag.trim_matches('"') {
            return Err(BackendError::new(
                BackendErrorKind::InvalidPart,
                format!("ETag mismatch for part {}", part.part_number),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(n: u32, etag: &str) -> CompletePart {
        CompletePart {
            part_number: n,
            etag: etag.to_string(),
        }
    }

    #[test]
    fn test_multipart_upload_creation() {
        let manager = MultipartManager::new(3600);
        let upload_id = manager.create_upload("test-bucket", "test-key", ObjectUpload::default());

        assert!(!upload_id.is_empty());
        assert_eq!(manager.upload_count(), 1);
    }

    #[test]
    fn test_reupload_replaces_part() {
        let manager = MultipartManager::new(3600);
        let id = manager.create_upload("bucket", "key", ObjectUpload::default());

        let first = manager.put_part("bucket", "key", &id, 1, Bytes::from("aaa")).unwrap();
        let second = manager.put_part("bucket", "key", &id, 1, Bytes::from("bbbb")).unwrap();
        assert_ne!(first, second);

        let parts = manager.list_parts(&id).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].etag, second);
        assert_eq!(parts[0].size, 4);
    }

    #[test]
    fn test_complete_assembles_in_order() {
        let manager = MultipartManager::new(3600);
        let id = manager.create_upload("bucket", "key", ObjectUpload::default());
        let e1 = manager.put_part("bucket", "key", &id, 1, Bytes::from("hello ")).unwrap();
        let e2 = manager.put_part("bucket", "key", &id, 2, Bytes::from("world")).unwrap();

        let quoted = format!("\"{}\"", e2);
        let assembled = manager
            .complete("bucket", "key", &id, &[part(1, &e1), part(2, &quoted)])
            .unwrap();

        assert_eq!(assembled.data, Bytes::from("hello world"));
        assert!(assembled.etag.ends_with("-2"));
        assert_eq!(manager.upload_count(), 0);
    }

    #[test]
    fn test_complete_rejects_bad_part_lists() {
        let manager = MultipartManager::new(3600);
        let id = manager.create_upload("bucket", "key", ObjectUpload::default());
        let e1 = manager.put_part("bucket", "key", &id, 1, Bytes::from("a")).unwrap();
        let e2 = manager.put_part("bucket", "key", &id, 2, Bytes::from("b")).unwrap();

        let err = manager.complete("bucket", "key", &id, &[]).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidPart);

        let err = manager
            .complete("bucket", "key", &id, &[part(2, &e2), part(1, &e1)])
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidPartOrder);

        let err = manager
            .complete("bucket", "key", &id, &[part(1, "deadbeef")])
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidPart);

        let err = manager
            .complete("bucket", "key", &id, &[part(1, &e1), part(3, &e2)])
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidPart);

        // Failed completions keep the session alive
        assert_eq!(manager.upload_count(), 1);
    }

    #[test]
    fn test_session_is_scoped_to_bucket_and_key() {
        let manager = MultipartManager::new(3600);
        let id = manager.create_upload("bucket", "key", ObjectUpload::default());

        let err = manager.put_part("bucket", "other", &id, 1, Bytes::from("x")).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::UploadNotFound);

        assert!(manager.abort("other-bucket", "key", &id).is_err());
        assert!(manager.abort("bucket", "key", &id).is_ok());
        assert!(manager.abort("bucket", "key", &id).is_err());
    }

    #[test]
    fn test_part_number_bounds() {
        let manager = MultipartManager::new(3600);
        let id = manager.create_upload("bucket", "key", ObjectUpload::default());

        assert!(manager.put_part("bucket", "key", &id, 0, Bytes::new()).is_err());
        assert!(manager.put_part("bucket", "key", &id, MAX_PART_NUMBER + 1, Bytes::new()).is_err());
        assert!(manager.put_part("bucket", "key", &id, MAX_PART_NUMBER, Bytes::new()).is_ok());
    }

    #[test]
    fn test_cleanup_expired() {
        let manager = MultipartManager::new(3600);
        let id = manager.create_upload("bucket", "key", ObjectUpload::default());
        manager
            .uploads
            .get_mut(&id)
            .unwrap()
            .created_at = Utc::now() - Duration::seconds(7200);
        manager.create_upload("bucket", "fresh", ObjectUpload::default());

        assert_eq!(manager.cleanup_expired(), 1);
        assert_eq!(manager.upload_count(), 1);
    }

    #[test]
    fn test_cleanup_with_unbounded_expiry_keeps_sessions() {
        let manager = MultipartManager::new(u64::MAX);
        manager.create_upload("bucket", "key", ObjectUpload::default());

        assert_eq!(manager.cleanup_expired(), 0);
        assert_eq!(manager.upload_count(), 1);
    }

    #[test]
    fn test_rejected_completion_reports_validation_error() {
        let manager = MultipartManager::new(3600);
        let id = manager.create_upload("bucket", "key", ObjectUpload::default());
        manager.put_part("bucket", "key", &id, 1, Bytes::from("a")).unwrap();

        // Wrong key reports the session as missing, not the part list
        let err = manager
            .complete("bucket", "other", &id, &[part(1, "deadbeef")])
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::UploadNotFound);

        let err = manager
            .complete("bucket", "key", &id, &[part(1, "deadbeef")])
            .unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::InvalidPart);
        assert_eq!(manager.upload_count(), 1);
    }

    #[test]
    fn test_concurrent_part_replacement_never_mixes_into_completion() {
        let manager = std::sync::Arc::new(MultipartManager::new(3600));
        let id = manager.create_upload("bucket", "key", ObjectUpload::default());
        let declared = manager.put_part("bucket", "key", &id, 1, Bytes::from("original")).unwrap();

        let writer = {
            let manager = manager.clone();
            let id = id.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    if manager
                        .put_part("bucket", "key", &id, 1, Bytes::from("replaced"))
                        .is_err()
                    {
                        break;
                    }
                    let _ = manager.put_part("bucket", "key", &id, 1, Bytes::from("original"));
                }
            })
        };

        let mut assembled = None;
        for _ in 0..10_000 {
            if let Ok(object) = manager.complete("bucket", "key", &id, &[part(1, &declared)]) {
                assembled = Some(object);
                break;
            }
        }
        writer.join().unwrap();

        // Whatever was assembled must match the ETag the caller declared
        if let Some(object) = assembled {
            assert_eq!(object.data, Bytes::from("original"));
        }
    }

    #[test]
    fn test_remove_bucket() {
        let manager = MultipartManager::new(3600);
        manager.create_upload("bucket1", "a", ObjectUpload::default());
        manager.create_upload("bucket1", "b", ObjectUpload::default());
        manager.create_upload("bucket2", "c", ObjectUpload::default());

        assert_eq!(manager.remove_bucket("bucket1"), 2);
        assert_eq!(manager.upload_count(), 1);
    }
}
