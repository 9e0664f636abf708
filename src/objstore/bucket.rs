use std::fmt;
use std::sync::Arc;

use super::{BucketDescriptor, ObjectStoreClient, ObjectStoreRoot, object::list_children};
use crate::{
    AttributeSource, CacheConfig, Capabilities, FileAttributes, FileEntity, FileOperation, FileRef,
    FileUrl, FsError, FsResult, OperationSet, Permissions, SyncedAttributes,
};

/// Buckets are private to the account.
const BUCKET_PERMISSIONS: Permissions = Permissions::from_mode(0o700);

/// A bucket: a top-level directory of the store.
///
/// `mkdir` creates the bucket, `delete` removes it. Attributes are cached
/// for the configured TTL.
#[derive(Clone)]
pub struct BucketFile {
    inner: Arc<BucketInner>,
}

struct BucketInner {
    url: FileUrl,
    name: String,
    client: Arc<dyn ObjectStoreClient>,
    attributes: SyncedAttributes<BucketSource>,
    config: CacheConfig,
}

struct BucketSource {
    client: Arc<dyn ObjectStoreClient>,
    name: String,
}

impl AttributeSource for BucketSource {
    fn fetch(&self) -> FsResult<FileAttributes> {
        self.client.bucket(&self.name).map(bucket_attributes)
    }
}

fn bucket_attributes(descriptor: BucketDescriptor) -> FileAttributes {
    FileAttributes {
        owner: descriptor.owner,
        permissions: BUCKET_PERMISSIONS,
        ..FileAttributes::directory(descriptor.created)
    }
}

impl BucketFile {
    /// Bucket whose attributes are fetched on first read.
    pub fn new(url: FileUrl, client: Arc<dyn ObjectStoreClient>, config: &CacheConfig) -> Self {
        let source = BucketSource {
            client: client.clone(),
            name: url.filename().unwrap_or_default().to_string(),
        };
        Self::build(url, client, SyncedAttributes::new(source, config), config)
    }

    /// Bucket whose attributes are fetched now.
    ///
    /// # Errors
    ///
    /// - [`FsError::Authentication`] if the store rejects the credentials;
    ///   other fetch failures follow the refresh policy on the next read
    pub fn open(url: FileUrl, client: Arc<dyn ObjectStoreClient>, config: &CacheConfig) -> FsResult<Self> {
        let bucket = Self::new(url, client, config);
        match bucket.inner.attributes.refresh() {
            Err(error @ FsError::Authentication { .. }) => Err(error),
            _ => Ok(bucket),
        }
    }

    /// Bucket built from a listing response; no fetch until the TTL expires.
    pub fn with_descriptor(
        url: FileUrl,
        client: Arc<dyn ObjectStoreClient>,
        descriptor: BucketDescriptor,
        config: &CacheConfig,
    ) -> Self {
        let source = BucketSource {
            client: client.clone(),
            name: descriptor.name.clone(),
        };
        let attributes = SyncedAttributes::with_snapshot(source, bucket_attributes(descriptor), config);
        Self::build(url, client, attributes, config)
    }

    fn build(
        url: FileUrl,
        client: Arc<dyn ObjectStoreClient>,
        attributes: SyncedAttributes<BucketSource>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            inner: Arc::new(BucketInner {
                name: attributes.source().name.clone(),
                url,
                client,
                attributes,
                config: *config,
            }),
        }
    }

    /// Name of the bucket.
    pub fn bucket_name(&self) -> &str {
        &self.inner.name
    }
}

impl fmt::Debug for BucketFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketFile").field("url", &self.inner.url).finish()
    }
}

impl Capabilities for BucketFile {
    const OPERATIONS: OperationSet = OperationSet::of(&[
        FileOperation::CreateDirectory,
        FileOperation::ListChildren,
        FileOperation::Delete,
    ]);
}

impl FileEntity for BucketFile {
    fn url(&self) -> &FileUrl {
        &self.inner.url
    }

    fn supported_operations(&self) -> OperationSet {
        Self::OPERATIONS
    }

    fn attributes(&self) -> FsResult<FileAttributes> {
        self.inner.attributes.get_or_refresh()
    }

    fn parent(&self) -> Option<FileRef> {
        let url = self.inner.url.parent()?;
        Some(Arc::new(ObjectStoreRoot::new(url, self.inner.client.clone(), &self.inner.config)))
    }

    fn is_directory(&self) -> bool {
        true
    }

    fn permissions(&self) -> Permissions {
        BUCKET_PERMISSIONS
    }

    fn mkdir(&self) -> FsResult<()> {
        self.inner.client.create_bucket(&self.inner.name)?;
        self.inner.attributes.invalidate();
        Ok(())
    }

    fn ls(&self) -> FsResult<Vec<FileRef>> {
        let parent: FileRef = Arc::new(self.clone());
        list_children(
            &self.inner.client,
            &self.inner.url,
            &self.inner.name,
            "",
            parent,
            &self.inner.config,
        )
    }

    fn delete(&self) -> FsResult<()> {
        self.inner.client.delete_bucket(&self.inner.name)?;
        self.inner.attributes.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::testing::assert_unsupported_stubs;
    use crate::objstore::testing::{MemoryStore, url};
    use std::sync::atomic::Ordering;

    #[test]
    fn empty_bucket_lists_nothing() {
        let store = MemoryStore::with("empty", &[]);
        let bucket = BucketFile::open(url("/empty"), store, &CacheConfig::default()).unwrap();
        assert!(bucket.exists());
        assert!(bucket.ls().unwrap().is_empty());
    }

    #[test]
    fn fixed_permissions_and_owner() {
        let store = MemoryStore::with("b", &[]);
        let bucket = BucketFile::open(url("/b"), store, &CacheConfig::default()).unwrap();
        assert_eq!(bucket.permissions().mode(), 0o700);
        assert_eq!(bucket.owner().as_deref(), Some("owner"));
        assert!(bucket.is_browsable());
        assert!(bucket.parent().unwrap().is_directory());
    }

    #[test]
    fn descriptor_skips_fetch() {
        let store = MemoryStore::with("b", &[]);
        let descriptor = store.bucket("b").unwrap();
        store.stats.store(0, Ordering::SeqCst);
        let bucket = BucketFile::with_descriptor(url("/b"), store.clone(), descriptor, &CacheConfig::default());
        assert!(bucket.exists());
        assert_eq!(store.stats.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn authentication_is_surfaced_at_construction() {
        let store = MemoryStore::with("b", &[]);
        store.reject.store(true, Ordering::SeqCst);
        let err = BucketFile::open(url("/b"), store, &CacheConfig::default()).unwrap_err();
        assert!(matches!(err, FsError::Authentication { .. }));
    }

    #[test]
    fn missing_bucket_does_not_exist() {
        let store = MemoryStore::with("b", &[]);
        let bucket = BucketFile::open(url("/other"), store, &CacheConfig::default()).unwrap();
        assert!(!bucket.exists());
    }

    #[test]
    fn create_and_delete() {
        let store = MemoryStore::with("b", &[]);
        let bucket = BucketFile::open(url("/fresh"), store.clone(), &CacheConfig::default()).unwrap();
        bucket.mkdir().unwrap();
        assert!(bucket.exists());
        bucket.delete().unwrap();
        assert!(!bucket.exists());
        assert_unsupported_stubs(&bucket);
    }
}
