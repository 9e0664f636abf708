use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use super::{BucketFile, ObjectStoreClient};
use crate::{
    CacheConfig, Capabilities, FileAttributes, FileEntity, FileOperation, FileRef, FileUrl, FsResult,
    OperationSet,
};

/// Root of an object store: the list of buckets of the account.
pub struct ObjectStoreRoot {
    url: FileUrl,
    client: Arc<dyn ObjectStoreClient>,
    config: CacheConfig,
}

impl ObjectStoreRoot {
    /// Root entity of the store reached through `client`.
    pub fn new(url: FileUrl, client: Arc<dyn ObjectStoreClient>, config: &CacheConfig) -> Self {
        Self {
            url,
            client,
            config: *config,
        }
    }
}

impl fmt::Debug for ObjectStoreRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreRoot").field("url", &self.url).finish()
    }
}

impl Capabilities for ObjectStoreRoot {
    const OPERATIONS: OperationSet = OperationSet::of(&[FileOperation::ListChildren]);
}

impl FileEntity for ObjectStoreRoot {
    fn url(&self) -> &FileUrl {
        &self.url
    }

    fn supported_operations(&self) -> OperationSet {
        Self::OPERATIONS
    }

    fn attributes(&self) -> FsResult<FileAttributes> {
        Ok(FileAttributes::directory(SystemTime::UNIX_EPOCH))
    }

    fn parent(&self) -> Option<FileRef> {
        None
    }

    fn exists(&self) -> bool {
        true
    }

    fn is_directory(&self) -> bool {
        true
    }

    fn ls(&self) -> FsResult<Vec<FileRef>> {
        let buckets = self.client.list_buckets()?;
        Ok(buckets
            .into_iter()
            .map(|descriptor| {
                let url = self.url.with_path(format!("/{}", descriptor.name));
                Arc::new(BucketFile::with_descriptor(url, self.client.clone(), descriptor, &self.config)) as FileRef
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::testing::assert_unsupported_stubs;
    use crate::objstore::testing::{MemoryStore, url};

    #[test]
    fn lists_buckets() {
        let store = MemoryStore::with("photos", &[]);
        store.buckets.lock().insert("music".into(), Default::default());
        let root = ObjectStoreRoot::new(url("/"), store, &CacheConfig::default());

        let mut names: Vec<String> = root.ls().unwrap().iter().map(|b| b.name().to_string()).collect();
        names.sort();
        assert_eq!(names, ["music", "photos"]);
        assert!(root.parent().is_none());
        assert_unsupported_stubs(&root);
    }
}
