use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::SystemTime;

use super::{BucketFile, DELIMITER, ObjectDescriptor, ObjectStoreClient, bucket_and_key, object_key};
use crate::entity::ParentLink;
use crate::staged::StagedWriter;
use crate::{
    AttributeSource, CacheConfig, Capabilities, FileAttributes, FileEntity, FileOperation, FileRef,
    FileUrl, FsError, FsResult, OperationSet, RandomRead, SyncedAttributes, ensure_same_realm,
};

/// An object or a key prefix (directory) inside a bucket.
#[derive(Clone)]
pub struct ObjectFile {
    inner: Arc<ObjectInner>,
}

struct ObjectInner {
    url: FileUrl,
    client: Arc<dyn ObjectStoreClient>,
    bucket: String,
    key: String,
    attributes: SyncedAttributes<ObjectSource>,
    parent: ParentLink,
    config: CacheConfig,
}

struct ObjectSource {
    client: Arc<dyn ObjectStoreClient>,
    bucket: String,
    key: String,
}

impl AttributeSource for ObjectSource {
    fn fetch(&self) -> FsResult<FileAttributes> {
        match self.client.stat_object(&self.bucket, &self.key) {
            Ok(descriptor) => return Ok(object_attributes(descriptor)),
            Err(error) if error.is_not_found() => {}
            Err(error) => return Err(error),
        }
        // No object under the key itself: a directory if its prefix has content.
        let listing = self
            .client
            .list_objects(&self.bucket, &format!("{}{DELIMITER}", self.key), DELIMITER)?;
        if listing.is_empty() {
            Ok(FileAttributes::missing())
        } else {
            Ok(FileAttributes::directory(SystemTime::UNIX_EPOCH))
        }
    }
}

fn object_attributes(descriptor: ObjectDescriptor) -> FileAttributes {
    let attributes = if descriptor.key.ends_with(DELIMITER) {
        FileAttributes::directory(descriptor.modified)
    } else {
        FileAttributes::file(descriptor.size, descriptor.modified)
    };
    FileAttributes {
        owner: descriptor.owner,
        ..attributes
    }
}

impl ObjectFile {
    /// Object whose attributes are fetched on first read.
    pub fn new(
        url: FileUrl,
        client: Arc<dyn ObjectStoreClient>,
        bucket: String,
        config: &CacheConfig,
        parent: Option<FileRef>,
    ) -> Self {
        let source = ObjectSource {
            client: client.clone(),
            bucket: bucket.clone(),
            key: object_key(&url),
        };
        Self::build(url, client, bucket, SyncedAttributes::new(source, config), config, parent)
    }

    /// Object built from a listing response; no fetch until the TTL expires.
    pub fn with_descriptor(
        url: FileUrl,
        client: Arc<dyn ObjectStoreClient>,
        bucket: String,
        descriptor: ObjectDescriptor,
        config: &CacheConfig,
        parent: Option<FileRef>,
    ) -> Self {
        Self::with_snapshot(url, client, bucket, object_attributes(descriptor), config, parent)
    }

    fn with_snapshot(
        url: FileUrl,
        client: Arc<dyn ObjectStoreClient>,
        bucket: String,
        snapshot: FileAttributes,
        config: &CacheConfig,
        parent: Option<FileRef>,
    ) -> Self {
        let source = ObjectSource {
            client: client.clone(),
            bucket: bucket.clone(),
            key: object_key(&url),
        };
        let attributes = SyncedAttributes::with_snapshot(source, snapshot, config);
        Self::build(url, client, bucket, attributes, config, parent)
    }

    fn build(
        url: FileUrl,
        client: Arc<dyn ObjectStoreClient>,
        bucket: String,
        attributes: SyncedAttributes<ObjectSource>,
        config: &CacheConfig,
        parent: Option<FileRef>,
    ) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                key: attributes.source().key.clone(),
                url,
                client,
                bucket,
                attributes,
                parent: ParentLink::new(parent.as_ref()),
                config: *config,
            }),
        }
    }

    /// Bucket holding the object.
    pub fn bucket_name(&self) -> &str {
        &self.inner.bucket
    }

    /// Key of the object, without trailing delimiter.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    fn dest_of(&self, op: FileOperation, dest: &dyn FileEntity) -> FsResult<(String, String)> {
        ensure_same_realm(op, self, dest)?;
        bucket_and_key(dest.url()).ok_or_else(|| FsError::unsupported(op))
    }
}

/// Children of `prefix` in `bucket`, built from the listing response.
///
/// The marker object equal to `prefix` is skipped. An empty response for a
/// non-empty prefix means the directory does not exist.
pub(super) fn list_children(
    client: &Arc<dyn ObjectStoreClient>,
    base: &FileUrl,
    bucket: &str,
    prefix: &str,
    parent: FileRef,
    config: &CacheConfig,
) -> FsResult<Vec<FileRef>> {
    let listing = client.list_objects(bucket, prefix, DELIMITER)?;
    if listing.is_empty() && !prefix.is_empty() {
        return Err(FsError::NotFound {
            url: parent.url().clone(),
        });
    }

    let child_url = |key: &str| base.with_path(format!("/{bucket}/{}", key.trim_end_matches(DELIMITER)));
    let mut children: Vec<FileRef> = Vec::with_capacity(listing.objects.len() + listing.prefixes.len());

    for descriptor in listing.objects {
        if descriptor.key == prefix {
            continue;
        }
        children.push(Arc::new(ObjectFile::with_descriptor(
            child_url(&descriptor.key),
            client.clone(),
            bucket.to_string(),
            descriptor,
            config,
            Some(parent.clone()),
        )));
    }
    for common in listing.prefixes {
        if common == prefix {
            continue;
        }
        // Common prefixes have no date, size or owner of their own.
        children.push(Arc::new(ObjectFile::with_snapshot(
            child_url(&common),
            client.clone(),
            bucket.to_string(),
            FileAttributes::directory(SystemTime::UNIX_EPOCH),
            config,
            Some(parent.clone()),
        )));
    }
    Ok(children)
}

impl fmt::Debug for ObjectFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectFile").field("url", &self.inner.url).finish()
    }
}

impl Capabilities for ObjectFile {
    const OPERATIONS: OperationSet = OperationSet::of(&[
        FileOperation::ReadFile,
        FileOperation::RandomReadFile,
        FileOperation::WriteFile,
        FileOperation::CreateDirectory,
        FileOperation::ListChildren,
        FileOperation::Delete,
        FileOperation::CopyRemotely,
        FileOperation::Rename,
    ]);
}

impl FileEntity for ObjectFile {
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
        let inner = &self.inner;
        inner.parent.get_or_derive(|| {
            let url = inner.url.parent().unwrap_or_else(|| inner.url.realm());
            let parent: FileRef = if url.segments().count() == 1 {
                Arc::new(BucketFile::new(url, inner.client.clone(), &inner.config))
            } else {
                Arc::new(ObjectFile::new(url, inner.client.clone(), inner.bucket.clone(), &inner.config, None))
            };
            Some(parent)
        })
    }

    fn open_read(&self) -> FsResult<Box<dyn Read + Send>> {
        self.inner.client.get_object(&self.inner.bucket, &self.inner.key, 0)
    }

    fn open_random_read(&self) -> FsResult<Box<dyn RandomRead>> {
        let attributes = self.attributes()?;
        if !attributes.exists {
            return Err(FsError::NotFound {
                url: self.inner.url.clone(),
            });
        }
        Ok(Box::new(ObjectReader {
            inner: self.inner.clone(),
            length: attributes.size,
            position: 0,
            stream: None,
        }))
    }

    fn open_write(&self) -> FsResult<Box<dyn Write + Send>> {
        let inner = self.inner.clone();
        Ok(Box::new(StagedWriter::new(move |data: &[u8]| {
            inner.client.put_object(&inner.bucket, &inner.key, data)?;
            inner.attributes.invalidate();
            Ok(())
        })))
    }

    fn mkdir(&self) -> FsResult<()> {
        let marker = format!("{}{DELIMITER}", self.inner.key);
        self.inner.client.put_object(&self.inner.bucket, &marker, &[])?;
        self.inner.attributes.invalidate();
        Ok(())
    }

    fn ls(&self) -> FsResult<Vec<FileRef>> {
        if !self.is_directory() {
            return Err(FsError::NotADirectory {
                url: self.inner.url.clone(),
            });
        }
        let parent: FileRef = Arc::new(self.clone());
        let bucket_url = self.inner.url.with_path(format!("/{}", self.inner.bucket));
        list_children(
            &self.inner.client,
            &bucket_url,
            &self.inner.bucket,
            &format!("{}{DELIMITER}", self.inner.key),
            parent,
            &self.inner.config,
        )
    }

    fn delete(&self) -> FsResult<()> {
        let key = if self.is_directory() {
            format!("{}{DELIMITER}", self.inner.key)
        } else {
            self.inner.key.clone()
        };
        self.inner.client.delete_object(&self.inner.bucket, &key)?;
        self.inner.attributes.invalidate();
        Ok(())
    }

    fn copy_remotely_to(&self, dest: &dyn FileEntity) -> FsResult<()> {
        let (bucket, key) = self.dest_of(FileOperation::CopyRemotely, dest)?;
        self.inner
            .client
            .copy_object(&self.inner.bucket, &self.inner.key, &bucket, &key)
    }

    fn rename_to(&self, dest: &dyn FileEntity) -> FsResult<()> {
        let (bucket, key) = self.dest_of(FileOperation::Rename, dest)?;
        self.inner
            .client
            .copy_object(&self.inner.bucket, &self.inner.key, &bucket, &key)?;
        self.inner.client.delete_object(&self.inner.bucket, &self.inner.key)?;
        self.inner.attributes.invalidate();
        Ok(())
    }
}

/// Seekable reader over an object: a seek drops the current stream and the
/// next read reopens it at the new position.
struct ObjectReader {
    inner: Arc<ObjectInner>,
    length: u64,
    position: u64,
    stream: Option<Box<dyn Read + Send>>,
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.length || buf.is_empty() {
            return Ok(0);
        }
        if self.stream.is_none() {
            let stream = self
                .inner
                .client
                .get_object(&self.inner.bucket, &self.inner.key, self.position)
                .map_err(FsError::into_io)?;
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(0);
        };
        let n = stream.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for ObjectReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
        if target != self.position {
            self.stream = None;
            self.position = target;
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileEntityExt;
    use crate::entity::testing::assert_unsupported_stubs;
    use crate::objstore::testing::{MemoryStore, url};
    use std::sync::atomic::Ordering;

    fn object(store: &Arc<MemoryStore>, path: &str) -> ObjectFile {
        ObjectFile::new(url(path), store.clone(), "b".into(), &CacheConfig::default(), None)
    }

    fn sample() -> Arc<MemoryStore> {
        MemoryStore::with(
            "b",
            &[
                ("docs/", b""),
                ("docs/a.txt", b"alpha"),
                ("docs/deep/b.txt", b"beta"),
                ("top.txt", b"top"),
            ],
        )
    }

    #[test]
    fn children_are_prefixed_and_skip_the_marker() {
        let store = sample();
        let docs = object(&store, "/b/docs");
        assert!(docs.is_directory());

        let children = docs.ls().unwrap();
        let mut names: Vec<&str> = children.iter().map(|c| c.name()).collect();
        names.sort();
        assert_eq!(names, ["a.txt", "deep"]);
        for child in &children {
            assert!(child.url().path().starts_with("/b/docs/"));
            assert_ne!(child.url(), docs.url());
        }
    }

    #[test]
    fn listed_children_carry_their_snapshot_and_parent() {
        let store = sample();
        let docs = object(&store, "/b/docs");
        let children = docs.ls().unwrap();
        store.stats.store(0, Ordering::SeqCst);
        store.lists.store(0, Ordering::SeqCst);

        let a = children.iter().find(|c| c.name() == "a.txt").unwrap();
        assert_eq!(a.size(), 5);
        assert_eq!(a.owner().as_deref(), Some("owner"));
        let deep = children.iter().find(|c| c.name() == "deep").unwrap();
        assert!(deep.is_directory());
        assert_eq!(a.parent().unwrap().url(), docs.url());
        assert_eq!(store.stats.load(Ordering::SeqCst), 0);
        assert_eq!(store.lists.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn implied_directory_exists_without_marker() {
        let store = sample();
        let deep = object(&store, "/b/docs/deep");
        assert!(deep.is_directory());
        assert_eq!(deep.ls().unwrap().len(), 1);
    }

    #[test]
    fn empty_prefix_is_not_found() {
        let store = sample();
        let missing = ObjectFile::with_snapshot(
            url("/b/nothing"),
            store.clone(),
            "b".into(),
            FileAttributes::directory(SystemTime::UNIX_EPOCH),
            &CacheConfig::default(),
            None,
        );
        assert!(matches!(missing.ls(), Err(FsError::NotFound { .. })));
        assert!(!object(&store, "/b/nothing").exists());
    }

    #[test]
    fn ls_on_a_file_fails() {
        let store = sample();
        assert!(matches!(object(&store, "/b/top.txt").ls(), Err(FsError::NotADirectory { .. })));
    }

    #[test]
    fn read_write_and_random_read() {
        let store = sample();
        let file = object(&store, "/b/new.bin");
        assert!(!file.exists());
        file.write_bytes(b"0123456789").unwrap();
        assert_eq!(file.size(), 10);
        assert_eq!(file.read_to_vec().unwrap(), b"0123456789");

        let mut reader = file.open_random_read().unwrap();
        reader.seek(SeekFrom::End(-3)).unwrap();
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, b"789");
        reader.seek(SeekFrom::Start(2)).unwrap();
        let mut two = [0u8; 2];
        reader.read_exact(&mut two).unwrap();
        assert_eq!(&two, b"23");
        assert!(reader.seek(SeekFrom::Current(-10)).is_err());
    }

    #[test]
    fn mkdir_creates_marker() {
        let store = sample();
        let dir = object(&store, "/b/fresh");
        dir.mkdir().unwrap();
        assert!(dir.is_directory());
        assert!(dir.ls().unwrap().is_empty());
        dir.delete().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn rename_and_copy_within_store() {
        let store = sample();
        let top = object(&store, "/b/top.txt");
        let copy = object(&store, "/b/copy.txt");
        top.copy_remotely_to(&copy).unwrap();
        assert_eq!(copy.read_to_vec().unwrap(), b"top");

        let moved = object(&store, "/b/docs/moved.txt");
        top.rename_to(&moved).unwrap();
        assert!(!top.exists());
        assert_eq!(moved.read_to_vec().unwrap(), b"top");
    }

    #[test]
    fn cross_realm_rename_fails_fast() {
        let store = sample();
        let top = object(&store, "/b/top.txt");
        let elsewhere = crate::entity::testing::BareEntity::new("/b/x");
        let err = top.rename_to(&elsewhere).unwrap_err();
        assert_eq!(err.unsupported_operation(), Some(FileOperation::Rename));
        assert!(top.exists());
    }

    #[test]
    fn parent_chain_reaches_bucket() {
        let store = sample();
        let file = object(&store, "/b/docs/a.txt");
        let docs = file.parent().unwrap();
        assert_eq!(docs.url().path(), "/b/docs");
        let bucket = docs.parent().unwrap();
        assert_eq!(bucket.permissions().mode(), 0o700);
        assert!(Arc::ptr_eq(&file.parent().unwrap(), &docs));
    }

    #[test]
    fn dropped_parent_is_rebuilt_from_the_address() {
        let store = sample();
        let file = object(&store, "/b/docs/a.txt");
        let weak = Arc::downgrade(&file.parent().unwrap());
        assert!(weak.upgrade().is_none());

        let docs = file.parent().unwrap();
        assert_eq!(docs.url().path(), "/b/docs");
        assert!(docs.is_directory());
    }

    #[test]
    fn listed_children_do_not_own_their_parent() {
        let store = sample();
        let docs: FileRef = Arc::new(object(&store, "/b/docs"));
        let children = docs.ls().unwrap();
        let weak = Arc::downgrade(&docs);
        drop(docs);
        assert!(weak.upgrade().is_none());
        assert_eq!(children[0].parent().unwrap().url().path(), "/b/docs");
    }

    #[test]
    fn unsupported_operations_are_stubs() {
        let store = sample();
        assert_unsupported_stubs(&object(&store, "/b/top.txt"));
    }
}
