//! # Object Store Protocol
//!
//! Buckets and objects of an S3-like store as a directory tree.
//!
//! ## Layout
//!
//! ```text
//! s3://key:secret@host/                 ObjectStoreRoot  (lists buckets)
//! s3://key:secret@host/bucket           BucketFile
//! s3://key:secret@host/bucket/dir/      ObjectFile       (common prefix "dir/")
//! s3://key:secret@host/bucket/dir/a.txt ObjectFile       (object "dir/a.txt")
//! ```
//!
//! Directories are key prefixes ending in `/`, listed with the `/`
//! delimiter. A directory may or may not have a marker object of its own;
//! the marker is never listed as a child of itself.
//!
//! ## Capabilities
//!
//! | Entity | Operations |
//! |--------|------------|
//! | [`ObjectStoreRoot`] | list-children |
//! | [`BucketFile`] | create-directory, list-children, delete |
//! | [`ObjectFile`] | read, random-read, write, create-directory, list-children, delete, copy-remotely, rename |
//!
//! The wire client is an [`ObjectStoreClient`] supplied by the embedding
//! application through an [`ObjectStoreConnector`].

mod bucket;
mod object;
mod root;

pub use bucket::BucketFile;
pub use object::ObjectFile;
pub use root::ObjectStoreRoot;

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::{FileRef, FileUrl, FsResult, Prefetched, ProtocolProvider, ResolveContext};

/// Key delimiter of the store.
pub const DELIMITER: &str = "/";

/// Metadata of one bucket, as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDescriptor {
    /// Bucket name.
    pub name: String,
    /// Creation date.
    pub created: SystemTime,
    /// Owner display name.
    pub owner: Option<String>,
}

/// Metadata of one object, as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Full key; directory markers end with `/`.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification date.
    pub modified: SystemTime,
    /// Owner display name.
    pub owner: Option<String>,
}

/// One delimited listing response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    /// Objects directly under the prefix (the prefix's own marker included).
    pub objects: Vec<ObjectDescriptor>,
    /// Common prefixes directly under the prefix, each ending with `/`.
    pub prefixes: Vec<String>,
}

impl ObjectListing {
    /// Returns `true` if the response names nothing at all.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.prefixes.is_empty()
    }
}

/// Wire client of an object store, bound to one set of credentials.
///
/// Missing buckets and objects are reported as
/// [`FsError::NotFound`](crate::FsError::NotFound); rejected credentials as
/// [`FsError::Authentication`](crate::FsError::Authentication).
pub trait ObjectStoreClient: Send + Sync + fmt::Debug {
    /// All buckets of the account.
    fn list_buckets(&self) -> FsResult<Vec<BucketDescriptor>>;

    /// One bucket.
    fn bucket(&self, name: &str) -> FsResult<BucketDescriptor>;

    /// Create a bucket.
    fn create_bucket(&self, name: &str) -> FsResult<()>;

    /// Delete an empty bucket.
    fn delete_bucket(&self, name: &str) -> FsResult<()>;

    /// Keys starting with `prefix`, grouped by the first `delimiter` after it.
    fn list_objects(&self, bucket: &str, prefix: &str, delimiter: &str) -> FsResult<ObjectListing>;

    /// Metadata of one object.
    fn stat_object(&self, bucket: &str, key: &str) -> FsResult<ObjectDescriptor>;

    /// Contents of one object from byte `offset` on.
    fn get_object(&self, bucket: &str, key: &str, offset: u64) -> FsResult<Box<dyn Read + Send>>;

    /// Create or replace an object.
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> FsResult<()>;

    /// Delete an object.
    fn delete_object(&self, bucket: &str, key: &str) -> FsResult<()>;

    /// Server-side copy.
    fn copy_object(&self, bucket: &str, key: &str, dest_bucket: &str, dest_key: &str) -> FsResult<()>;
}

/// Opens clients for a realm (scheme, host, port and credentials).
pub trait ObjectStoreConnector: Send + Sync {
    /// Connect with the credentials of `realm`.
    fn connect(&self, realm: &FileUrl) -> FsResult<Arc<dyn ObjectStoreClient>>;
}

impl<F> ObjectStoreConnector for F
where
    F: Fn(&FileUrl) -> FsResult<Arc<dyn ObjectStoreClient>> + Send + Sync,
{
    fn connect(&self, realm: &FileUrl) -> FsResult<Arc<dyn ObjectStoreClient>> {
        self(realm)
    }
}

/// Provider of object-store schemes.
///
/// Requires a login and a password. Keeps one client per realm.
pub struct ObjectStoreProvider {
    connector: Box<dyn ObjectStoreConnector>,
    clients: RwLock<HashMap<FileUrl, Arc<dyn ObjectStoreClient>>>,
}

impl fmt::Debug for ObjectStoreProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreProvider")
            .field("clients", &self.clients.read().len())
            .finish()
    }
}

impl ObjectStoreProvider {
    /// Provider opening clients with `connector`.
    pub fn new(connector: impl ObjectStoreConnector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// The client of `url`'s realm, connecting on first use.
    pub fn client(&self, url: &FileUrl) -> FsResult<Arc<dyn ObjectStoreClient>> {
        let realm = url.realm();
        if let Some(client) = self.clients.read().get(&realm) {
            return Ok(client.clone());
        }
        let client = self.connector.connect(&realm)?;
        tracing::debug!(realm = %realm, "object store client connected");
        Ok(self.clients.write().entry(realm).or_insert(client).clone())
    }

    /// Forget the client of `url`'s realm.
    pub fn disconnect(&self, url: &FileUrl) {
        self.clients.write().remove(&url.realm());
    }
}

impl ProtocolProvider for ObjectStoreProvider {
    fn requires_credentials(&self) -> bool {
        true
    }

    fn get_file(&self, url: &FileUrl, prefetched: Option<Prefetched>, ctx: &ResolveContext<'_>) -> FsResult<FileRef> {
        let client = self.client(url)?;
        let config = &ctx.config.cache;
        let mut segments = url.segments();

        let Some(bucket) = segments.next() else {
            return Ok(Arc::new(ObjectStoreRoot::new(url.clone(), client, config)));
        };
        let bucket = bucket.to_string();

        if segments.next().is_none() {
            let file = match prefetched.and_then(|p| p.downcast::<BucketDescriptor>().ok()) {
                Some(descriptor) => BucketFile::with_descriptor(url.clone(), client, *descriptor, config),
                None => BucketFile::open(url.clone(), client, config)?,
            };
            return Ok(Arc::new(file));
        }

        let file = match prefetched.and_then(|p| p.downcast::<ObjectDescriptor>().ok()) {
            Some(descriptor) => ObjectFile::with_descriptor(url.clone(), client, bucket, *descriptor, config, None),
            None => ObjectFile::new(url.clone(), client, bucket, config, None),
        };
        Ok(Arc::new(file))
    }
}

/// Key of the object under `bucket` named by `url`, without trailing `/`.
pub(crate) fn object_key(url: &FileUrl) -> String {
    url.segments().skip(1).collect::<Vec<_>>().join(DELIMITER)
}

/// Bucket and key named by an address of the store.
pub(crate) fn bucket_and_key(url: &FileUrl) -> Option<(String, String)> {
    let bucket = url.segments().next()?.to_string();
    let key = object_key(url);
    (!key.is_empty()).then_some((bucket, key))
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory store shared by the object-store unit tests.

    use super::*;
    use crate::FsError;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Buckets of sorted keys, counting stat and list calls.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryStore {
        pub(crate) buckets: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
        pub(crate) stats: AtomicUsize,
        pub(crate) lists: AtomicUsize,
        pub(crate) reject: std::sync::atomic::AtomicBool,
    }

    impl MemoryStore {
        pub(crate) fn with(bucket: &str, objects: &[(&str, &[u8])]) -> Arc<Self> {
            let store = Self::default();
            let mut keys = BTreeMap::new();
            for (key, data) in objects {
                keys.insert(key.to_string(), data.to_vec());
            }
            store.buckets.lock().insert(bucket.to_string(), keys);
            Arc::new(store)
        }

        fn missing(path: &str) -> FsError {
            FsError::NotFound {
                url: FileUrl::new("s3", "memory", path),
            }
        }

        fn check(&self) -> FsResult<()> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(FsError::Authentication {
                    url: FileUrl::new("s3", "memory", "/"),
                });
            }
            Ok(())
        }

        fn descriptor(key: &str, data: &[u8]) -> ObjectDescriptor {
            ObjectDescriptor {
                key: key.to_string(),
                size: data.len() as u64,
                modified: SystemTime::UNIX_EPOCH,
                owner: Some("owner".into()),
            }
        }
    }

    impl ObjectStoreClient for MemoryStore {
        fn list_buckets(&self) -> FsResult<Vec<BucketDescriptor>> {
            self.check()?;
            Ok(self
                .buckets
                .lock()
                .keys()
                .map(|name| BucketDescriptor {
                    name: name.clone(),
                    created: SystemTime::UNIX_EPOCH,
                    owner: Some("owner".into()),
                })
                .collect())
        }

        fn bucket(&self, name: &str) -> FsResult<BucketDescriptor> {
            self.check()?;
            self.stats.fetch_add(1, Ordering::SeqCst);
            if self.buckets.lock().contains_key(name) {
                Ok(BucketDescriptor {
                    name: name.to_string(),
                    created: SystemTime::UNIX_EPOCH,
                    owner: Some("owner".into()),
                })
            } else {
                Err(Self::missing(name))
            }
        }

        fn create_bucket(&self, name: &str) -> FsResult<()> {
            self.buckets.lock().entry(name.to_string()).or_default();
            Ok(())
        }

        fn delete_bucket(&self, name: &str) -> FsResult<()> {
            self.buckets.lock().remove(name).map(drop).ok_or_else(|| Self::missing(name))
        }

        fn list_objects(&self, bucket: &str, prefix: &str, delimiter: &str) -> FsResult<ObjectListing> {
            self.check()?;
            self.lists.fetch_add(1, Ordering::SeqCst);
            let buckets = self.buckets.lock();
            let keys = buckets.get(bucket).ok_or_else(|| Self::missing(bucket))?;
            let mut listing = ObjectListing::default();
            for (key, data) in keys.range(prefix.to_string()..) {
                let Some(rest) = key.strip_prefix(prefix) else {
                    break;
                };
                match rest.find(delimiter) {
                    Some(i) if !rest.is_empty() => {
                        let common = format!("{prefix}{}", &rest[..i + delimiter.len()]);
                        if !listing.prefixes.contains(&common) {
                            listing.prefixes.push(common);
                        }
                    }
                    _ => listing.objects.push(Self::descriptor(key, data)),
                }
            }
            Ok(listing)
        }

        fn stat_object(&self, bucket: &str, key: &str) -> FsResult<ObjectDescriptor> {
            self.check()?;
            self.stats.fetch_add(1, Ordering::SeqCst);
            let buckets = self.buckets.lock();
            let data = buckets
                .get(bucket)
                .and_then(|keys| keys.get(key))
                .ok_or_else(|| Self::missing(key))?;
            Ok(Self::descriptor(key, data))
        }

        fn get_object(&self, bucket: &str, key: &str, offset: u64) -> FsResult<Box<dyn Read + Send>> {
            let buckets = self.buckets.lock();
            let data = buckets
                .get(bucket)
                .and_then(|keys| keys.get(key))
                .ok_or_else(|| Self::missing(key))?;
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
            Ok(Box::new(std::io::Cursor::new(data[start..].to_vec())))
        }

        fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> FsResult<()> {
            let mut buckets = self.buckets.lock();
            let keys = buckets.get_mut(bucket).ok_or_else(|| Self::missing(bucket))?;
            keys.insert(key.to_string(), data.to_vec());
            Ok(())
        }

        fn delete_object(&self, bucket: &str, key: &str) -> FsResult<()> {
            let mut buckets = self.buckets.lock();
            let keys = buckets.get_mut(bucket).ok_or_else(|| Self::missing(bucket))?;
            keys.remove(key).map(drop).ok_or_else(|| Self::missing(key))
        }

        fn copy_object(&self, bucket: &str, key: &str, dest_bucket: &str, dest_key: &str) -> FsResult<()> {
            let data = {
                let buckets = self.buckets.lock();
                buckets
                    .get(bucket)
                    .and_then(|keys| keys.get(key))
                    .cloned()
                    .ok_or_else(|| Self::missing(key))?
            };
            self.put_object(dest_bucket, dest_key, &data)
        }
    }

    pub(crate) fn url(path: &str) -> FileUrl {
        FileUrl::new("s3", "memory", path).with_credentials(crate::Credentials::new("key", "secret"))
    }
}
