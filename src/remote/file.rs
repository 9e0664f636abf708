use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::SystemTime;

use super::{RemoteEntry, SessionBackend};
use crate::entity::ParentLink;
use crate::staged::StagedWriter;
use crate::{
    AttributeSource, CacheConfig, Capabilities, ConnectionPool, FileAttributes, FileEntity, FileOperation,
    FileRef, FileUrl, FsError, FsResult, OperationSet, SyncedAttributes, ensure_same_realm,
};

/// A file or directory behind a pooled remote session.
pub struct RemoteFile<C: SessionBackend> {
    inner: Arc<RemoteInner<C>>,
}

impl<C: SessionBackend> Clone for RemoteFile<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct RemoteInner<C: SessionBackend> {
    url: FileUrl,
    pool: Arc<ConnectionPool<C>>,
    attributes: SyncedAttributes<RemoteSource<C>>,
    parent: ParentLink,
    config: CacheConfig,
}

struct RemoteSource<C> {
    url: FileUrl,
    pool: Arc<ConnectionPool<C>>,
}

impl<C: SessionBackend> AttributeSource for RemoteSource<C> {
    fn fetch(&self) -> FsResult<FileAttributes> {
        let path = self.url.normalized_path();
        self.pool
            .with_connection(&self.url, |session| session.stat(path))
            .map(|entry| entry.attributes())
    }
}

impl<C: SessionBackend> RemoteFile<C> {
    /// Entity whose attributes are fetched on first read.
    pub fn new(url: FileUrl, pool: Arc<ConnectionPool<C>>, config: &CacheConfig) -> Self {
        let source = RemoteSource {
            url: url.clone(),
            pool: pool.clone(),
        };
        Self::build(url, pool, SyncedAttributes::new(source, config), config, None)
    }

    /// Entity built from a listing entry; no fetch until the TTL expires.
    pub fn with_entry(
        url: FileUrl,
        pool: Arc<ConnectionPool<C>>,
        entry: &RemoteEntry,
        config: &CacheConfig,
        parent: Option<FileRef>,
    ) -> Self {
        let source = RemoteSource {
            url: url.clone(),
            pool: pool.clone(),
        };
        let attributes = SyncedAttributes::with_snapshot(source, entry.attributes(), config);
        Self::build(url, pool, attributes, config, parent)
    }

    fn build(
        url: FileUrl,
        pool: Arc<ConnectionPool<C>>,
        attributes: SyncedAttributes<RemoteSource<C>>,
        config: &CacheConfig,
        parent: Option<FileRef>,
    ) -> Self {
        Self {
            inner: Arc::new(RemoteInner {
                url,
                pool,
                attributes,
                parent: ParentLink::new(parent.as_ref()),
                config: *config,
            }),
        }
    }

    fn path(&self) -> &str {
        self.inner.url.normalized_path()
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut C) -> FsResult<T>) -> FsResult<T> {
        self.inner.pool.with_connection(&self.inner.url, f)
    }
}

impl<C: SessionBackend> fmt::Debug for RemoteFile<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFile").field("url", &self.inner.url).finish()
    }
}

impl<C: SessionBackend> Capabilities for RemoteFile<C> {
    const OPERATIONS: OperationSet = OperationSet::of(&[
        FileOperation::ReadFile,
        FileOperation::WriteFile,
        FileOperation::CreateDirectory,
        FileOperation::ListChildren,
        FileOperation::Delete,
        FileOperation::Rename,
        FileOperation::ChangeDate,
    ]);
}

impl<C: SessionBackend> FileEntity for RemoteFile<C> {
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
            let url = inner.url.parent()?;
            Some(Arc::new(RemoteFile::new(url, inner.pool.clone(), &inner.config)) as FileRef)
        })
    }

    fn open_read(&self) -> FsResult<Box<dyn Read + Send>> {
        self.with_session(|session| session.open_read(self.path()))
    }

    fn open_write(&self) -> FsResult<Box<dyn Write + Send>> {
        let inner = self.inner.clone();
        Ok(Box::new(StagedWriter::new(move |data: &[u8]| {
            let path = inner.url.normalized_path();
            inner
                .pool
                .with_connection(&inner.url, |session| session.write(path, data))?;
            inner.attributes.invalidate();
            Ok(())
        })))
    }

    fn mkdir(&self) -> FsResult<()> {
        self.with_session(|session| session.mkdir(self.path()))?;
        self.inner.attributes.invalidate();
        Ok(())
    }

    fn ls(&self) -> FsResult<Vec<FileRef>> {
        if !self.is_directory() {
            return Err(FsError::NotADirectory {
                url: self.inner.url.clone(),
            });
        }

        let mut entries = Vec::new();
        self.with_session(|session| {
            loop {
                let page = session.list(self.path(), entries.len())?;
                let done = !page.remaining || page.entries.is_empty();
                entries.extend(page.entries);
                if done {
                    return Ok(());
                }
            }
        })?;

        let parent: FileRef = Arc::new(self.clone());
        Ok(entries
            .iter()
            .filter(|entry| entry.name != "." && entry.name != "..")
            .map(|entry| {
                let url = self.inner.url.child(&entry.name);
                Arc::new(RemoteFile::with_entry(
                    url,
                    self.inner.pool.clone(),
                    entry,
                    &self.inner.config,
                    Some(parent.clone()),
                )) as FileRef
            })
            .collect())
    }

    fn delete(&self) -> FsResult<()> {
        let directory = self.is_directory();
        self.with_session(|session| session.delete(self.path(), directory))?;
        self.inner.attributes.invalidate();
        Ok(())
    }

    fn rename_to(&self, dest: &dyn FileEntity) -> FsResult<()> {
        ensure_same_realm(FileOperation::Rename, self, dest)?;
        let directory = self.is_directory();
        let to = dest.url().normalized_path();
        self.with_session(|session| session.rename(self.path(), to, directory))?;
        self.inner.attributes.invalidate();
        Ok(())
    }

    fn set_last_modified(&self, modified: SystemTime) -> FsResult<()> {
        self.with_session(|session| session.set_modified(self.path(), modified))?;
        self.inner.attributes.update(|attributes| attributes.modified = modified);
        Ok(())
    }
}
