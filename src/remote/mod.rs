//! # Session-based Remote Protocol
//!
//! File systems reached through a stateful session (a hypervisor guest
//! file manager, for instance).
//!
//! Every operation of a [`RemoteFile`] acquires the pooled session of its
//! realm, runs one or more [`SessionBackend`] calls and releases the session
//! when the guard drops. Attributes are cached per entity for the configured
//! TTL; listings hand each child the descriptor already fetched.
//!
//! | Supported | Not supported |
//! |-----------|---------------|
//! | read, write, create-directory, list-children, delete, rename, change-date | append, random read/write, change-permission, replication, block size, free/total space, copy-remotely |

mod file;

pub use file::RemoteFile;

use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

use crate::{
    ConnectionFactory, ConnectionHandler, ConnectionPool, FileAttributes, FileRef, FileUrl, FsResult,
    Permissions, PoolConfig, Prefetched, ProtocolProvider, ResolveContext,
};

/// Metadata of one remote entry, as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Name within its directory.
    pub name: String,
    /// Whether the entry is a directory.
    pub directory: bool,
    /// Whether the entry is a symbolic link.
    pub symlink: bool,
    /// Size in bytes.
    pub size: u64,
    /// Last modification date.
    pub modified: SystemTime,
    /// Permissions, if the backend reports them.
    pub permissions: Option<Permissions>,
    /// Owner name.
    pub owner: Option<String>,
    /// Group name.
    pub group: Option<String>,
}

impl RemoteEntry {
    /// The entry as an attribute snapshot.
    pub fn attributes(&self) -> FileAttributes {
        let base = if self.directory {
            FileAttributes::directory(self.modified)
        } else {
            FileAttributes::file(self.size, self.modified)
        };
        FileAttributes {
            symlink: self.symlink,
            permissions: self.permissions.unwrap_or(base.permissions),
            owner: self.owner.clone(),
            group: self.group.clone(),
            ..base
        }
    }
}

/// One page of a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPage {
    /// Entries of this page.
    pub entries: Vec<RemoteEntry>,
    /// Whether more entries follow.
    pub remaining: bool,
}

/// Calls of a remote session. Paths are absolute and `/`-separated.
///
/// Missing entries are reported as
/// [`FsError::NotFound`](crate::FsError::NotFound).
pub trait SessionBackend: ConnectionHandler {
    /// Entries of the directory at `path`, starting at index `offset`.
    fn list(&mut self, path: &str, offset: usize) -> FsResult<EntryPage>;

    /// Metadata of the entry at `path`.
    fn stat(&mut self, path: &str) -> FsResult<RemoteEntry>;

    /// Open the contents of `path`. The stream does not use the session.
    fn open_read(&mut self, path: &str) -> FsResult<Box<dyn Read + Send>>;

    /// Replace the contents of `path`.
    fn write(&mut self, path: &str, data: &[u8]) -> FsResult<()>;

    /// Create a directory.
    fn mkdir(&mut self, path: &str) -> FsResult<()>;

    /// Delete a file or an empty directory.
    fn delete(&mut self, path: &str, directory: bool) -> FsResult<()>;

    /// Move an entry.
    fn rename(&mut self, from: &str, to: &str, directory: bool) -> FsResult<()>;

    /// Change the modification date.
    fn set_modified(&mut self, path: &str, modified: SystemTime) -> FsResult<()>;
}

/// Provider of a session-based scheme. Requires credentials.
pub struct RemoteProvider<C> {
    pool: Arc<ConnectionPool<C>>,
}

impl<C: SessionBackend> RemoteProvider<C> {
    /// Provider opening sessions with `factory`.
    pub fn new(factory: impl ConnectionFactory<C> + 'static, config: &PoolConfig) -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new(factory, config)),
        }
    }

    /// The session pool shared by every entity of this provider.
    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }
}

impl<C> fmt::Debug for RemoteProvider<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProvider").field("pool", &self.pool).finish()
    }
}

impl<C: SessionBackend> ProtocolProvider for RemoteProvider<C> {
    fn requires_credentials(&self) -> bool {
        true
    }

    fn get_file(&self, url: &FileUrl, prefetched: Option<Prefetched>, ctx: &ResolveContext<'_>) -> FsResult<FileRef> {
        let config = &ctx.config.cache;
        let file = match prefetched.and_then(|p| p.downcast::<RemoteEntry>().ok()) {
            Some(entry) => RemoteFile::with_entry(url.clone(), self.pool.clone(), &entry, config, None),
            None => RemoteFile::new(url.clone(), self.pool.clone(), config),
        };
        Ok(Arc::new(file))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory session backend for the remote unit tests.

    use super::*;
    use crate::FsError;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A guest file system: path to (directory, contents, modified).
    #[derive(Debug, Default)]
    pub(crate) struct Guest {
        pub(crate) nodes: Mutex<BTreeMap<String, (bool, Vec<u8>, SystemTime)>>,
        pub(crate) stats: AtomicUsize,
        pub(crate) lists: AtomicUsize,
        pub(crate) sessions: AtomicUsize,
        pub(crate) page_size: usize,
    }

    impl Guest {
        pub(crate) fn new(page_size: usize, paths: &[(&str, Option<&[u8]>)]) -> Arc<Self> {
            let guest = Self {
                page_size,
                ..Default::default()
            };
            {
                let mut nodes = guest.nodes.lock();
                nodes.insert("/".into(), (true, Vec::new(), SystemTime::UNIX_EPOCH));
                for (path, data) in paths {
                    let node = match data {
                        Some(data) => (false, data.to_vec(), SystemTime::UNIX_EPOCH),
                        None => (true, Vec::new(), SystemTime::UNIX_EPOCH),
                    };
                    nodes.insert(path.to_string(), node);
                }
            }
            Arc::new(guest)
        }

        fn missing(path: &str) -> FsError {
            FsError::NotFound {
                url: FileUrl::new("vsphere", "guest", path),
            }
        }

        fn entry(path: &str, node: &(bool, Vec<u8>, SystemTime)) -> RemoteEntry {
            RemoteEntry {
                name: path.rsplit('/').next().unwrap_or_default().to_string(),
                directory: node.0,
                symlink: false,
                size: node.1.len() as u64,
                modified: node.2,
                permissions: None,
                owner: Some("root".into()),
                group: None,
            }
        }
    }

    /// A session over a shared guest.
    #[derive(Debug)]
    pub(crate) struct Session(pub(crate) Arc<Guest>);

    impl ConnectionHandler for Session {
        fn check_connection(&mut self) -> bool {
            true
        }
    }

    impl SessionBackend for Session {
        fn list(&mut self, path: &str, offset: usize) -> FsResult<EntryPage> {
            self.0.lists.fetch_add(1, Ordering::SeqCst);
            let nodes = self.0.nodes.lock();
            if !nodes.get(path).is_some_and(|n| n.0) {
                return Err(Guest::missing(path));
            }
            let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
            let mut all: Vec<RemoteEntry> = vec![
                Guest::entry(".", &(true, Vec::new(), SystemTime::UNIX_EPOCH)),
                Guest::entry("..", &(true, Vec::new(), SystemTime::UNIX_EPOCH)),
            ];
            all.extend(
                nodes
                    .iter()
                    .filter(|(p, _)| p.strip_prefix(&prefix).is_some_and(|rest| !rest.is_empty() && !rest.contains('/')))
                    .map(|(p, n)| Guest::entry(p, n)),
            );
            let end = (offset + self.0.page_size).min(all.len());
            Ok(EntryPage {
                entries: all[offset.min(end)..end].to_vec(),
                remaining: end < all.len(),
            })
        }

        fn stat(&mut self, path: &str) -> FsResult<RemoteEntry> {
            self.0.stats.fetch_add(1, Ordering::SeqCst);
            let nodes = self.0.nodes.lock();
            let node = nodes.get(path).ok_or_else(|| Guest::missing(path))?;
            Ok(Guest::entry(path, node))
        }

        fn open_read(&mut self, path: &str) -> FsResult<Box<dyn Read + Send>> {
            let nodes = self.0.nodes.lock();
            let node = nodes.get(path).ok_or_else(|| Guest::missing(path))?;
            Ok(Box::new(std::io::Cursor::new(node.1.clone())))
        }

        fn write(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
            self.0
                .nodes
                .lock()
                .insert(path.to_string(), (false, data.to_vec(), SystemTime::now()));
            Ok(())
        }

        fn mkdir(&mut self, path: &str) -> FsResult<()> {
            self.0
                .nodes
                .lock()
                .insert(path.to_string(), (true, Vec::new(), SystemTime::now()));
            Ok(())
        }

        fn delete(&mut self, path: &str, _: bool) -> FsResult<()> {
            self.0.nodes.lock().remove(path).map(drop).ok_or_else(|| Guest::missing(path))
        }

        fn rename(&mut self, from: &str, to: &str, _: bool) -> FsResult<()> {
            let mut nodes = self.0.nodes.lock();
            let node = nodes.remove(from).ok_or_else(|| Guest::missing(from))?;
            nodes.insert(to.to_string(), node);
            Ok(())
        }

        fn set_modified(&mut self, path: &str, modified: SystemTime) -> FsResult<()> {
            let mut nodes = self.0.nodes.lock();
            let node = nodes.get_mut(path).ok_or_else(|| Guest::missing(path))?;
            node.2 = modified;
            Ok(())
        }
    }

    /// Pool opening sessions over `guest`, counting them.
    pub(crate) fn pool(guest: &Arc<Guest>) -> Arc<ConnectionPool<Session>> {
        let guest = guest.clone();
        Arc::new(ConnectionPool::new(
            move |_: &FileUrl| -> FsResult<Session> {
                guest.sessions.fetch_add(1, Ordering::SeqCst);
                Ok(Session(guest.clone()))
            },
            &PoolConfig::default(),
        ))
    }

    pub(crate) fn url(path: &str) -> FileUrl {
        FileUrl::new("vsphere", "guest", path).with_credentials(crate::Credentials::new("admin", "pw"))
    }
}
