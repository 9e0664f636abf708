//! # unifs
//!
//! Entity model, capability contract and protocol registry for a **uniform
//! virtual file tree**: local disks, disk images and remote stores seen as one
//! tree of addressable entities.
//!
//! ---
//!
//! ## Quick Start
//!
//! Resolve an address through a [`ProtocolRegistry`] and work with the
//! resulting [`FileEntity`], checking capabilities up front:
//!
//! ```rust,no_run
//! use unifs::{FileEntity, FileEntityExt, FileOperation, ProtocolRegistry};
//!
//! fn dump(address: &str) -> Result<(), unifs::FsError> {
//!     let registry = ProtocolRegistry::new();
//!     let file = registry.resolve_str(address)?;
//!     if file.is_browsable() {
//!         for child in file.ls()? {
//!             println!("{} ({} bytes)", child.name(), child.size());
//!         }
//!     } else if file.is_operation_supported(FileOperation::ReadFile) {
//!         println!("{} bytes", file.read_to_vec()?.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`FileOperation`] | Closed set of operations an entity may support |
//! | [`Capabilities`] | Static per-type capability declaration |
//! | [`FileUrl`] | Entity address: scheme, host, path, credentials |
//! | [`FileEntity`] | The addressable object; unsupported operations are stubs |
//! | [`ProxyFile`] | Delegating wrapper driven by [`ProxyHooks`] |
//! | [`ArchiveFile`] | Proxy presenting a disk image or compressed stream as a directory |
//! | [`SyncedAttributes`] | TTL-cached metadata of remote entities |
//! | [`ConnectionPool`] | Per-realm exclusive reuse of remote sessions |
//! | [`ProtocolRegistry`] | Scheme to provider map resolving addresses |
//! | [`FsError`] | Error taxonomy |
//!
//! ---
//!
//! ## Data Flow
//!
//! ```text
//! FileUrl ──▶ ProtocolRegistry ──▶ ProtocolProvider::get_file ──▶ FileRef
//!                                        │                          │
//!                       ConnectionPool ◀─┤                 ArchiveFormats::wrap
//!                     SyncedAttributes ◀─┘                          │
//!                                                                   ▼
//!                                                     capability-checked calls
//! ```
//!
//! ---
//!
//! ## Protocols
//!
//! | Scheme family | Entities | Backend boundary |
//! |---------------|----------|------------------|
//! | `file` | [`LocalFile`] | `std::fs` |
//! | object stores | [`ObjectStoreRoot`], [`BucketFile`], [`ObjectFile`] | [`ObjectStoreClient`] |
//! | session-based | [`RemoteFile`] | [`SessionBackend`] |
//!
//! Only `file` is registered by default. Wire clients of remote protocols
//! are supplied by the application:
//!
//! ```rust,ignore
//! registry.register("s3", Arc::new(ObjectStoreProvider::new(connect_s3)));
//! registry.register("vsphere", Arc::new(RemoteProvider::new(open_session, &config.pool)));
//! ```
//!
//! ---
//!
//! ## Error Handling
//!
//! All operations return [`FsResult`]. Capability errors carry the operation:
//!
//! ```rust
//! use unifs::{FileOperation, FsError};
//!
//! let err = FsError::unsupported(FileOperation::ChangeDate);
//! assert_eq!(err.to_string(), "operation not supported: change date");
//! ```
//!
//! ---
//!
//! ## Thread Safety
//!
//! Entities are `Send + Sync` and take `&self`. Remote entities serialize
//! their own attribute refreshes; pooled sessions are used by one caller at a
//! time. Nothing here spawns threads, and no call can be cancelled midway.
//!
//! ---
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (resolution, pooling, archive parsing,
//! stale attribute fallbacks) and installs no subscriber.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | Serialization of [`FileAttributes`], [`Permissions`], [`VfsConfig`]; JSON helpers in [`FileEntityExtJson`] |

// Private modules
mod archive;
mod attributes;
mod config;
mod entity;
mod error;
mod ext;
mod layer;
mod local;
mod markers;
mod objstore;
mod operation;
mod pool;
mod proxy;
mod registry;
mod remote;
mod staged;
mod types;
mod url;

// Public re-exports - error types
pub use error::{FsError, FsResult};

// Public re-exports - capability model
pub use markers::{Capabilities, is_operation_supported};
pub use operation::{FileOperation, OperationSet};

// Public re-exports - core types
pub use types::{
    FileAttributes, PermissionAccess, PermissionBits, PermissionType, Permissions, RandomRead, RandomWrite,
};
pub use url::{Credentials, FileUrl, LOCAL_SCHEME, SEPARATOR};

// Public re-exports - file entity
pub use entity::{FileEntity, FileRef, ensure_changeable, ensure_same_realm};

// Public re-exports - delegation
pub use layer::{Layer, LayerExt};
pub use proxy::{ProxyFile, ProxyHooks, ReadOnly};

// Public re-exports - archives
pub use archive::{
    ArchiveEntry, ArchiveEntryFile, ArchiveFile, ArchiveFormat, ArchiveFormats, ArchiveHooks, Gzip, Iso,
    Nrg, SectorGeometry, WAV_HEADER_LEN, wav_header,
};

// Public re-exports - remote machinery
pub use attributes::{AttributeSource, RefreshPolicy, SyncedAttributes};
pub use pool::{ConnectionFactory, ConnectionHandler, ConnectionPool, PooledConnection};

// Public re-exports - resolution
pub use config::{CacheConfig, PoolConfig, VfsConfig};
pub use registry::{Prefetched, ProtocolProvider, ProtocolRegistry, ResolveContext};

// Public re-exports - protocols
pub use local::{LocalFile, LocalProvider};
pub use objstore::{
    BucketDescriptor, BucketFile, ObjectDescriptor, ObjectFile, ObjectListing, ObjectStoreClient,
    ObjectStoreConnector, ObjectStoreProvider, ObjectStoreRoot,
};
pub use remote::{EntryPage, RemoteEntry, RemoteFile, RemoteProvider, SessionBackend};

// Public re-exports - infrastructure
pub use ext::FileEntityExt;

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::FileEntityExtJson;
