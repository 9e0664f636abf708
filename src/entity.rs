//! The file entity: an addressable, file-like object of the virtual tree.

use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::{
    FileAttributes, FileOperation, FileUrl, FsError, FsResult, OperationSet, PermissionAccess,
    PermissionBits, PermissionType, Permissions, RandomRead, RandomWrite,
};

/// Shared handle to a file entity.
pub type FileRef = Arc<dyn FileEntity>;

/// An addressable object of the virtual tree: a local file, a bucket, an
/// archive member, a directory inside a virtual machine...
///
/// # Capabilities
///
/// Each operation method corresponds to one [`FileOperation`]. The default
/// implementations are stubs that fail with
/// [`FsError::UnsupportedOperation`] without performing any I/O. A concrete
/// type overrides the methods it genuinely implements and reports exactly those
/// operations from [`supported_operations`](Self::supported_operations), so
/// callers can filter actions up front:
///
/// ```rust
/// use unifs::{FileEntity, FileOperation};
///
/// fn can_rename(file: &dyn FileEntity) -> bool {
///     file.is_operation_supported(FileOperation::Rename)
/// }
/// ```
///
/// The advertised set never changes over the lifetime of an instance.
///
/// # Attributes
///
/// [`attributes`](Self::attributes) may block on I/O for remote-backed
/// entities (a stale cached snapshot is refreshed first). The convenience
/// accessors (`exists`, `size`, ...) derive from it and fall back to
/// [`FileAttributes::missing`] on error; implementations with cheaper sources
/// override them.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. Methods take `&self`.
///
/// # Object Safety
///
/// This trait is object-safe and is normally used as [`FileRef`].
pub trait FileEntity: Send + Sync + fmt::Debug {
    /// Address of this entity.
    fn url(&self) -> &FileUrl;

    /// Operations this entity genuinely implements.
    fn supported_operations(&self) -> OperationSet;

    /// Current metadata snapshot, refreshing it first if it is stale.
    ///
    /// A missing entity is reported as `Ok` with `exists == false`.
    fn attributes(&self) -> FsResult<FileAttributes>;

    /// Parent entity; `None` for a root address.
    ///
    /// Idempotent. The returned parent is not authoritative and is not kept
    /// alive by the child beyond what the implementation memoises.
    fn parent(&self) -> Option<FileRef>;

    /// Returns `true` if `op` is in [`supported_operations`](Self::supported_operations).
    fn is_operation_supported(&self, op: FileOperation) -> bool {
        self.supported_operations().contains(op)
    }

    /// Last path segment of the address (empty for a root).
    fn name(&self) -> &str {
        self.url().filename().unwrap_or("")
    }

    /// Whether the entity exists.
    fn exists(&self) -> bool {
        self.attributes().map(|a| a.exists).unwrap_or(false)
    }

    /// Whether the entity is a directory.
    fn is_directory(&self) -> bool {
        self.attributes().map(|a| a.directory).unwrap_or(false)
    }

    /// Whether [`ls`](Self::ls) can be called: directories, and files
    /// presented as a virtual directory (archives).
    fn is_browsable(&self) -> bool {
        self.is_directory()
    }

    /// Whether the entity is a symbolic link.
    fn is_symlink(&self) -> bool {
        self.attributes().map(|a| a.symlink).unwrap_or(false)
    }

    /// Whether the entity is hidden (dot-prefixed by default).
    fn is_hidden(&self) -> bool {
        self.name().starts_with('.')
    }

    /// Whether the entity is a system file.
    fn is_system(&self) -> bool {
        false
    }

    /// Size in bytes.
    fn size(&self) -> u64 {
        self.attributes().map(|a| a.size).unwrap_or(0)
    }

    /// Last modification time.
    fn last_modified(&self) -> SystemTime {
        self.attributes()
            .map(|a| a.modified)
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }

    /// Permissions.
    fn permissions(&self) -> Permissions {
        self.attributes()
            .map(|a| a.permissions)
            .unwrap_or(Permissions::EMPTY)
    }

    /// Permission bits [`change_permission`](Self::change_permission) can alter.
    fn changeable_permissions(&self) -> PermissionBits {
        PermissionBits::EMPTY
    }

    /// Owner name, if known.
    fn owner(&self) -> Option<String> {
        self.attributes().ok().and_then(|a| a.owner)
    }

    /// Group name, if known.
    fn group(&self) -> Option<String> {
        self.attributes().ok().and_then(|a| a.group)
    }

    // ------------------------------------------------------------------
    // Operations. Defaults are unsupported stubs.
    // ------------------------------------------------------------------

    /// Open the contents for sequential reading.
    fn open_read(&self) -> FsResult<Box<dyn Read + Send>> {
        Err(FsError::unsupported(FileOperation::ReadFile))
    }

    /// Open the contents for seekable reading.
    fn open_random_read(&self) -> FsResult<Box<dyn RandomRead>> {
        Err(FsError::unsupported(FileOperation::RandomReadFile))
    }

    /// Open the entity for writing, replacing its contents.
    fn open_write(&self) -> FsResult<Box<dyn Write + Send>> {
        Err(FsError::unsupported(FileOperation::WriteFile))
    }

    /// Open the entity for writing at its end.
    fn open_append(&self) -> FsResult<Box<dyn Write + Send>> {
        Err(FsError::unsupported(FileOperation::AppendFile))
    }

    /// Open the entity for seekable writing.
    fn open_random_write(&self) -> FsResult<Box<dyn RandomWrite>> {
        Err(FsError::unsupported(FileOperation::RandomWriteFile))
    }

    /// Create the entity as a directory.
    fn mkdir(&self) -> FsResult<()> {
        Err(FsError::unsupported(FileOperation::CreateDirectory))
    }

    /// List direct children, newly materialized, in no guaranteed order.
    ///
    /// # Errors
    ///
    /// - [`FsError::NotADirectory`] if the entity is not browsable
    fn ls(&self) -> FsResult<Vec<FileRef>> {
        Err(FsError::unsupported(FileOperation::ListChildren))
    }

    /// Delete the entity. Behavior on non-empty directories is backend-defined.
    fn delete(&self) -> FsResult<()> {
        Err(FsError::unsupported(FileOperation::Delete))
    }

    /// Server-side copy to `dest`, which must share this entity's protocol and host.
    fn copy_remotely_to(&self, dest: &dyn FileEntity) -> FsResult<()> {
        let _ = dest;
        Err(FsError::unsupported(FileOperation::CopyRemotely))
    }

    /// Server-side move to `dest`, which must share this entity's protocol and host.
    fn rename_to(&self, dest: &dyn FileEntity) -> FsResult<()> {
        let _ = dest;
        Err(FsError::unsupported(FileOperation::Rename))
    }

    /// Change the modification time.
    fn set_last_modified(&self, modified: SystemTime) -> FsResult<()> {
        let _ = modified;
        Err(FsError::unsupported(FileOperation::ChangeDate))
    }

    /// Set or clear one permission bit.
    ///
    /// # Errors
    ///
    /// - [`FsError::PermissionNotChangeable`] for a bit outside
    ///   [`changeable_permissions`](Self::changeable_permissions)
    fn change_permission(
        &self,
        access: PermissionAccess,
        permission: PermissionType,
        enabled: bool,
    ) -> FsResult<()> {
        let _ = (access, permission, enabled);
        Err(FsError::unsupported(FileOperation::ChangePermission))
    }

    /// Replication factor.
    fn replication(&self) -> FsResult<u16> {
        Err(FsError::unsupported(FileOperation::GetReplication))
    }

    /// Change the replication factor.
    fn change_replication(&self, replication: u16) -> FsResult<()> {
        let _ = replication;
        Err(FsError::unsupported(FileOperation::ChangeReplication))
    }

    /// Block size in bytes.
    fn block_size(&self) -> FsResult<u64> {
        Err(FsError::unsupported(FileOperation::GetBlockSize))
    }

    /// Free space of the volume holding this entity, in bytes.
    fn free_space(&self) -> FsResult<u64> {
        Err(FsError::unsupported(FileOperation::GetFreeSpace))
    }

    /// Total space of the volume holding this entity, in bytes.
    fn total_space(&self) -> FsResult<u64> {
        Err(FsError::unsupported(FileOperation::GetTotalSpace))
    }
}

/// Fail fast with [`FsError::UnsupportedOperation`] unless `dest` shares
/// `src`'s scheme, host, port and credentials.
///
/// Used by `rename_to` / `copy_remotely_to` implementations: cross-protocol
/// transfer belongs to a byte-copy routine above this layer.
pub fn ensure_same_realm(
    op: FileOperation,
    src: &dyn FileEntity,
    dest: &dyn FileEntity,
) -> FsResult<()> {
    if src.url().same_realm(dest.url()) {
        Ok(())
    } else {
        Err(FsError::unsupported(op))
    }
}

/// Fail with [`FsError::PermissionNotChangeable`] unless the bit is in the
/// entity's changeable mask.
pub fn ensure_changeable(
    entity: &dyn FileEntity,
    access: PermissionAccess,
    permission: PermissionType,
) -> FsResult<()> {
    if entity.changeable_permissions().contains(access, permission) {
        Ok(())
    } else {
        Err(FsError::PermissionNotChangeable { access, permission })
    }
}

/// Weak memo of an entity's parent.
///
/// The parent stays shared while anyone else holds it. Once every strong
/// handle is gone it is derived again on the next lookup, so a child never
/// keeps its ancestors alive.
pub(crate) struct ParentLink {
    cached: Mutex<Option<Weak<dyn FileEntity>>>,
}

impl ParentLink {
    /// Link remembering `parent`, if known.
    pub(crate) fn new(parent: Option<&FileRef>) -> Self {
        Self {
            cached: Mutex::new(parent.map(Arc::downgrade)),
        }
    }

    /// The remembered parent, or the one `derive` builds if it was dropped.
    pub(crate) fn get_or_derive(&self, derive: impl FnOnce() -> Option<FileRef>) -> Option<FileRef> {
        let mut cached = self.cached.lock();
        if let Some(parent) = cached.as_ref().and_then(Weak::upgrade) {
            return Some(parent);
        }
        let parent = derive()?;
        *cached = Some(Arc::downgrade(&parent));
        Some(parent)
    }
}
