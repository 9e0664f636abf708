//! # Delegation Proxy
//!
//! Wrap a [`FileEntity`] and forward every operation to it, except those a
//! set of hooks overrides.
//!
//! ## How It Works
//!
//! ```text
//! caller ──▶ ProxyFile<H> ──▶ H::hook(...) ──(default)──▶ backing entity
//! ```
//!
//! [`ProxyHooks`] has one method per overridable behavior, each defaulting to
//! a plain forward. A wrapper overrides only what it changes and declares,
//! in two constants, how that changes capabilities:
//!
//! - [`PROVIDED`](ProxyHooks::PROVIDED): operations the hooks genuinely
//!   implement themselves. Supported whatever the backing entity says.
//! - [`WITHHELD`](ProxyHooks::WITHHELD): operations the wrapper disables.
//!   Unsupported whatever the backing entity says; [`ProxyFile`] answers them
//!   with [`FsError::UnsupportedOperation`] without calling the hook.
//!
//! Every other operation is supported exactly when the backing entity
//! supports it. Wrapping therefore never fakes support the backend lacks,
//! while still letting a wrapper add support (an archive wrapper adding
//! `list-children` over a plain file).
//!
//! ## Example
//!
//! ```rust
//! use unifs::{FileOperation, OperationSet, ProxyHooks};
//!
//! /// Refuses deletion, forwards everything else.
//! #[derive(Debug)]
//! struct NoDelete;
//!
//! impl ProxyHooks for NoDelete {
//!     const WITHHELD: OperationSet = OperationSet::of(&[FileOperation::Delete]);
//! }
//! ```

use std::io::{Read, Write};
use std::time::SystemTime;

use crate::{
    FileAttributes, FileEntity, FileOperation, FileRef, FileUrl, FsError, FsResult, OperationSet,
    PermissionAccess, PermissionBits, PermissionType, Permissions, RandomRead, RandomWrite,
};

/// Overridable behavior of a [`ProxyFile`].
///
/// Every method receives the backing entity and forwards to it by default.
/// Overriding an operation method without listing the operation in
/// [`PROVIDED`](Self::PROVIDED) leaves its capability to the backing entity.
#[allow(unused_variables)]
pub trait ProxyHooks: Send + Sync + std::fmt::Debug {
    /// Operations implemented by the hooks themselves.
    const PROVIDED: OperationSet = OperationSet::EMPTY;

    /// Operations disabled by the wrapper.
    const WITHHELD: OperationSet = OperationSet::EMPTY;

    /// See [`FileEntity::attributes`].
    fn attributes(&self, backing: &FileRef) -> FsResult<FileAttributes> {
        backing.attributes()
    }

    /// See [`FileEntity::is_directory`].
    fn is_directory(&self, backing: &FileRef) -> bool {
        backing.is_directory()
    }

    /// See [`FileEntity::is_browsable`].
    fn is_browsable(&self, backing: &FileRef) -> bool {
        backing.is_browsable()
    }

    /// See [`FileEntity::size`].
    fn size(&self, backing: &FileRef) -> u64 {
        backing.size()
    }

    /// See [`FileEntity::parent`].
    fn parent(&self, backing: &FileRef) -> Option<FileRef> {
        backing.parent()
    }

    /// See [`FileEntity::open_read`].
    fn open_read(&self, backing: &FileRef) -> FsResult<Box<dyn Read + Send>> {
        backing.open_read()
    }

    /// See [`FileEntity::open_random_read`].
    fn open_random_read(&self, backing: &FileRef) -> FsResult<Box<dyn RandomRead>> {
        backing.open_random_read()
    }

    /// See [`FileEntity::open_write`].
    fn open_write(&self, backing: &FileRef) -> FsResult<Box<dyn Write + Send>> {
        backing.open_write()
    }

    /// See [`FileEntity::open_append`].
    fn open_append(&self, backing: &FileRef) -> FsResult<Box<dyn Write + Send>> {
        backing.open_append()
    }

    /// See [`FileEntity::open_random_write`].
    fn open_random_write(&self, backing: &FileRef) -> FsResult<Box<dyn RandomWrite>> {
        backing.open_random_write()
    }

    /// See [`FileEntity::mkdir`].
    fn mkdir(&self, backing: &FileRef) -> FsResult<()> {
        backing.mkdir()
    }

    /// See [`FileEntity::ls`].
    fn ls(&self, backing: &FileRef) -> FsResult<Vec<FileRef>> {
        backing.ls()
    }

    /// See [`FileEntity::delete`].
    fn delete(&self, backing: &FileRef) -> FsResult<()> {
        backing.delete()
    }

    /// See [`FileEntity::copy_remotely_to`].
    fn copy_remotely_to(&self, backing: &FileRef, dest: &dyn FileEntity) -> FsResult<()> {
        backing.copy_remotely_to(dest)
    }

    /// See [`FileEntity::rename_to`].
    fn rename_to(&self, backing: &FileRef, dest: &dyn FileEntity) -> FsResult<()> {
        backing.rename_to(dest)
    }

    /// See [`FileEntity::set_last_modified`].
    fn set_last_modified(&self, backing: &FileRef, modified: SystemTime) -> FsResult<()> {
        backing.set_last_modified(modified)
    }

    /// See [`FileEntity::change_permission`].
    fn change_permission(
        &self,
        backing: &FileRef,
        access: PermissionAccess,
        permission: PermissionType,
        enabled: bool,
    ) -> FsResult<()> {
        backing.change_permission(access, permission, enabled)
    }

    /// See [`FileEntity::replication`].
    fn replication(&self, backing: &FileRef) -> FsResult<u16> {
        backing.replication()
    }

    /// See [`FileEntity::change_replication`].
    fn change_replication(&self, backing: &FileRef, replication: u16) -> FsResult<()> {
        backing.change_replication(replication)
    }

    /// See [`FileEntity::block_size`].
    fn block_size(&self, backing: &FileRef) -> FsResult<u64> {
        backing.block_size()
    }

    /// See [`FileEntity::free_space`].
    fn free_space(&self, backing: &FileRef) -> FsResult<u64> {
        backing.free_space()
    }

    /// See [`FileEntity::total_space`].
    fn total_space(&self, backing: &FileRef) -> FsResult<u64> {
        backing.total_space()
    }
}

/// A file entity that delegates to a backing entity through [`ProxyHooks`].
#[derive(Debug)]
pub struct ProxyFile<H> {
    backing: FileRef,
    hooks: H,
}

impl<H: ProxyHooks> ProxyFile<H> {
    /// Wrap `backing`.
    pub fn new(backing: FileRef, hooks: H) -> Self {
        Self { backing, hooks }
    }

    /// The wrapped entity.
    pub fn backing(&self) -> &FileRef {
        &self.backing
    }

    /// The hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// The wrapper's own decision for `op`: `Some(true)` if provided,
    /// `Some(false)` if withheld, `None` if deferred to the backing entity.
    pub const fn own_capability(op: FileOperation) -> Option<bool> {
        if H::PROVIDED.contains(op) {
            Some(true)
        } else if H::WITHHELD.contains(op) {
            Some(false)
        } else {
            None
        }
    }

    #[inline]
    fn gate(&self, op: FileOperation) -> FsResult<()> {
        if H::WITHHELD.contains(op) && !H::PROVIDED.contains(op) {
            Err(FsError::unsupported(op))
        } else {
            Ok(())
        }
    }
}

impl<H: ProxyHooks> FileEntity for ProxyFile<H> {
    fn url(&self) -> &FileUrl {
        self.backing.url()
    }

    fn supported_operations(&self) -> OperationSet {
        self.backing
            .supported_operations()
            .difference(H::WITHHELD)
            .union(H::PROVIDED)
    }

    fn attributes(&self) -> FsResult<FileAttributes> {
        self.hooks.attributes(&self.backing)
    }

    fn parent(&self) -> Option<FileRef> {
        self.hooks.parent(&self.backing)
    }

    fn name(&self) -> &str {
        self.backing.name()
    }

    fn exists(&self) -> bool {
        self.backing.exists()
    }

    fn is_directory(&self) -> bool {
        self.hooks.is_directory(&self.backing)
    }

    fn is_browsable(&self) -> bool {
        self.hooks.is_browsable(&self.backing)
    }

    fn is_symlink(&self) -> bool {
        self.backing.is_symlink()
    }

    fn is_hidden(&self) -> bool {
        self.backing.is_hidden()
    }

    fn is_system(&self) -> bool {
        self.backing.is_system()
    }

    fn size(&self) -> u64 {
        self.hooks.size(&self.backing)
    }

    fn last_modified(&self) -> SystemTime {
        self.backing.last_modified()
    }

    fn permissions(&self) -> Permissions {
        self.backing.permissions()
    }

    fn changeable_permissions(&self) -> PermissionBits {
        if H::WITHHELD.contains(FileOperation::ChangePermission) {
            PermissionBits::EMPTY
        } else {
            self.backing.changeable_permissions()
        }
    }

    fn owner(&self) -> Option<String> {
        self.backing.owner()
    }

    fn group(&self) -> Option<String> {
        self.backing.group()
    }

    fn open_read(&self) -> FsResult<Box<dyn Read + Send>> {
        self.gate(FileOperation::ReadFile)?;
        self.hooks.open_read(&self.backing)
    }

    fn open_random_read(&self) -> FsResult<Box<dyn RandomRead>> {
        self.gate(FileOperation::RandomReadFile)?;
        self.hooks.open_random_read(&self.backing)
    }

    fn open_write(&self) -> FsResult<Box<dyn Write + Send>> {
        self.gate(FileOperation::WriteFile)?;
        self.hooks.open_write(&self.backing)
    }

    fn open_append(&self) -> FsResult<Box<dyn Write + Send>> {
        self.gate(FileOperation::AppendFile)?;
        self.hooks.open_append(&self.backing)
    }

    fn open_random_write(&self) -> FsResult<Box<dyn RandomWrite>> {
        self.gate(FileOperation::RandomWriteFile)?;
        self.hooks.open_random_write(&self.backing)
    }

    fn mkdir(&self) -> FsResult<()> {
        self.gate(FileOperation::CreateDirectory)?;
        self.hooks.mkdir(&self.backing)
    }

    fn ls(&self) -> FsResult<Vec<FileRef>> {
        self.gate(FileOperation::ListChildren)?;
        self.hooks.ls(&self.backing)
    }

    fn delete(&self) -> FsResult<()> {
        self.gate(FileOperation::Delete)?;
        self.hooks.delete(&self.backing)
    }

    fn copy_remotely_to(&self, dest: &dyn FileEntity) -> FsResult<()> {
        self.gate(FileOperation::CopyRemotely)?;
        self.hooks.copy_remotely_to(&self.backing, dest)
    }

    fn rename_to(&self, dest: &dyn FileEntity) -> FsResult<()> {
        self.gate(FileOperation::Rename)?;
        self.hooks.rename_to(&self.backing, dest)
    }

    fn set_last_modified(&self, modified: SystemTime) -> FsResult<()> {
        self.gate(FileOperation::ChangeDate)?;
        self.hooks.set_last_modified(&self.backing, modified)
    }

    fn change_permission(
        &self,
        access: PermissionAccess,
        permission: PermissionType,
        enabled: bool,
    ) -> FsResult<()> {
        self.gate(FileOperation::ChangePermission)?;
        self.hooks
            .change_permission(&self.backing, access, permission, enabled)
    }

    fn replication(&self) -> FsResult<u16> {
        self.gate(FileOperation::GetReplication)?;
        self.hooks.replication(&self.backing)
    }

    fn change_replication(&self, replication: u16) -> FsResult<()> {
        self.gate(FileOperation::ChangeReplication)?;
        self.hooks.change_replication(&self.backing, replication)
    }

    fn block_size(&self) -> FsResult<u64> {
        self.gate(FileOperation::GetBlockSize)?;
        self.hooks.block_size(&self.backing)
    }

    fn free_space(&self) -> FsResult<u64> {
        self.gate(FileOperation::GetFreeSpace)?;
        self.hooks.free_space(&self.backing)
    }

    fn total_space(&self) -> FsResult<u64> {
        self.gate(FileOperation::GetTotalSpace)?;
        self.hooks.total_space(&self.backing)
    }
}

/// Hooks that withhold every mutating operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnly;

impl ProxyHooks for ReadOnly {
    const WITHHELD: OperationSet = OperationSet::of(&[
        FileOperation::WriteFile,
        FileOperation::AppendFile,
        FileOperation::RandomWriteFile,
        FileOperation::CreateDirectory,
        FileOperation::Delete,
        FileOperation::Rename,
        FileOperation::ChangeDate,
        FileOperation::ChangePermission,
        FileOperation::ChangeReplication,
    ]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::testing::{BareEntity, assert_unsupported_stubs, invoke_operation};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backing entity supporting read and delete, counting calls.
    #[derive(Debug)]
    struct Backing {
        inner: BareEntity,
        calls: AtomicUsize,
    }

    impl Backing {
        const OPS: OperationSet =
            OperationSet::of(&[FileOperation::ReadFile, FileOperation::Delete]);

        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: BareEntity::new("/dir/file.bin"),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl FileEntity for Backing {
        fn url(&self) -> &FileUrl {
            self.inner.url()
        }
        fn supported_operations(&self) -> OperationSet {
            Self::OPS
        }
        fn attributes(&self) -> FsResult<FileAttributes> {
            self.inner.attributes()
        }
        fn parent(&self) -> Option<FileRef> {
            None
        }
        fn open_read(&self) -> FsResult<Box<dyn Read + Send>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(std::io::Cursor::new(b"abc".to_vec())))
        }
        fn delete(&self) -> FsResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Adds listing, withholds delete.
    #[derive(Debug)]
    struct Browse;

    impl ProxyHooks for Browse {
        const PROVIDED: OperationSet = OperationSet::of(&[FileOperation::ListChildren]);
        const WITHHELD: OperationSet = OperationSet::of(&[FileOperation::Delete]);

        fn is_browsable(&self, _: &FileRef) -> bool {
            true
        }

        fn ls(&self, _: &FileRef) -> FsResult<Vec<FileRef>> {
            Ok(vec![Arc::new(BareEntity::new("/dir/file.bin/inner"))])
        }
    }

    #[test]
    fn unhooked_operations_forward() {
        let backing = Backing::new();
        let proxy = ProxyFile::new(backing.clone(), Browse);
        let mut data = String::new();
        proxy.open_read().unwrap().read_to_string(&mut data).unwrap();
        assert_eq!(data, "abc");
        assert_eq!(backing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(proxy.url(), backing.url());
        assert_eq!(proxy.size(), 3);
    }

    #[test]
    fn capability_composition() {
        let backing = Backing::new();
        let proxy = ProxyFile::new(backing.clone(), Browse);

        // Provided by the wrapper although the backing entity lacks it
        assert!(proxy.is_operation_supported(FileOperation::ListChildren));
        // Withheld by the wrapper although the backing entity has it
        assert!(!proxy.is_operation_supported(FileOperation::Delete));
        // Everything else mirrors the backing entity
        for op in FileOperation::ALL {
            if ProxyFile::<Browse>::own_capability(op).is_none() {
                assert_eq!(
                    proxy.is_operation_supported(op),
                    backing.is_operation_supported(op),
                    "{op:?}"
                );
            }
        }
    }

    #[test]
    fn withheld_operation_never_reaches_backing() {
        let backing = Backing::new();
        let proxy = ProxyFile::new(backing.clone(), Browse);
        let err = proxy.delete().unwrap_err();
        assert_eq!(err.unsupported_operation(), Some(FileOperation::Delete));
        assert_eq!(backing.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invocation_matches_advertised_capabilities() {
        let proxy = ProxyFile::new(Backing::new(), Browse);
        assert_unsupported_stubs(&proxy);
        for op in proxy.supported_operations().iter() {
            let result = invoke_operation(&proxy, op);
            assert!(
                result.as_ref().err().and_then(|e| e.unsupported_operation()).is_none(),
                "{op:?} advertised but returned {result:?}"
            );
        }
    }

    #[test]
    fn provided_listing_and_browsable() {
        let proxy = ProxyFile::new(Backing::new(), Browse);
        assert!(proxy.is_browsable());
        assert!(!proxy.is_directory());
        assert_eq!(proxy.ls().unwrap().len(), 1);
    }

    #[test]
    fn read_only_hooks_withhold_mutations() {
        let backing = Backing::new();
        let proxy = ProxyFile::new(backing.clone(), ReadOnly);
        assert!(proxy.is_operation_supported(FileOperation::ReadFile));
        assert!(!proxy.is_operation_supported(FileOperation::Delete));
        assert!(proxy.delete().is_err());
        assert_eq!(backing.calls.load(Ordering::SeqCst), 0);
        assert!(proxy.changeable_permissions().is_empty());
    }

    #[test]
    fn own_capability_is_const() {
        const LIST: Option<bool> = ProxyFile::<Browse>::own_capability(FileOperation::ListChildren);
        assert_eq!(LIST, Some(true));
        assert_eq!(ProxyFile::<Browse>::own_capability(FileOperation::Delete), Some(false));
        assert_eq!(ProxyFile::<Browse>::own_capability(FileOperation::ReadFile), None);
    }
}
