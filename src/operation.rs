//! # File Operations
//!
//! The closed set of operations a [`FileEntity`](crate::FileEntity) may support,
//! and a compact set type used to advertise support.
//!
//! ## Overview
//!
//! Every mutating or stream-producing method of `FileEntity` corresponds to
//! exactly one [`FileOperation`]. A concrete entity type declares which of them
//! it genuinely implements through an [`OperationSet`]; every other operation
//! fails with [`FsError::UnsupportedOperation`](crate::FsError::UnsupportedOperation)
//! without touching the backend.
//!
//! | Operation | `FileEntity` method |
//! |-----------|---------------------|
//! | [`ReadFile`](FileOperation::ReadFile) | `open_read` |
//! | [`RandomReadFile`](FileOperation::RandomReadFile) | `open_random_read` |
//! | [`WriteFile`](FileOperation::WriteFile) | `open_write` |
//! | [`AppendFile`](FileOperation::AppendFile) | `open_append` |
//! | [`RandomWriteFile`](FileOperation::RandomWriteFile) | `open_random_write` |
//! | [`CreateDirectory`](FileOperation::CreateDirectory) | `mkdir` |
//! | [`ListChildren`](FileOperation::ListChildren) | `ls` |
//! | [`Delete`](FileOperation::Delete) | `delete` |
//! | [`CopyRemotely`](FileOperation::CopyRemotely) | `copy_remotely_to` |
//! | [`Rename`](FileOperation::Rename) | `rename_to` |
//! | [`ChangeDate`](FileOperation::ChangeDate) | `set_last_modified` |
//! | [`ChangePermission`](FileOperation::ChangePermission) | `change_permission` |
//! | [`GetReplication`](FileOperation::GetReplication) | `replication` |
//! | [`ChangeReplication`](FileOperation::ChangeReplication) | `change_replication` |
//! | [`GetBlockSize`](FileOperation::GetBlockSize) | `block_size` |
//! | [`GetFreeSpace`](FileOperation::GetFreeSpace) | `free_space` |
//! | [`GetTotalSpace`](FileOperation::GetTotalSpace) | `total_space` |

use std::fmt;

/// An operation a file entity may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum FileOperation {
    /// Sequential read of the file contents.
    ReadFile = 0,
    /// Seekable read of the file contents.
    RandomReadFile = 1,
    /// Sequential write, replacing the file contents.
    WriteFile = 2,
    /// Sequential write at the end of the file.
    AppendFile = 3,
    /// Seekable write.
    RandomWriteFile = 4,
    /// Create the entity as a directory.
    CreateDirectory = 5,
    /// List direct children.
    ListChildren = 6,
    /// Delete the entity.
    Delete = 7,
    /// Server-side copy to an entity of the same protocol and host.
    CopyRemotely = 8,
    /// Server-side move to an entity of the same protocol and host.
    Rename = 9,
    /// Change the modification time.
    ChangeDate = 10,
    /// Change a permission bit.
    ChangePermission = 11,
    /// Read the replication factor.
    GetReplication = 12,
    /// Change the replication factor.
    ChangeReplication = 13,
    /// Read the block size.
    GetBlockSize = 14,
    /// Read the free space of the volume holding the entity.
    GetFreeSpace = 15,
    /// Read the total space of the volume holding the entity.
    GetTotalSpace = 16,
}

impl FileOperation {
    /// Every operation, in declaration order.
    pub const ALL: [FileOperation; 17] = [
        FileOperation::ReadFile,
        FileOperation::RandomReadFile,
        FileOperation::WriteFile,
        FileOperation::AppendFile,
        FileOperation::RandomWriteFile,
        FileOperation::CreateDirectory,
        FileOperation::ListChildren,
        FileOperation::Delete,
        FileOperation::CopyRemotely,
        FileOperation::Rename,
        FileOperation::ChangeDate,
        FileOperation::ChangePermission,
        FileOperation::GetReplication,
        FileOperation::ChangeReplication,
        FileOperation::GetBlockSize,
        FileOperation::GetFreeSpace,
        FileOperation::GetTotalSpace,
    ];

    /// Name of the [`FileEntity`](crate::FileEntity) method implementing this operation.
    pub const fn method_name(self) -> &'static str {
        match self {
            FileOperation::ReadFile => "open_read",
            FileOperation::RandomReadFile => "open_random_read",
            FileOperation::WriteFile => "open_write",
            FileOperation::AppendFile => "open_append",
            FileOperation::RandomWriteFile => "open_random_write",
            FileOperation::CreateDirectory => "mkdir",
            FileOperation::ListChildren => "ls",
            FileOperation::Delete => "delete",
            FileOperation::CopyRemotely => "copy_remotely_to",
            FileOperation::Rename => "rename_to",
            FileOperation::ChangeDate => "set_last_modified",
            FileOperation::ChangePermission => "change_permission",
            FileOperation::GetReplication => "replication",
            FileOperation::ChangeReplication => "change_replication",
            FileOperation::GetBlockSize => "block_size",
            FileOperation::GetFreeSpace => "free_space",
            FileOperation::GetTotalSpace => "total_space",
        }
    }

    /// Short human-readable name, used in error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            FileOperation::ReadFile => "read",
            FileOperation::RandomReadFile => "random read",
            FileOperation::WriteFile => "write",
            FileOperation::AppendFile => "append",
            FileOperation::RandomWriteFile => "random write",
            FileOperation::CreateDirectory => "create directory",
            FileOperation::ListChildren => "list children",
            FileOperation::Delete => "delete",
            FileOperation::CopyRemotely => "remote copy",
            FileOperation::Rename => "rename",
            FileOperation::ChangeDate => "change date",
            FileOperation::ChangePermission => "change permission",
            FileOperation::GetReplication => "get replication",
            FileOperation::ChangeReplication => "change replication",
            FileOperation::GetBlockSize => "get block size",
            FileOperation::GetFreeSpace => "get free space",
            FileOperation::GetTotalSpace => "get total space",
        }
    }

    #[inline]
    const fn bit(self) -> u32 {
        1 << (self as u8)
    }
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of [`FileOperation`]s, stored as a bitmask.
///
/// All constructors are `const`, so concrete entity types can declare their
/// capabilities in a constant:
///
/// ```rust
/// use unifs::{FileOperation, OperationSet};
///
/// const READ_ONLY: OperationSet = OperationSet::of(&[
///     FileOperation::ReadFile,
///     FileOperation::RandomReadFile,
///     FileOperation::ListChildren,
/// ]);
///
/// assert!(READ_ONLY.contains(FileOperation::ReadFile));
/// assert!(!READ_ONLY.contains(FileOperation::Delete));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationSet(u32);

impl OperationSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Every operation.
    pub const ALL: Self = Self::of(&FileOperation::ALL);

    /// Build a set from a slice of operations.
    pub const fn of(ops: &[FileOperation]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < ops.len() {
            bits |= ops[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// Returns `true` if `op` is in the set.
    #[inline]
    pub const fn contains(self, op: FileOperation) -> bool {
        self.0 & op.bit() != 0
    }

    /// Set with `op` added.
    #[inline]
    pub const fn with(self, op: FileOperation) -> Self {
        Self(self.0 | op.bit())
    }

    /// Set with `op` removed.
    #[inline]
    pub const fn without(self, op: FileOperation) -> Self {
        Self(self.0 & !op.bit())
    }

    /// Union of two sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Operations in `self` that are not in `other`.
    #[inline]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Intersection of two sets.
    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Returns `true` if no operation is in the set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of operations in the set.
    #[inline]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate over the operations in the set, in declaration order.
    pub fn iter(self) -> impl Iterator<Item = FileOperation> {
        FileOperation::ALL
            .into_iter()
            .filter(move |op| self.contains(*op))
    }
}

impl fmt::Debug for OperationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<FileOperation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = FileOperation>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}
