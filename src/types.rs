//! Core value types shared by every entity implementation.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::SystemTime;

/// Access class of a permission bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PermissionAccess {
    /// The owning user.
    User,
    /// The owning group.
    Group,
    /// Everybody else.
    Other,
}

impl PermissionAccess {
    /// Every access class.
    pub const ALL: [PermissionAccess; 3] = [Self::User, Self::Group, Self::Other];

    #[inline]
    const fn shift(self) -> u32 {
        match self {
            PermissionAccess::User => 6,
            PermissionAccess::Group => 3,
            PermissionAccess::Other => 0,
        }
    }
}

/// Type of a permission bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PermissionType {
    /// Read permission.
    Read,
    /// Write permission.
    Write,
    /// Execute (or traverse) permission.
    Execute,
}

impl PermissionType {
    /// Every permission type.
    pub const ALL: [PermissionType; 3] = [Self::Read, Self::Write, Self::Execute];

    #[inline]
    const fn bit(self) -> u32 {
        match self {
            PermissionType::Read => 0o4,
            PermissionType::Write => 0o2,
            PermissionType::Execute => 0o1,
        }
    }
}

#[inline]
const fn bit_of(access: PermissionAccess, permission: PermissionType) -> u32 {
    permission.bit() << access.shift()
}

/// Unix-style permissions stored as a mode bitmask.
///
/// The 3 × 3 matrix of [`PermissionAccess`] × [`PermissionType`] maps onto the
/// standard `rwxrwxrwx` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Permissions(u32);

impl Permissions {
    /// No bit set.
    pub const EMPTY: Self = Self(0);

    /// Create permissions from a Unix mode (e.g., 0o755).
    #[inline]
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o777)
    }

    /// Get the raw mode value.
    #[inline]
    pub const fn mode(&self) -> u32 {
        self.0
    }

    /// Value of one bit of the matrix.
    #[inline]
    pub const fn get(&self, access: PermissionAccess, permission: PermissionType) -> bool {
        self.0 & bit_of(access, permission) != 0
    }

    /// Copy with one bit of the matrix set or cleared.
    #[inline]
    pub const fn with(self, access: PermissionAccess, permission: PermissionType, enabled: bool) -> Self {
        let bit = bit_of(access, permission);
        if enabled { Self(self.0 | bit) } else { Self(self.0 & !bit) }
    }

    /// Returns `true` if these permissions deny writing.
    #[inline]
    pub const fn readonly(&self) -> bool {
        (self.0 & 0o222) == 0
    }

    /// Default permissions for a file (0o644 = rw-r--r--).
    #[inline]
    pub const fn default_file() -> Self {
        Self(0o644)
    }

    /// Default permissions for a directory (0o755 = rwxr-xr-x).
    #[inline]
    pub const fn default_dir() -> Self {
        Self(0o755)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::default_file()
    }
}

/// Mask of the permission bits a backend can actually alter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PermissionBits(u32);

impl PermissionBits {
    /// Nothing can be changed.
    pub const EMPTY: Self = Self(0);

    /// All nine bits can be changed.
    pub const ALL: Self = Self(0o777);

    /// Only the user write bit can be changed (read-only flag backends).
    pub const USER_WRITE: Self = Self(0o200);

    /// Build a mask from raw mode bits.
    #[inline]
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o777)
    }

    /// Returns `true` if the bit is in the mask.
    #[inline]
    pub const fn contains(&self, access: PermissionAccess, permission: PermissionType) -> bool {
        self.0 & bit_of(access, permission) != 0
    }

    /// Returns `true` if no bit is in the mask.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Snapshot of an entity's metadata.
///
/// A snapshot with `exists == false` is a valid, successfully fetched state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileAttributes {
    /// Whether the entity exists.
    pub exists: bool,
    /// Whether the entity is a directory.
    pub directory: bool,
    /// Whether the entity is a symbolic link.
    pub symlink: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub modified: SystemTime,
    /// Permissions.
    pub permissions: Permissions,
    /// Owner name, if the backend reports one.
    pub owner: Option<String>,
    /// Group name, if the backend reports one.
    pub group: Option<String>,
}

impl FileAttributes {
    /// Attributes of an entity that does not exist.
    pub fn missing() -> Self {
        Self {
            exists: false,
            directory: false,
            symlink: false,
            size: 0,
            modified: SystemTime::UNIX_EPOCH,
            permissions: Permissions::EMPTY,
            owner: None,
            group: None,
        }
    }

    /// Attributes of an existing regular file.
    pub fn file(size: u64, modified: SystemTime) -> Self {
        Self {
            exists: true,
            size,
            modified,
            permissions: Permissions::default_file(),
            ..Self::missing()
        }
    }

    /// Attributes of an existing directory.
    pub fn directory(modified: SystemTime) -> Self {
        Self {
            exists: true,
            directory: true,
            modified,
            permissions: Permissions::default_dir(),
            ..Self::missing()
        }
    }
}

impl Default for FileAttributes {
    fn default() -> Self {
        Self::missing()
    }
}

/// A seekable byte reader, as returned by `open_random_read`.
///
/// Implemented for every `Read + Seek + Send` type.
pub trait RandomRead: Read + Seek + Send {
    /// Total length of the underlying content.
    fn length(&mut self) -> io::Result<u64> {
        let position = self.stream_position()?;
        let length = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(position))?;
        Ok(length)
    }
}

impl<T: Read + Seek + Send> RandomRead for T {}

/// A seekable byte writer, as returned by `open_random_write`.
pub trait RandomWrite: Write + Seek + Send {
    /// Truncate or extend the underlying content to `length` bytes.
    fn set_length(&mut self, length: u64) -> io::Result<()>;
}

impl RandomWrite for std::fs::File {
    fn set_length(&mut self, length: u64) -> io::Result<()> {
        self.set_len(length)
    }
}

impl RandomWrite for io::Cursor<Vec<u8>> {
    fn set_length(&mut self, length: u64) -> io::Result<()> {
        let length = usize::try_from(length).map_err(io::Error::other)?;
        self.get_mut().resize(length, 0);
        Ok(())
    }
}

/// Serde support for SystemTime (when serde feature is enabled).
#[cfg(feature = "serde")]
pub(crate) mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        (duration.as_secs(), duration.subsec_nanos()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (secs, nanos): (u64, u32) = Deserialize::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::new(secs, nanos))
    }
}
