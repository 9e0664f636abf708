//! The `file` protocol over `std::fs`.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::{
    Capabilities, FileAttributes, FileEntity, FileOperation, FileRef, FileUrl, FsError, FsResult,
    OperationSet, PermissionAccess, PermissionBits, PermissionType, Permissions, Prefetched,
    ProtocolProvider, RandomRead, RandomWrite, ResolveContext, ensure_changeable, ensure_same_realm,
};

/// A file or directory of the local file system.
///
/// Attributes are read from the file system on every call; nothing is cached.
///
/// # Example
///
/// ```rust,no_run
/// use unifs::{FileEntity, LocalFile};
///
/// let home = LocalFile::new("/home");
/// for child in home.ls().unwrap() {
///     println!("{}", child.name());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LocalFile {
    url: FileUrl,
    path: PathBuf,
}

impl Capabilities for LocalFile {
    const OPERATIONS: OperationSet = OperationSet::of(&[
        FileOperation::ReadFile,
        FileOperation::RandomReadFile,
        FileOperation::WriteFile,
        FileOperation::AppendFile,
        FileOperation::RandomWriteFile,
        FileOperation::CreateDirectory,
        FileOperation::ListChildren,
        FileOperation::Delete,
        FileOperation::Rename,
        FileOperation::ChangeDate,
        FileOperation::ChangePermission,
    ]);
}

impl LocalFile {
    /// Entity for a native path.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            url: FileUrl::local(path.to_string_lossy()),
            path,
        }
    }

    /// Entity for a `file://` address.
    pub fn from_url(url: &FileUrl) -> Self {
        Self {
            url: url.clone(),
            path: native_path(url),
        }
    }

    /// The native path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, operation: &'static str, error: std::io::Error) -> FsError {
        FsError::io(operation, &self.url, error)
    }
}

#[cfg(windows)]
fn native_path(url: &FileUrl) -> PathBuf {
    // "/C:/dir" names "C:/dir"
    let path = url.path();
    match path.as_bytes() {
        [b'/', _, b':', ..] => PathBuf::from(&path[1..]),
        _ => PathBuf::from(path),
    }
}

#[cfg(not(windows))]
fn native_path(url: &FileUrl) -> PathBuf {
    PathBuf::from(url.path())
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> Permissions {
    use std::os::unix::fs::PermissionsExt;
    Permissions::from_mode(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn mode_of(metadata: &fs::Metadata) -> Permissions {
    let mode = match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, false) => 0o777,
        (true, true) => 0o555,
        (false, false) => 0o666,
        (false, true) => 0o444,
    };
    Permissions::from_mode(mode)
}

impl FileEntity for LocalFile {
    fn url(&self) -> &FileUrl {
        &self.url
    }

    fn supported_operations(&self) -> OperationSet {
        Self::OPERATIONS
    }

    fn attributes(&self) -> FsResult<FileAttributes> {
        let link = match fs::symlink_metadata(&self.path) {
            Ok(link) => link,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileAttributes::missing()),
            Err(e) => return Err(self.io("stat", e)),
        };
        // Dangling links report the link itself.
        let metadata = fs::metadata(&self.path).unwrap_or_else(|_| link.clone());
        Ok(FileAttributes {
            exists: true,
            directory: metadata.is_dir(),
            symlink: link.file_type().is_symlink(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            permissions: mode_of(&metadata),
            owner: None,
            group: None,
        })
    }

    fn parent(&self) -> Option<FileRef> {
        let url = self.url.parent()?;
        Some(Arc::new(Self::from_url(&url)))
    }

    fn exists(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok()
    }

    fn is_directory(&self) -> bool {
        self.path.is_dir()
    }

    fn is_symlink(&self) -> bool {
        self.path.is_symlink()
    }

    fn changeable_permissions(&self) -> PermissionBits {
        if cfg!(unix) {
            PermissionBits::ALL
        } else {
            PermissionBits::USER_WRITE
        }
    }

    fn open_read(&self) -> FsResult<Box<dyn Read + Send>> {
        let file = fs::File::open(&self.path).map_err(|e| self.io("open_read", e))?;
        Ok(Box::new(file))
    }

    fn open_random_read(&self) -> FsResult<Box<dyn RandomRead>> {
        let file = fs::File::open(&self.path).map_err(|e| self.io("open_random_read", e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self) -> FsResult<Box<dyn Write + Send>> {
        let file = fs::File::create(&self.path).map_err(|e| self.io("open_write", e))?;
        Ok(Box::new(file))
    }

    fn open_append(&self) -> FsResult<Box<dyn Write + Send>> {
        let file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io("open_append", e))?;
        Ok(Box::new(file))
    }

    fn open_random_write(&self) -> FsResult<Box<dyn RandomWrite>> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io("open_random_write", e))?;
        Ok(Box::new(file))
    }

    fn mkdir(&self) -> FsResult<()> {
        fs::create_dir(&self.path).map_err(|e| self.io("mkdir", e))
    }

    fn ls(&self) -> FsResult<Vec<FileRef>> {
        if !self.path.is_dir() {
            if !self.exists() {
                return Err(FsError::NotFound { url: self.url.clone() });
            }
            return Err(FsError::NotADirectory { url: self.url.clone() });
        }
        let entries = fs::read_dir(&self.path).map_err(|e| self.io("ls", e))?;
        let mut children: Vec<FileRef> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io("ls", e))?;
            let name = entry.file_name();
            children.push(Arc::new(Self {
                url: self.url.child(&name.to_string_lossy()),
                path: entry.path(),
            }));
        }
        Ok(children)
    }

    fn delete(&self) -> FsResult<()> {
        let link = fs::symlink_metadata(&self.path).map_err(|e| self.io("delete", e))?;
        if link.is_dir() {
            fs::remove_dir(&self.path).map_err(|e| match e.kind() {
                std::io::ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty { url: self.url.clone() },
                _ => self.io("delete", e),
            })
        } else {
            fs::remove_file(&self.path).map_err(|e| self.io("delete", e))
        }
    }

    fn rename_to(&self, dest: &dyn FileEntity) -> FsResult<()> {
        ensure_same_realm(FileOperation::Rename, self, dest)?;
        fs::rename(&self.path, native_path(dest.url())).map_err(|e| self.io("rename", e))
    }

    fn set_last_modified(&self, modified: SystemTime) -> FsResult<()> {
        // Updating times needs write access to the handle outside unix.
        let file = fs::OpenOptions::new()
            .read(true)
            .write(!cfg!(unix))
            .open(&self.path)
            .map_err(|e| self.io("set_last_modified", e))?;
        file.set_modified(modified)
            .map_err(|e| self.io("set_last_modified", e))
    }

    fn change_permission(&self, access: PermissionAccess, permission: PermissionType, enabled: bool) -> FsResult<()> {
        ensure_changeable(self, access, permission)?;
        let metadata = fs::metadata(&self.path).map_err(|e| self.io("change_permission", e))?;
        let mut native = metadata.permissions();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = mode_of(&metadata).with(access, permission, enabled).mode();
            native.set_mode((native.mode() & !0o777) | mode);
        }
        #[cfg(not(unix))]
        {
            let _ = (access, permission);
            native.set_readonly(!enabled);
        }

        fs::set_permissions(&self.path, native).map_err(|e| self.io("change_permission", e))
    }
}

/// Provider of the `file` scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

impl ProtocolProvider for LocalProvider {
    fn get_file(&self, url: &FileUrl, _: Option<Prefetched>, _: &ResolveContext<'_>) -> FsResult<FileRef> {
        Ok(Arc::new(LocalFile::from_url(url)))
    }
}
