//! Archive files and their entries as file entities.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use super::{ArchiveEntry, ArchiveFormat, SectorGeometry};
use crate::{
    Capabilities, FileAttributes, FileEntity, FileOperation, FileRef, FileUrl, FsError, FsResult,
    OperationSet, Permissions, ProxyFile, ProxyHooks, RandomRead,
};

/// A container file presented as a browsable directory.
///
/// Every capability of the container file is kept; `list-children` is added.
pub type ArchiveFile = ProxyFile<ArchiveHooks>;

impl ArchiveFile {
    /// Present `backing` as an archive of the given format.
    pub fn open(backing: FileRef, format: Arc<dyn ArchiveFormat>) -> Self {
        ProxyFile::new(backing, ArchiveHooks::new(format))
    }

    /// The parsed entry list, parsing the container if needed.
    pub fn entries(&self) -> FsResult<Arc<[ArchiveEntry]>> {
        self.hooks().archive(self.backing()).entries()
    }
}

/// Hooks turning a container file into an [`ArchiveFile`].
///
/// The parsed entry list is shared with every child the archive hands out.
pub struct ArchiveHooks {
    format: Arc<dyn ArchiveFormat>,
    parsed: Arc<Mutex<Option<Parsed>>>,
}

impl ArchiveHooks {
    /// Hooks for the given format. Nothing is parsed until first listed.
    pub fn new(format: Arc<dyn ArchiveFormat>) -> Self {
        Self {
            format,
            parsed: Arc::new(Mutex::new(None)),
        }
    }

    fn archive(&self, backing: &FileRef) -> Arc<Archive> {
        Arc::new(Archive {
            backing: backing.clone(),
            format: self.format.clone(),
            parsed: self.parsed.clone(),
        })
    }
}

impl fmt::Debug for ArchiveHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveHooks")
            .field("format", &self.format.name())
            .field("parsed", &self.parsed.lock().is_some())
            .finish()
    }
}

impl ProxyHooks for ArchiveHooks {
    const PROVIDED: OperationSet = OperationSet::of(&[FileOperation::ListChildren]);

    fn is_browsable(&self, _backing: &FileRef) -> bool {
        true
    }

    fn ls(&self, backing: &FileRef) -> FsResult<Vec<FileRef>> {
        self.archive(backing).children("")
    }
}

struct Parsed {
    modified: SystemTime,
    entries: Arc<[ArchiveEntry]>,
}

/// Container state shared by an archive file and its entries.
#[derive(Debug)]
pub(crate) struct Archive {
    backing: FileRef,
    format: Arc<dyn ArchiveFormat>,
    parsed: Arc<Mutex<Option<Parsed>>>,
}

impl fmt::Debug for Parsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parsed").field("entries", &self.entries.len()).finish()
    }
}

impl Archive {
    /// Entry list, parsed again when the container's date changed.
    fn entries(&self) -> FsResult<Arc<[ArchiveEntry]>> {
        let modified = self.backing.last_modified();
        let mut parsed = self.parsed.lock();
        if let Some(current) = parsed.as_ref() {
            if current.modified == modified {
                return Ok(current.entries.clone());
            }
        }

        let mut source = self.backing.open_random_read()?;
        let entries: Arc<[ArchiveEntry]> = self
            .format
            .entries(self.backing.as_ref(), &mut *source)
            .map_err(|error| match error {
                FsError::Io { operation, source, .. } => FsError::Io {
                    operation,
                    url: self.backing.url().clone(),
                    source,
                },
                other => other,
            })?
            .into();
        tracing::debug!(
            url = %self.backing.url(),
            format = self.format.name(),
            entries = entries.len(),
            "parsed archive"
        );
        *parsed = Some(Parsed {
            modified,
            entries: entries.clone(),
        });
        Ok(entries)
    }

    /// Entities for the direct children of `dir` ("" for the top level).
    ///
    /// Directories implied by deeper paths but absent from the list are
    /// synthesized.
    fn children(self: &Arc<Self>, dir: &str) -> FsResult<Vec<FileRef>> {
        let entries = self.entries()?;
        let mut explicit = BTreeSet::new();
        let mut implied = BTreeSet::new();
        let mut children: Vec<FileRef> = Vec::new();

        for entry in entries.iter() {
            let Some(rest) = relative_to(&entry.path, dir) else {
                continue;
            };
            match rest.split_once('/') {
                None => {
                    explicit.insert(rest.to_string());
                    children.push(Arc::new(self.entry_file(entry.clone())));
                }
                Some((head, _)) => {
                    implied.insert(head.to_string());
                }
            }
        }

        for name in implied.difference(&explicit) {
            let path = join(dir, name);
            children.push(Arc::new(self.entry_file(implied_directory(path, self.backing.last_modified()))));
        }
        Ok(children)
    }

    fn entry_file(self: &Arc<Self>, entry: ArchiveEntry) -> ArchiveEntryFile {
        ArchiveEntryFile {
            url: self.backing.url().child(&entry.path),
            entry,
            archive: self.clone(),
        }
    }

    /// The archive file itself, as handed to top-level entries as parent.
    fn as_file(&self) -> FileRef {
        Arc::new(ProxyFile::new(
            self.backing.clone(),
            ArchiveHooks {
                format: self.format.clone(),
                parsed: self.parsed.clone(),
            },
        ))
    }
}

fn relative_to<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    if dir.is_empty() {
        return Some(path);
    }
    path.strip_prefix(dir)?.strip_prefix('/')
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn implied_directory(path: String, modified: SystemTime) -> ArchiveEntry {
    ArchiveEntry {
        path,
        directory: true,
        modified,
        size: 0,
        header_len: 0,
        start: 0,
        geometry: SectorGeometry::Mode1,
        sector_offset: 0,
        shift: 0,
        synthesized: true,
    }
}

/// One entry of an archive.
///
/// Read-only: files can be read sequentially or randomly, directories listed.
#[derive(Debug)]
pub struct ArchiveEntryFile {
    url: FileUrl,
    entry: ArchiveEntry,
    archive: Arc<Archive>,
}

impl ArchiveEntryFile {
    /// The parsed entry.
    pub fn entry(&self) -> &ArchiveEntry {
        &self.entry
    }

    fn open(&self) -> FsResult<Box<dyn RandomRead>> {
        if self.entry.directory {
            return Err(FsError::Io {
                operation: "read",
                url: self.url.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "is a directory"),
            });
        }
        let source = self.archive.backing.open_random_read()?;
        self.archive.format.open_entry(&self.entry, source)
    }
}

impl Capabilities for ArchiveEntryFile {
    const OPERATIONS: OperationSet = OperationSet::of(&[
        FileOperation::ReadFile,
        FileOperation::RandomReadFile,
        FileOperation::ListChildren,
    ]);
}

impl FileEntity for ArchiveEntryFile {
    fn url(&self) -> &FileUrl {
        &self.url
    }

    fn supported_operations(&self) -> OperationSet {
        Self::OPERATIONS
    }

    fn attributes(&self) -> FsResult<FileAttributes> {
        let permissions = if self.entry.directory {
            Permissions::from_mode(0o555)
        } else {
            Permissions::from_mode(0o444)
        };
        Ok(FileAttributes {
            exists: true,
            directory: self.entry.directory,
            size: self.entry.size,
            modified: self.entry.modified,
            permissions,
            ..FileAttributes::missing()
        })
    }

    fn parent(&self) -> Option<FileRef> {
        let parent_path = self.entry.parent_path();
        if parent_path.is_empty() {
            return Some(self.archive.as_file());
        }
        let entry = self
            .archive
            .entries()
            .ok()
            .and_then(|entries| entries.iter().find(|e| e.path == parent_path).cloned())
            .unwrap_or_else(|| implied_directory(parent_path.to_string(), self.entry.modified));
        Some(Arc::new(self.archive.entry_file(entry)))
    }

    fn name(&self) -> &str {
        self.entry.name()
    }

    fn exists(&self) -> bool {
        true
    }

    fn is_directory(&self) -> bool {
        self.entry.directory
    }

    fn size(&self) -> u64 {
        self.entry.size
    }

    fn last_modified(&self) -> SystemTime {
        self.entry.modified
    }

    fn open_read(&self) -> FsResult<Box<dyn Read + Send>> {
        Ok(Box::new(self.open()?))
    }

    fn open_random_read(&self) -> FsResult<Box<dyn RandomRead>> {
        self.open()
    }

    fn ls(&self) -> FsResult<Vec<FileRef>> {
        if !self.entry.directory {
            return Err(FsError::NotADirectory { url: self.url.clone() });
        }
        self.archive.children(&self.entry.path)
    }
}
