//! # Archive Adapter
//!
//! Expose a byte container (a disk image, a compressed stream) as a read-only
//! virtual directory.
//!
//! ## Overview
//!
//! | Type | Role |
//! |------|------|
//! | [`ArchiveEntry`] | One node of the parsed tree |
//! | [`ArchiveFormat`] | Parser producing the entry list of one container layout |
//! | [`ArchiveFormats`] | Extension-keyed set of formats used during resolution |
//! | [`ArchiveFile`] | Proxy over the container file adding `list-children` |
//! | [`ArchiveEntryFile`] | Child entity reading one entry's bytes |
//!
//! The entry list is parsed lazily on first listing and parsed again when the
//! container's modification date changes.
//!
//! ## Built-in Formats
//!
//! | Format | Extensions | Parser |
//! |--------|------------|--------|
//! | [`Iso`] | `iso` | ISO-9660 volume descriptors and directory records |
//! | [`Nrg`] | `nrg` | Nero footer and chunk table, ISO-9660 fallback |
//! | [`Gzip`] | `gz` | One entry holding the decompressed stream |

mod file;
mod gzip;
mod iso;
mod nrg;
mod sector;

pub use file::{ArchiveEntryFile, ArchiveFile, ArchiveHooks};
pub use gzip::Gzip;
pub use iso::Iso;
pub use nrg::Nrg;
pub use sector::{SectorGeometry, WAV_HEADER_LEN, wav_header};

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use sector::{EntryReader, Extent, SectorMap};

use crate::{FileEntity, FileOperation, FileRef, FsResult, LayerExt, RandomRead};

/// A node of a parsed container.
///
/// Regular entries map onto user-data sectors of the container. Synthesized
/// entries (audio tracks presented as WAV files) map onto a contiguous byte
/// range and get a generated header of `header_len` bytes prepended on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the container, `/`-separated, without leading separator.
    pub path: String,
    /// Whether the entry is a directory.
    pub directory: bool,
    /// Modification date.
    pub modified: SystemTime,
    /// Logical size in bytes, header included.
    pub size: u64,
    /// Length of the header synthesized in front of the payload on read.
    pub header_len: u64,
    /// First logical sector, or first byte for synthesized entries.
    pub start: u64,
    /// Sector layout of the container.
    pub geometry: SectorGeometry,
    /// Logical sector number stored at byte `shift` of the container.
    pub sector_offset: u64,
    /// Byte position of the first sector of the track holding the entry.
    pub shift: u64,
    /// Whether the entry has no 1:1 on-disk counterpart.
    pub synthesized: bool,
}

impl ArchiveEntry {
    /// Last segment of [`path`](Self::path).
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Path of the enclosing directory; empty at the top level.
    pub fn parent_path(&self) -> &str {
        self.path.rsplit_once('/').map_or("", |(parent, _)| parent)
    }

    /// Length of the bytes read from the container.
    pub fn payload_len(&self) -> u64 {
        self.size.saturating_sub(self.header_len)
    }
}

/// Parser of one container layout.
///
/// # Object Safety
///
/// Object-safe; formats are held as `Arc<dyn ArchiveFormat>`.
pub trait ArchiveFormat: Send + Sync + fmt::Debug {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Filename extensions, lowercase, without dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Parse `source` (the contents of `archive`) into its entry list.
    ///
    /// # Errors
    ///
    /// - [`FsError::StructuralFormat`](crate::FsError::StructuralFormat) when
    ///   the layout cannot be inferred safely
    fn entries(&self, archive: &dyn FileEntity, source: &mut dyn RandomRead) -> FsResult<Vec<ArchiveEntry>>;

    /// Reader of the bytes of `entry`, given `source` opened on the container.
    ///
    /// The default reads the user data of the entry's sectors, and for
    /// synthesized entries the contiguous payload behind a WAV header.
    fn open_entry(&self, entry: &ArchiveEntry, source: Box<dyn RandomRead>) -> FsResult<Box<dyn RandomRead>> {
        let (header, extent) = if entry.synthesized {
            let wav = wav_header(entry.payload_len());
            let len = usize::try_from(entry.header_len).unwrap_or(usize::MAX).min(wav.len());
            (wav[..len].to_vec(), Extent::Contiguous(entry.start))
        } else {
            let map = SectorMap {
                geometry: entry.geometry,
                sector_offset: entry.sector_offset,
                shift: entry.shift,
            };
            (Vec::new(), Extent::Sectors { first: entry.start, map })
        };
        Ok(Box::new(EntryReader::new(source, header, extent, entry.payload_len())))
    }

    /// Returns `true` if `filename` carries one of the extensions, ignoring case.
    fn matches(&self, filename: &str) -> bool {
        filename.rsplit_once('.').is_some_and(|(stem, ext)| {
            !stem.is_empty()
                && self
                    .extensions()
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
    }
}

/// The formats consulted when resolving addresses.
#[derive(Debug, Clone)]
pub struct ArchiveFormats {
    formats: Vec<Arc<dyn ArchiveFormat>>,
}

impl ArchiveFormats {
    /// No format at all.
    pub fn empty() -> Self {
        Self { formats: Vec::new() }
    }

    /// Add a format. Later registrations win on shared extensions.
    pub fn register(&mut self, format: Arc<dyn ArchiveFormat>) {
        self.formats.insert(0, format);
    }

    /// The format matching `filename`, if any.
    pub fn for_name(&self, filename: &str) -> Option<Arc<dyn ArchiveFormat>> {
        self.formats.iter().find(|f| f.matches(filename)).cloned()
    }

    /// Wrap `file` in an [`ArchiveFile`] if its name matches a format.
    ///
    /// Only non-directory entities supporting random reads are wrapped; any
    /// other entity is returned unchanged.
    pub fn wrap(&self, file: FileRef) -> FileRef {
        let Some(format) = self.for_name(file.name()) else {
            return file;
        };
        if !file.is_operation_supported(FileOperation::RandomReadFile) || file.is_directory() {
            return file;
        }
        tracing::debug!(url = %file.url(), format = format.name(), "wrapping archive");
        file.layer(ArchiveHooks::new(format))
    }

    /// Number of registered formats.
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// Returns `true` if no format is registered.
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

impl Default for ArchiveFormats {
    fn default() -> Self {
        let mut formats = Self::empty();
        formats.register(Arc::new(Iso));
        formats.register(Arc::new(Nrg));
        formats.register(Arc::new(Gzip));
        formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_path_helpers() {
        let entry = ArchiveEntry {
            path: "docs/guide/intro.txt".into(),
            directory: false,
            modified: SystemTime::UNIX_EPOCH,
            size: 100,
            header_len: 44,
            start: 0,
            geometry: SectorGeometry::Mode1,
            sector_offset: 0,
            shift: 0,
            synthesized: true,
        };
        assert_eq!(entry.name(), "intro.txt");
        assert_eq!(entry.parent_path(), "docs/guide");
        assert_eq!(entry.payload_len(), 56);
    }

    #[test]
    fn formats_match_extension_ignoring_case() {
        let formats = ArchiveFormats::default();
        assert_eq!(formats.len(), 3);
        assert_eq!(formats.for_name("disc.ISO").unwrap().name(), "iso");
        assert_eq!(formats.for_name("album.nrg").unwrap().name(), "nrg");
        assert_eq!(formats.for_name("notes.txt.GZ").unwrap().name(), "gzip");
        assert!(formats.for_name("notes.txt").is_none());
        assert!(formats.for_name(".iso").is_none());
        assert!(formats.for_name("iso").is_none());
    }

    #[test]
    fn empty_formats_match_nothing() {
        let formats = ArchiveFormats::empty();
        assert!(formats.is_empty());
        assert!(formats.for_name("disc.iso").is_none());
    }

    #[test]
    fn format_is_object_safe() {
        fn _check(_: &dyn ArchiveFormat) {}
    }
}
