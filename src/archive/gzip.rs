//! Gzip streams, presented as an archive holding the decompressed file.
//!
//! The single entry is named after the archive without its `.gz` extension.
//! Its size is the ISIZE trailer, which is the uncompressed length modulo
//! 2^32. Random reads decode again from the start when seeking backwards.

use std::io::{self, Read, Seek, SeekFrom};

use flate2::read::GzDecoder;

use super::{ArchiveEntry, ArchiveFormat, SectorGeometry};
use crate::{FileEntity, FsError, FsResult, RandomRead};

const FORMAT: &str = "gzip";

const MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Fixed member header plus CRC32 and ISIZE trailer.
const MIN_LEN: u64 = 18;

/// The gzip format (`.gz`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Gzip;

impl ArchiveFormat for Gzip {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["gz"]
    }

    fn entries(&self, archive: &dyn FileEntity, source: &mut dyn RandomRead) -> FsResult<Vec<ArchiveEntry>> {
        let len = source.length().map_err(read_error)?;
        if len < MIN_LEN {
            return Err(malformed("stream too short"));
        }

        let mut magic = [0u8; 2];
        source.seek(SeekFrom::Start(0)).map_err(read_error)?;
        source.read_exact(&mut magic).map_err(read_error)?;
        if magic != MAGIC {
            return Err(malformed("missing gzip signature"));
        }

        let mut trailer = [0u8; 4];
        source.seek(SeekFrom::Start(len - 4)).map_err(read_error)?;
        source.read_exact(&mut trailer).map_err(read_error)?;

        let name = archive.name();
        Ok(vec![ArchiveEntry {
            path: name.rsplit_once('.').map_or(name, |(stem, _)| stem).to_string(),
            directory: false,
            modified: archive.last_modified(),
            size: u64::from(u32::from_le_bytes(trailer)),
            header_len: 0,
            start: 0,
            geometry: SectorGeometry::Mode1,
            sector_offset: 0,
            shift: 0,
            synthesized: true,
        }])
    }

    fn open_entry(&self, entry: &ArchiveEntry, source: Box<dyn RandomRead>) -> FsResult<Box<dyn RandomRead>> {
        Ok(Box::new(GzipReader::new(source, entry.size)))
    }
}

fn malformed(details: impl Into<String>) -> FsError {
    FsError::StructuralFormat {
        format: FORMAT,
        details: details.into(),
    }
}

fn read_error(error: io::Error) -> FsError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        malformed("truncated stream")
    } else {
        FsError::Io {
            operation: "parse",
            url: crate::FileUrl::local("/"),
            source: error,
        }
    }
}

/// Seekable reader over the decompressed stream.
struct GzipReader {
    decoder: Option<GzDecoder<Box<dyn RandomRead>>>,
    /// Decompressed bytes consumed from `decoder`.
    decoded: u64,
    pos: u64,
    len: u64,
}

impl GzipReader {
    fn new(source: Box<dyn RandomRead>, len: u64) -> Self {
        Self {
            decoder: Some(GzDecoder::new(source)),
            decoded: 0,
            pos: 0,
            len,
        }
    }

    /// The decoder, advanced to `pos`.
    fn decoder_at_pos(&mut self) -> io::Result<&mut GzDecoder<Box<dyn RandomRead>>> {
        let decoder = match self.decoder.take() {
            Some(decoder) if self.decoded <= self.pos => decoder,
            Some(decoder) => {
                let mut source = decoder.into_inner();
                source.seek(SeekFrom::Start(0))?;
                self.decoded = 0;
                GzDecoder::new(source)
            }
            None => return Err(io::Error::other("gzip source lost after a failed rewind")),
        };
        let decoder = self.decoder.insert(decoder);
        let skip = self.pos - self.decoded;
        if skip > 0 {
            self.decoded += io::copy(&mut decoder.by_ref().take(skip), &mut io::sink())?;
        }
        Ok(decoder)
    }
}

impl Read for GzipReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.decoder_at_pos()?.read(buf)?;
        self.decoded += n as u64;
        self.pos = self.decoded;
        Ok(n)
    }
}

impl Seek for GzipReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        self.pos = target.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start of entry"))?;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::testing::BareEntity;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn payload() -> Vec<u8> {
        (0..100_000u32).map(|i| (i % 251) as u8).collect()
    }

    fn parse(path: &str, data: Vec<u8>) -> FsResult<Vec<ArchiveEntry>> {
        Gzip.entries(&BareEntity::new(path), &mut Cursor::new(data))
    }

    #[test]
    fn single_entry_named_after_stem() {
        let entries = parse("/logs/app.log.gz", compress(&payload())).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "app.log");
        assert_eq!(entries[0].size, 100_000);
        assert!(entries[0].synthesized);
        assert!(!entries[0].directory);
    }

    #[test]
    fn entry_reads_decompressed_bytes() {
        let compressed = compress(&payload());
        let entry = parse("/a.bin.gz", compressed.clone()).unwrap().remove(0);
        let mut reader = Gzip.open_entry(&entry, Box::new(Cursor::new(compressed))).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload());
    }

    #[test]
    fn random_reads_seek_both_ways() {
        let compressed = compress(&payload());
        let entry = parse("/a.bin.gz", compressed.clone()).unwrap().remove(0);
        let mut reader = Gzip.open_entry(&entry, Box::new(Cursor::new(compressed))).unwrap();
        let expected = payload();

        let mut buf = [0u8; 16];
        reader.seek(SeekFrom::Start(70_000)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, expected[70_000..70_016]);

        reader.seek(SeekFrom::Start(10)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, expected[10..26]);

        reader.seek(SeekFrom::End(-16)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, expected[expected.len() - 16..]);

        assert_eq!(reader.length().unwrap(), 100_000);
        assert!(reader.seek(SeekFrom::Current(-1_000_000)).is_err());
    }

    #[test]
    fn plain_bytes_are_structural() {
        let err = parse("/fake.gz", vec![b'x'; 64]).unwrap_err();
        assert!(matches!(err, FsError::StructuralFormat { format: "gzip", .. }));
    }

    #[test]
    fn short_stream_is_structural() {
        let err = parse("/tiny.gz", vec![0x1f, 0x8b, 8]).unwrap_err();
        assert!(matches!(err, FsError::StructuralFormat { format: "gzip", .. }));
    }
}
