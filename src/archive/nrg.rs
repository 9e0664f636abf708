//! Nero disc image parser.
//!
//! An NRG image is a raw track dump followed by a chunk table and a footer
//! pointing at it:
//!
//! ```text
//! [ track data ... ][ CUEX ][ DAOX ][ ... ][ END! ][ NER5 | offset ]
//! ```
//!
//! | Footer | Position | Chunk table offset |
//! |--------|----------|--------------------|
//! | `NERO` (v1) | last 8 bytes | 32-bit, bytes 4..8 |
//! | `NER5` (v2) | last 12 bytes | 64-bit, low word at bytes 8..12 |
//!
//! All integers are big-endian. Unknown chunks are skipped by their declared
//! length; an unknown track mode aborts parsing.

use std::io::{self, Read, Seek, SeekFrom};

use super::iso::read_tree;
use super::sector::{SectorMap, WAV_HEADER_LEN};
use super::{ArchiveEntry, ArchiveFormat, SectorGeometry};
use crate::{FileEntity, FsError, FsResult, RandomRead};

const FORMAT: &str = "nrg";

/// Upper bound on chunks walked and tracks recorded.
const MAX_CHUNKS: usize = 255;

/// `(footer position from the end, bytes read, magic, offset field position)`
const FOOTERS: [(u64, usize, &[u8; 4], usize); 2] = [(8, 8, b"NERO", 4), (12, 12, b"NER5", 8)];

/// The Nero image format (`.nrg`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Nrg;

impl ArchiveFormat for Nrg {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["nrg"]
    }

    fn entries(&self, archive: &dyn FileEntity, source: &mut dyn RandomRead) -> FsResult<Vec<ArchiveEntry>> {
        let len = source.length().map_err(read_error)?;
        let mut map = SectorMap::default();

        for (from_end, footer_len, magic, offset_at) in FOOTERS {
            let Some(position) = len.checked_sub(from_end) else {
                continue;
            };
            let mut footer = vec![0u8; footer_len];
            source.seek(SeekFrom::Start(position)).map_err(read_error)?;
            source.read_exact(&mut footer).map_err(read_error)?;
            if &footer[..4] != magic {
                continue;
            }

            let table = read_chunks(source, u64::from(dword(&footer, offset_at)))?;
            let Some(audio_only) = table.resolve(&mut map)? else {
                continue;
            };
            if audio_only {
                let entries = table.audio_entries(archive, map.geometry);
                tracing::debug!(tracks = entries.len(), "nrg image holds audio tracks only");
                return Ok(entries);
            }
        }

        tracing::debug!(?map, "reading nrg image as iso-9660");
        read_tree(source, map).map_err(|error| match error {
            FsError::StructuralFormat { details, .. } => malformed(details),
            other => other,
        })
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
        malformed("truncated chunk table")
    } else {
        FsError::Io {
            operation: "parse",
            url: crate::FileUrl::local("/"),
            source: error,
        }
    }
}

fn dword(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Track layout facts gathered from the chunk table.
#[derive(Debug, Default)]
struct TrackTable {
    tracks: Vec<Track>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Track {
    mode: u32,
    offset: u64,
    start: u64,
    end: u64,
}

impl TrackTable {
    fn track_mut(&mut self, index: usize) -> FsResult<&mut Track> {
        if index >= MAX_CHUNKS {
            return Err(malformed(format!("track index {index} out of range")));
        }
        if self.tracks.len() <= index {
            self.tracks.resize(index + 1, Track::default());
        }
        Ok(&mut self.tracks[index])
    }

    /// Apply every track's geometry to `map` in order, the last one winning.
    ///
    /// Returns `None` for an empty table, otherwise whether every track is audio.
    fn resolve(&self, map: &mut SectorMap) -> FsResult<Option<bool>> {
        if self.tracks.is_empty() {
            return Ok(None);
        }
        let mut audio_only = true;
        for track in &self.tracks {
            map.shift = track.offset;
            map.sector_offset = track.start;
            match track.mode {
                0 => {
                    map.geometry = SectorGeometry::Mode1;
                    audio_only = false;
                }
                3 => {
                    map.geometry = SectorGeometry::Mode2;
                    audio_only = false;
                }
                7 => map.geometry = SectorGeometry::Raw,
                // Audio with subchannel data: geometry unchanged
                16 => {}
                mode => return Err(malformed(format!("unhandled track mode {mode}"))),
            }
        }
        Ok(Some(audio_only))
    }

    /// One synthesized WAV entry per track.
    fn audio_entries(&self, archive: &dyn FileEntity, geometry: SectorGeometry) -> Vec<ArchiveEntry> {
        let modified = archive.last_modified();
        self.tracks
            .iter()
            .enumerate()
            .map(|(k, track)| ArchiveEntry {
                path: format!("{}.TRACK{}.wav", archive.name(), k + 1),
                directory: false,
                modified,
                size: track.end.saturating_sub(track.offset) + WAV_HEADER_LEN,
                header_len: WAV_HEADER_LEN,
                start: track.offset,
                geometry,
                sector_offset: 0,
                shift: track.offset,
                synthesized: true,
            })
            .collect()
    }
}

/// Read `len` bytes of chunk body at the current position.
fn read_body(source: &mut dyn RandomRead, len: u32) -> FsResult<Vec<u8>> {
    let mut body = Vec::new();
    source
        .take(u64::from(len))
        .read_to_end(&mut body)
        .map_err(read_error)?;
    if body.len() < len as usize {
        return Err(malformed("chunk body overruns image"));
    }
    Ok(body)
}

/// Walk the chunk table starting at `offset`.
fn read_chunks(source: &mut dyn RandomRead, mut offset: u64) -> FsResult<TrackTable> {
    let mut table = TrackTable::default();
    let mut count = 0;

    for _ in 0..MAX_CHUNKS {
        let mut header = [0u8; 8];
        source.seek(SeekFrom::Start(offset)).map_err(read_error)?;
        source.read_exact(&mut header).map_err(read_error)?;
        let id = &header[..4];
        let len = dword(&header, 4);
        offset += 8 + u64::from(len);

        match id {
            b"END!" => break,
            [b'E', b'T', b'N', version] => {
                // Track-at-once table ends the walk.
                let etn2 = *version == b'2';
                let (stride, offset_at, length_at, mode_at) = if etn2 { (32, 4, 12, 16) } else { (20, 0, 4, 8) };
                let body = read_body(source, len)?;
                for entry in body.chunks_exact(stride) {
                    let track = table.track_mut(count)?;
                    track.offset = u64::from(dword(entry, offset_at));
                    track.end = track.offset + u64::from(dword(entry, length_at));
                    track.mode = dword(entry, mode_at);
                    count += 1;
                }
                break;
            }
            [b'D', b'A', b'O', kind] => {
                let daox = *kind == b'X';
                let (stride, offset_at, end_at) = if daox { (42, 30, 38) } else { (30, 22, 26) };
                // The body repeats its own length first.
                let body = read_body(source, len)?;
                let body = body.get(4..).ok_or_else(|| malformed("DAO chunk too short"))?;
                let first = *body.get(16).ok_or_else(|| malformed("DAO chunk too short"))?;
                let mut current = usize::from(first)
                    .checked_sub(1)
                    .ok_or_else(|| malformed("DAO chunk declares track 0"))?;
                let mut z = 18;
                while z + stride <= body.len() {
                    let entry = &body[z..z + stride];
                    let track = table.track_mut(current)?;
                    track.mode = u32::from(entry[14]);
                    track.offset = u64::from(dword(entry, offset_at));
                    track.end = u64::from(dword(entry, end_at));
                    current += 1;
                    z += stride;
                }
                count = current;
            }
            b"CUEX" => {
                let body = read_body(source, len)?;
                for entry in body.chunks_exact(8) {
                    // Index 0 (pregap) and the lead-out carry no track start.
                    if entry[2] == 0 || entry[1] == 0xAA {
                        continue;
                    }
                    table.track_mut(count)?.start = u64::from(dword(entry, 4));
                    count += 1;
                }
            }
            _ => {
                tracing::trace!(chunk = %String::from_utf8_lossy(id), len, "skipping nrg chunk");
            }
        }
    }

    table.tracks.truncate(count);
    Ok(table)
}
