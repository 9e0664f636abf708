//! ISO-9660 parser: volume descriptors and directory records.
//!
//! Joliet names are preferred when a supplementary descriptor carries the
//! Joliet escape sequence. Raw and mode-2 images are recognized by probing
//! the `CD001` identifier under each sector geometry.

use std::collections::HashSet;
use std::io;
use std::time::{Duration, SystemTime};

use super::sector::{SectorMap, USER_DATA, read_sectors};
use super::{ArchiveEntry, ArchiveFormat, SectorGeometry};
use crate::{FileEntity, FsError, FsResult, RandomRead};

const FORMAT: &str = "iso";

/// First sector of the volume descriptor set.
const DESCRIPTOR_START: u64 = 16;
/// Upper bound on descriptors scanned before the terminator.
const MAX_DESCRIPTORS: u64 = 32;
/// Upper bound on directory nesting.
const MAX_DEPTH: usize = 64;

const STANDARD_ID: &[u8; 5] = b"CD001";
const JOLIET_ESCAPES: [&[u8; 3]; 3] = [b"%/@", b"%/C", b"%/E"];

/// The ISO-9660 format (`.iso`).
#[derive(Debug, Clone, Copy, Default)]
pub struct Iso;

impl ArchiveFormat for Iso {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["iso"]
    }

    fn entries(&self, _archive: &dyn FileEntity, source: &mut dyn RandomRead) -> FsResult<Vec<ArchiveEntry>> {
        let geometry = detect_geometry(source)?;
        read_tree(
            source,
            SectorMap {
                geometry,
                ..SectorMap::default()
            },
        )
    }
}

fn malformed(details: impl Into<String>) -> FsError {
    FsError::StructuralFormat {
        format: FORMAT,
        details: details.into(),
    }
}

fn parse_error(error: io::Error) -> FsError {
    match error.kind() {
        io::ErrorKind::UnexpectedEof => malformed("truncated image"),
        io::ErrorKind::InvalidData => malformed(error.to_string()),
        _ => FsError::Io {
            operation: "parse",
            url: crate::FileUrl::local("/"),
            source: error,
        },
    }
}

/// The geometry under which the first volume descriptor carries `CD001`.
fn detect_geometry(source: &mut dyn RandomRead) -> FsResult<SectorGeometry> {
    for geometry in SectorGeometry::ALL {
        let map = SectorMap {
            geometry,
            ..SectorMap::default()
        };
        if let Ok(head) = read_sectors(source, map, DESCRIPTOR_START, 6) {
            if &head[1..6] == STANDARD_ID {
                return Ok(geometry);
            }
        }
    }
    Err(malformed("no volume descriptor found"))
}

/// Walk the directory tree described by the volume descriptors at `map`.
pub(crate) fn read_tree(source: &mut dyn RandomRead, map: SectorMap) -> FsResult<Vec<ArchiveEntry>> {
    let root = root_record(source, map)?;
    let mut walker = Walker {
        source,
        map,
        joliet: root.joliet,
        visited: HashSet::new(),
        entries: Vec::new(),
    };
    walker.visited.insert(root.extent);
    walker.walk(root.extent, root.size, "", 0)?;
    tracing::debug!(entries = walker.entries.len(), joliet = root.joliet, "parsed iso directory tree");
    Ok(walker.entries)
}

struct Root {
    extent: u64,
    size: u64,
    joliet: bool,
}

fn root_record(source: &mut dyn RandomRead, map: SectorMap) -> FsResult<Root> {
    let mut primary = None;
    for lba in DESCRIPTOR_START..DESCRIPTOR_START + MAX_DESCRIPTORS {
        let descriptor = read_sectors(source, map, lba, USER_DATA).map_err(parse_error)?;
        if &descriptor[1..6] != STANDARD_ID {
            return Err(malformed(format!("bad volume descriptor at sector {lba}")));
        }
        let record = &descriptor[156..190];
        let root = Root {
            extent: u64::from(le32(record, 2)),
            size: u64::from(le32(record, 10)),
            joliet: false,
        };
        match descriptor[0] {
            1 if primary.is_none() => primary = Some(root),
            2 if JOLIET_ESCAPES.iter().any(|e| &descriptor[88..91] == *e) => {
                return Ok(Root { joliet: true, ..root });
            }
            255 => break,
            _ => {}
        }
    }
    primary.ok_or_else(|| malformed("no primary volume descriptor"))
}

struct Walker<'a> {
    source: &'a mut dyn RandomRead,
    map: SectorMap,
    joliet: bool,
    visited: HashSet<u64>,
    entries: Vec<ArchiveEntry>,
}

impl Walker<'_> {
    fn walk(&mut self, extent: u64, size: u64, prefix: &str, depth: usize) -> FsResult<()> {
        if depth > MAX_DEPTH {
            return Err(malformed("directory tree too deep"));
        }
        let data = read_sectors(&mut *self.source, self.map, extent, size).map_err(parse_error)?;

        let mut pos = 0;
        while pos < data.len() {
            let record_len = usize::from(data[pos]);
            if record_len == 0 {
                // Records never straddle sectors; zero padding up to the next one.
                pos = (pos / USER_DATA as usize + 1) * USER_DATA as usize;
                continue;
            }
            let record = data
                .get(pos..pos + record_len)
                .filter(|r| r.len() >= 34)
                .ok_or_else(|| malformed(format!("directory record overruns extent {extent}")))?;
            pos += record_len;

            let name_len = usize::from(record[32]);
            let raw_name = record
                .get(33..33 + name_len)
                .ok_or_else(|| malformed("directory record name overruns record"))?;
            if raw_name == [0] || raw_name == [1] {
                continue;
            }

            let directory = record[25] & 0x02 != 0;
            let name = self.decode_name(raw_name, directory);
            if name.is_empty() {
                continue;
            }
            let path = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            let child_extent = u64::from(le32(record, 2));
            let child_size = u64::from(le32(record, 10));

            self.entries.push(ArchiveEntry {
                path: path.clone(),
                directory,
                modified: recording_date(&record[18..25]),
                size: if directory { 0 } else { child_size },
                header_len: 0,
                start: child_extent,
                geometry: self.map.geometry,
                sector_offset: self.map.sector_offset,
                shift: self.map.shift,
                synthesized: false,
            });

            if directory && self.visited.insert(child_extent) {
                self.walk(child_extent, child_size, &path, depth + 1)?;
            }
        }
        Ok(())
    }

    fn decode_name(&self, raw: &[u8], directory: bool) -> String {
        let mut name = if self.joliet {
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            String::from_utf8_lossy(raw).into_owned()
        };
        if let Some(i) = name.rfind(';') {
            name.truncate(i);
        }
        if !directory && name.ends_with('.') {
            name.pop();
        }
        name
    }
}

fn le32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Decode a 7-byte directory record date: years since 1900, month, day,
/// hour, minute, second, GMT offset in 15-minute units.
fn recording_date(raw: &[u8]) -> SystemTime {
    let [years, month, day, hour, minute, second, gmt] = [raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6]];
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return SystemTime::UNIX_EPOCH;
    }
    let days = days_from_civil(1900 + i64::from(years), i64::from(month), i64::from(day));
    let seconds = days * 86_400 + i64::from(hour) * 3_600 + i64::from(minute) * 60 + i64::from(second)
        - i64::from(gmt as i8) * 900;
    u64::try_from(seconds)
        .map(|s| SystemTime::UNIX_EPOCH + Duration::from_secs(s))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Days since 1970-01-01 of a proleptic Gregorian date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
pub(crate) mod testing {
    //! Builder of small ISO-9660 images for tests.

    use super::*;

    /// A file or directory to lay out in a test image.
    pub(crate) enum Node {
        File(&'static str, Vec<u8>),
        Dir(&'static str, Vec<Node>),
    }

    fn record(name: &[u8], extent: u32, size: u32, directory: bool) -> Vec<u8> {
        let len = 33 + name.len() + (name.len() + 1) % 2;
        let mut r = vec![0u8; len];
        r[0] = len as u8;
        r[2..6].copy_from_slice(&extent.to_le_bytes());
        r[6..10].copy_from_slice(&extent.to_be_bytes());
        r[10..14].copy_from_slice(&size.to_le_bytes());
        r[14..18].copy_from_slice(&size.to_be_bytes());
        // 2020-06-15 12:30:00 UTC
        r[18..25].copy_from_slice(&[120, 6, 15, 12, 30, 0, 0]);
        r[25] = if directory { 0x02 } else { 0 };
        r[32] = name.len() as u8;
        r[33..33 + name.len()].copy_from_slice(name);
        r
    }

    /// Lay out `root` as a cooked (2048-byte sector) image.
    pub(crate) fn build_image(root: Vec<Node>) -> Vec<u8> {
        let mut sectors: Vec<[u8; 2048]> = vec![[0u8; 2048]; 18];
        let root_extent = place_dir(&mut sectors, root, None);

        let mut pvd = [0u8; 2048];
        pvd[0] = 1;
        pvd[1..6].copy_from_slice(STANDARD_ID);
        pvd[6] = 1;
        pvd[156..190].copy_from_slice(&record(&[0], root_extent, 2048, true)[..34]);
        sectors[16] = pvd;

        let mut terminator = [0u8; 2048];
        terminator[0] = 255;
        terminator[1..6].copy_from_slice(STANDARD_ID);
        sectors[17] = terminator;

        sectors.concat()
    }

    fn place_dir(sectors: &mut Vec<[u8; 2048]>, nodes: Vec<Node>, parent: Option<u32>) -> u32 {
        let extent = sectors.len() as u32;
        sectors.push([0u8; 2048]);
        let mut table = record(&[0], extent, 2048, true);
        table.extend(record(&[1], parent.unwrap_or(extent), 2048, true));

        for node in nodes {
            match node {
                Node::File(name, data) => {
                    let file_extent = sectors.len() as u32;
                    for chunk in data.chunks(2048) {
                        let mut sector = [0u8; 2048];
                        sector[..chunk.len()].copy_from_slice(chunk);
                        sectors.push(sector);
                    }
                    let name = format!("{name};1");
                    table.extend(record(name.as_bytes(), file_extent, data.len() as u32, false));
                }
                Node::Dir(name, children) => {
                    let child_extent = place_dir(sectors, children, Some(extent));
                    table.extend(record(name.as_bytes(), child_extent, 2048, true));
                }
            }
        }
        sectors[extent as usize][..table.len()].copy_from_slice(&table);
        extent
    }
}
