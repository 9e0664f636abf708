//! Sector geometry, logical-to-physical mapping and the entry reader.

use std::io::{self, Read, Seek, SeekFrom};

use crate::RandomRead;

/// Bytes of user data per logical sector.
pub(crate) const USER_DATA: u64 = 2048;

/// Length of the RIFF/WAVE header prepended to synthesized audio entries.
pub const WAV_HEADER_LEN: u64 = 44;

/// Physical sector layout of a disc image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SectorGeometry {
    /// Cooked 2048-byte sectors holding user data only.
    #[default]
    Mode1,
    /// 2336-byte sectors: 8-byte subheader, then user data.
    Mode2,
    /// Raw 2352-byte sectors: 24 bytes of sync, header and subheader, then
    /// user data. Also the layout of audio tracks.
    Raw,
}

impl SectorGeometry {
    /// Every geometry, most common first.
    pub const ALL: [SectorGeometry; 3] = [Self::Mode1, Self::Raw, Self::Mode2];

    /// Physical sector size in bytes.
    pub const fn sector_size(self) -> u64 {
        match self {
            SectorGeometry::Mode1 => 2048,
            SectorGeometry::Mode2 => 2336,
            SectorGeometry::Raw => 2352,
        }
    }

    /// Offset of the user data inside a physical sector.
    pub const fn data_offset(self) -> u64 {
        match self {
            SectorGeometry::Mode1 => 0,
            SectorGeometry::Mode2 => 8,
            SectorGeometry::Raw => 24,
        }
    }
}

/// Maps logical sector numbers to byte positions of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct SectorMap {
    pub(crate) geometry: SectorGeometry,
    pub(crate) sector_offset: u64,
    pub(crate) shift: u64,
}

impl SectorMap {
    /// Byte position of the user data of logical sector `lba`.
    pub(crate) fn physical(&self, lba: u64) -> io::Result<u64> {
        lba.checked_sub(self.sector_offset)
            .and_then(|rel| rel.checked_mul(self.geometry.sector_size()))
            .and_then(|pos| pos.checked_add(self.shift))
            .and_then(|pos| pos.checked_add(self.geometry.data_offset()))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "sector outside of track"))
    }
}

/// Read `len` bytes of user data starting at logical sector `lba`.
///
/// A `len` beyond the container length is rejected before allocating.
pub(crate) fn read_sectors(
    source: &mut dyn RandomRead,
    map: SectorMap,
    lba: u64,
    len: u64,
) -> io::Result<Vec<u8>> {
    if len > source.length()? {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("extent of {len} bytes exceeds the image"),
        ));
    }
    let capacity = usize::try_from(len).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut data = vec![0u8; capacity];
    let mut sector = lba;
    for chunk in data.chunks_mut(USER_DATA as usize) {
        source.seek(SeekFrom::Start(map.physical(sector)?))?;
        source.read_exact(chunk)?;
        sector += 1;
    }
    Ok(data)
}

/// 44-byte RIFF/WAVE header for `payload_len` bytes of CD audio
/// (PCM, stereo, 44.1 kHz, 16-bit).
pub fn wav_header(payload_len: u64) -> [u8; WAV_HEADER_LEN as usize] {
    const SAMPLE_RATE: u32 = 44_100;
    const CHANNELS: u16 = 2;
    const BITS: u16 = 16;
    const BLOCK_ALIGN: u16 = CHANNELS * BITS / 8;

    let data_len = u32::try_from(payload_len).unwrap_or(u32::MAX);
    let riff_len = data_len.saturating_add(36);

    let mut header = [0u8; WAV_HEADER_LEN as usize];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_len.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&SAMPLE_RATE.to_le_bytes());
    header[28..32].copy_from_slice(&(SAMPLE_RATE * u32::from(BLOCK_ALIGN)).to_le_bytes());
    header[32..34].copy_from_slice(&BLOCK_ALIGN.to_le_bytes());
    header[34..36].copy_from_slice(&BITS.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

/// Where an entry's payload lives in the container.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Extent {
    /// Contiguous bytes from this position.
    Contiguous(u64),
    /// User data of consecutive logical sectors from `first`.
    Sectors { first: u64, map: SectorMap },
}

/// Seekable reader of one entry: an optional synthesized header followed by
/// the payload.
pub(crate) struct EntryReader {
    source: Box<dyn RandomRead>,
    header: Vec<u8>,
    extent: Extent,
    len: u64,
    pos: u64,
}

impl EntryReader {
    pub(crate) fn new(source: Box<dyn RandomRead>, header: Vec<u8>, extent: Extent, payload_len: u64) -> Self {
        let len = payload_len + header.len() as u64;
        Self {
            source,
            header,
            extent,
            len,
            pos: 0,
        }
    }

    /// Container position of payload byte `offset`, and how many bytes can be
    /// read from there in one go.
    fn locate(&self, offset: u64) -> io::Result<(u64, u64)> {
        let remaining = self.len - self.pos;
        match self.extent {
            Extent::Contiguous(base) => Ok((base + offset, remaining)),
            Extent::Sectors { first, map } => {
                let within = offset % USER_DATA;
                let position = map.physical(first + offset / USER_DATA)? + within;
                Ok((position, remaining.min(USER_DATA - within)))
            }
        }
    }
}

impl Read for EntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }

        let header_len = self.header.len() as u64;
        if self.pos < header_len {
            let start = self.pos as usize;
            let n = buf.len().min(self.header.len() - start);
            buf[..n].copy_from_slice(&self.header[start..start + n]);
            self.pos += n as u64;
            return Ok(n);
        }

        let (position, available) = self.locate(self.pos - header_len)?;
        let want = buf.len().min(usize::try_from(available).unwrap_or(usize::MAX));
        self.source.seek(SeekFrom::Start(position))?;
        let n = self.source.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "container truncated"));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for EntryReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of entry")
        })?;
        self.pos = target;
        Ok(target)
    }
}
