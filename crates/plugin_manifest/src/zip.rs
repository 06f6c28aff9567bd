//! Read-only access to entries of a zip container.
//!
//! Only what plugin archives need is supported: the central directory is
//! walked to find an entry by name, and `stored` or `deflate` entries are
//! decoded and checked against their CRC-32. Zip64, encryption, multi-disk
//! archives and other compression methods are reported as unsupported.
//!
//! Decoded entries are capped in size. Both the declared size and the bytes
//! actually produced by the decoder count against the cap.

use crate::ManifestError;
use flate2::read::DeflateDecoder;
use flate2::Crc;
use std::io::Read;

const EOCD_SIGNATURE: u32 = 0x0605_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

const EOCD_LEN: usize = 22;
const CENTRAL_HEADER_LEN: usize = 46;
const LOCAL_HEADER_LEN: usize = 30;
/// The archive comment may push the end record this far from the end.
const MAX_COMMENT_LEN: usize = u16::MAX as usize;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;
const FLAG_ENCRYPTED: u16 = 0x0001;

/// Largest entry [`ZipArchive::read`] will decode.
pub const MAX_ENTRY_SIZE: u64 = 1024 * 1024;

/// Central directory record for one entry.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub method: u16,
    pub flags: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub local_header_offset: u32,
}

/// A zip archive held in memory.
pub struct ZipArchive {
    data: Vec<u8>,
    entries: Vec<ZipEntry>,
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, ManifestError> {
    data.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| ManifestError::Corrupt(format!("truncated at offset {at}")))
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, ManifestError> {
    data.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| ManifestError::Corrupt(format!("truncated at offset {at}")))
}

impl ZipArchive {
    /// Parses the central directory of `data`.
    pub fn new(data: Vec<u8>) -> Result<Self, ManifestError> {
        let eocd = Self::find_end_record(&data)?;

        let disk = read_u16(&data, eocd + 4)?;
        let cd_disk = read_u16(&data, eocd + 6)?;
        if disk != 0 || cd_disk != 0 {
            return Err(ManifestError::Unsupported("multi-disk archive".to_string()));
        }

        let entry_count = read_u16(&data, eocd + 10)? as usize;
        let cd_offset = read_u32(&data, eocd + 16)?;
        if cd_offset == u32::MAX || entry_count == u16::MAX as usize {
            return Err(ManifestError::Unsupported("zip64 archive".to_string()));
        }

        let mut entries = Vec::with_capacity(entry_count);
        let mut cursor = cd_offset as usize;
        for _ in 0..entry_count {
            if read_u32(&data, cursor)? != CENTRAL_HEADER_SIGNATURE {
                return Err(ManifestError::Corrupt(format!(
                    "bad central directory header at offset {cursor}"
                )));
            }

            let name_len = read_u16(&data, cursor + 28)? as usize;
            let extra_len = read_u16(&data, cursor + 30)? as usize;
            let comment_len = read_u16(&data, cursor + 32)? as usize;
            let name_start = cursor + CENTRAL_HEADER_LEN;
            let name = data
                .get(name_start..name_start + name_len)
                .ok_or_else(|| ManifestError::Corrupt("truncated entry name".to_string()))?;

            entries.push(ZipEntry {
                name: String::from_utf8_lossy(name).into_owned(),
                flags: read_u16(&data, cursor + 8)?,
                method: read_u16(&data, cursor + 10)?,
                crc32: read_u32(&data, cursor + 16)?,
                compressed_size: read_u32(&data, cursor + 20)?,
                uncompressed_size: read_u32(&data, cursor + 24)?,
                local_header_offset: read_u32(&data, cursor + 42)?,
            });

            cursor = name_start + name_len + extra_len + comment_len;
        }

        Ok(Self { data, entries })
    }

    /// Scans backwards for the end-of-central-directory record.
    fn find_end_record(data: &[u8]) -> Result<usize, ManifestError> {
        if data.len() < EOCD_LEN {
            return Err(ManifestError::Corrupt("file too small to be a zip archive".to_string()));
        }
        let lowest = data.len().saturating_sub(EOCD_LEN + MAX_COMMENT_LEN);
        (lowest..=data.len() - EOCD_LEN)
            .rev()
            .find(|&at| read_u32(data, at).ok() == Some(EOCD_SIGNATURE))
            .ok_or_else(|| ManifestError::Corrupt("end of central directory not found".to_string()))
    }

    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn find(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Decodes the contents of `entry` and verifies its checksum.
    pub fn read(&self, entry: &ZipEntry) -> Result<Vec<u8>, ManifestError> {
        self.read_limited(entry, MAX_ENTRY_SIZE)
    }

    /// Like [`read`](Self::read), refusing entries larger than `limit` bytes.
    pub fn read_limited(&self, entry: &ZipEntry, limit: u64) -> Result<Vec<u8>, ManifestError> {
        if entry.flags & FLAG_ENCRYPTED != 0 {
            return Err(ManifestError::Unsupported(format!("{} is encrypted", entry.name)));
        }
        let too_large = || ManifestError::TooLarge {
            name: entry.name.clone(),
            limit,
        };
        if u64::from(entry.uncompressed_size) > limit {
            return Err(too_large());
        }

        let header = entry.local_header_offset as usize;
        if read_u32(&self.data, header)? != LOCAL_HEADER_SIGNATURE {
            return Err(ManifestError::Corrupt(format!("bad local header for {}", entry.name)));
        }
        let name_len = read_u16(&self.data, header + 26)? as usize;
        let extra_len = read_u16(&self.data, header + 28)? as usize;
        let start = header + LOCAL_HEADER_LEN + name_len + extra_len;
        let raw = self
            .data
            .get(start..start + entry.compressed_size as usize)
            .ok_or_else(|| ManifestError::Corrupt(format!("truncated data for {}", entry.name)))?;

        let contents = match entry.method {
            METHOD_STORED if raw.len() as u64 > limit => return Err(too_large()),
            METHOD_STORED => raw.to_vec(),
            METHOD_DEFLATE => {
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(raw)
                    .take(limit + 1)
                    .read_to_end(&mut out)
                    .map_err(|e| ManifestError::Corrupt(format!("inflate {} failed: {e}", entry.name)))?;
                if out.len() as u64 > limit {
                    return Err(too_large());
                }
                out
            }
            other => {
                return Err(ManifestError::Unsupported(format!(
                    "compression method {other} for {}",
                    entry.name
                )))
            }
        };

        let mut crc = Crc::new();
        crc.update(&contents);
        if crc.sum() != entry.crc32 {
            return Err(ManifestError::Corrupt(format!("checksum mismatch for {}", entry.name)));
        }

        Ok(contents)
    }
}
