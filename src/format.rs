//! On-disk layout of a `KmergeV1` container.
//!
//! ```text
//! offset        width           field
//! 0             8               magic  "KmergeV1"
//! 8             4               entry_count (N)
//! 12            4 * N           size[0..N)
//! 12 + 4N       size[0]         payload[0]
//! ...           size[i]         payload[i], directly after payload[i-1]
//! ```
//!
//! All integers are little-endian `u32`.  There is no padding, alignment,
//! checksum or trailer; the payload region is exactly `sum(size)` bytes.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Fixed tag identifying format and version.
pub const MAGIC:        [u8; 8] = *b"KmergeV1";
pub const MAGIC_LEN:    usize   = 8;
pub const COUNT_LEN:    usize   = 4;
pub const SIZE_LEN:     usize   = 4;
/// Magic + entry count; the size table starts here.
pub const PREAMBLE_LEN: usize   = MAGIC_LEN + COUNT_LEN;

/// Length of the full header (preamble + size table) for `entry_count` entries.
#[inline]
pub fn header_len(entry_count: u32) -> u64 {
    PREAMBLE_LEN as u64 + SIZE_LEN as u64 * entry_count as u64
}

/// Absolute offset of the size slot belonging to entry `index`.
#[inline]
pub fn size_slot_offset(index: u32) -> u64 {
    PREAMBLE_LEN as u64 + SIZE_LEN as u64 * index as u64
}

// ── Header ────────────────────────────────────────────────────────────────────

/// Parsed or to-be-written container header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub entry_count: u32,
    pub sizes:       Vec<u32>,
}

impl Header {
    pub fn new(sizes: Vec<u32>) -> Self {
        Self { entry_count: sizes.len() as u32, sizes }
    }

    /// Sum of all entry sizes.
    pub fn payload_len(&self) -> u64 {
        self.sizes.iter().map(|&s| s as u64).sum()
    }

    pub fn total_len(&self) -> u64 {
        header_len(self.entry_count) + self.payload_len()
    }

    /// Write magic, count and the complete size table.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u32::<LittleEndian>(self.entry_count)?;
        for &size in &self.sizes {
            writer.write_u32::<LittleEndian>(size)?;
        }
        Ok(())
    }
}

/// Read the 8-byte tag.  Returns `Ok(false)` when the bytes are present but
/// do not match, and an `UnexpectedEof` error when fewer than 8 bytes exist.
pub fn read_magic<R: Read>(mut reader: R) -> io::Result<bool> {
    let mut magic = [0u8; MAGIC_LEN];
    reader.read_exact(&mut magic)?;
    Ok(magic == MAGIC)
}

pub fn read_entry_count<R: Read>(mut reader: R) -> io::Result<u32> {
    reader.read_u32::<LittleEndian>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_len_is_fixed_by_count() {
        assert_eq!(header_len(0), 12);
        assert_eq!(header_len(2), 20);
        assert_eq!(header_len(u32::MAX), 12 + 4 * u32::MAX as u64);
        assert_eq!(size_slot_offset(0), 12);
        assert_eq!(size_slot_offset(3), 24);
    }

    #[test]
    fn header_write_layout() {
        let header = Header::new(vec![2, 6]);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(&buf[..8], b"KmergeV1");
        assert_eq!(&buf[8..], &[2, 0, 0, 0, 2, 0, 0, 0, 6, 0, 0, 0]);
        assert_eq!(header.payload_len(), 8);
        assert_eq!(header.total_len(), 28);
    }

    #[test]
    fn magic_mismatch_and_short_read() {
        assert!(read_magic(&b"KmergeV1"[..]).unwrap());
        assert!(!read_magic(&b"KmergeV2"[..]).unwrap());
        let err = read_magic(&b"Kmer"[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
