//! Container reader.
//!
//! [`ContainerReader`] parses the header up front (magic, entry count, full
//! size table) and then streams payloads strictly forward.  No seeking is
//! needed, so any `Read` works as a source.
//!
//! # Untrusted header fields
//! The entry count is checked against [`DecodeLimits::max_entries`] and, when
//! the container length is known, against the bytes actually available.  The
//! size table is then read incrementally, so its allocation only ever grows
//! with bytes that really exist in the stream.
//!
//! # Truncation
//! Extraction is partial up to the failure point: entries before the first
//! short payload are complete, the short entry's sink holds whatever bytes
//! were present, and nothing after it is attempted.

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::ops::Range;

use crate::encode::COPY_BUF_SIZE;
use crate::error::{DecodeError, TruncatedAt};
use crate::format::{self, header_len, PREAMBLE_LEN, SIZE_LEN};

/// Default ceiling on the declared entry count (a 4 MiB size table).
pub const DEFAULT_MAX_ENTRIES: u32 = 1 << 20;

// ── DecodeLimits ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    pub max_entries:   u32,
    /// Total container length, when the caller knows it (e.g. file metadata).
    pub available_len: Option<u64>,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_entries:   DEFAULT_MAX_ENTRIES,
            available_len: None,
        }
    }
}

impl DecodeLimits {
    pub fn for_len(len: u64) -> Self {
        Self { available_len: Some(len), ..Self::default() }
    }
}

// ── Entry ─────────────────────────────────────────────────────────────────────

/// One entry as described by the size table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub index:  usize,
    pub size:   u32,
    /// Absolute offset of the payload within the container.
    pub offset: u64,
}

impl Entry {
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.size as u64
    }

    pub fn is_empty(&self) -> bool { self.size == 0 }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ContainerReader<R: Read> {
    reader:   R,
    entries:  Vec<Entry>,
    next:     usize,
    poisoned: bool,
    buf:      Vec<u8>,
}

impl<R: Read> ContainerReader<R> {
    pub fn new(reader: R) -> Result<Self, DecodeError> {
        Self::with_limits(reader, DecodeLimits::default())
    }

    pub fn with_limits(mut reader: R, limits: DecodeLimits) -> Result<Self, DecodeError> {
        match format::read_magic(&mut reader) {
            Ok(true) => {}
            Ok(false) => return Err(DecodeError::InvalidFormat),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(DecodeError::InvalidFormat)
            }
            Err(e) => return Err(DecodeError::ReadFailure(e)),
        }

        let count = format::read_entry_count(&mut reader)
            .map_err(|e| eof_or(e, TruncatedAt::EntryCount))?;

        if count > limits.max_entries {
            return Err(DecodeError::AllocationLimitExceeded {
                requested: count,
                limit:     limits.max_entries,
            });
        }
        if let Some(available) = limits.available_len {
            if available < header_len(count) {
                let found = available.saturating_sub(PREAMBLE_LEN as u64) / SIZE_LEN as u64;
                return Err(DecodeError::Truncated(TruncatedAt::SizeTable {
                    expected: count,
                    found:    found as u32,
                }));
            }
        }

        let mut entries = Vec::with_capacity(count.min(4096) as usize);
        let mut offset = header_len(count);
        for i in 0..count {
            let size = reader.read_u32::<LittleEndian>().map_err(|e| {
                eof_or(e, TruncatedAt::SizeTable { expected: count, found: i })
            })?;
            entries.push(Entry { index: i as usize, size, offset });
            offset += size as u64;
        }
        debug!("container header: {count} entries, {} payload bytes", offset - header_len(count));

        Ok(Self {
            reader,
            entries,
            next:     0,
            poisoned: false,
            buf:      vec![0u8; COPY_BUF_SIZE],
        })
    }

    pub fn entries(&self) -> &[Entry] { &self.entries }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn payload_len(&self) -> u64 {
        self.entries.iter().map(|e| e.size as u64).sum()
    }

    /// Index of the next entry the stream is positioned at.
    pub fn next_index(&self) -> usize { self.next }

    pub fn into_inner(self) -> R { self.reader }

    /// Stream entry `index` into `sink`.  Entries between the current
    /// position and `index` are skipped; entries already passed cannot be
    /// revisited.
    pub fn write_entry<W: Write>(&mut self, index: usize, mut sink: W) -> Result<u32, DecodeError> {
        if self.poisoned {
            return Err(DecodeError::Aborted);
        }
        if index >= self.entries.len() {
            return Err(DecodeError::NoSuchEntry { index, len: self.entries.len() });
        }
        if index < self.next {
            return Err(DecodeError::OutOfOrder { index, next: self.next });
        }

        while self.next < index {
            let skipped = self.entries[self.next];
            self.skip_entry(skipped)?;
        }

        let entry = self.entries[index];
        self.poisoned = true;
        let mut remaining = entry.size as usize;
        while remaining > 0 {
            let want = remaining.min(self.buf.len());
            let n = match self.reader.read(&mut self.buf[..want]) {
                Ok(0) => {
                    return Err(DecodeError::Truncated(TruncatedAt::Payload {
                        index,
                        expected: entry.size,
                        found:    (entry.size as usize - remaining) as u64,
                    }))
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::ReadFailure(e)),
            };
            sink.write_all(&self.buf[..n])
                .map_err(|source| DecodeError::SinkUnavailable { index, source })?;
            remaining -= n;
        }
        sink.flush().map_err(|source| DecodeError::SinkUnavailable { index, source })?;

        self.poisoned = false;
        self.next = index + 1;
        debug!("entry #{index}: {} bytes extracted", entry.size);
        Ok(entry.size)
    }

    /// Read entry `index` into memory.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>, DecodeError> {
        let hint = self.entries.get(index).map_or(0, |e| e.size as usize);
        let mut out = Vec::with_capacity(hint.min(COPY_BUF_SIZE));
        self.write_entry(index, &mut out)?;
        Ok(out)
    }

    /// Extract every remaining entry in order.  `open_sink` is called once per
    /// entry; each sink is dropped before the next one is opened.
    pub fn extract_all<F, W>(&mut self, mut open_sink: F) -> Result<usize, DecodeError>
    where
        F: FnMut(&Entry) -> io::Result<W>,
        W: Write,
    {
        let start = self.next;
        for index in start..self.entries.len() {
            let entry = self.entries[index];
            let sink = open_sink(&entry)
                .map_err(|source| DecodeError::SinkUnavailable { index, source })?;
            self.write_entry(index, sink)?;
        }
        Ok(self.entries.len() - start)
    }

    fn skip_entry(&mut self, entry: Entry) -> Result<(), DecodeError> {
        self.poisoned = true;
        let skipped = io::copy(&mut (&mut self.reader).take(entry.size as u64), &mut io::sink())
            .map_err(DecodeError::ReadFailure)?;
        if skipped < entry.size as u64 {
            return Err(DecodeError::Truncated(TruncatedAt::Payload {
                index:    entry.index,
                expected: entry.size,
                found:    skipped,
            }));
        }
        self.poisoned = false;
        self.next = entry.index + 1;
        Ok(())
    }
}

/// Parse the header of `source`; the returned reader lists the entries and
/// extracts them with [`ContainerReader::write_entry`].
pub fn decode<R: Read>(source: R) -> Result<ContainerReader<R>, DecodeError> {
    ContainerReader::new(source)
}

fn eof_or(e: io::Error, at: TruncatedAt) -> DecodeError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        DecodeError::Truncated(at)
    } else {
        DecodeError::ReadFailure(e)
    }
}
