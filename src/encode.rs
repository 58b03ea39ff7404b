//! Container writer.
//!
//! [`ContainerWriter`] is the single-pass streaming encoder.  The header is
//! laid down first with a zero-filled size table; each entry is then streamed
//! into the payload region through a fixed copy buffer, and its size slot is
//! patched once the entry's length is known.  Only the copy buffer is held in
//! memory, whatever the input sizes.
//!
//! The magic tag is written as zeros and stamped by [`ContainerWriter::finish`],
//! so a container abandoned mid-encode never passes the decoder's magic check.
//!
//! [`encode_buffers`] is the two-pass variant for non-seekable sinks: all
//! sizes are known up front, so the header and payloads are written strictly
//! in order.

use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::EncodeError;
use crate::format::{header_len, size_slot_offset, Header, MAGIC, MAGIC_LEN, SIZE_LEN};

/// Copy buffer used when streaming a single entry.
pub const COPY_BUF_SIZE: usize = 64 * 1024;

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ContainerWriter<W: Write + Seek> {
    writer:         W,
    /// Absolute sink offset of the container's first byte.
    base:           u64,
    entry_count:    u32,
    written:        u32,
    header_cursor:  u64,
    payload_cursor: u64,
    /// Set while an entry is in flight; stays set if it fails.
    poisoned:       bool,
    buf:            Vec<u8>,
}

impl<W: Write + Seek> ContainerWriter<W> {
    /// Start a container of `entry_count` entries at the sink's current position.
    pub fn new(mut writer: W, entry_count: usize) -> Result<Self, EncodeError> {
        let count = u32::try_from(entry_count)
            .map_err(|_| EncodeError::TooManyEntries(entry_count))?;

        let base = writer.stream_position().map_err(EncodeError::WriteFailure)?;
        writer.write_all(&[0u8; MAGIC_LEN]).map_err(EncodeError::WriteFailure)?; // stamped on finish
        writer.write_u32::<LittleEndian>(count).map_err(EncodeError::WriteFailure)?;

        // Reserved size table; slots are patched as entries complete.
        let table_len = SIZE_LEN as u64 * count as u64;
        io::copy(&mut io::repeat(0).take(table_len), &mut writer)
            .map_err(EncodeError::WriteFailure)?;

        Ok(Self {
            writer,
            base,
            entry_count:    count,
            written:        0,
            header_cursor:  base + size_slot_offset(0),
            payload_cursor: base + header_len(count),
            poisoned:       false,
            buf:            vec![0u8; COPY_BUF_SIZE],
        })
    }

    pub fn entry_count(&self) -> u32 { self.entry_count }

    /// Number of entries completed so far.
    pub fn written(&self) -> u32 { self.written }

    /// Bytes of container produced so far, header included.
    pub fn container_len(&self) -> u64 { self.payload_cursor - self.base }

    /// Stream `reader` to EOF as the next entry.  Returns the entry size.
    ///
    /// Any failure poisons the writer: later `add_entry` and `finish` calls
    /// return [`EncodeError::Aborted`].
    pub fn add_entry<R: Read>(&mut self, mut reader: R) -> Result<u32, EncodeError> {
        if self.poisoned {
            return Err(EncodeError::Aborted);
        }
        let index = self.written as usize;
        if self.written == self.entry_count {
            self.poisoned = true;
            return Err(EncodeError::TooManyEntries(index + 1));
        }

        self.poisoned = true;

        self.writer.seek(SeekFrom::Start(self.payload_cursor))
            .map_err(EncodeError::WriteFailure)?;

        let mut len: u64 = 0;
        loop {
            let n = match reader.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(EncodeError::ReadFailure { index, source }),
            };
            len += n as u64;
            if len > u32::MAX as u64 {
                return Err(EncodeError::EntryTooLarge { index });
            }
            self.writer.write_all(&self.buf[..n]).map_err(EncodeError::WriteFailure)?;
        }
        let size = len as u32;

        self.writer.seek(SeekFrom::Start(self.header_cursor))
            .map_err(EncodeError::WriteFailure)?;
        self.writer.write_u32::<LittleEndian>(size).map_err(EncodeError::WriteFailure)?;

        self.header_cursor  += SIZE_LEN as u64;
        self.payload_cursor += len;
        self.written        += 1;
        self.poisoned       = false;
        debug!("entry #{index}: {size} bytes, container now {} bytes", self.container_len());
        Ok(size)
    }

    /// Check every declared entry was written, stamp the magic tag, park the
    /// sink at the end of the container, flush, and hand the sink back.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        if self.poisoned {
            return Err(EncodeError::Aborted);
        }
        if self.written != self.entry_count {
            return Err(EncodeError::MissingEntries {
                expected: self.entry_count,
                written:  self.written,
            });
        }
        self.writer.seek(SeekFrom::Start(self.base)).map_err(EncodeError::WriteFailure)?;
        self.writer.write_all(&MAGIC).map_err(EncodeError::WriteFailure)?;
        self.writer.seek(SeekFrom::Start(self.payload_cursor))
            .map_err(EncodeError::WriteFailure)?;
        self.writer.flush().map_err(EncodeError::WriteFailure)?;
        Ok(self.writer)
    }
}

// ── One-shot helpers ─────────────────────────────────────────────────────────

/// Encode `sources` in order into `sink`.
///
/// Sources are pulled lazily: each one is opened only when its turn comes and
/// is dropped before the next is opened.  An `Err` item aborts the encode
/// with [`EncodeError::SourceUnavailable`].
pub fn encode<W, I, R>(sink: W, sources: I) -> Result<W, EncodeError>
where
    W: Write + Seek,
    I: IntoIterator<Item = io::Result<R>>,
    I::IntoIter: ExactSizeIterator,
    R: Read,
{
    let sources = sources.into_iter();
    let mut writer = ContainerWriter::new(sink, sources.len())?;
    for (index, source) in sources.enumerate() {
        let reader = source.map_err(|source| EncodeError::SourceUnavailable { index, source })?;
        writer.add_entry(reader)?;
    }
    writer.finish()
}

/// Encode in-memory payloads into a sink that need not be seekable.
pub fn encode_buffers<W, B>(mut sink: W, entries: &[B]) -> Result<W, EncodeError>
where
    W: Write,
    B: AsRef<[u8]>,
{
    if u32::try_from(entries.len()).is_err() {
        return Err(EncodeError::TooManyEntries(entries.len()));
    }
    let sizes = entries.iter().enumerate()
        .map(|(index, e)| u32::try_from(e.as_ref().len())
            .map_err(|_| EncodeError::EntryTooLarge { index }))
        .collect::<Result<Vec<u32>, _>>()?;

    Header::new(sizes).write(&mut sink).map_err(EncodeError::WriteFailure)?;
    for entry in entries {
        sink.write_all(entry.as_ref()).map_err(EncodeError::WriteFailure)?;
    }
    sink.flush().map_err(EncodeError::WriteFailure)?;
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode_slices(entries: &[&[u8]]) -> Vec<u8> {
        let sink = encode(Cursor::new(Vec::new()), entries.iter().map(|e| Ok(*e))).unwrap();
        sink.into_inner()
    }

    /// Yields `good` bytes, then fails.
    struct FailingReader { good: usize }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.good == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "device gone"));
            }
            let n = self.good.min(buf.len());
            buf[..n].fill(b'x');
            self.good -= n;
            Ok(n)
        }
    }

    /// Accepts `room` bytes, then reports a full disk.
    #[derive(Debug)]
    struct FullDisk { inner: Cursor<Vec<u8>>, room: usize }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.room == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left"));
            }
            let n = self.room.min(buf.len());
            self.room -= n;
            self.inner.write(&buf[..n])
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    impl Seek for FullDisk {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> { self.inner.seek(pos) }
    }

    #[test]
    fn two_entry_layout() {
        let bytes = encode_slices(&[b"hi", b"world!"]);
        let mut expected = b"KmergeV1".to_vec();
        expected.extend_from_slice(&[2, 0, 0, 0, 2, 0, 0, 0, 6, 0, 0, 0]);
        expected.extend_from_slice(b"hiworld!");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn empty_list_is_bare_preamble() {
        let bytes = encode_slices(&[]);
        assert_eq!(bytes, b"KmergeV1\0\0\0\0");
    }

    #[test]
    fn zero_length_entries() {
        let bytes = encode_slices(&[b"", b"abc", b""]);
        assert_eq!(&bytes[8..12], &[3, 0, 0, 0]);
        assert_eq!(&bytes[12..24], &[0, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[24..], b"abc");
    }

    #[test]
    fn large_entry_spans_many_copy_buffers() {
        let big: Vec<u8> = (0..COPY_BUF_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let bytes = encode_slices(&[&big[..], b"tail"]);
        assert_eq!(&bytes[12..16], &(big.len() as u32).to_le_bytes());
        assert_eq!(&bytes[16..20], &4u32.to_le_bytes());
        assert_eq!(&bytes[20..20 + big.len()], &big[..]);
        assert_eq!(&bytes[20 + big.len()..], b"tail");
    }

    #[test]
    fn container_starts_at_current_position() {
        let mut cursor = Cursor::new(Vec::new());
        cursor.write_all(b"prefix").unwrap();
        let sink = encode(cursor, [Ok(&b"ab"[..])]).unwrap();
        let bytes = sink.into_inner();
        assert_eq!(&bytes[..6], b"prefix");
        assert_eq!(&bytes[6..14], b"KmergeV1");
        assert_eq!(&bytes[14..22], &[1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(&bytes[22..], b"ab");
    }

    #[test]
    fn buffers_match_streaming_output() {
        let entries: [&[u8]; 4] = [b"one", b"", b"three", b"\x00\xff"];
        let two_pass = encode_buffers(Vec::new(), &entries).unwrap();
        assert_eq!(two_pass, encode_slices(&entries));
    }

    #[test]
    fn unavailable_source_aborts() {
        let sources: Vec<io::Result<&[u8]>> = vec![
            Ok(&b"first"[..]),
            Err(io::Error::new(io::ErrorKind::NotFound, "missing")),
            Ok(&b"never reached"[..]),
        ];
        let err = encode(Cursor::new(Vec::new()), sources).unwrap_err();
        assert!(matches!(err, EncodeError::SourceUnavailable { index: 1, .. }));
        assert_eq!(err.index(), Some(1));
    }

    #[test]
    fn read_failure_names_the_entry() {
        let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), 2).unwrap();
        writer.add_entry(&b"ok"[..]).unwrap();
        let err = writer.add_entry(FailingReader { good: 10 }).unwrap_err();
        assert!(matches!(err, EncodeError::ReadFailure { index: 1, .. }));
    }

    #[test]
    fn failed_entry_cannot_be_skipped() {
        let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), 2).unwrap();
        writer.add_entry(&b"aa"[..]).unwrap();
        writer.add_entry(FailingReader { good: 8 }).unwrap_err();

        assert!(matches!(writer.add_entry(&b"ok"[..]), Err(EncodeError::Aborted)));
        assert_eq!(writer.written(), 1);
        assert!(matches!(writer.finish(), Err(EncodeError::Aborted)));
    }

    #[test]
    fn failed_write_poisons_finish() {
        let sink = FullDisk { inner: Cursor::new(Vec::new()), room: 20 };
        let mut writer = ContainerWriter::new(sink, 1).unwrap();
        assert!(matches!(
            writer.add_entry(&b"does not fit"[..]),
            Err(EncodeError::WriteFailure(_))
        ));
        assert!(matches!(writer.finish(), Err(EncodeError::Aborted)));
    }

    #[test]
    fn write_failure_surfaces() {
        let sink = FullDisk { inner: Cursor::new(Vec::new()), room: 16 };
        let err = encode(sink, [Ok(&b"more than the disk can hold"[..])]).unwrap_err();
        assert!(matches!(err, EncodeError::WriteFailure(_)));
    }

    #[test]
    fn declared_count_is_enforced() {
        let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), 1).unwrap();
        assert_eq!(writer.add_entry(&b"a"[..]).unwrap(), 1);
        assert!(matches!(
            writer.add_entry(&b"b"[..]),
            Err(EncodeError::TooManyEntries(2))
        ));
        assert!(matches!(writer.finish(), Err(EncodeError::Aborted)));

        let short = ContainerWriter::new(Cursor::new(Vec::new()), 3).unwrap();
        assert!(matches!(
            short.finish(),
            Err(EncodeError::MissingEntries { expected: 3, written: 0 })
        ));
    }

    #[test]
    fn abandoned_container_has_no_magic() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = ContainerWriter::new(&mut cursor, 2).unwrap();
            writer.add_entry(&b"partial"[..]).unwrap();
        }
        let bytes = cursor.into_inner();
        assert_eq!(&bytes[..8], &[0u8; 8]);
        assert_eq!(&bytes[12..16], &7u32.to_le_bytes());
    }

    #[test]
    fn container_len_tracks_payload() {
        let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), 2).unwrap();
        assert_eq!(writer.container_len(), 20);
        writer.add_entry(&b"12345"[..]).unwrap();
        assert_eq!(writer.container_len(), 25);
        assert_eq!(writer.written(), 1);
        assert_eq!(writer.entry_count(), 2);
    }
}
