use std::io;
use thiserror::Error;

/// Failures while building a container.  Every variant aborts the whole
/// encode; bytes already written to the sink are left as they are.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("unable to create container: {0}")]
    SinkUnavailable(#[source] io::Error),
    #[error("unable to open input #{index}: {source}")]
    SourceUnavailable { index: usize, #[source] source: io::Error },
    #[error("failed to read input #{index}: {source}")]
    ReadFailure { index: usize, #[source] source: io::Error },
    #[error("failed to write container: {0}")]
    WriteFailure(#[source] io::Error),
    #[error("input #{index} exceeds the {} byte entry limit", u32::MAX)]
    EntryTooLarge { index: usize },
    #[error("too many entries: {0} (limit {})", u32::MAX)]
    TooManyEntries(usize),
    #[error("container declares {expected} entries but only {written} were written")]
    MissingEntries { expected: u32, written: u32 },
    #[error("an earlier entry failed; the container cannot be completed")]
    Aborted,
}

impl EncodeError {
    /// Index of the input the failure belongs to, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            EncodeError::SourceUnavailable { index, .. }
            | EncodeError::ReadFailure { index, .. }
            | EncodeError::EntryTooLarge { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Where a truncated container ran out of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncatedAt {
    EntryCount,
    SizeTable { expected: u32, found: u32 },
    Payload { index: usize, expected: u32, found: u64 },
}

impl std::fmt::Display for TruncatedAt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TruncatedAt::EntryCount => write!(f, "entry count"),
            TruncatedAt::SizeTable { expected, found } =>
                write!(f, "size table ({found} of {expected} sizes present)"),
            TruncatedAt::Payload { index, expected, found } =>
                write!(f, "entry #{index} ({found} of {expected} bytes present)"),
        }
    }
}

/// Failures while reading a container.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unable to open container: {0}")]
    SourceUnavailable(#[source] io::Error),
    #[error("not a KmergeV1 container")]
    InvalidFormat,
    #[error("container truncated at {0}")]
    Truncated(TruncatedAt),
    #[error("container declares {requested} entries; limit is {limit}")]
    AllocationLimitExceeded { requested: u32, limit: u32 },
    #[error("failed to read container: {0}")]
    ReadFailure(#[source] io::Error),
    #[error("unable to create output directory: {0}")]
    OutputDirUnavailable(#[source] io::Error),
    #[error("unable to write entry #{index}: {source}")]
    SinkUnavailable { index: usize, #[source] source: io::Error },
    #[error("entry #{index} does not exist (container has {len})")]
    NoSuchEntry { index: usize, len: usize },
    #[error("entry #{index} was already consumed; next readable entry is #{next}")]
    OutOfOrder { index: usize, next: usize },
    #[error("an earlier entry failed mid-payload; the container stream is no longer aligned")]
    Aborted,
}

impl DecodeError {
    pub fn index(&self) -> Option<usize> {
        match self {
            DecodeError::SinkUnavailable { index, .. }
            | DecodeError::NoSuchEntry { index, .. }
            | DecodeError::OutOfOrder { index, .. }
            | DecodeError::Truncated(TruncatedAt::Payload { index, .. }) => Some(*index),
            _ => None,
        }
    }
}
