//! Merge, split and list containers on disk.
//!
//! ```no_run
//! use kmerge::archive::{merge, split, SplitOptions};
//!
//! merge("m", &["x", "y", "z"])?;
//! let written = split("m", &SplitOptions::default())?;
//! assert_eq!(written.len(), 3); // k1.bin, k2.bin, k3.bin
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use log::{info, warn};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Seek};
use std::path::{Path, PathBuf};

use crate::decode::{ContainerReader, DecodeLimits, Entry};
use crate::encode::encode;
use crate::error::{DecodeError, EncodeError};

// ── SplitOptions ──────────────────────────────────────────────────────────────

/// Where [`split`] writes entries and how it names them.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub output_dir: PathBuf,
    pub prefix:     String,
    pub extension:  String,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            prefix:     "k".to_owned(),
            extension:  "bin".to_owned(),
        }
    }
}

impl SplitOptions {
    /// Output path for entry `index`; names are 1-based (`k1.bin` is entry 0).
    pub fn output_path(&self, index: usize) -> PathBuf {
        self.output_dir.join(format!("{}{}.{}", self.prefix, index + 1, self.extension))
    }
}

// ── Merge ─────────────────────────────────────────────────────────────────────

/// Concatenate `inputs` in order into a new container at `output`.
///
/// Inputs are opened one at a time as the encoder reaches them.  On failure
/// the partially written container is left on disk.  Returns the container
/// length in bytes.
pub fn merge<P: AsRef<Path>, Q: AsRef<Path>>(output: P, inputs: &[Q]) -> Result<u64, EncodeError> {
    let output = output.as_ref();
    let file = File::create(output).map_err(EncodeError::SinkUnavailable)?;

    let sources = inputs.iter().map(|p| File::open(p.as_ref()).map(BufReader::new));
    let mut sink = encode(BufWriter::new(file), sources)?;

    let len = sink.stream_position().map_err(EncodeError::WriteFailure)?;
    info!("merged {} file(s) into {} ({len} bytes)", inputs.len(), output.display());
    Ok(len)
}

// ── Split ─────────────────────────────────────────────────────────────────────

fn open_container(container: &Path) -> Result<ContainerReader<BufReader<File>>, DecodeError> {
    let file = File::open(container).map_err(DecodeError::SourceUnavailable)?;
    let len = file.metadata().map_err(DecodeError::SourceUnavailable)?.len();
    ContainerReader::with_limits(BufReader::new(file), DecodeLimits::for_len(len))
}

/// Extract every entry of `container` into its own file.  Returns the paths
/// written, in entry order.
///
/// Extraction stops at the first failure; files written before it are kept.
pub fn split<P: AsRef<Path>>(container: P, opts: &SplitOptions) -> Result<Vec<PathBuf>, DecodeError> {
    let container = container.as_ref();
    let mut reader = open_container(container)?;

    if !opts.output_dir.exists() {
        fs::create_dir_all(&opts.output_dir)
            .map_err(DecodeError::OutputDirUnavailable)?;
    }

    let mut written = Vec::with_capacity(reader.len());
    let result = reader.extract_all(|entry| {
        let path = opts.output_path(entry.index);
        let file = File::create(&path)?;
        written.push(path);
        Ok(BufWriter::new(file))
    });

    match result {
        Ok(n) => {
            info!("split {} into {n} file(s)", container.display());
            Ok(written)
        }
        Err(e) => {
            if !written.is_empty() {
                warn!("split of {} aborted; {} file(s) left on disk", container.display(), written.len());
            }
            Err(e)
        }
    }
}

/// Read only the header of `container` and describe its entries.
pub fn list<P: AsRef<Path>>(container: P) -> Result<Vec<Entry>, DecodeError> {
    Ok(open_container(container.as_ref())?.entries().to_vec())
}
