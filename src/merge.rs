//! Merging previously recorded execution data files.
//!
//! [`ExecFileLoader`] is the accumulator: it reads any number of
//! execution data streams into one pair of stores, deduplicating by the
//! format's native keys and OR-combining probe arrays, then writes a
//! single merged stream. The `execmerge` binary is a thin CLI over it.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::execdata::{
    ExecDataError, ExecutionDataReader, ExecutionDataStore, ExecutionDataWriter, SessionInfoStore,
};

/// Error raised by [`merge_files`]. Every variant names the offending
/// resource, since that is all an operator has to go on.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("unable to write to destination file {}", .path.display())]
    UnwritableDestination { path: PathBuf },
    #[error("unable to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: ExecDataError,
    },
    #[error("unable to write merged file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Merges the execution data files in `inputs` into a single file at
/// `dest`, returning the number of files merged.
///
/// The destination is validated first: if it exists it must be a
/// writable regular file. Directories among the inputs are skipped, not
/// recursed. Any read or parse error aborts the whole merge before the
/// destination is touched - partial merges are never produced.
pub fn merge_files(dest: &Path, inputs: &[PathBuf]) -> Result<usize, MergeError> {
    if dest.exists() {
        let writable = dest
            .metadata()
            .is_ok_and(|m| m.is_file() && !m.permissions().readonly());
        if !writable {
            return Err(MergeError::UnwritableDestination {
                path: dest.to_path_buf(),
            });
        }
    }

    let mut loader = ExecFileLoader::new();
    let mut merged = 0;
    for path in inputs {
        if path.is_dir() {
            debug!(path = %path.display(), "skipping directory");
            continue;
        }
        debug!(path = %path.display(), "merging");
        loader.load_file(path).map_err(|source| MergeError::Read {
            path: path.clone(),
            source,
        })?;
        merged += 1;
    }
    info!("{merged} files merged");

    info!("writing merged execution data to {}", dest.display());
    loader.save_file(dest).map_err(|source| MergeError::Write {
        path: dest.to_path_buf(),
        source,
    })?;
    Ok(merged)
}

/// Loads execution data files into in-memory stores and serializes the
/// merged result.
///
/// Probe union holds across inputs: a probe is hit in the saved output
/// iff it was hit in at least one loaded input. Output order is
/// canonical - all session records sorted by dump time, then all
/// execution data records in class-id order - so loading a single file
/// and saving it yields the format's canonical form of that file.
#[derive(Debug, Default)]
pub struct ExecFileLoader {
    sessions: SessionInfoStore,
    store: ExecutionDataStore,
}

impl ExecFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one execution data stream into the accumulator.
    pub fn load<R: Read>(&mut self, input: R) -> Result<(), ExecDataError> {
        ExecutionDataReader::new(BufReader::new(input)).read(&mut self.sessions, &mut self.store)
    }

    /// Reads the execution data file at `path`.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ExecDataError> {
        self.load(File::open(path)?)
    }

    /// Writes the accumulated data as one execution data stream.
    pub fn save<W: Write>(&self, output: W) -> std::io::Result<()> {
        let mut writer = ExecutionDataWriter::new(output)?;
        self.sessions.accept(&mut writer)?;
        self.store.accept(&mut writer)?;
        writer.into_inner().flush()
    }

    /// Writes the accumulated data to `path`, creating parent
    /// directories as needed and truncating any existing file.
    pub fn save_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.save(BufWriter::new(File::create(path)?))
    }

    pub fn sessions(&self) -> &SessionInfoStore {
        &self.sessions
    }

    pub fn execution_data(&self) -> &ExecutionDataStore {
        &self.store
    }
}
