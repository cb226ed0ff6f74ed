//! Persistence of the program table in `<home>/programs.json`.

use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use tempfile::Builder;
use thiserror::Error;

use warden_rpc::ProgramInfo;

/// Errors raised while loading or saving the program table.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The programs file path had no parent or file name component.
    #[error("program list path '{path}' is not a file path")]
    InvalidPath {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Reading the programs file failed.
    #[error("failed to read program list '{path}': {source}")]
    Read {
        /// Programs file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The programs file did not contain a JSON program list.
    #[error("failed to parse program list '{path}': {source}")]
    Parse {
        /// Programs file path.
        path: Utf8PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// Serialising the program list failed.
    #[error("failed to encode program list: {0}")]
    Encode(#[source] serde_json::Error),
    /// Writing the programs file failed.
    #[error("failed to write program list '{path}': {source}")]
    Write {
        /// Programs file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Reads and atomically rewrites the persisted program list.
#[derive(Debug, Clone)]
pub(crate) struct ProgramStore {
    path: Utf8PathBuf,
}

impl ProgramStore {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the stored programs. A missing file is an empty list.
    pub(crate) fn load(&self) -> Result<Vec<ProgramInfo>, StoreError> {
        let Some(contents) = self.read_optional()? else {
            return Ok(Vec::new());
        };
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the stored programs. Readers never observe a partial file.
    pub(crate) fn save(&self, programs: &[ProgramInfo]) -> Result<(), StoreError> {
        let mut encoded = serde_json::to_vec_pretty(programs).map_err(StoreError::Encode)?;
        encoded.push(b'\n');
        let (directory, _) = self.split()?;
        atomic_write(directory, &self.path, &encoded).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn read_optional(&self) -> Result<Option<String>, StoreError> {
        let (directory, file_name) = self.split()?;
        let read_error = |source: io::Error| StoreError::Read {
            path: self.path.clone(),
            source,
        };
        let dir = match Dir::open_ambient_dir(directory, ambient_authority()) {
            Ok(dir) => dir,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(read_error(error)),
        };
        match dir.read_to_string(file_name) {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(read_error(error)),
        }
    }

    fn split(&self) -> Result<(&Utf8Path, &str), StoreError> {
        self.path
            .parent()
            .zip(self.path.file_name())
            .ok_or_else(|| StoreError::InvalidPath {
                path: self.path.clone(),
            })
    }
}

fn atomic_write(directory: &Utf8Path, path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let mut file = Builder::new()
        .prefix(".programs")
        .suffix(".tmp")
        .tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
