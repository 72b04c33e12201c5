use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cannot use {path} as a directory: {message}")]
    Directory { path: PathBuf, message: String },
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Creates `dir` (and parents) unless it already exists as a directory.
pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    let failed = |message: String| PersistError::Directory {
        path: dir.to_path_buf(),
        message,
    };
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(failed("path exists and is not a directory".into())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| failed(e.to_string()))
        }
        Err(err) => Err(failed(err.to_string())),
    }
}

/// Writes files into one directory via a temp file and a rename, so a reader
/// sees either the old content or the new one, never a prefix.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        self.write_bytes(filename, content.as_bytes())
    }

    pub fn write_bytes(&self, filename: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_dir(&self.dir)?;
        let target = self.dir.join(filename);
        let wrap = |source: io::Error| PersistError::Write {
            path: target.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(wrap)?;
        tmp.write_all(content).map_err(wrap)?;
        tmp.as_file_mut().sync_all().map_err(wrap)?;
        tmp.persist(&target).map_err(|e| wrap(e.error))?;
        Ok(target)
    }

    /// Deletes `filename` if present.
    pub fn remove(&self, filename: &str) -> Result<(), PersistError> {
        let target = self.dir.join(filename);
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistError::Write {
                path: target,
                source,
            }),
        }
    }
}
