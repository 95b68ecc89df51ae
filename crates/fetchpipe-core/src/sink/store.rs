//! Storage medium behind the sink: one file per payload.

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::error::{SetupError, StoreError};

/// Persists one payload. Blocking; the sink calls it from the blocking pool.
pub trait PayloadStore: Send + Sync + 'static {
    /// Stores `payload` and returns where it went.
    fn store(&self, payload: &[u8]) -> Result<PathBuf, StoreError>;
}

/// Writes each payload to `<dir>/<uuid-v4>.<ext>`.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
    extension: String,
}

impl DirStore {
    /// Checks that `dir` exists and is a directory. Does not create it.
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Result<Self, SetupError> {
        let dir = dir.into();
        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(SetupError::OutDirNotDir(dir)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SetupError::OutDirMissing(dir))
            }
            Err(source) => return Err(SetupError::OutDirAccess { path: dir, source }),
        }
        Ok(Self {
            dir,
            extension: extension.trim_start_matches('.').to_string(),
        })
    }

    fn next_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        if self.extension.is_empty() {
            self.dir.join(id.to_string())
        } else {
            self.dir.join(format!("{}.{}", id, self.extension))
        }
    }
}

impl PayloadStore for DirStore {
    fn store(&self, payload: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.next_path();
        fs::write(&path, payload).map_err(|source| StoreError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
