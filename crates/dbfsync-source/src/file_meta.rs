use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use dbfsync_core::FileMeta;

use crate::error::FileAccessError;

/// Result of comparing a file against its stored metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileCheck {
    pub changed: bool,
    pub current: FileMeta,
}

/// Cheap gate in front of the record scan: compares modification time and size.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileChangeDetector;

impl FileChangeDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn stat(&self, path: &Path) -> Result<FileMeta, FileAccessError> {
        let err = |source| FileAccessError {
            path: path.display().to_string(),
            source,
        };
        let metadata = fs::metadata(path).map_err(err)?;
        let mtime = metadata
            .modified()
            .map_err(err)?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Ok(FileMeta {
            mtime,
            size: metadata.len(),
        })
    }

    pub fn check(
        &self,
        path: &Path,
        stored: Option<&FileMeta>,
    ) -> Result<FileCheck, FileAccessError> {
        let current = self.stat(path)?;
        let changed = match stored {
            Some(prev) => prev.mtime != current.mtime || prev.size != current.size,
            None => true,
        };
        Ok(FileCheck { changed, current })
    }

    pub fn changed(&self, path: &Path, stored: Option<&FileMeta>) -> Result<bool, FileAccessError> {
        self.check(path, stored).map(|c| c.changed)
    }
}
