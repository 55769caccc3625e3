use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dbfsync_core::RawRecord;

use crate::error::{SourceError, SourceResult};
use crate::RecordSource;

/// In-memory record source (for testing).
#[derive(Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<PathBuf, Vec<RawRecord>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the records served for `path`.
    pub fn set(&self, path: impl AsRef<Path>, records: Vec<RawRecord>) {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.as_ref().to_path_buf(), records);
    }
}

impl RecordSource for MemorySource {
    fn open(&self, path: &Path) -> SourceResult<Vec<RawRecord>> {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.display().to_string()))
    }
}
