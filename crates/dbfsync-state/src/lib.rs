mod error;
mod json;
mod memory;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use dbfsync_core::{DiffState, DiffStrategy, FileMeta};
use serde::{Deserialize, Serialize};

pub use error::{StateError, StateResult};
pub use json::JsonStateStore;
pub use memory::MemoryStateStore;

/// Durable state for one source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileState {
    /// Modification time seen when the file was last fully processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<f64>,
    /// Size seen when the file was last fully processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Content-hash snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digests: Option<BTreeSet<String>>,
    /// Monotonic high-water mark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_water: Option<i64>,
    /// Records confirmed by the remote side over the file's lifetime.
    #[serde(default)]
    pub records_delivered: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl FileState {
    /// The stored file metadata, if both parts are present.
    pub fn meta(&self) -> Option<FileMeta> {
        match (self.mtime, self.size) {
            (Some(mtime), Some(size)) => Some(FileMeta { mtime, size }),
            _ => None,
        }
    }

    pub fn set_meta(&mut self, meta: FileMeta) {
        self.mtime = Some(meta.mtime);
        self.size = Some(meta.size);
    }

    /// Diff state for a strategy; missing state starts from scratch.
    pub fn diff_state(&self, strategy: &DiffStrategy) -> DiffState {
        match strategy {
            DiffStrategy::ContentHash => self
                .digests
                .clone()
                .map(DiffState::Digests)
                .unwrap_or_else(|| DiffState::initial(strategy)),
            DiffStrategy::Sequence { .. } => self
                .high_water
                .map(DiffState::HighWater)
                .unwrap_or_else(|| DiffState::initial(strategy)),
        }
    }

    /// Replace the diff state. Only one of digests / high-water is kept.
    pub fn set_diff_state(&mut self, state: DiffState) {
        match state {
            DiffState::Digests(set) => {
                self.digests = Some(set);
                self.high_water = None;
            }
            DiffState::HighWater(mark) => {
                self.high_water = Some(mark);
                self.digests = None;
            }
        }
    }
}

/// State of every source file, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState {
    pub files: BTreeMap<String, FileState>,
}

impl SyncState {
    pub fn file(&self, key: &str) -> Option<&FileState> {
        self.files.get(key)
    }

    pub fn file_mut(&mut self, key: &str) -> &mut FileState {
        self.files.entry(key.to_string()).or_default()
    }

    /// Forget a file so every record is treated as new. Returns whether it existed.
    pub fn forget(&mut self, key: &str) -> bool {
        self.files.remove(key).is_some()
    }
}

/// Trait for state storage backends.
pub trait StateStore: Send + Sync {
    /// Load the full state. Never fails: unreadable state yields an empty one.
    fn load(&self) -> SyncState;

    /// Persist the full state in a single atomic write.
    fn save(&self, state: &SyncState) -> StateResult<()>;
}
