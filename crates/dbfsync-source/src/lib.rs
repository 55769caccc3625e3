mod dbf;
mod error;
mod file_meta;
mod memory;

use std::path::Path;

use dbfsync_core::RawRecord;

pub use dbf::DbfSource;
pub use error::{FileAccessError, SourceError, SourceResult};
pub use file_meta::{FileChangeDetector, FileCheck};
pub use memory::MemorySource;

/// Reads every record of a tabular source file, in file order.
pub trait RecordSource: Send + Sync {
    fn open(&self, path: &Path) -> SourceResult<Vec<RawRecord>>;
}
