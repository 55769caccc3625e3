pub mod batcher;
pub mod diff;
pub mod error;
pub mod mapping;
pub mod transform;
pub mod types;

pub use batcher::{Batch, Batcher};
pub use diff::{content_digest, DiffState, DiffStrategy, RecordDiffEngine, Resolution, Verdict};
pub use error::{Error, RecordMappingError, Result};
pub use mapping::{
    standard_priority_rules, Endpoint, Feed, FieldKind, FieldSpec, KeyField, MappingProfile,
    MappingProfileBuilder, Priority, PriorityMatch, PriorityRule, QuantityRule, YearRule,
};
pub use transform::{
    classify_priority, clean_record, clean_value, extract_quantity, extract_year, CleanedRecord,
    FieldMapper, MappedRecord, Transformer,
};
pub use types::{FileMeta, Fingerprint, RawRecord, Value};
