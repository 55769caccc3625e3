use crate::transform::MappedRecord;

/// A consecutive, size-bounded run of records sent in one request.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// Position of this batch within the pass (0-based).
    pub index: usize,
    /// Position of the first record within the full record list.
    pub offset: usize,
    pub records: &'a [MappedRecord],
}

impl Batch<'_> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Splits records into consecutive batches of at most `max_rows`.
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    max_rows: usize,
}

impl Batcher {
    /// A batch size of zero is treated as one.
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows: max_rows.max(1),
        }
    }

    /// Partition records, preserving their order.
    pub fn partition<'a>(&self, records: &'a [MappedRecord]) -> Vec<Batch<'a>> {
        records
            .chunks(self.max_rows)
            .enumerate()
            .map(|(index, chunk)| Batch {
                index,
                offset: index * self.max_rows,
                records: chunk,
            })
            .collect()
    }
}
